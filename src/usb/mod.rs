use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusb::{Context, Device, DeviceHandle, Direction, Recipient, RequestType, UsbContext};
use thiserror::Error;

/// Largest bulk transfer the dongle will produce in a single read.
pub const MAX_BULK_TRANSFER_SIZE: usize = 512;

const TRANSFER_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum UsbError {
    #[error("failed to initialize USB context: {0}")]
    Context(rusb::Error),
    #[error("failed to open device: {0}")]
    Open(rusb::Error),
    #[error("failed to reset device: {0}")]
    Reset(rusb::Error),
    #[error("failed to set configuration: {0}")]
    Configuration(rusb::Error),
    #[error("failed to claim interface: {0}")]
    Claim(rusb::Error),
    #[error("failed to register hotplug callback: {0}")]
    Hotplug(rusb::Error),
    #[error("error handling USB events: {0}")]
    Events(rusb::Error),
    #[error("transfer failed: {0}")]
    Transfer(rusb::Error),
}

/// Called once when a transfer fails fatally, to unblock the main thread's
/// signal wait. Read timeouts do not count as fatal.
pub type Terminate = Box<dyn Fn() + Send + Sync>;

pub struct ControlPacket<'a> {
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub data: &'a mut [u8],
}

/// One opened dongle: configuration 1, interface 0 claimed, control and bulk
/// transfers. Bulk reads and writes may run concurrently from different
/// threads; the underlying library serialises per endpoint.
pub struct UsbTransport {
    handle: DeviceHandle<Context>,
    terminate: Terminate,
}

impl UsbTransport {
    fn open(device: &Device<Context>, terminate: Terminate) -> Result<Self, UsbError> {
        log::debug!("Opening device...");

        let mut handle = device.open().map_err(UsbError::Open)?;

        handle.reset().map_err(UsbError::Reset)?;
        handle
            .set_active_configuration(1)
            .map_err(UsbError::Configuration)?;
        handle.claim_interface(0).map_err(UsbError::Claim)?;

        Ok(Self { handle, terminate })
    }

    pub fn control_read(&self, packet: &mut ControlPacket) -> Result<(), UsbError> {
        let request_type = rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Device);
        let result = self.handle.read_control(
            request_type,
            packet.request,
            packet.value,
            packet.index,
            packet.data,
            TRANSFER_TIMEOUT,
        );

        self.check_transfer(result, packet.data.len())
    }

    pub fn control_write(&self, packet: &mut ControlPacket) -> Result<(), UsbError> {
        let request_type =
            rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device);
        let result = self.handle.write_control(
            request_type,
            packet.request,
            packet.value,
            packet.index,
            packet.data,
            TRANSFER_TIMEOUT,
        );

        self.check_transfer(result, packet.data.len())
    }

    /// Reads a bulk transfer into `buf`. A timeout is not an error and is
    /// reported as zero bytes.
    pub fn bulk_read(&self, endpoint: u8, buf: &mut [u8]) -> Result<usize, UsbError> {
        match self
            .handle
            .read_bulk(endpoint | rusb::constants::LIBUSB_ENDPOINT_IN, buf, TRANSFER_TIMEOUT)
        {
            Ok(transferred) => Ok(transferred),
            Err(rusb::Error::Timeout) => Ok(0),
            Err(e) => {
                log::error!("Error in bulk read: {e}");
                (self.terminate)();

                Err(UsbError::Transfer(e))
            }
        }
    }

    pub fn bulk_write(&self, endpoint: u8, data: &[u8]) -> Result<(), UsbError> {
        if let Err(e) = self.handle.write_bulk(endpoint, data, TRANSFER_TIMEOUT) {
            log::error!("Error in bulk write: {e}");
            (self.terminate)();

            return Err(UsbError::Transfer(e));
        }

        Ok(())
    }

    fn check_transfer(
        &self,
        result: Result<usize, rusb::Error>,
        expected: usize,
    ) -> Result<(), UsbError> {
        match result {
            Ok(transferred) if transferred == expected => Ok(()),
            Ok(_) => {
                log::error!("Short control transfer");
                (self.terminate)();

                Err(UsbError::Transfer(rusb::Error::Io))
            }
            Err(e) => {
                log::error!("Error in control transfer: {e}");
                (self.terminate)();

                Err(UsbError::Transfer(e))
            }
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        log::debug!("Closing device...");

        if let Err(e) = self.handle.release_interface(0) {
            log::error!("Error releasing interface: {e}");
        }
    }
}

struct ArrivalHandler {
    device: Arc<Mutex<Option<Device<Context>>>>,
}

impl rusb::Hotplug<Context> for ArrivalHandler {
    fn device_arrived(&mut self, device: Device<Context>) {
        self.device.lock().unwrap().replace(device);
    }

    fn device_left(&mut self, _device: Device<Context>) {}
}

/// Blocks until a device matching one of the given (vendor, product) pairs is
/// plugged in, then returns an owning transport for it.
pub struct DeviceWatcher {
    context: Context,
}

impl DeviceWatcher {
    pub fn new() -> Result<Self, UsbError> {
        let context = Context::new().map_err(UsbError::Context)?;

        Ok(Self { context })
    }

    pub fn wait_for_device(
        &self,
        ids: &[(u16, u16)],
        terminate: Terminate,
    ) -> Result<UsbTransport, UsbError> {
        let device = Arc::new(Mutex::new(None));
        let mut registrations = Vec::with_capacity(ids.len());

        for (vendor_id, product_id) in ids {
            let registration = rusb::HotplugBuilder::new()
                .vendor_id(*vendor_id)
                .product_id(*product_id)
                .enumerate(true)
                .register(
                    &self.context,
                    Box::new(ArrivalHandler {
                        device: device.clone(),
                    }),
                )
                .map_err(UsbError::Hotplug)?;

            registrations.push(registration);
        }

        log::info!("Waiting for device...");

        // Handle events until a device is plugged in
        let device = loop {
            if let Some(device) = device.lock().unwrap().take() {
                break device;
            }

            self.context
                .handle_events(Some(Duration::from_millis(500)))
                .map_err(UsbError::Events)?;
        };

        drop(registrations);

        UsbTransport::open(&device, terminate)
    }
}
