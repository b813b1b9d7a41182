//! Gamepad logic for one wireless client: translates GIP messages into
//! virtual input events and force feedback effects into rumble commands.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use evdev::{AbsoluteAxisCode, KeyCode};
use packed_struct::types::SizedInteger;
use thiserror::Error;

use crate::drivers::gip::report::{
    AnnounceData, GuideButtonData, InputData, SerialData, StatusData,
};
use crate::drivers::gip::session::{GipError, GipMessage, GipSession, SendPacket};
use crate::drivers::gip::{BatteryType, LedMode, PowerMode, DEVICE_ID_CONTROLLER};
use crate::drivers::mt76::radio::Mt76Radio;
use crate::input::device::{DeviceIdentity, FeedbackHandler, InputError, VirtualGamepad};
use crate::input::rumble::{shape_rumble, RumblePump};

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Gip(#[from] GipError),
    #[error(transparent)]
    Input(#[from] InputError),
}

/// Per-slot gamepad state. The GIP session is shared with the rumble pump
/// thread; the virtual input device is created once the client announces
/// itself.
pub struct Controller {
    gip: Arc<Mutex<GipSession>>,
    device: Option<VirtualGamepad>,
    rumble: Option<Arc<RumblePump>>,
    #[cfg(feature = "audio")]
    audio: Option<crate::audio::AudioStream>,
    battery_level: Option<u8>,
    serial_number: Option<String>,
}

impl Controller {
    pub fn new(radio: Arc<Mt76Radio>, wcid: u8, address: [u8; 6]) -> Self {
        let send: SendPacket = Arc::new(move |data: &[u8]| {
            radio
                .send_client_packet(wcid, address, data)
                .map_err(Into::into)
        });

        Self {
            gip: Arc::new(Mutex::new(GipSession::new(send))),
            device: None,
            rumble: None,
            #[cfg(feature = "audio")]
            audio: None,
            battery_level: None,
            serial_number: None,
        }
    }

    pub fn handle_packet(&mut self, packet: &[u8]) -> Result<(), ControllerError> {
        let message = self.gip.lock().unwrap().handle_packet(packet)?;

        match message {
            Some(GipMessage::Announce(announce)) => self.handle_announce(&announce)?,
            Some(GipMessage::Status(status)) => self.handle_status(&status),
            Some(GipMessage::GuideButton(button)) => self.handle_guide_button(&button)?,
            Some(GipMessage::SerialNumber(serial)) => self.handle_serial_number(&serial),
            Some(GipMessage::Input(input)) => self.handle_input(&input)?,
            #[cfg(feature = "audio")]
            Some(GipMessage::AudioConfig(config)) => self.handle_audio_config(&config),
            #[cfg(feature = "audio")]
            Some(GipMessage::AudioSamples(samples)) => self.handle_audio_samples(&samples),
            _ => {}
        }

        Ok(())
    }

    fn handle_announce(&mut self, announce: &AnnounceData) -> Result<(), ControllerError> {
        log::info!("Device announced, product id: {:04x}", announce.product_id);
        log::debug!(
            "Firmware version: {}.{}.{}.{}",
            announce.firmware_version.major,
            announce.firmware_version.minor,
            announce.firmware_version.build,
            announce.firmware_version.revision
        );
        log::debug!(
            "Hardware version: {}.{}.{}.{}",
            announce.hardware_version.major,
            announce.hardware_version.minor,
            announce.hardware_version.build,
            announce.hardware_version.revision
        );

        self.init_input(announce)
    }

    /// Initial handshake and virtual device creation: power the controller
    /// on, dim its LED like the original driver does and ask for the serial
    /// number.
    fn init_input(&mut self, announce: &AnnounceData) -> Result<(), ControllerError> {
        {
            let mut gip = self.gip.lock().unwrap();

            gip.set_power_mode(DEVICE_ID_CONTROLLER, PowerMode::On)?;
            // Brightness ranges from 0x00 to 0x20
            gip.set_led_mode(LedMode::On, 0x14)?;
            gip.request_serial_number()?;
        }

        let pump = Arc::new(RumblePump::new(self.gip.clone()));
        let rumbling = Arc::new(AtomicBool::new(false));

        let feedback: FeedbackHandler = {
            let pump = pump.clone();

            Box::new(move |effect, gain, value| {
                if !rumbling.load(Ordering::SeqCst) && gain == 0 {
                    return;
                }

                if let Some(rumble) = shape_rumble(&effect, gain, value) {
                    pump.put(rumble);
                    rumbling.store(gain > 0, Ordering::SeqCst);
                }
            })
        };

        let identity = DeviceIdentity::new(
            announce.vendor_id,
            announce.product_id,
            announce.firmware_version.major,
        );

        self.device = Some(VirtualGamepad::new(identity, feedback)?);
        self.rumble = Some(pump);

        Ok(())
    }

    fn handle_status(&mut self, status: &StatusData) {
        let level = status.battery_level.to_primitive();

        // Charging status and unchanged levels are not worth reporting
        if status.battery_type.to_primitive() == BatteryType::Charging as u8
            || self.battery_level == Some(level)
        {
            return;
        }

        log::info!("Battery level: {level}");

        self.battery_level = Some(level);
    }

    fn handle_guide_button(&self, button: &GuideButtonData) -> Result<(), ControllerError> {
        let Some(device) = &self.device else {
            return Ok(());
        };

        device.set_key(KeyCode::BTN_MODE, button.pressed != 0);
        device.report()?;

        Ok(())
    }

    fn handle_serial_number(&mut self, serial: &SerialData) {
        let number = String::from_utf8_lossy(&serial.serial_number)
            .trim_end_matches('\0')
            .to_string();

        log::info!("Serial number: {number}");

        self.serial_number = Some(number);
    }

    fn handle_input(&self, input: &InputData) -> Result<(), ControllerError> {
        let Some(device) = &self.device else {
            return Ok(());
        };

        device.set_key(KeyCode::BTN_START, input.start);
        device.set_key(KeyCode::BTN_SELECT, input.select);
        device.set_key(KeyCode::BTN_SOUTH, input.a);
        device.set_key(KeyCode::BTN_EAST, input.b);
        device.set_key(KeyCode::BTN_NORTH, input.x);
        device.set_key(KeyCode::BTN_WEST, input.y);
        device.set_key(KeyCode::BTN_TL, input.bumper_left);
        device.set_key(KeyCode::BTN_TR, input.bumper_right);
        device.set_key(KeyCode::BTN_THUMBL, input.stick_left);
        device.set_key(KeyCode::BTN_THUMBR, input.stick_right);
        device.set_axis(AbsoluteAxisCode::ABS_X, i32::from(input.stick_left_x));
        device.set_axis(AbsoluteAxisCode::ABS_RX, i32::from(input.stick_right_x));
        // Up is negative on the host side
        device.set_axis(AbsoluteAxisCode::ABS_Y, i32::from(!input.stick_left_y));
        device.set_axis(AbsoluteAxisCode::ABS_RY, i32::from(!input.stick_right_y));
        device.set_axis(AbsoluteAxisCode::ABS_Z, i32::from(input.trigger_left));
        device.set_axis(AbsoluteAxisCode::ABS_RZ, i32::from(input.trigger_right));
        device.set_axis(
            AbsoluteAxisCode::ABS_HAT0X,
            i32::from(input.dpad_right) - i32::from(input.dpad_left),
        );
        device.set_axis(
            AbsoluteAxisCode::ABS_HAT0Y,
            i32::from(input.dpad_down) - i32::from(input.dpad_up),
        );
        device.report()?;

        Ok(())
    }

    #[cfg(feature = "audio")]
    fn handle_audio_config(&mut self, config: &[u8]) {
        use crate::audio::AudioStream;

        if self.audio.is_some() {
            return;
        }

        // The format negotiation is not fully understood; the first payload
        // byte selects the sample rate
        let sample_rate = match config.first() {
            Some(0x00) => 24_000,
            _ => 48_000,
        };

        if let Err(e) = self.gip.lock().unwrap().enable_audio(DEVICE_ID_CONTROLLER) {
            log::error!("Failed to enable audio: {e}");

            return;
        }

        let gip = self.gip.clone();
        let stream = AudioStream::new(sample_rate, move |samples| {
            if let Err(e) = gip.lock().unwrap().send_audio_samples(samples) {
                log::error!("Failed to send audio samples: {e}");
            }
        });

        match stream {
            Ok(stream) => {
                log::info!("Audio enabled at {sample_rate} Hz");

                self.audio = Some(stream);
            }
            // Audio failures leave the gamepad running
            Err(e) => log::error!("Failed to open audio streams: {e}"),
        }
    }

    #[cfg(feature = "audio")]
    fn handle_audio_samples(&mut self, samples: &[u8]) {
        let Some(audio) = &self.audio else {
            return;
        };

        if let Err(e) = audio.write(samples) {
            log::error!("Failed to write audio samples: {e}");
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        let result = self
            .gip
            .lock()
            .unwrap()
            .set_power_mode(DEVICE_ID_CONTROLLER, PowerMode::Off);

        if let Err(e) = result {
            log::error!("Failed to turn off controller: {e}");
        }
    }
}
