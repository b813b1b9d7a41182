//! Virtual gamepad exposed to the host through uinput.

use std::collections::HashMap;
use std::env;
use std::io::ErrorKind;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AbsInfo, AbsoluteAxisCode, AttributeSet, BusType, EventSummary, EventType, FFEffectCode,
    FFEffectData, FFEffectKind, InputEvent, InputId, KeyCode, SynchronizationCode,
    SynchronizationEvent, UInputCode, UinputAbsSetup,
};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use thiserror::Error;

use crate::sync::interrupt::{InterruptError, InterruptibleReader};

pub const DEVICE_NAME: &str = "Xbox One Wireless Controller";

/// Satisfies games that compare pad names against hard-coded strings.
const COMPATIBILITY_NAME: &str = "Microsoft X-Box 360 pad";
const COMPATIBILITY_PRODUCT_ID: u16 = 0x028e;
const COMPATIBILITY_VERSION: u16 = 0x0104;

const MAX_FF_EFFECTS: u32 = 1;
const EFFECT_ID: i16 = 0;

const STICK_FUZZ: i32 = 255;
const STICK_FLAT: i32 = 4095;
const TRIGGER_FUZZ: i32 = 3;
const TRIGGER_FLAT: i32 = 63;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("failed to configure virtual device: {0}")]
    Setup(std::io::Error),
    #[error("failed to emit events: {0}")]
    Emit(std::io::Error),
    #[error("failed to set up event reader: {0}")]
    Reader(#[from] InterruptError),
    #[error("failed to set non-blocking mode: {0}")]
    NonBlocking(nix::Error),
}

/// Identity the virtual device reports to the kernel.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub version: u16,
    pub name: String,
}

impl DeviceIdentity {
    /// Uses the controller's real ids, unless compatibility mode is
    /// requested through the environment.
    pub fn new(vendor_id: u16, product_id: u16, version: u16) -> Self {
        if env::var("XOW_COMPATIBILITY").as_deref() == Ok("1") {
            Self {
                vendor_id,
                product_id: COMPATIBILITY_PRODUCT_ID,
                version: COMPATIBILITY_VERSION,
                name: COMPATIBILITY_NAME.to_string(),
            }
        } else {
            Self {
                vendor_id,
                product_id,
                version,
                name: DEVICE_NAME.to_string(),
            }
        }
    }
}

/// Called from the event reader thread with the uploaded effect, the
/// effective gain and the play count. A value of zero stops the feedback.
pub type FeedbackHandler = Box<dyn Fn(FFEffectData, u16, i32) + Send + Sync>;

/// A uinput gamepad: emits key and axis events towards the host and pumps
/// force feedback uploads back through the feedback handler.
pub struct VirtualGamepad {
    device: Arc<Mutex<VirtualDevice>>,
    axes: HashMap<AbsoluteAxisCode, AbsInfo>,
    pending: Mutex<Vec<InputEvent>>,
    reader: Arc<InterruptibleReader>,
    thread: Option<JoinHandle<()>>,
}

impl VirtualGamepad {
    pub fn new(identity: DeviceIdentity, feedback: FeedbackHandler) -> Result<Self, InputError> {
        let axes = Self::axis_setup();
        let device = Self::create_device(&identity, &axes)?;

        // Non-blocking reads so the event thread can be interrupted
        let raw_fd = device.as_raw_fd();
        let fd = unsafe { BorrowedFd::borrow_raw(raw_fd) };
        fcntl(fd, FcntlArg::F_SETFL(OFlag::O_NONBLOCK)).map_err(InputError::NonBlocking)?;

        let device = Arc::new(Mutex::new(device));
        let reader = Arc::new(InterruptibleReader::new(raw_fd)?);

        let thread = {
            let device = device.clone();
            let reader = reader.clone();
            let effect = Arc::new(Mutex::new(None));
            let gain = Arc::new(AtomicU16::new(0xffff));

            thread::spawn(move || Self::read_events(device, reader, effect, gain, feedback))
        };

        Ok(Self {
            device,
            axes,
            pending: Mutex::new(Vec::new()),
            reader,
            thread: Some(thread),
        })
    }

    fn axis_setup() -> HashMap<AbsoluteAxisCode, AbsInfo> {
        let mut axes = HashMap::new();

        // 16 bits (signed) for the sticks
        let stick = AbsInfo::new(0, -32768, 32767, STICK_FUZZ, STICK_FLAT, 0);
        axes.insert(AbsoluteAxisCode::ABS_X, stick);
        axes.insert(AbsoluteAxisCode::ABS_Y, stick);
        axes.insert(AbsoluteAxisCode::ABS_RX, stick);
        axes.insert(AbsoluteAxisCode::ABS_RY, stick);

        // 10 bits (unsigned) for the triggers
        let trigger = AbsInfo::new(0, 0, 1023, TRIGGER_FUZZ, TRIGGER_FLAT, 0);
        axes.insert(AbsoluteAxisCode::ABS_Z, trigger);
        axes.insert(AbsoluteAxisCode::ABS_RZ, trigger);

        let dpad = AbsInfo::new(0, -1, 1, 0, 0, 0);
        axes.insert(AbsoluteAxisCode::ABS_HAT0X, dpad);
        axes.insert(AbsoluteAxisCode::ABS_HAT0Y, dpad);

        axes
    }

    fn create_device(
        identity: &DeviceIdentity,
        axes: &HashMap<AbsoluteAxisCode, AbsInfo>,
    ) -> Result<VirtualDevice, InputError> {
        let mut keys = AttributeSet::<KeyCode>::new();
        keys.insert(KeyCode::BTN_MODE);
        keys.insert(KeyCode::BTN_START);
        keys.insert(KeyCode::BTN_SELECT);
        keys.insert(KeyCode::BTN_SOUTH);
        keys.insert(KeyCode::BTN_EAST);
        keys.insert(KeyCode::BTN_NORTH);
        keys.insert(KeyCode::BTN_WEST);
        keys.insert(KeyCode::BTN_TL);
        keys.insert(KeyCode::BTN_TR);
        keys.insert(KeyCode::BTN_THUMBL);
        keys.insert(KeyCode::BTN_THUMBR);

        let mut ff = AttributeSet::<FFEffectCode>::new();
        ff.insert(FFEffectCode::FF_RUMBLE);
        ff.insert(FFEffectCode::FF_GAIN);

        let id = InputId::new(
            BusType::BUS_USB,
            identity.vendor_id,
            identity.product_id,
            identity.version,
        );

        let mut builder = VirtualDeviceBuilder::new()
            .map_err(InputError::Setup)?
            .name(&identity.name)
            .input_id(id)
            .with_keys(&keys)
            .map_err(InputError::Setup)?;

        for (code, info) in axes {
            builder = builder
                .with_absolute_axis(&UinputAbsSetup::new(*code, *info))
                .map_err(InputError::Setup)?;
        }

        builder
            .with_ff(&ff)
            .map_err(InputError::Setup)?
            .with_ff_effects_max(MAX_FF_EFFECTS)
            .build()
            .map_err(InputError::Setup)
    }

    /// Queues a key event for the next report.
    pub fn set_key(&self, code: KeyCode, pressed: bool) {
        self.pending
            .lock()
            .unwrap()
            .push(InputEvent::new(EventType::KEY.0, code.0, pressed as i32));
    }

    /// Queues an axis event for the next report, clamped to the axis range.
    pub fn set_axis(&self, code: AbsoluteAxisCode, value: i32) {
        let value = match self.axes.get(&code) {
            Some(info) => value.clamp(info.minimum(), info.maximum()),
            None => value,
        };

        self.pending
            .lock()
            .unwrap()
            .push(InputEvent::new(EventType::ABSOLUTE.0, code.0, value));
    }

    /// Emits all queued events followed by one synchronization report.
    pub fn report(&self) -> Result<(), InputError> {
        let events: Vec<InputEvent> = {
            let mut pending = self.pending.lock().unwrap();

            pending.drain(..).collect()
        };

        let mut device = self.device.lock().unwrap();

        device.emit(&events).map_err(InputError::Emit)?;
        device
            .emit(&[SynchronizationEvent::new(SynchronizationCode::SYN_REPORT, 0).into()])
            .map_err(InputError::Emit)?;

        Ok(())
    }

    fn read_events(
        device: Arc<Mutex<VirtualDevice>>,
        reader: Arc<InterruptibleReader>,
        effect: Arc<Mutex<Option<FFEffectData>>>,
        gain: Arc<AtomicU16>,
        feedback: FeedbackHandler,
    ) {
        loop {
            match reader.wait() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    log::error!("Error waiting for input events: {e}");

                    break;
                }
            }

            if let Err(e) = Self::handle_events(&device, &effect, &gain, &feedback) {
                log::error!("Error handling feedback events: {e}");
            }
        }
    }

    fn handle_events(
        device: &Arc<Mutex<VirtualDevice>>,
        effect: &Arc<Mutex<Option<FFEffectData>>>,
        gain: &Arc<AtomicU16>,
        feedback: &FeedbackHandler,
    ) -> Result<(), std::io::Error> {
        let events: Vec<InputEvent> = {
            let mut device = device.lock().unwrap();
            let fetched = device.fetch_events();

            match fetched {
                Ok(events) => events.collect(),
                Err(e) if e.kind() == ErrorKind::WouldBlock => Vec::new(),
                Err(e) => return Err(e),
            }
        };

        for event in events {
            match event.destructure() {
                EventSummary::UInput(event, UInputCode::UI_FF_UPLOAD, ..) => {
                    let mut upload = device.lock().unwrap().process_ff_upload(event)?;

                    // Only rumble effects are honoured; everything else is
                    // accepted and ignored
                    if matches!(upload.effect().kind, FFEffectKind::Rumble { .. }) {
                        log::debug!("Uploading effect {}", upload.effect_id());

                        effect.lock().unwrap().replace(upload.effect());
                        upload.set_effect_id(EFFECT_ID);
                    }

                    upload.set_retval(0);
                }
                EventSummary::UInput(event, UInputCode::UI_FF_ERASE, ..) => {
                    let erase = device.lock().unwrap().process_ff_erase(event)?;

                    log::debug!("Erasing effect {}", erase.effect_id());

                    // Erasing stops the feedback
                    if let Some(stopped) = effect.lock().unwrap().take() {
                        feedback(stopped, 0, 0);
                    }
                }
                EventSummary::ForceFeedback(_, code, value) => {
                    if code == FFEffectCode::FF_GAIN {
                        // Gain varies between 0 and 0xffff
                        gain.store(value as u16, Ordering::SeqCst);
                    } else if i32::from(code.0) == i32::from(EFFECT_ID) {
                        let current = *effect.lock().unwrap();

                        if let Some(current) = current {
                            let gain = if value > 0 {
                                gain.load(Ordering::SeqCst)
                            } else {
                                0
                            };

                            feedback(current, gain, value);
                        }
                    }
                }
                _ => {
                    log::trace!("Unhandled event: {event:?}");
                }
            }
        }

        Ok(())
    }
}

impl Drop for VirtualGamepad {
    fn drop(&mut self) {
        self.reader.interrupt();

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
