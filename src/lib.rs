#[cfg(feature = "audio")]
pub mod audio;
pub mod dongle;
pub mod drivers;
pub mod input;
pub mod sync;
pub mod usb;
