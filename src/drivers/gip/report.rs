//! GIP frame header and payload wire formats.
//!
//! All payloads are little-endian and byte aligned; sub-byte fields fill
//! each byte from the least significant bit up.

use packed_struct::prelude::*;

/// Frame header preceding every GIP message.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "4")]
pub struct GipFrame {
    #[packed_field(bytes = "0")]
    pub command: u8,
    #[packed_field(bits = "8..=11")]
    pub frame_type: Integer<u8, packed_bits::Bits<4>>,
    #[packed_field(bits = "12..=15")]
    pub device_id: Integer<u8, packed_bits::Bits<4>>,
    #[packed_field(bytes = "2")]
    pub sequence: u8,
    #[packed_field(bytes = "3")]
    pub length: u8,
}

pub const GIP_FRAME_SIZE: usize = 4;

#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "8", endian = "lsb")]
pub struct VersionInfo {
    #[packed_field(bytes = "0..=1")]
    pub major: u16,
    #[packed_field(bytes = "2..=3")]
    pub minor: u16,
    #[packed_field(bytes = "4..=5")]
    pub build: u16,
    #[packed_field(bytes = "6..=7")]
    pub revision: u16,
}

/// Payload of `CMD_ANNOUNCE`, sent by a client right after association.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "28", endian = "lsb")]
pub struct AnnounceData {
    #[packed_field(bytes = "0..=5")]
    pub address: [u8; 6],
    #[packed_field(bytes = "6..=7")]
    pub unknown: u16,
    #[packed_field(bytes = "8..=9")]
    pub vendor_id: u16,
    #[packed_field(bytes = "10..=11")]
    pub product_id: u16,
    #[packed_field(bytes = "12..=19")]
    pub firmware_version: VersionInfo,
    #[packed_field(bytes = "20..=27")]
    pub hardware_version: VersionInfo,
}

pub const ANNOUNCE_DATA_SIZE: usize = 28;

#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "4", endian = "lsb")]
pub struct StatusData {
    #[packed_field(bits = "0..=3")]
    pub connection_info: Integer<u8, packed_bits::Bits<4>>,
    #[packed_field(bits = "4..=5")]
    pub battery_type: Integer<u8, packed_bits::Bits<2>>,
    #[packed_field(bits = "6..=7")]
    pub battery_level: Integer<u8, packed_bits::Bits<2>>,
    #[packed_field(bytes = "1")]
    pub unknown1: u8,
    #[packed_field(bytes = "2..=3")]
    pub unknown2: u16,
}

pub const STATUS_DATA_SIZE: usize = 4;

#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "2")]
pub struct GuideButtonData {
    #[packed_field(bytes = "0")]
    pub pressed: u8,
    #[packed_field(bytes = "1")]
    pub unknown: u8,
}

pub const GUIDE_BUTTON_DATA_SIZE: usize = 2;

#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "16")]
pub struct SerialData {
    #[packed_field(bytes = "0..=1", endian = "lsb")]
    pub unknown: u16,
    #[packed_field(bytes = "2..=15")]
    pub serial_number: [u8; 14],
}

pub const SERIAL_DATA_SIZE: usize = 16;

/// Payload of `CMD_RUMBLE`, durations in 10 ms units.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Default)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "9")]
pub struct RumbleData {
    #[packed_field(bytes = "0")]
    pub unknown: u8,
    #[packed_field(bytes = "1")]
    pub motors: u8,
    #[packed_field(bytes = "2")]
    pub trigger_left: u8,
    #[packed_field(bytes = "3")]
    pub trigger_right: u8,
    #[packed_field(bytes = "4")]
    pub left: u8,
    #[packed_field(bytes = "5")]
    pub right: u8,
    #[packed_field(bytes = "6")]
    pub duration: u8,
    #[packed_field(bytes = "7")]
    pub delay: u8,
    #[packed_field(bytes = "8")]
    pub repeat: u8,
}

pub const RUMBLE_DATA_SIZE: usize = 9;

#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Default)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "3")]
pub struct LedModeData {
    #[packed_field(bytes = "0")]
    pub unknown: u8,
    #[packed_field(bytes = "1")]
    pub mode: u8,
    #[packed_field(bytes = "2")]
    pub brightness: u8,
}

pub const LED_MODE_DATA_SIZE: usize = 3;

/// Payload of `CMD_INPUT`: a 14-button bitfield, two 10-bit triggers and
/// four signed 16-bit stick axes.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Default)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "14", endian = "lsb")]
pub struct InputData {
    #[packed_field(bits = "0")]
    pub y: bool,
    #[packed_field(bits = "1")]
    pub x: bool,
    #[packed_field(bits = "2")]
    pub b: bool,
    #[packed_field(bits = "3")]
    pub a: bool,
    #[packed_field(bits = "4")]
    pub select: bool,
    #[packed_field(bits = "5")]
    pub start: bool,

    #[packed_field(bits = "8")]
    pub stick_right: bool,
    #[packed_field(bits = "9")]
    pub stick_left: bool,
    #[packed_field(bits = "10")]
    pub bumper_right: bool,
    #[packed_field(bits = "11")]
    pub bumper_left: bool,
    #[packed_field(bits = "12")]
    pub dpad_right: bool,
    #[packed_field(bits = "13")]
    pub dpad_left: bool,
    #[packed_field(bits = "14")]
    pub dpad_down: bool,
    #[packed_field(bits = "15")]
    pub dpad_up: bool,

    #[packed_field(bytes = "2..=3")]
    pub trigger_left: u16,
    #[packed_field(bytes = "4..=5")]
    pub trigger_right: u16,
    #[packed_field(bytes = "6..=7")]
    pub stick_left_x: i16,
    #[packed_field(bytes = "8..=9")]
    pub stick_left_y: i16,
    #[packed_field(bytes = "10..=11")]
    pub stick_right_x: i16,
    #[packed_field(bytes = "12..=13")]
    pub stick_right_y: i16,
}

pub const INPUT_DATA_SIZE: usize = 14;

#[cfg(test)]
#[path = "report_test.rs"]
mod report_test;
