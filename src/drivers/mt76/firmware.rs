//! Firmware blob handling for the radio's MCU.
//!
//! The blob starts with a fixed header describing the instruction (ILM) and
//! data (DLM) local memory images that follow it back to back.

use std::env;
use std::fs;
use std::path::PathBuf;

use packed_struct::prelude::*;
use thiserror::Error;

use super::registers::MT_FW_CHUNK_SIZE;

/// Default blob location, overridable at build time and with the
/// `PADLINK_FIRMWARE` environment variable at runtime.
const FIRMWARE_PATH: &str = match option_env!("PADLINK_FIRMWARE_PATH") {
    Some(path) => path,
    None => "/usr/lib/padlink/firmware.bin",
};

pub const FW_HEADER_SIZE: usize = 32;

#[derive(Error, Debug)]
pub enum FirmwareError {
    #[error("failed to read firmware from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("firmware blob is truncated")]
    Truncated,
    #[error("failed to parse firmware header: {0}")]
    Header(PackingError),
}

#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "32", endian = "lsb")]
pub struct FwHeader {
    #[packed_field(bytes = "0..=3")]
    pub ilm_length: u32,
    #[packed_field(bytes = "4..=7")]
    pub dlm_length: u32,
    #[packed_field(bytes = "8..=9")]
    pub build_version: u16,
    #[packed_field(bytes = "10..=11")]
    pub firmware_version: u16,
    #[packed_field(bytes = "12..=15")]
    pub padding: u32,
    #[packed_field(bytes = "16..=31")]
    pub build_time: [u8; 16],
}

pub struct Firmware {
    pub header: FwHeader,
    data: Vec<u8>,
}

impl Firmware {
    pub fn load() -> Result<Self, FirmwareError> {
        let path = env::var_os("PADLINK_FIRMWARE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(FIRMWARE_PATH));

        let data = fs::read(&path).map_err(|source| FirmwareError::Read { path, source })?;

        Self::parse(data)
    }

    pub fn parse(data: Vec<u8>) -> Result<Self, FirmwareError> {
        if data.len() < FW_HEADER_SIZE {
            return Err(FirmwareError::Truncated);
        }

        let header = FwHeader::unpack_from_slice(&data[..FW_HEADER_SIZE])
            .map_err(FirmwareError::Header)?;

        let ilm_length = header.ilm_length as usize;
        let dlm_length = header.dlm_length as usize;

        if data.len() < FW_HEADER_SIZE + ilm_length + dlm_length {
            return Err(FirmwareError::Truncated);
        }

        Ok(Self { header, data })
    }

    /// Instruction local memory image.
    pub fn ilm(&self) -> &[u8] {
        &self.data[FW_HEADER_SIZE..FW_HEADER_SIZE + self.header.ilm_length as usize]
    }

    /// Data local memory image.
    pub fn dlm(&self) -> &[u8] {
        let start = FW_HEADER_SIZE + self.header.ilm_length as usize;

        &self.data[start..start + self.header.dlm_length as usize]
    }
}

/// Splits a memory image into upload chunks with their target addresses.
pub fn chunks(offset: u32, image: &[u8]) -> impl Iterator<Item = (u32, &[u8])> {
    image
        .chunks(MT_FW_CHUNK_SIZE)
        .enumerate()
        .map(move |(index, chunk)| (offset + (index * MT_FW_CHUNK_SIZE) as u32, chunk))
}

#[cfg(test)]
mod firmware_test {
    use super::*;
    use crate::drivers::mt76::registers::MT_MCU_ILM_OFFSET;

    fn blob(ilm_length: u32, dlm_length: u32) -> Vec<u8> {
        let mut data = vec![0u8; FW_HEADER_SIZE];
        data[0..4].copy_from_slice(&ilm_length.to_le_bytes());
        data[4..8].copy_from_slice(&dlm_length.to_le_bytes());
        data[8..10].copy_from_slice(&0x0201u16.to_le_bytes());
        data[10..12].copy_from_slice(&0x0403u16.to_le_bytes());
        data.extend(std::iter::repeat(0x11).take(ilm_length as usize));
        data.extend(std::iter::repeat(0x22).take(dlm_length as usize));
        data
    }

    #[test]
    fn test_parse_header_and_images() {
        let firmware = Firmware::parse(blob(100, 40)).unwrap();

        assert_eq!(firmware.header.ilm_length, 100);
        assert_eq!(firmware.header.dlm_length, 40);
        assert_eq!(firmware.header.build_version, 0x0201);
        assert_eq!(firmware.header.firmware_version, 0x0403);
        assert_eq!(firmware.ilm().len(), 100);
        assert!(firmware.ilm().iter().all(|&b| b == 0x11));
        assert_eq!(firmware.dlm().len(), 40);
        assert!(firmware.dlm().iter().all(|&b| b == 0x22));
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        assert!(matches!(
            Firmware::parse(vec![0u8; 8]),
            Err(FirmwareError::Truncated)
        ));
        assert!(matches!(
            Firmware::parse(blob(100, 40)[..100].to_vec()),
            Err(FirmwareError::Truncated)
        ));
    }

    #[test]
    fn test_chunk_addresses() {
        let image = vec![0u8; MT_FW_CHUNK_SIZE * 2 + 10];
        let parts: Vec<_> = chunks(MT_MCU_ILM_OFFSET, &image).collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].0, MT_MCU_ILM_OFFSET);
        assert_eq!(parts[0].1.len(), MT_FW_CHUNK_SIZE);
        assert_eq!(parts[1].0, MT_MCU_ILM_OFFSET + MT_FW_CHUNK_SIZE as u32);
        assert_eq!(parts[2].1.len(), 10);
    }
}
