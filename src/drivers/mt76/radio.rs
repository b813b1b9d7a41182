//! Boot and operation of the MT76xx radio as a minimalist access point.

use std::num::NonZeroU8;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::usb::{ControlPacket, UsbError, UsbTransport};

use super::firmware::{chunks, Firmware};
use super::registers::*;
use super::report::{
    association_response, beacon_frame, client_data_packet, command_packet, pairing_frame,
    wlan_packet, BeaconTimeConfig, ChannelConfig, DmaConfig, EfuseControl, TxInfoCommand,
};
use super::{
    DmaMsgPort, LedMode, McuCalibration, McuChannelBandwidth, McuCommand, McuCrMode, McuFunction,
    McuPowerMode, McuFwCommand, TxInfoType, VendorRequest, MT_EP_WRITE,
};

const POLL_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum RadioError {
    #[error(transparent)]
    Usb(#[from] UsbError),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("radio initialization failed: {0}")]
    Init(&'static str),
    #[error("all wireless client ids are taken")]
    WcidExhausted,
}

/// Allocation bitmap for wireless client ids 1..=16. WCID 0 is reserved for
/// beacon frames and never handed out.
#[derive(Debug, Default, Clone, Copy)]
pub struct WcidMap {
    bits: u16,
}

impl WcidMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the lowest free WCID, if any.
    pub fn allocate(&mut self) -> Option<NonZeroU8> {
        let free = (!self.bits).trailing_zeros() as u8;

        if free >= super::MT_WCID_COUNT as u8 {
            return None;
        }

        self.bits |= 1 << free;

        NonZeroU8::new(free + 1)
    }

    /// Releases a WCID. Returns `false` if it was already free.
    pub fn release(&mut self, wcid: u8) -> bool {
        if !self.contains(wcid) {
            return false;
        }

        self.bits &= !(1 << (wcid - 1));

        true
    }

    pub fn contains(&self, wcid: u8) -> bool {
        (1..=super::MT_WCID_COUNT as u8).contains(&wcid) && self.bits & (1 << (wcid - 1)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

/// Signed trim offset encoded in the low byte of an e-fuse trim word: a
/// 7-bit magnitude with a sign bit, where an all-ones byte means zero.
fn trim_offset(word: u16) -> i8 {
    if word & 0xff == 0xff {
        return 0;
    }

    let offset = (word & 0x7f) as i8;

    if word & 0x80 != 0 {
        -offset
    } else {
        offset
    }
}

/// Crystal oscillator trim from the two e-fuse trim words. A missing or
/// blank word falls back to the 0x14 default.
pub fn crystal_trim(word2: Option<u16>, word1: Option<u16>) -> u16 {
    let offset = word2.map(trim_offset).unwrap_or(0) as i16;
    let mut value = word2.map(|word| word >> 8).unwrap_or(0);

    if value == 0x00 || value == 0xff {
        value = word1.map(|word| word & 0xff).unwrap_or(0x14);

        if value == 0x00 || value == 0xff {
            value = 0x14;
        }
    }

    (((value & 0x7f) as i16) + offset) as u16
}

/* Channel groups for the 5 GHz power table */
const MT_CH_5G_JAPAN: u8 = 0;
const MT_CH_5G_UNII_1: u8 = 1;
const MT_CH_5G_UNII_2: u8 = 2;
const MT_CH_5G_UNII_2E_1: u8 = 3;
const MT_CH_5G_UNII_2E_2: u8 = 4;
const MT_CH_5G_UNII_3: u8 = 5;

/* Subgroups for channel power offsets */
const MT_CH_2G_LOW: u8 = 0x01;
const MT_CH_2G_MID: u8 = 0x02;
const MT_CH_2G_HIGH: u8 = 0x03;
const MT_CH_5G_LOW: u8 = 0x01;
const MT_CH_5G_HIGH: u8 = 0x02;

pub fn channel_group(channel: u8) -> u8 {
    match channel {
        184..=196 => MT_CH_5G_JAPAN,
        0..=48 => MT_CH_5G_UNII_1,
        49..=64 => MT_CH_5G_UNII_2,
        65..=114 => MT_CH_5G_UNII_2E_1,
        115..=144 => MT_CH_5G_UNII_2E_2,
        _ => MT_CH_5G_UNII_3,
    }
}

pub fn channel_subgroup(channel: u8) -> u8 {
    match channel {
        192.. => MT_CH_5G_HIGH,
        184..=191 => MT_CH_5G_LOW,
        0..=5 => MT_CH_2G_LOW,
        6..=10 => MT_CH_2G_MID,
        11..=14 => MT_CH_2G_HIGH,
        15..=43 => MT_CH_5G_LOW,
        44..=51 => MT_CH_5G_HIGH,
        52..=57 => MT_CH_5G_LOW,
        58..=97 => MT_CH_5G_HIGH,
        98..=105 => MT_CH_5G_LOW,
        106..=115 => MT_CH_5G_HIGH,
        116..=129 => MT_CH_5G_LOW,
        130..=148 => MT_CH_5G_HIGH,
        149..=156 => MT_CH_5G_LOW,
        _ => MT_CH_5G_HIGH,
    }
}

/// Transmit power for a channel from its 8-byte power table entry: a target
/// power plus a signed 6-bit offset in 0.5 dB steps, selected by subgroup.
pub fn power_from_entry(entry: &[u8], channel: u8) -> u8 {
    let index = if channel <= 14 { 4 } else { 5 };
    let subgroup = channel_subgroup(channel) as usize;
    let target = entry[index];
    let offset = entry[index + subgroup];

    // Bit 7 enables the offset, bit 6 selects its sign
    if offset & 0x80 == 0 {
        return target;
    }

    let magnitude = (offset & 0x3f) as i16;
    let power = if offset & 0x40 != 0 {
        target as i16 + magnitude
    } else {
        target as i16 - magnitude
    };

    power.clamp(MT_CH_POWER_MIN as i16, MT_CH_POWER_MAX as i16) as u8
}

/// Wireless channel candidate pairs handed to the firmware, one 32-bit value
/// per channel.
pub fn channel_candidates() -> Vec<u8> {
    const CANDIDATES: [u8; 14] = [
        0x01, 0xa5, 0x0b, 0x01, 0x06, 0x0b, 0x24, 0x28, 0x2c, 0x30, 0x95, 0x99, 0x9d, 0xa1,
    ];

    let mut values = Vec::with_capacity(CANDIDATES.len() * 4);

    for channel in CANDIDATES {
        values.extend_from_slice(&u32::from(channel).to_le_bytes());
    }

    values
}

pub fn format_address(address: &[u8]) -> String {
    address
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

fn control_read(
    usb: &UsbTransport,
    address: u32,
    request: VendorRequest,
) -> Result<u32, RadioError> {
    let mut data = [0u8; 4];
    let mut packet = ControlPacket {
        request: request as u8,
        value: 0,
        index: address as u16,
        data: &mut data,
    };

    usb.control_read(&mut packet)?;

    Ok(u32::from_le_bytes(data))
}

fn control_write(
    usb: &UsbTransport,
    address: u32,
    value: u32,
    request: VendorRequest,
) -> Result<(), RadioError> {
    if request == VendorRequest::DevMode {
        let mut empty = [0u8; 0];
        let mut packet = ControlPacket {
            request: request as u8,
            value: address as u16,
            index: 0,
            data: &mut empty,
        };

        usb.control_write(&mut packet)?;
    } else {
        let mut data = value.to_le_bytes();
        let mut packet = ControlPacket {
            request: request as u8,
            value: 0,
            index: address as u16,
            data: &mut data,
        };

        usb.control_write(&mut packet)?;
    }

    Ok(())
}

/// Polls `done` until it reports completion, bounded by a one second
/// deadline.
fn poll_until<F>(what: &'static str, mut done: F) -> Result<(), RadioError>
where
    F: FnMut() -> Result<bool, RadioError>,
{
    let start = Instant::now();

    while !done()? {
        if start.elapsed() > POLL_TIMEOUT {
            return Err(RadioError::Timeout(what));
        }
    }

    Ok(())
}

fn send_command(usb: &UsbTransport, command: McuCommand, data: &[u8]) -> Result<(), RadioError> {
    usb.bulk_write(MT_EP_WRITE, &command_packet(command, data))?;

    Ok(())
}

fn send_firmware_command(
    usb: &UsbTransport,
    command: McuFwCommand,
    data: &[u8],
) -> Result<(), RadioError> {
    let mut out = Vec::with_capacity(4 + data.len());

    out.extend_from_slice(&(command as u32).to_le_bytes());
    out.extend_from_slice(data);

    send_command(usb, McuCommand::InternalFwOp, &out)
}

fn select_function(usb: &UsbTransport, function: McuFunction, value: u32) -> Result<(), RadioError> {
    let mut out = [0u8; 8];

    out[0..4].copy_from_slice(&(function as u32).to_le_bytes());
    out[4..8].copy_from_slice(&value.to_le_bytes());

    send_command(usb, McuCommand::FunSetOp, &out)
}

fn power_mode(usb: &UsbTransport, mode: McuPowerMode) -> Result<(), RadioError> {
    send_command(usb, McuCommand::PowerSavingOp, &(mode as u32).to_le_bytes())
}

fn load_cr(usb: &UsbTransport, mode: McuCrMode) -> Result<(), RadioError> {
    send_command(usb, McuCommand::LoadCr, &(mode as u32).to_le_bytes())
}

fn calibrate(usb: &UsbTransport, calibration: McuCalibration, value: u32) -> Result<(), RadioError> {
    let mut out = [0u8; 8];

    out[0..4].copy_from_slice(&(calibration as u32).to_le_bytes());
    out[4..8].copy_from_slice(&value.to_le_bytes());

    send_command(usb, McuCommand::CalibrationOp, &out)
}

fn burst_write(usb: &UsbTransport, index: u32, values: &[u8]) -> Result<(), RadioError> {
    let mut out = Vec::with_capacity(4 + values.len());

    out.extend_from_slice(&(index + MT_REGISTER_OFFSET).to_le_bytes());
    out.extend_from_slice(values);

    send_command(usb, McuCommand::BurstWrite, &out)
}

fn set_led_mode(usb: &UsbTransport, mode: LedMode) -> Result<(), RadioError> {
    send_command(usb, McuCommand::LedModeOp, &(mode as u32).to_le_bytes())
}

fn efuse_read(usb: &UsbTransport, address: u8, length: usize) -> Result<Vec<u8>, RadioError> {
    let mut control =
        EfuseControl::from_bytes(control_read(usb, MT_EFUSE_CTRL, VendorRequest::MultiRead)?.to_le_bytes());

    // Read a block of 4 * 32 bits and kick off
    control.set_mode(0);
    control.set_address_in(u16::from(address & !0x0f));
    control.set_kick(true);

    control_write(
        usb,
        MT_EFUSE_CTRL,
        u32::from_le_bytes(control.into_bytes()),
        VendorRequest::MultiWrite,
    )?;

    poll_until("e-fuse read", || {
        Ok(control_read(usb, MT_EFUSE_CTRL, VendorRequest::MultiRead)? & MT_EFUSE_CTRL_KICK == 0)
    })?;

    let mut data = Vec::with_capacity(length);
    let mut read = 0;

    while read < length {
        // Offset of the word within the block
        let offset = u32::from(address & 0x0c) + read as u32;
        let value = control_read(usb, MT_EFUSE_DATA_BASE + offset, VendorRequest::MultiRead)?;
        let size = (length - read).min(4);

        data.extend_from_slice(&value.to_le_bytes()[..size]);
        read += 4;
    }

    Ok(data)
}

fn load_firmware(usb: &UsbTransport, firmware: &Firmware) -> Result<(), RadioError> {
    if control_read(usb, MT_FCE_DMA_ADDR, VendorRequest::ReadCfg)? != 0 {
        log::debug!("Firmware already loaded, resetting...");

        let patch = control_read(usb, MT_RF_PATCH, VendorRequest::ReadCfg)? & !bit(19);

        // Mandatory for already initialized radios
        control_write(usb, MT_RF_PATCH, patch, VendorRequest::WriteCfg)?;
        control_write(usb, u32::from(MT_FW_RESET_IVB), 0, VendorRequest::DevMode)?;

        poll_until("firmware reset", || {
            Ok(control_read(usb, MT_FCE_DMA_ADDR, VendorRequest::ReadCfg)? == 0x80000000)
        })?;
    }

    // Configure direct memory access (DMA), enable FCE and packet DMA
    let config = DmaConfig::new()
        .with_rx_bulk_enabled(true)
        .with_tx_bulk_enabled(true);

    control_write(
        usb,
        MT_USB_U3DMA_CFG,
        u32::from_le_bytes(config.into_bytes()),
        VendorRequest::WriteCfg,
    )?;
    control_write(usb, MT_FCE_PSE_CTRL, 0x01, VendorRequest::MultiWrite)?;
    control_write(usb, MT_TX_CPU_FROM_FCE_BASE_PTR, 0x400230, VendorRequest::MultiWrite)?;
    control_write(usb, MT_TX_CPU_FROM_FCE_MAX_COUNT, 0x01, VendorRequest::MultiWrite)?;
    control_write(usb, MT_TX_CPU_FROM_FCE_CPU_DESC_IDX, 0x01, VendorRequest::MultiWrite)?;
    control_write(usb, MT_FCE_PDMA_GLOBAL_CONF, 0x44, VendorRequest::MultiWrite)?;
    control_write(usb, MT_FCE_SKIP_FS, 0x03, VendorRequest::MultiWrite)?;

    load_firmware_part(usb, MT_MCU_ILM_OFFSET, firmware.ilm())?;
    load_firmware_part(usb, MT_MCU_DLM_OFFSET, firmware.dlm())?;

    // Load the initial vector block (IVB)
    control_write(usb, MT_FCE_DMA_ADDR, 0, VendorRequest::WriteCfg)?;
    control_write(usb, u32::from(MT_FW_LOAD_IVB), 0, VendorRequest::DevMode)?;

    poll_until("firmware start", || {
        Ok(control_read(usb, MT_FCE_DMA_ADDR, VendorRequest::ReadCfg)? == 0x01)
    })?;

    log::debug!("Firmware loaded");

    Ok(())
}

fn load_firmware_part(usb: &UsbTransport, offset: u32, image: &[u8]) -> Result<(), RadioError> {
    for (address, chunk) in chunks(offset, image) {
        let info = TxInfoCommand::new()
            .with_port(DmaMsgPort::CpuTx as u8)
            .with_info_type(TxInfoType::NormalPacket as u8)
            .with_length(chunk.len() as u16);

        let mut out = Vec::with_capacity(4 + chunk.len() + 4);

        out.extend_from_slice(&info.into_bytes());
        out.extend_from_slice(chunk);
        out.resize(out.len() + 4, 0);

        control_write(usb, MT_FCE_DMA_ADDR, address, VendorRequest::WriteCfg)?;
        control_write(
            usb,
            MT_FCE_DMA_LEN,
            (chunk.len() as u32) << 16,
            VendorRequest::WriteCfg,
        )?;

        usb.bulk_write(MT_EP_WRITE, &out)?;

        let complete = ((chunk.len() as u32) << 16) | MT_DMA_COMPLETE;

        poll_until("firmware chunk upload", || {
            Ok(control_read(usb, MT_FCE_DMA_LEN, VendorRequest::ReadCfg)? == complete)
        })?;
    }

    Ok(())
}

fn calibrate_crystal(usb: &UsbTransport) -> Result<(), RadioError> {
    let word2 = efuse_word_high(&efuse_read(usb, MT_EE_XTAL_TRIM_2, 4)?);
    let needs_fallback = match word2 {
        Some(word) => matches!(word >> 8, 0x00 | 0xff),
        None => true,
    };
    let word1 = if needs_fallback {
        efuse_word_high(&efuse_read(usb, MT_EE_XTAL_TRIM_1, 4)?)
    } else {
        None
    };

    let value = crystal_trim(word2, word1);

    let ctrl = control_read(usb, MT_XO_CTRL5, VendorRequest::MultiRead)? & !MT_XO_CTRL5_C2_VAL;

    control_write(
        usb,
        MT_XO_CTRL5,
        ctrl | (u32::from(value) << 8),
        VendorRequest::WriteCfg,
    )?;
    control_write(usb, MT_XO_CTRL6, MT_XO_CTRL6_C2_CTRL, VendorRequest::WriteCfg)?;
    control_write(usb, MT_CMB_CTRL, 0x0091a7ff, VendorRequest::MultiWrite)?;

    Ok(())
}

fn efuse_word_high(trim: &[u8]) -> Option<u16> {
    if trim.len() < 4 {
        return None;
    }

    Some(u16::from_le_bytes([trim[2], trim[3]]))
}

fn init_registers(usb: &UsbTransport) -> Result<[u8; 6], RadioError> {
    // Hardware-mandated initialization values, reproduced verbatim
    const WRITES: [(u32, u32); 62] = [
        (MT_MAC_SYS_CTRL, MT_MAC_SYS_CTRL_RESET_CSR | MT_MAC_SYS_CTRL_RESET_BBP),
        (MT_USB_DMA_CFG, 0),
        (MT_MAC_SYS_CTRL, 0),
        (MT_PWR_PIN_CFG, 0),
        (MT_LDO_CTRL_1, 0x6b006464),
        (MT_WPDMA_GLO_CFG, 0x70),
        (MT_WMM_AIFSN, 0x2273),
        (MT_WMM_CWMIN, 0x2344),
        (MT_WMM_CWMAX, 0x34aa),
        (MT_FCE_DMA_ADDR, 0x041200),
        (MT_TSO_CTRL, 0),
        (MT_PBF_SYS_CTRL, 0x080c00),
        (MT_PBF_TX_MAX_PCNT, 0x1fbf1f1f),
        (MT_FCE_PSE_CTRL, 0x01),
        (MT_MAC_SYS_CTRL, MT_MAC_SYS_CTRL_ENABLE_TX | MT_MAC_SYS_CTRL_ENABLE_RX),
        (MT_AUTO_RSP_CFG, 0x13),
        (MT_MAX_LEN_CFG, 0x3e3fff),
        (MT_AMPDU_MAX_LEN_20M1S, 0xfffc9855),
        (MT_AMPDU_MAX_LEN_20M2S, 0xff),
        (MT_BKOFF_SLOT_CFG, 0x0109),
        (MT_PWR_PIN_CFG, 0),
        (mt_edca_cfg_ac(0), 0x064320),
        (mt_edca_cfg_ac(1), 0x0a4700),
        (mt_edca_cfg_ac(2), 0x043238),
        (mt_edca_cfg_ac(3), 0x03212f),
        (MT_TX_PIN_CFG, 0x150f0f),
        (MT_TX_SW_CFG0, 0x101001),
        (MT_TX_SW_CFG1, 0x010000),
        (MT_TXOP_CTRL_CFG, 0x10583f),
        (MT_TX_TIMEOUT_CFG, 0x0a0f90),
        (MT_TX_RETRY_CFG, 0x47d01f0f),
        (MT_CCK_PROT_CFG, 0x03f40003),
        (MT_OFDM_PROT_CFG, 0x03f40003),
        (MT_MM20_PROT_CFG, 0x01742004),
        (MT_GF20_PROT_CFG, 0x01742004),
        (MT_GF40_PROT_CFG, 0x03f42084),
        (MT_EXP_ACK_TIME, 0x2c00dc),
        (MT_TX_ALC_CFG_2, 0x22160a00),
        (MT_TX_ALC_CFG_3, 0x22160a76),
        (MT_TX_ALC_CFG_0, 0x3f3f1818),
        (MT_TX_ALC_CFG_4, 0x0606),
        (MT_PIFS_TX_CFG, 0x060fff),
        (MT_RX_FILTR_CFG, 0x017f17),
        (MT_LEGACY_BASIC_RATE, 0x017f),
        (MT_HT_BASIC_RATE, 0x8003),
        (MT_PN_PAD_MODE, 0x02),
        (MT_TXOP_HLDR_ET, 0x02),
        (MT_TX_PROT_CFG6, 0xe3f42004),
        (MT_TX_PROT_CFG7, 0xe3f42084),
        (MT_TX_PROT_CFG8, 0xe3f42104),
        (MT_DACCLK_EN_DLY_CFG, 0),
        (MT_RF_PA_MODE_ADJ0, 0xee000000),
        (MT_RF_PA_MODE_ADJ1, 0xee000000),
        (MT_TX0_RF_GAIN_CORR, 0x0f3c3c3c),
        (MT_TX1_RF_GAIN_CORR, 0x0f3c3c3c),
        (MT_PBF_CFG, 0x1efebcf5),
        (MT_PAUSE_ENABLE_CONTROL1, 0x0a),
        (MT_RF_BYPASS_0, 0x7f000000),
        (MT_RF_SETTING_0, 0x1a800000),
        (MT_XIFS_TIME_CFG, 0x33a40e0a),
        (MT_FCE_L2_STUFF, 0x03ff0223),
        (MT_TX_RTS_CFG, 0),
    ];

    for (address, value) in WRITES {
        control_write(usb, address, value, VendorRequest::MultiWrite)?;
    }

    control_write(usb, MT_BEACON_TIME_CFG, 0x0640, VendorRequest::MultiWrite)?;
    control_write(usb, MT_EXT_CCA_CFG, 0xf0e4, VendorRequest::MultiWrite)?;
    control_write(usb, MT_CH_TIME_CFG, 0x015f, VendorRequest::MultiWrite)?;

    calibrate_crystal(usb)?;

    // Configure automatic gain control (AGC)
    control_write(usb, mt_bbp_agc(8), 0x18365efa, VendorRequest::MultiWrite)?;
    control_write(usb, mt_bbp_agc(9), 0x18365efa, VendorRequest::MultiWrite)?;

    let address = efuse_read(usb, MT_EE_MAC_ADDR, 6)?;

    if address.len() < 6 {
        return Err(RadioError::Init("failed to read MAC address"));
    }

    let mut mac_address = [0u8; 6];
    mac_address.copy_from_slice(&address);

    // Some dongles' addresses start with 6c:5d:3a, but controllers only
    // connect to 62:45:bx:xx:xx:xx
    if mac_address[0] != 0x62 {
        log::debug!("Invalid MAC address, correcting...");

        mac_address[0] = 0x62;
        mac_address[1] = 0x45;
        mac_address[2] = 0xbd;
    }

    burst_write(usb, MT_MAC_ADDR_DW0, &mac_address)?;
    burst_write(usb, MT_MAC_BSSID_DW0, &mac_address)?;

    let asic_version = control_read(usb, MT_ASIC_VERSION, VendorRequest::MultiRead)? >> 16;
    let mac_version = control_read(usb, MT_MAC_CSR0, VendorRequest::MultiRead)? >> 16;
    let chip_id = efuse_read(usb, MT_EE_CHIP_ID, 4)?;

    if chip_id.len() < 4 {
        return Err(RadioError::Init("failed to read chip id"));
    }

    log::debug!("ASIC version: {asic_version:x}");
    log::debug!("MAC version: {mac_version:x}");
    log::debug!("Chip id: {:x}", (u16::from(chip_id[1]) << 8) | u16::from(chip_id[2]));
    log::info!("Wireless address: {}", format_address(&mac_address));

    Ok(mac_address)
}

/// The radio controller. Owns the USB transport, the e-fuse derived MAC
/// address and the WCID allocation state.
///
/// Command transmission is serialised by an internal lock so that the demux
/// thread and the per-client rumble threads can share the radio.
pub struct Mt76Radio {
    usb: Arc<UsbTransport>,
    mac_address: [u8; 6],
    clients: Mutex<WcidMap>,
    tx_lock: Mutex<()>,
}

impl Mt76Radio {
    /// Boots the dongle: firmware, MCU setup, registers, calibration,
    /// channel plan and the initial non-pairing beacon.
    pub fn new(usb: Arc<UsbTransport>, firmware: &Firmware) -> Result<Self, RadioError> {
        load_firmware(&usb, firmware)?;

        // Select RX ring buffer 1, turn the radio on, load the BBP command
        // register
        select_function(&usb, McuFunction::QSelect, 1)?;
        power_mode(&usb, McuPowerMode::RadioOn)?;
        load_cr(&usb, McuCrMode::RfBbpCr)?;

        let mac_address = init_registers(&usb)?;

        send_firmware_command(&usb, McuFwCommand::MacAddressSet, &mac_address)?;

        // Reset necessary for reliable WLAN associations
        control_write(&usb, MT_MAC_SYS_CTRL, 0, VendorRequest::MultiWrite)?;
        control_write(&usb, MT_RF_BYPASS_0, 0, VendorRequest::MultiWrite)?;
        control_write(&usb, MT_RF_SETTING_0, 0, VendorRequest::MultiWrite)?;

        calibrate(&usb, McuCalibration::TempSensor, 0)?;
        calibrate(&usb, McuCalibration::Rxdcoc, 1)?;
        calibrate(&usb, McuCalibration::Rc, 0)?;

        control_write(
            &usb,
            MT_MAC_SYS_CTRL,
            MT_MAC_SYS_CTRL_ENABLE_TX | MT_MAC_SYS_CTRL_ENABLE_RX,
            VendorRequest::MultiWrite,
        )?;

        let radio = Self {
            usb,
            mac_address,
            clients: Mutex::new(WcidMap::new()),
            tx_lock: Mutex::new(()),
        };

        radio.init_channels()?;
        radio.write_beacon(false)?;

        Ok(radio)
    }

    pub fn mac_address(&self) -> [u8; 6] {
        self.mac_address
    }

    /// Associates a client: allocates the lowest free WCID, programs the
    /// client address, registers it with the firmware and transmits the
    /// association response. Rolls the allocation back on failure.
    pub fn associate_client(&self, address: [u8; 6]) -> Result<NonZeroU8, RadioError> {
        let mut clients = self.clients.lock().unwrap();
        let wcid = clients.allocate().ok_or(RadioError::WcidExhausted)?;

        if let Err(e) = self.add_client(wcid.get(), address) {
            clients.release(wcid.get());

            return Err(e);
        }

        Ok(wcid)
    }

    fn add_client(&self, wcid: u8, address: [u8; 6]) -> Result<(), RadioError> {
        self.burst_write(mt_wcid_addr(u32::from(wcid)), &address)?;
        self.send_firmware_command(
            McuFwCommand::ClientAdd,
            &[wcid - 1, 0x00, 0x00, 0x00, 0x40, 0x1f, 0x00, 0x00],
        )?;
        self.send_wlan_packet(&association_response(self.mac_address, address))?;
        self.set_led_mode(LedMode::On)?;

        Ok(())
    }

    /// Releases a client's WCID. A no-op when the WCID is already free.
    pub fn remove_client(&self, wcid: u8) -> Result<(), RadioError> {
        let mut clients = self.clients.lock().unwrap();

        if !clients.release(wcid) {
            return Ok(());
        }

        self.send_firmware_command(McuFwCommand::ClientRemove, &[wcid - 1, 0x00, 0x00, 0x00])?;
        self.burst_write(mt_wcid_addr(u32::from(wcid)), &[0u8; 6])?;

        if clients.is_empty() {
            self.set_led_mode(LedMode::Off)?;
        }

        Ok(())
    }

    /// Sends the pairing handshake to a prospective client.
    pub fn pair_client(&self, address: [u8; 6]) -> Result<(), RadioError> {
        self.send_wlan_packet(&pairing_frame(self.mac_address, address))
    }

    /// Sends an application payload to a connected client as a QoS data
    /// frame. Silently skipped when the WCID is not allocated.
    pub fn send_client_packet(
        &self,
        wcid: u8,
        address: [u8; 6],
        payload: &[u8],
    ) -> Result<(), RadioError> {
        if !self.clients.lock().unwrap().contains(wcid) {
            return Ok(());
        }

        self.send_command(
            McuCommand::PacketTx,
            &client_data_packet(wcid, self.mac_address, address, payload),
        )
    }

    /// Rewrites the beacon with the pairing bit and adjusts the LED.
    pub fn set_pairing(&self, enable: bool) -> Result<(), RadioError> {
        self.write_beacon(enable)?;
        self.set_led_mode(if enable { LedMode::Blink } else { LedMode::On })?;

        log::info!("Pairing {}", if enable { "enabled" } else { "disabled" });

        Ok(())
    }

    fn write_beacon(&self, pairing: bool) -> Result<(), RadioError> {
        // Enable the TSF and TBTT timers, set the TSF timer to AP mode and
        // activate beacon transmission
        let mut config = BeaconTimeConfig::from_bytes(
            control_read(&self.usb, MT_BEACON_TIME_CFG, VendorRequest::MultiRead)?.to_le_bytes(),
        );

        config.set_tsf_timer_enabled(true);
        config.set_tbtt_timer_enabled(true);
        config.set_tsf_sync_mode(3);
        config.set_transmit_beacon(true);

        self.burst_write(MT_BEACON_BASE, &beacon_frame(self.mac_address, pairing))?;

        control_write(
            &self.usb,
            MT_BEACON_TIME_CFG,
            u32::from_le_bytes(config.into_bytes()),
            VendorRequest::MultiWrite,
        )?;

        self.calibrate(McuCalibration::Rxdcoc, 0)?;

        Ok(())
    }

    fn init_channels(&self) -> Result<(), RadioError> {
        const CHANNELS: [(u8, McuChannelBandwidth, bool); 12] = [
            (0x01, McuChannelBandwidth::Bw20, true),
            (0x06, McuChannelBandwidth::Bw20, true),
            (0x0b, McuChannelBandwidth::Bw20, true),
            (0x24, McuChannelBandwidth::Bw40, true),
            (0x28, McuChannelBandwidth::Bw40, false),
            (0x2c, McuChannelBandwidth::Bw40, true),
            (0x30, McuChannelBandwidth::Bw40, false),
            (0x95, McuChannelBandwidth::Bw80, true),
            (0x99, McuChannelBandwidth::Bw80, false),
            (0x9d, McuChannelBandwidth::Bw80, true),
            (0xa1, McuChannelBandwidth::Bw80, false),
            (0xa5, McuChannelBandwidth::Bw80, false),
        ];

        for (channel, bandwidth, scan) in CHANNELS {
            self.configure_channel(channel, bandwidth, scan)?;
        }

        self.send_firmware_command(McuFwCommand::ChannelCandidatesSet, &channel_candidates())?;

        Ok(())
    }

    fn configure_channel(
        &self,
        channel: u8,
        bandwidth: McuChannelBandwidth,
        scan: bool,
    ) -> Result<(), RadioError> {
        // Select TX and RX stream 1
        let config = ChannelConfig {
            channel,
            tx_rx_setting: 0x0101,
            bandwidth: bandwidth as u8,
            tx_power: self.channel_power(channel)?,
            scan,
        };

        self.send_command(McuCommand::SwitchChannelOp, &config.to_bytes())?;

        log::debug!("Channel {}, power: {}", channel, config.tx_power);

        Ok(())
    }

    /// Per-channel transmit power from the e-fuse power table, keyed by
    /// channel group.
    fn channel_power(&self, channel: u8) -> Result<u8, RadioError> {
        let is_24ghz = channel <= 14;
        let mut index = if is_24ghz {
            MT_EE_TX_POWER_0_START_2G
        } else {
            MT_EE_TX_POWER_0_START_5G
        };

        if !is_24ghz {
            index += channel_group(channel) * MT_EE_TX_POWER_GROUP_SIZE_5G;
        }

        let entry = efuse_read(&self.usb, index, 8)?;

        if entry.len() < 8 {
            log::error!("Failed to read power table entry");

            return Ok(MT_CH_POWER_MIN);
        }

        Ok(power_from_entry(&entry, channel))
    }

    fn send_command(&self, command: McuCommand, data: &[u8]) -> Result<(), RadioError> {
        let _guard = self.tx_lock.lock().unwrap();

        send_command(&self.usb, command, data)
    }

    fn send_wlan_packet(&self, data: &[u8]) -> Result<(), RadioError> {
        let _guard = self.tx_lock.lock().unwrap();

        self.usb.bulk_write(MT_EP_WRITE, &wlan_packet(data))?;

        Ok(())
    }

    fn send_firmware_command(&self, command: McuFwCommand, data: &[u8]) -> Result<(), RadioError> {
        let _guard = self.tx_lock.lock().unwrap();

        send_firmware_command(&self.usb, command, data)
    }

    fn burst_write(&self, index: u32, values: &[u8]) -> Result<(), RadioError> {
        let _guard = self.tx_lock.lock().unwrap();

        burst_write(&self.usb, index, values)
    }

    fn set_led_mode(&self, mode: LedMode) -> Result<(), RadioError> {
        let _guard = self.tx_lock.lock().unwrap();

        set_led_mode(&self.usb, mode)
    }

    fn calibrate(&self, calibration: McuCalibration, value: u32) -> Result<(), RadioError> {
        let _guard = self.tx_lock.lock().unwrap();

        calibrate(&self.usb, calibration, value)
    }
}

impl Drop for Mt76Radio {
    fn drop(&mut self) {
        if let Err(e) = self.set_led_mode(LedMode::Off) {
            log::error!("Failed to turn off LED: {e}");
        }

        let _guard = self.tx_lock.lock().unwrap();

        if let Err(e) = power_mode(&self.usb, McuPowerMode::RadioOff) {
            log::error!("Failed to turn off radio: {e}");
        }
    }
}

#[cfg(test)]
#[path = "radio_test.rs"]
mod radio_test;
