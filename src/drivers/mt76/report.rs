//! Wire formats exchanged with the radio over USB.
//!
//! The DMA descriptors and wireless info headers are dense little-endian
//! bitfields that fill each byte starting at the least significant bit, which
//! is exactly the layout `modular_bitfield` produces. The 802.11 frame
//! headers carry byte arrays and are packed with explicit offsets. All of
//! them are covered by golden-byte tests.

use modular_bitfield::prelude::*;

use super::{DmaMsgPort, McuCommand, PhyType, Qsel, TxInfoType};

/// 802.11 frame control field.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameControl {
    pub protocol_version: B2,
    pub frame_type: B2,
    pub subtype: B4,
    pub to_ds: bool,
    pub from_ds: bool,
    pub more_fragments: bool,
    pub retry: bool,
    pub power_management: bool,
    pub more_data: bool,
    pub protected_frame: bool,
    pub order: bool,
}

/// 802.11 MAC header: frame control, duration, three addresses and sequence
/// control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WlanFrame {
    pub frame_control: FrameControl,
    pub duration: u16,
    pub destination: [u8; 6],
    pub source: [u8; 6],
    pub bss_id: [u8; 6],
    pub sequence_control: u16,
}

pub const WLAN_FRAME_SIZE: usize = 24;
pub const QOS_FRAME_SIZE: usize = 2;

impl WlanFrame {
    pub fn to_bytes(&self) -> [u8; WLAN_FRAME_SIZE] {
        let mut out = [0u8; WLAN_FRAME_SIZE];

        out[0..2].copy_from_slice(&self.frame_control.into_bytes());
        out[2..4].copy_from_slice(&self.duration.to_le_bytes());
        out[4..10].copy_from_slice(&self.destination);
        out[10..16].copy_from_slice(&self.source);
        out[16..22].copy_from_slice(&self.bss_id);
        out[22..24].copy_from_slice(&self.sequence_control.to_le_bytes());

        out
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < WLAN_FRAME_SIZE {
            return None;
        }

        Some(Self {
            frame_control: FrameControl::from_bytes([data[0], data[1]]),
            duration: u16::from_le_bytes([data[2], data[3]]),
            destination: data[4..10].try_into().unwrap(),
            source: data[10..16].try_into().unwrap(),
            bss_id: data[16..22].try_into().unwrap(),
            sequence_control: u16::from_le_bytes([data[22], data[23]]),
        })
    }
}

/// Common prefix of every received DMA message, used to tell the ports apart.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxInfoGeneric {
    pub data: B25,
    pub qsel: B2,
    pub port: B3,
    pub info_type: B2,
}

/// RX descriptor for messages on the CPU port (firmware events).
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxInfoCommand {
    pub length: B14,
    pub reserved: B1,
    pub self_gen: B1,
    pub sequence: B4,
    pub event_type: B4,
    pub pcie_interrupt: B1,
    pub qsel: B2,
    pub port: B3,
    pub info_type: B2,
}

/// RX descriptor for messages on the WLAN port (802.11 packets).
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxInfoPacket {
    pub length: B14,
    pub reserved: B2,
    pub udp_error: B1,
    pub tcp_error: B1,
    pub ip_error: B1,
    pub is_802_11: bool,
    pub l3l4_done: B1,
    pub mac_length: B3,
    pub pcie_interrupt: B1,
    pub qsel: B2,
    pub port: B3,
    pub info_type: B2,
}

/// TX descriptor preceding MCU command packets.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxInfoCommand {
    pub length: B16,
    pub sequence: B4,
    pub command: B7,
    pub port: B3,
    pub info_type: B2,
}

/// TX descriptor preceding raw 802.11 packets.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxInfoPacket {
    pub length: B16,
    pub next_vld: B1,
    pub tx_burst: B1,
    pub reserved1: B1,
    pub is_802_11: bool,
    pub tso: B1,
    pub cso: B1,
    pub reserved2: B2,
    pub wiv: bool,
    pub qsel: B2,
    pub port: B3,
    pub info_type: B2,
}

/// Transmit wireless information, prepended to every outgoing 802.11 frame.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxWi {
    pub fragment: B1,
    pub mimo_power_save: B1,
    pub cf_ack: B1,
    pub timestamp: bool,
    pub ampdu: B1,
    pub mpdu_density: B3,
    pub txop: B2,
    pub ndp_sounding_rate: B1,
    pub rts_bw_sig: B1,
    pub ndp_sounding_bw: B2,
    pub sounding: B1,
    pub lut_enable: B1,
    pub mcs: B6,
    pub ldpc: B1,
    pub bandwidth: B2,
    pub sgi: B1,
    pub stbc: B1,
    pub e_tx_bf: B1,
    pub i_tx_bf: B1,
    pub phy_type: B3,

    pub ack: bool,
    pub nseq: bool,
    pub ba_window_size: B6,
    pub wcid: B8,
    pub mpdu_byte_count: B14,
    pub txbf_pt_sca: B1,
    pub tim: B1,

    pub iv: B32,
    pub eiv: B32,

    pub eap_id: B8,
    pub stream_mode: B8,
    pub power_adjustment: B4,
    pub reserved: B3,
    pub group_id: B1,
    pub packet_id: B8,
}

pub const TX_WI_SIZE: usize = 20;

/// Receive wireless information, prepended to every incoming 802.11 frame.
/// Includes the leading 32-bit DMA length word.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxWi {
    pub dma_length: B32,

    pub wcid: B8,
    pub key_index: B2,
    pub bss_index: B3,
    pub user_defined: B3,
    pub mpdu_byte_count: B14,
    pub reserved1: B1,
    pub eof: B1,

    pub traffic_id: B4,
    pub sequence_number: B12,
    pub mcs: B6,
    pub ldpc: B1,
    pub bandwidth: B2,
    pub sgi: B1,
    pub stbc: B1,
    pub ldpc_ex_sym: B1,
    pub reserved2: B1,
    pub phy_type: B3,

    pub rssi: B32,
    pub bbp_rx_info: B128,
}

pub const RX_WI_SIZE: usize = 32;

/// USB DMA configuration (`MT_USB_U3DMA_CFG`).
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaConfig {
    pub rx_bulk_agg_timeout: B8,
    pub rx_bulk_agg_limit: B8,
    pub udma_tx_wl_drop: B1,
    pub wakeup_enabled: B1,
    pub rx_drop_or_pad: B1,
    pub tx_clear: B1,
    pub txop_halt: B1,
    pub rx_bulk_agg_enabled: B1,
    pub rx_bulk_enabled: bool,
    pub tx_bulk_enabled: bool,
    pub ep_out_valid: B6,
    pub rx_busy: B1,
    pub tx_busy: B1,
}

/// Beacon timing configuration (`MT_BEACON_TIME_CFG`).
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconTimeConfig {
    pub interval: B16,
    pub tsf_timer_enabled: bool,
    pub tsf_sync_mode: B2,
    pub tbtt_timer_enabled: bool,
    pub transmit_beacon: bool,
    pub reserved: B3,
    pub tsf_insertion_compensation: B8,
}

/// E-fuse access control (`MT_EFUSE_CTRL`).
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EfuseControl {
    pub address_out: B6,
    pub mode: B2,
    pub ldo_off_time: B6,
    pub ldo_on_time: B2,
    pub address_in: B10,
    pub reserved: B4,
    pub kick: bool,
    pub select: B1,
}

/// Channel switch parameters for `CMD_SWITCH_CHANNEL_OP`.
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    pub channel: u8,
    pub tx_rx_setting: u16,
    pub bandwidth: u8,
    pub tx_power: u8,
    pub scan: bool,
}

impl ChannelConfig {
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];

        out[0] = self.channel;
        out[4..6].copy_from_slice(&self.tx_rx_setting.to_le_bytes());
        out[16] = self.bandwidth;
        out[17] = self.tx_power;
        out[18] = self.scan as u8;

        out
    }
}

/// Number of padding bytes required to align `length` to 32 bits.
pub fn pad32(length: usize) -> usize {
    (4 - length % 4) % 4
}

/// Wraps an MCU command payload in its TX descriptor: the payload is padded
/// to 32 bits and terminated by a 32-bit zero trailer.
pub fn command_packet(command: McuCommand, data: &[u8]) -> Vec<u8> {
    let padding = pad32(data.len());

    let info = TxInfoCommand::new()
        .with_port(DmaMsgPort::CpuTx as u8)
        .with_info_type(TxInfoType::CmdPacket as u8)
        .with_command(command as u8)
        .with_length((data.len() + padding) as u16);

    let mut out = Vec::with_capacity(4 + data.len() + padding + 4);

    out.extend_from_slice(&info.into_bytes());
    out.extend_from_slice(data);
    out.resize(out.len() + padding, 0);
    out.resize(out.len() + 4, 0);

    out
}

/// Wraps a raw 802.11 frame in its TX descriptor for the WLAN port.
pub fn wlan_packet(data: &[u8]) -> Vec<u8> {
    let padding = pad32(data.len());

    let info = TxInfoPacket::new()
        .with_port(DmaMsgPort::Wlan as u8)
        .with_info_type(TxInfoType::NormalPacket as u8)
        .with_is_802_11(true)
        .with_wiv(true)
        .with_qsel(Qsel::Edca as u8)
        .with_length((data.len() + padding) as u16);

    let mut out = Vec::with_capacity(4 + data.len() + padding + 4);

    out.extend_from_slice(&info.into_bytes());
    out.extend_from_slice(data);
    out.resize(out.len() + padding, 0);
    out.resize(out.len() + 4, 0);

    out
}

fn management_frame(subtype: u8, destination: [u8; 6], address: [u8; 6]) -> WlanFrame {
    WlanFrame {
        frame_control: FrameControl::new()
            .with_frame_type(super::MT_WLAN_MGMT)
            .with_subtype(subtype),
        destination,
        source: address,
        bss_id: address,
        ..Default::default()
    }
}

/// Association response with the status code and association id the
/// controllers expect.
pub fn association_response(address: [u8; 6], client: [u8; 6]) -> Vec<u8> {
    // Capability info and an unknown trailing quadword stay zero
    let mut response = [0u8; 14];
    response[2..4].copy_from_slice(&0x0110u16.to_le_bytes());
    response[4..6].copy_from_slice(&0x0f00u16.to_le_bytes());

    let tx_wi = TxWi::new()
        .with_phy_type(PhyType::Ofdm as u8)
        .with_ack(true)
        .with_wcid(0xff)
        .with_mpdu_byte_count((WLAN_FRAME_SIZE + response.len()) as u16);

    let frame = management_frame(super::MT_WLAN_ASSOC_RESP, client, address);

    let mut out = Vec::with_capacity(TX_WI_SIZE + WLAN_FRAME_SIZE + response.len());

    out.extend_from_slice(&tx_wi.into_bytes());
    out.extend_from_slice(&frame.to_bytes());
    out.extend_from_slice(&response);

    out
}

/// Pairing frame: a reserved-subtype management frame with a fixed payload.
pub fn pairing_frame(address: [u8; 6], client: [u8; 6]) -> Vec<u8> {
    const PAIRING_DATA: [u8; 11] = [
        0x70, 0x02, 0x00, 0x45, 0x55, 0x01, 0x0f, 0x8f, 0xff, 0x87, 0x1f,
    ];

    let tx_wi = TxWi::new()
        .with_phy_type(PhyType::Ofdm as u8)
        .with_ack(true)
        .with_wcid(0xff)
        .with_mpdu_byte_count((WLAN_FRAME_SIZE + PAIRING_DATA.len()) as u16);

    let frame = management_frame(super::MT_WLAN_RESERVED, client, address);

    let mut out = Vec::with_capacity(TX_WI_SIZE + WLAN_FRAME_SIZE + PAIRING_DATA.len());

    out.extend_from_slice(&tx_wi.into_bytes());
    out.extend_from_slice(&frame.to_bytes());
    out.extend_from_slice(&PAIRING_DATA);

    out
}

/// Broadcast beacon frame. The trailing vendor-specific information element
/// (ID 0xdd, length 0x10) is reproduced verbatim; byte 8 carries the
/// pairing-enabled flag.
pub fn beacon_frame(address: [u8; 6], pairing: bool) -> Vec<u8> {
    let data: [u8; 18] = [
        0xdd,
        0x10,
        0x00,
        0x50,
        0xf2,
        0x11,
        0x01,
        0x10,
        pairing as u8,
        0xa5,
        0x30,
        0x99,
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
    ];

    // Timestamp is filled in by hardware; default interval (100 ms),
    // original capability info, wildcard SSID
    let mut body = [0u8; 14];
    body[8..10].copy_from_slice(&0x64u16.to_le_bytes());
    body[10..12].copy_from_slice(&0xc631u16.to_le_bytes());

    let tx_wi = TxWi::new()
        .with_phy_type(PhyType::Ofdm as u8)
        .with_timestamp(true)
        .with_nseq(true)
        .with_mpdu_byte_count((WLAN_FRAME_SIZE + body.len() + data.len()) as u16);

    let frame = management_frame(
        super::MT_WLAN_BEACON,
        [0xff, 0xff, 0xff, 0xff, 0xff, 0xff],
        address,
    );

    let mut out = Vec::with_capacity(TX_WI_SIZE + WLAN_FRAME_SIZE + body.len() + data.len());

    out.extend_from_slice(&tx_wi.into_bytes());
    out.extend_from_slice(&frame.to_bytes());
    out.extend_from_slice(&body);
    out.extend_from_slice(&data);

    out
}

/// Body of a `CMD_PACKET_TX` command carrying one QoS data frame to a client:
/// the WCID index, a 32-bit pad, TxWi, the 802.11 and QoS headers padded to
/// 32 bits, then the payload padded to 32 bits.
pub fn client_data_packet(wcid: u8, address: [u8; 6], client: [u8; 6], payload: &[u8]) -> Vec<u8> {
    let tx_wi = TxWi::new()
        .with_phy_type(PhyType::Ofdm as u8)
        .with_ack(true)
        .with_mpdu_byte_count((WLAN_FRAME_SIZE + QOS_FRAME_SIZE + payload.len()) as u16);

    // Frame is sent from the AP (DS); the duration is the time required to
    // transmit in microseconds
    let frame = WlanFrame {
        frame_control: FrameControl::new()
            .with_frame_type(super::MT_WLAN_DATA)
            .with_subtype(super::MT_WLAN_QOS_DATA)
            .with_from_ds(true),
        duration: 144,
        destination: client,
        source: address,
        bss_id: address,
        ..Default::default()
    };

    let header_padding = pad32(TX_WI_SIZE + WLAN_FRAME_SIZE + QOS_FRAME_SIZE);
    let payload_padding = pad32(payload.len());

    let mut out = Vec::with_capacity(
        8 + TX_WI_SIZE + WLAN_FRAME_SIZE + QOS_FRAME_SIZE + header_padding + payload.len()
            + payload_padding,
    );

    out.extend_from_slice(&u32::from(wcid - 1).to_le_bytes());
    out.resize(out.len() + 4, 0);
    out.extend_from_slice(&tx_wi.into_bytes());
    out.extend_from_slice(&frame.to_bytes());
    out.resize(out.len() + QOS_FRAME_SIZE, 0);
    out.resize(out.len() + header_padding, 0);
    out.extend_from_slice(payload);
    out.resize(out.len() + payload_padding, 0);

    out
}

#[cfg(test)]
#[path = "report_test.rs"]
mod report_test;
