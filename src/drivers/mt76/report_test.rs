use super::*;
use crate::drivers::mt76::{DmaMsgPort, McuCommand, PhyType, MT_WLAN_QOS_DATA};

const ADDRESS: [u8; 6] = [0x62, 0x45, 0xbd, 0x01, 0x02, 0x03];
const CLIENT: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];

#[test]
fn test_pad32() {
    assert_eq!(pad32(0), 0);
    assert_eq!(pad32(1), 3);
    assert_eq!(pad32(4), 0);
    assert_eq!(pad32(46), 2);
}

#[test]
fn test_frame_control_layout() {
    let control = FrameControl::new()
        .with_frame_type(super::super::MT_WLAN_MGMT)
        .with_subtype(super::super::MT_WLAN_BEACON);
    assert_eq!(control.into_bytes(), [0x80, 0x00]);

    let control = FrameControl::new()
        .with_frame_type(super::super::MT_WLAN_DATA)
        .with_subtype(MT_WLAN_QOS_DATA)
        .with_from_ds(true);
    assert_eq!(control.into_bytes(), [0x88, 0x02]);

    let parsed = FrameControl::from_bytes([0x10, 0x00]);
    assert_eq!(parsed.frame_type(), super::super::MT_WLAN_MGMT);
    assert_eq!(parsed.subtype(), super::super::MT_WLAN_ASSOC_RESP);
}

#[test]
fn test_wlan_frame_round_trip() {
    let frame = WlanFrame {
        frame_control: FrameControl::new().with_frame_type(2).with_subtype(8),
        duration: 144,
        destination: CLIENT,
        source: ADDRESS,
        bss_id: ADDRESS,
        sequence_control: 0x1234,
    };

    let bytes = frame.to_bytes();
    assert_eq!(bytes.len(), WLAN_FRAME_SIZE);
    assert_eq!(WlanFrame::from_bytes(&bytes), Some(frame));

    assert_eq!(WlanFrame::from_bytes(&bytes[..WLAN_FRAME_SIZE - 1]), None);
}

#[test]
fn test_tx_info_command_layout() {
    // 10 bytes of payload are padded to 12
    let packet = command_packet(McuCommand::BurstWrite, &[0u8; 10]);

    assert_eq!(packet.len(), 4 + 12 + 4);
    assert_eq!(&packet[0..4], &[0x0c, 0x00, 0x80, 0x50]);
    // 32-bit zero trailer
    assert_eq!(&packet[16..20], &[0, 0, 0, 0]);
}

#[test]
fn test_tx_info_packet_layout() {
    let packet = wlan_packet(&[0u8; 58]);

    assert_eq!(packet.len(), 4 + 60 + 4);
    assert_eq!(&packet[0..4], &[0x3c, 0x00, 0x08, 0x05]);
}

#[test]
fn test_rx_info_command_layout() {
    let info = RxInfoCommand::new()
        .with_event_type(0x0c)
        .with_port(DmaMsgPort::CpuRx as u8);
    assert_eq!(info.into_bytes(), [0x00, 0x00, 0xc0, 0x08]);

    let parsed = RxInfoCommand::from_bytes([0x00, 0x00, 0xc0, 0x08]);
    assert_eq!(parsed.event_type(), 0x0c);
    assert_eq!(parsed.port(), DmaMsgPort::CpuRx as u8);

    let generic = RxInfoGeneric::from_bytes([0x00, 0x00, 0xc0, 0x08]);
    assert_eq!(generic.port(), DmaMsgPort::CpuRx as u8);
}

#[test]
fn test_rx_wi_wcid_position() {
    let mut bytes = [0u8; RX_WI_SIZE];
    bytes[4] = 3;

    let rx_wi = RxWi::from_bytes(bytes);
    assert_eq!(rx_wi.wcid(), 3);
}

#[test]
fn test_tx_wi_round_trip() {
    let tx_wi = TxWi::new()
        .with_phy_type(PhyType::Ofdm as u8)
        .with_ack(true)
        .with_wcid(0xff)
        .with_mpdu_byte_count(38);

    let bytes = tx_wi.into_bytes();
    assert_eq!(bytes.len(), TX_WI_SIZE);
    assert_eq!(
        &bytes[..8],
        &[0x00, 0x00, 0x00, 0x20, 0x01, 0xff, 0x26, 0x00]
    );

    let parsed = TxWi::from_bytes(bytes);
    assert_eq!(parsed.phy_type(), PhyType::Ofdm as u8);
    assert!(parsed.ack());
    assert_eq!(parsed.wcid(), 0xff);
    assert_eq!(parsed.mpdu_byte_count(), 38);
}

#[test]
fn test_dma_config_layout() {
    let config = DmaConfig::new()
        .with_rx_bulk_enabled(true)
        .with_tx_bulk_enabled(true);

    assert_eq!(config.into_bytes(), [0x00, 0x00, 0xc0, 0x00]);
}

#[test]
fn test_beacon_time_config_layout() {
    let config = BeaconTimeConfig::new()
        .with_interval(0x0640)
        .with_tsf_timer_enabled(true)
        .with_tsf_sync_mode(3)
        .with_tbtt_timer_enabled(true)
        .with_transmit_beacon(true);

    assert_eq!(u32::from_le_bytes(config.into_bytes()), 0x001f0640);
}

#[test]
fn test_association_response_contents() {
    let packet = association_response(ADDRESS, CLIENT);

    assert_eq!(packet.len(), TX_WI_SIZE + WLAN_FRAME_SIZE + 14);

    let frame = WlanFrame::from_bytes(&packet[TX_WI_SIZE..]).unwrap();
    assert_eq!(frame.frame_control.frame_type(), super::super::MT_WLAN_MGMT);
    assert_eq!(frame.frame_control.subtype(), super::super::MT_WLAN_ASSOC_RESP);
    assert_eq!(frame.destination, CLIENT);
    assert_eq!(frame.source, ADDRESS);
    assert_eq!(frame.bss_id, ADDRESS);

    // Status code 0x0110 and association id 0x0f00
    let body = &packet[TX_WI_SIZE + WLAN_FRAME_SIZE..];
    assert_eq!(&body[2..4], &[0x10, 0x01]);
    assert_eq!(&body[4..6], &[0x00, 0x0f]);
}

#[test]
fn test_pairing_frame_contents() {
    let packet = pairing_frame(ADDRESS, CLIENT);

    assert_eq!(packet.len(), TX_WI_SIZE + WLAN_FRAME_SIZE + 11);
    assert_eq!(
        &packet[TX_WI_SIZE + WLAN_FRAME_SIZE..],
        &[0x70, 0x02, 0x00, 0x45, 0x55, 0x01, 0x0f, 0x8f, 0xff, 0x87, 0x1f]
    );

    let frame = WlanFrame::from_bytes(&packet[TX_WI_SIZE..]).unwrap();
    assert_eq!(frame.frame_control.subtype(), super::super::MT_WLAN_RESERVED);
}

#[test]
fn test_beacon_frame_pairing_flag() {
    let beacon = beacon_frame(ADDRESS, false);
    assert_eq!(beacon.len(), TX_WI_SIZE + WLAN_FRAME_SIZE + 14 + 18);

    let frame = WlanFrame::from_bytes(&beacon[TX_WI_SIZE..]).unwrap();
    assert_eq!(frame.frame_control.subtype(), super::super::MT_WLAN_BEACON);
    assert_eq!(frame.destination, [0xff; 6]);
    assert_eq!(frame.source, ADDRESS);

    let flag_offset = TX_WI_SIZE + WLAN_FRAME_SIZE + 14 + 8;
    assert_eq!(beacon[flag_offset], 0);
    assert_eq!(beacon_frame(ADDRESS, true)[flag_offset], 1);

    // Vendor information element header
    let element = &beacon[TX_WI_SIZE + WLAN_FRAME_SIZE + 14..];
    assert_eq!(&element[..4], &[0xdd, 0x10, 0x00, 0x50]);
}

#[test]
fn test_client_data_packet_layout() {
    let payload = [0xa5u8; 13];
    let packet = client_data_packet(1, ADDRESS, CLIENT, &payload);

    // WCID index, pad, TxWi, WLAN + QoS headers padded to 32 bits, payload
    // padded to 32 bits
    assert_eq!(packet.len(), 4 + 4 + TX_WI_SIZE + 24 + 2 + 2 + 13 + 3);
    assert_eq!(&packet[0..8], &[0, 0, 0, 0, 0, 0, 0, 0]);

    let tx_wi = TxWi::from_bytes(packet[8..28].try_into().unwrap());
    assert!(tx_wi.ack());
    assert_eq!(tx_wi.wcid(), 0);
    assert_eq!(tx_wi.mpdu_byte_count(), (24 + 2 + 13) as u16);

    let frame = WlanFrame::from_bytes(&packet[28..52]).unwrap();
    assert!(frame.frame_control.from_ds());
    assert_eq!(frame.duration, 144);
    assert_eq!(frame.destination, CLIENT);

    assert_eq!(&packet[56..69], &payload);
    assert_eq!(&packet[69..72], &[0, 0, 0]);

    // The WCID index is serialised little-endian
    let packet = client_data_packet(3, ADDRESS, CLIENT, &payload);
    assert_eq!(&packet[0..4], &[2, 0, 0, 0]);
}

#[test]
fn test_channel_config_layout() {
    let config = ChannelConfig {
        channel: 0x24,
        tx_rx_setting: 0x0101,
        bandwidth: 1,
        tx_power: 0x14,
        scan: true,
    };

    let bytes = config.to_bytes();
    assert_eq!(bytes[0], 0x24);
    assert_eq!(&bytes[4..6], &[0x01, 0x01]);
    assert_eq!(bytes[16], 1);
    assert_eq!(bytes[17], 0x14);
    assert_eq!(bytes[18], 1);
    assert_eq!(bytes[19], 0);
}
