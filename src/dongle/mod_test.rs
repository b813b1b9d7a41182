use super::*;
use crate::drivers::mt76::report::{
    FrameControl, RxInfoCommand, RxInfoPacket, RxWi, TxWi, WlanFrame, QOS_FRAME_SIZE, RX_WI_SIZE,
};
use crate::drivers::mt76::{
    DmaMsgPort, MT_WLAN_ASSOC_REQ, MT_WLAN_BEACON, MT_WLAN_DATA, MT_WLAN_DISASSOC, MT_WLAN_MGMT,
    MT_WLAN_QOS_DATA, MT_WLAN_RESERVED,
};

const ADDRESS: [u8; 6] = [0x62, 0x45, 0xbd, 0x01, 0x02, 0x03];
const CLIENT: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];

fn command_event(event_type: u8, payload: &[u8]) -> Vec<u8> {
    let info = RxInfoCommand::new()
        .with_port(DmaMsgPort::CpuRx as u8)
        .with_event_type(event_type)
        .with_length(payload.len() as u16);

    let mut out = info.into_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}

fn wlan_rx_packet(payload: &[u8]) -> Vec<u8> {
    let info = RxInfoPacket::new()
        .with_port(DmaMsgPort::Wlan as u8)
        .with_is_802_11(true)
        .with_length(payload.len() as u16);

    let mut out = info.into_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}

/// 802.11 packet as the dispatcher sees it: RxWi, header, body.
fn wlan_frame(wcid: u8, frame_type: u8, subtype: u8, destination: [u8; 6], body: &[u8]) -> Vec<u8> {
    let rx_wi = RxWi::new().with_wcid(wcid);
    let frame = WlanFrame {
        frame_control: FrameControl::new()
            .with_frame_type(frame_type)
            .with_subtype(subtype),
        destination,
        source: CLIENT,
        bss_id: ADDRESS,
        ..Default::default()
    };

    let mut out = rx_wi.into_bytes().to_vec();
    out.extend_from_slice(&frame.to_bytes());
    out.extend_from_slice(body);
    out
}

#[test]
fn test_classify_rejects_short_transfers() {
    assert_eq!(classify_bulk(&[0x00, 0x01]), None);
}

#[test]
fn test_classify_button_press() {
    let data = command_event(0x04, &[]);
    assert_eq!(classify_bulk(&data), Some(BulkEvent::ButtonPress));
}

#[test]
fn test_classify_client_lost() {
    let data = command_event(0x0e, &[3]);
    assert_eq!(classify_bulk(&data), Some(BulkEvent::ClientLost(3)));

    // A lost-client event without a payload is dropped
    let data = command_event(0x0e, &[]);
    assert_eq!(classify_bulk(&data), None);
}

#[test]
fn test_classify_packet_rx() {
    let data = command_event(0x0c, &[0xaa, 0xbb]);
    assert_eq!(
        classify_bulk(&data),
        Some(BulkEvent::WlanPacket(&[0xaa, 0xbb]))
    );
}

#[test]
fn test_classify_wlan_port() {
    let data = wlan_rx_packet(&[0x11, 0x22]);
    assert_eq!(
        classify_bulk(&data),
        Some(BulkEvent::WlanPacket(&[0x11, 0x22]))
    );

    // Non-802.11 messages on the WLAN port are skipped
    let info = RxInfoPacket::new().with_port(DmaMsgPort::Wlan as u8);
    assert_eq!(classify_bulk(&info.into_bytes()), None);
}

#[test]
fn test_classify_unknown_event() {
    let data = command_event(0x01, &[]);
    assert_eq!(classify_bulk(&data), None);
}

#[test]
fn test_parse_wlan_rejects_short_packets() {
    let data = wlan_frame(1, MT_WLAN_MGMT, MT_WLAN_ASSOC_REQ, ADDRESS, &[]);
    assert_eq!(parse_wlan(&data[..RX_WI_SIZE + 4], ADDRESS), None);
}

#[test]
fn test_parse_wlan_rejects_other_destinations() {
    let other = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
    let data = wlan_frame(1, MT_WLAN_MGMT, MT_WLAN_ASSOC_REQ, other, &[]);
    assert_eq!(parse_wlan(&data, ADDRESS), None);
}

#[test]
fn test_parse_wlan_association_request() {
    let data = wlan_frame(0, MT_WLAN_MGMT, MT_WLAN_ASSOC_REQ, ADDRESS, &[]);
    assert_eq!(
        parse_wlan(&data, ADDRESS),
        Some(WlanEvent::AssociationRequest { source: CLIENT })
    );
}

#[test]
fn test_parse_wlan_disassociation() {
    let data = wlan_frame(2, MT_WLAN_MGMT, MT_WLAN_DISASSOC, ADDRESS, &[]);
    assert_eq!(
        parse_wlan(&data, ADDRESS),
        Some(WlanEvent::Disassociation { wcid: 2 })
    );
}

#[test]
fn test_parse_wlan_pairing_request() {
    let data = wlan_frame(0, MT_WLAN_MGMT, MT_WLAN_RESERVED, ADDRESS, &[0x00, 0x01]);
    assert_eq!(
        parse_wlan(&data, ADDRESS),
        Some(WlanEvent::PairingRequest { source: CLIENT })
    );

    // Only type 0x01 marks a pairing request
    let data = wlan_frame(0, MT_WLAN_MGMT, MT_WLAN_RESERVED, ADDRESS, &[0x00, 0x02]);
    assert_eq!(parse_wlan(&data, ADDRESS), None);
}

#[test]
fn test_parse_wlan_qos_data_strips_framing() {
    // QoS header, two bytes of padding, payload, four byte trailer
    let mut body = vec![0u8; QOS_FRAME_SIZE + 2];
    body.extend_from_slice(&[0x20, 0x00, 0x05, 0x0e]);
    body.extend_from_slice(&[0, 0, 0, 0]);

    let data = wlan_frame(1, MT_WLAN_DATA, MT_WLAN_QOS_DATA, ADDRESS, &body);
    assert_eq!(
        parse_wlan(&data, ADDRESS),
        Some(WlanEvent::Data {
            wcid: 1,
            payload: &[0x20, 0x00, 0x05, 0x0e],
        })
    );
}

#[test]
fn test_parse_wlan_ignores_unrelated_management_frames() {
    let data = wlan_frame(0, MT_WLAN_MGMT, MT_WLAN_BEACON, ADDRESS, &[]);
    assert_eq!(parse_wlan(&data, ADDRESS), None);
}

#[test]
fn test_tx_wi_size_matches_wire_layout() {
    assert_eq!(TxWi::new().into_bytes().len(), 20);
    assert_eq!(RxWi::new().into_bytes().len(), RX_WI_SIZE);
}
