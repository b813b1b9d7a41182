use std::sync::{Arc, Mutex};

use packed_struct::prelude::*;

use padlink::dongle::{classify_bulk, parse_wlan, BulkEvent, WlanEvent};
use padlink::drivers::gip::report::{InputData, INPUT_DATA_SIZE};
use padlink::drivers::gip::session::{GipMessage, GipSession};
use padlink::drivers::gip::CMD_INPUT;
use padlink::drivers::mt76::report::{
    FrameControl, RxInfoCommand, RxWi, WlanFrame, RX_WI_SIZE,
};
use padlink::drivers::mt76::{
    DmaMsgPort, MT_WLAN_DATA, MT_WLAN_QOS_DATA,
};

const ADDRESS: [u8; 6] = [0x62, 0x45, 0xbd, 0x01, 0x02, 0x03];
const CLIENT: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];

/// Builds the bulk transfer the dongle produces for one inbound QoS data
/// frame carrying a GIP payload.
fn input_transfer(wcid: u8, payload: &[u8]) -> Vec<u8> {
    let mut wlan = RxWi::new().with_wcid(wcid).into_bytes().to_vec();

    let frame = WlanFrame {
        frame_control: FrameControl::new()
            .with_frame_type(MT_WLAN_DATA)
            .with_subtype(MT_WLAN_QOS_DATA)
            .with_from_ds(false)
            .with_to_ds(true),
        destination: ADDRESS,
        source: CLIENT,
        bss_id: ADDRESS,
        ..Default::default()
    };

    wlan.extend_from_slice(&frame.to_bytes());
    // QoS header and padding
    wlan.extend_from_slice(&[0, 0, 0, 0]);
    wlan.extend_from_slice(payload);
    // Trailer
    wlan.extend_from_slice(&[0, 0, 0, 0]);

    let info = RxInfoCommand::new()
        .with_port(DmaMsgPort::CpuRx as u8)
        .with_event_type(0x0c)
        .with_length(wlan.len() as u16);

    let mut transfer = info.into_bytes().to_vec();
    transfer.extend_from_slice(&wlan);
    transfer
}

#[test]
fn test_input_packet_end_to_end() {
    // An input report as it arrives over the air...
    let mut input = InputData::default();
    input.a = true;
    input.start = true;
    input.trigger_right = 0x3ff;
    input.stick_left_x = 0x1234;
    input.stick_left_y = 0x5678;

    let mut gip = vec![CMD_INPUT, 0x00, 0x01, INPUT_DATA_SIZE as u8];
    gip.extend_from_slice(&input.pack().unwrap());

    let transfer = input_transfer(1, &gip);

    // ...is classified as a WLAN packet...
    let Some(BulkEvent::WlanPacket(packet)) = classify_bulk(&transfer) else {
        panic!("expected a WLAN packet");
    };

    // ...demultiplexed to WCID 1 with the framing stripped...
    let Some(WlanEvent::Data { wcid, payload }) = parse_wlan(packet, ADDRESS) else {
        panic!("expected a data frame");
    };
    assert_eq!(wcid, 1);
    assert_eq!(payload, &gip[..]);

    // ...and decoded by the client's protocol session
    let mut session = GipSession::new(Arc::new(|_: &[u8]| Ok(())));
    let message = session.handle_packet(payload).unwrap().unwrap();

    let GipMessage::Input(decoded) = message else {
        panic!("expected an input message");
    };

    assert!(decoded.a);
    assert!(decoded.start);
    assert_eq!(decoded.trigger_right, 0x3ff);
    assert_eq!(decoded.stick_left_x, 0x1234);
    assert_eq!(decoded.stick_left_y, 0x5678);
}

#[test]
fn test_short_wlan_packet_causes_no_state_change() {
    let transfer = input_transfer(1, &[]);

    // Truncate into the 802.11 header: the packet must be dropped
    let Some(BulkEvent::WlanPacket(packet)) = classify_bulk(&transfer) else {
        panic!("expected a WLAN packet");
    };

    assert_eq!(parse_wlan(&packet[..RX_WI_SIZE + 10], ADDRESS), None);
}

#[test]
fn test_outbound_frames_never_use_sequence_zero() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let captured = sent.clone();

    let mut session = GipSession::new(Arc::new(move |packet: &[u8]| {
        captured.lock().unwrap().push(packet.to_vec());
        Ok(())
    }));

    for _ in 0..600 {
        session
            .set_power_mode(0, padlink::drivers::gip::PowerMode::On)
            .unwrap();
    }

    assert!(sent.lock().unwrap().iter().all(|packet| packet[2] != 0));
}
