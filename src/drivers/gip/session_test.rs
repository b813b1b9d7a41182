use std::sync::{Arc, Mutex};

use packed_struct::prelude::*;

use super::*;
use crate::drivers::gip::report::*;
use crate::drivers::gip::{LedMode, RUMBLE_ALL};

/// Session whose outbound packets are captured for inspection.
fn capture_session() -> (GipSession, Arc<Mutex<Vec<Vec<u8>>>>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let captured = sent.clone();

    let session = GipSession::new(Arc::new(move |packet: &[u8]| {
        captured.lock().unwrap().push(packet.to_vec());
        Ok(())
    }));

    (session, sent)
}

#[test]
fn test_sequence_covers_every_value_and_skips_zero() {
    let (mut session, sent) = capture_session();

    let mut seen = Vec::new();
    for _ in 0..255 {
        session.set_power_mode(0, PowerMode::On).unwrap();
        seen.push(sent.lock().unwrap().last().unwrap()[2]);
    }

    // Every value in 1..=255 appears once before wrapping
    let mut sorted = seen.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted, (1..=255).collect::<Vec<u8>>());

    // The next value wraps back to 1, never 0
    session.set_power_mode(0, PowerMode::On).unwrap();
    assert_eq!(sent.lock().unwrap().last().unwrap()[2], 1);
}

#[test]
fn test_accessory_sequence_is_independent() {
    let (mut session, sent) = capture_session();

    session.set_power_mode(0, PowerMode::On).unwrap();
    session.set_power_mode(0, PowerMode::On).unwrap();
    session.send_audio_samples(&[0u8; 8]).unwrap();

    let packets = sent.lock().unwrap();
    assert_eq!(packets[1][2], 2);
    // The audio frame starts its own counter at 1
    assert_eq!(packets[2][2], 1);
}

#[test]
fn test_short_frame_is_dropped_without_output() {
    let (mut session, sent) = capture_session();

    assert!(session.handle_packet(&[0x20, 0x00]).unwrap().is_none());
    assert!(sent.lock().unwrap().is_empty());
}

#[test]
fn test_length_mismatch_is_dropped() {
    let (mut session, _sent) = capture_session();

    // Announce frame whose length field disagrees with the payload size
    let mut packet = vec![CMD_ANNOUNCE, 0x00, 0x01, 0x10];
    packet.extend_from_slice(&[0u8; ANNOUNCE_DATA_SIZE]);

    assert!(session.handle_packet(&packet).unwrap().is_none());
}

#[test]
fn test_unknown_command_is_ignored() {
    let (mut session, sent) = capture_session();

    let packet = [0x7f, 0x00, 0x01, 0x00];
    assert!(session.handle_packet(&packet).unwrap().is_none());
    assert!(sent.lock().unwrap().is_empty());
}

#[test]
fn test_input_frame_decodes() {
    let (mut session, _sent) = capture_session();

    let mut packet = vec![CMD_INPUT, 0x00, 0x07, INPUT_DATA_SIZE as u8];
    let mut input = InputData::default();
    input.b = true;
    input.trigger_right = 0x3ff;
    packet.extend_from_slice(&input.pack().unwrap());

    let message = session.handle_packet(&packet).unwrap().unwrap();
    let GipMessage::Input(decoded) = message else {
        panic!("expected an input message");
    };

    assert!(decoded.b);
    assert_eq!(decoded.trigger_right, 0x3ff);
}

#[test]
fn test_ack_bit_triggers_acknowledgement() {
    let (mut session, sent) = capture_session();

    // Announce with the ack bit set: device id 2, sequence 0x33
    let mut packet = vec![CMD_ANNOUNCE, 0x12, 0x33, ANNOUNCE_DATA_SIZE as u8];
    packet.extend_from_slice(&[0u8; ANNOUNCE_DATA_SIZE]);

    let message = session.handle_packet(&packet).unwrap();
    assert!(matches!(message, Some(GipMessage::Announce(_))));

    let packets = sent.lock().unwrap();
    assert_eq!(packets.len(), 1);
    assert_eq!(
        packets[0],
        vec![
            // Acknowledge header echoing the received sequence
            CMD_ACKNOWLEDGE,
            0x22,
            0x33,
            (GIP_FRAME_SIZE + 5) as u8,
            0x00,
            // Received header with its length moved into the sequence slot
            CMD_ANNOUNCE,
            0x22,
            ANNOUNCE_DATA_SIZE as u8,
            0x00,
            0x00,
            0x00,
            0x00,
            0x00,
        ]
    );
}

#[test]
fn test_command_frame_is_not_acknowledged() {
    let (mut session, sent) = capture_session();

    let mut packet = vec![CMD_STATUS, 0x00, 0x01, STATUS_DATA_SIZE as u8];
    packet.extend_from_slice(&[0u8; STATUS_DATA_SIZE]);

    let message = session.handle_packet(&packet).unwrap();
    assert!(matches!(message, Some(GipMessage::Status(_))));
    assert!(sent.lock().unwrap().is_empty());
}

#[test]
fn test_rumble_frame_layout() {
    let (mut session, sent) = capture_session();

    let rumble = RumbleData {
        motors: RUMBLE_ALL,
        left: 100,
        duration: 50,
        ..Default::default()
    };
    session.rumble(&rumble).unwrap();

    let packets = sent.lock().unwrap();
    assert_eq!(
        packets[0],
        vec![CMD_RUMBLE, 0x00, 0x01, 9, 0, 0x0f, 0, 0, 100, 0, 50, 0, 0]
    );
}

#[test]
fn test_serial_number_request_layout() {
    let (mut session, sent) = capture_session();

    session.request_serial_number().unwrap();

    let packets = sent.lock().unwrap();
    // Request + ack type, argument 0x04
    assert_eq!(packets[0], vec![CMD_SERIAL_NUM, 0x30, 0x01, 0x01, 0x04]);
}

#[test]
fn test_led_mode_frame_layout() {
    let (mut session, sent) = capture_session();

    session
        .set_led_mode(LedMode::On, 0x14)
        .unwrap();

    let packets = sent.lock().unwrap();
    assert_eq!(packets[0], vec![CMD_LED_MODE, 0x20, 0x01, 3, 0, 1, 0x14]);
}

#[test]
fn test_send_failure_surfaces_for_outbound_commands() {
    let mut session = GipSession::new(Arc::new(|_: &[u8]| Err("radio gone".into())));

    assert!(matches!(
        session.set_power_mode(0, PowerMode::Off),
        Err(GipError::Send(_))
    ));
}
