use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use evdev::{FFEffectData, FFEffectKind, FFReplay, FFTrigger};

use super::*;
use crate::drivers::gip::session::GipSession;

fn rumble_effect(direction: u16, strong: u16, weak: u16, length: u16) -> FFEffectData {
    FFEffectData {
        direction,
        trigger: FFTrigger {
            button: 0,
            interval: 0,
        },
        replay: FFReplay { length, delay: 0 },
        kind: FFEffectKind::Rumble {
            strong_magnitude: strong,
            weak_magnitude: weak,
        },
    }
}

#[test]
fn test_strong_drives_left_motor() {
    let effect = rumble_effect(0, 0xffff, 0, 500);
    let rumble = shape_rumble(&effect, 0xffff, 1).unwrap();

    assert_eq!(rumble.left, 100);
    assert_eq!(rumble.right, 0);
    assert_eq!(rumble.trigger_left, 0);
    assert_eq!(rumble.trigger_right, 0);
    assert_eq!(rumble.duration, 50);
    assert_eq!(rumble.delay, 0);
    assert_eq!(rumble.repeat, 0);
}

#[test]
fn test_weak_drives_right_motor() {
    let effect = rumble_effect(0, 0, 0x8000, 500);
    let rumble = shape_rumble(&effect, 0xffff, 1).unwrap();

    assert_eq!(rumble.left, 0);
    assert_eq!(rumble.right, 49);
}

#[test]
fn test_gain_scales_magnitudes() {
    let effect = rumble_effect(0, 0xffff, 0xffff, 500);
    let rumble = shape_rumble(&effect, 0x8000, 1).unwrap();

    assert_eq!(rumble.left, 50);
    assert_eq!(rumble.right, 50);

    let rumble = shape_rumble(&effect, 0, 1).unwrap();
    assert_eq!(rumble.left, 0);
    assert_eq!(rumble.right, 0);
    assert_eq!(rumble.trigger_left, 0);
    assert_eq!(rumble.trigger_right, 0);
}

#[test]
fn test_trigger_motors_at_direction_boundaries() {
    // Both boundary directions enable trigger shaping
    let rumble = shape_rumble(&rumble_effect(0x4000, 0xffff, 0, 500), 0xffff, 1).unwrap();
    assert_eq!(rumble.trigger_left, 35);
    assert_eq!(rumble.trigger_right, 0);

    let rumble = shape_rumble(&rumble_effect(0xc000, 0xffff, 0, 500), 0xffff, 1).unwrap();
    assert_eq!(rumble.trigger_left, 0);
    assert_eq!(rumble.trigger_right, 35);

    // Directions just outside the upper half leave the triggers alone
    let rumble = shape_rumble(&rumble_effect(0x3fff, 0xffff, 0, 500), 0xffff, 1).unwrap();
    assert_eq!(rumble.trigger_left, 0);
    assert_eq!(rumble.trigger_right, 0);

    let rumble = shape_rumble(&rumble_effect(0xc001, 0xffff, 0, 500), 0xffff, 1).unwrap();
    assert_eq!(rumble.trigger_left, 0);
    assert_eq!(rumble.trigger_right, 0);
}

#[test]
fn test_trigger_motors_at_midpoint() {
    // Direction pointing at the user splits power across both triggers
    let rumble = shape_rumble(&rumble_effect(0x8000, 0xffff, 0, 500), 0xffff, 1).unwrap();

    assert_eq!(rumble.left, 100);
    assert_eq!(rumble.right, 0);
    assert_eq!(rumble.trigger_left, 35);
    assert_eq!(rumble.trigger_right, 35);
}

#[test]
fn test_duration_clamping() {
    let shape = |length| {
        shape_rumble(&rumble_effect(0, 0xffff, 0, length), 0xffff, 1)
            .unwrap()
            .duration
    };

    assert_eq!(shape(0), 255);
    assert_eq!(shape(5), 1);
    assert_eq!(shape(100), 10);
    assert_eq!(shape(500), 50);
    assert_eq!(shape(2560), 255);
}

#[test]
fn test_repeat_from_play_count() {
    let effect = rumble_effect(0, 0xffff, 0, 100);

    assert_eq!(shape_rumble(&effect, 0xffff, 1).unwrap().repeat, 0);
    assert_eq!(shape_rumble(&effect, 0xffff, 3).unwrap().repeat, 2);
    assert_eq!(shape_rumble(&effect, 0xffff, 0).unwrap().repeat, 0);
}

#[test]
fn test_non_rumble_effects_are_ignored() {
    let effect = FFEffectData {
        direction: 0,
        trigger: FFTrigger {
            button: 0,
            interval: 0,
        },
        replay: FFReplay {
            length: 100,
            delay: 0,
        },
        kind: FFEffectKind::Damper,
    };

    assert!(shape_rumble(&effect, 0xffff, 1).is_none());
}

#[test]
fn test_pump_delivers_latest_with_rate_limit() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let captured = sent.clone();

    let session = Arc::new(Mutex::new(GipSession::new(Arc::new(
        move |packet: &[u8]| {
            captured.lock().unwrap().push((Instant::now(), packet.to_vec()));
            Ok(())
        },
    ))));

    let pump = RumblePump::new(session);

    for left in 1..=20u8 {
        pump.put(RumbleData {
            left,
            ..Default::default()
        });
    }

    std::thread::sleep(Duration::from_millis(100));
    drop(pump);

    let packets = sent.lock().unwrap();
    assert!(!packets.is_empty());

    // The most recent command is always delivered eventually
    let (_, last) = packets.last().unwrap();
    assert_eq!(last[8], 20);

    // Transmissions are spaced at least 10 ms apart
    for pair in packets.windows(2) {
        assert!(pair[1].0.duration_since(pair[0].0) >= Duration::from_millis(10));
    }
}
