//! Force feedback effect shaping and rate-limited delivery.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use evdev::{FFEffectData, FFEffectKind};

use crate::drivers::gip::report::RumbleData;
use crate::drivers::gip::session::GipSession;
use crate::drivers::gip::RUMBLE_ALL;
use crate::sync::triple_buffer::TripleBuffer;
use crate::sync::Signal;

/// Device ceiling for motor power.
pub const RUMBLE_MAX_POWER: u8 = 100;

/// The controller firmware drops rumble commands that arrive faster.
const RUMBLE_DELAY: Duration = Duration::from_millis(10);

/// Rumble duration in 10 ms units. Zero means "play at maximum length".
fn duration_10ms(length: u16) -> u8 {
    if length == 0 {
        return 0xff;
    }

    (length / 10).clamp(1, 255) as u8
}

/// Maps a rumble effect with the given gain and play count to a rumble
/// command. Returns `None` for effect types other than rumble.
pub fn shape_rumble(effect: &FFEffectData, gain: u16, value: i32) -> Option<RumbleData> {
    let FFEffectKind::Rumble {
        strong_magnitude,
        weak_magnitude,
    } = effect.kind
    else {
        return None;
    };

    let weak = u32::from(weak_magnitude) * u32::from(gain) / 0xffff;
    let strong = u32::from(strong_magnitude) * u32::from(gain) / 0xffff;

    let left = (strong * u32::from(RUMBLE_MAX_POWER) / 0xffff) as u8;
    let right = (weak * u32::from(RUMBLE_MAX_POWER) / 0xffff) as u8;

    let mut rumble = RumbleData {
        motors: RUMBLE_ALL,
        left,
        right,
        duration: duration_10ms(effect.replay.length),
        delay: (effect.replay.delay / 10).min(255) as u8,
        repeat: if value > 0 {
            (value - 1).clamp(0, 255) as u8
        } else {
            0
        },
        ..Default::default()
    };

    // Directions in the upper half of the circle, toward the user, also
    // drive the trigger motors
    if (0x4000..=0xc000).contains(&effect.direction) {
        // Shift the angle by an eighth of a full circle so that 0x8000 maps
        // to the midpoint
        let angle = f32::from(effect.direction) / 65535.0 - 0.125;
        let left_share = (2.0 * PI * angle).sin().max(0.0);
        let right_share = (-(2.0 * PI * angle).cos()).max(0.0);
        let max_power = left.max(right);

        rumble.trigger_left = (left_share * f32::from(max_power) / 2.0) as u8;
        rumble.trigger_right = (right_share * f32::from(max_power) / 2.0) as u8;
    }

    Some(rumble)
}

/// Latest-wins rumble delivery: the force feedback callback publishes into a
/// triple buffer, a dedicated thread drains it with a 10 ms gap between
/// transmissions and sleeps while it is empty.
pub struct RumblePump {
    buffer: Arc<TripleBuffer<RumbleData>>,
    signal: Arc<Signal>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl RumblePump {
    pub fn new(session: Arc<Mutex<GipSession>>) -> Self {
        let buffer = Arc::new(TripleBuffer::new());
        let signal = Arc::new(Signal::new());
        let stop = Arc::new(AtomicBool::new(false));

        let thread = {
            let buffer = buffer.clone();
            let signal = signal.clone();
            let stop = stop.clone();

            thread::spawn(move || Self::run(session, buffer, signal, stop))
        };

        Self {
            buffer,
            signal,
            stop,
            thread: Some(thread),
        }
    }

    /// Publishes a rumble command, replacing any unsent one.
    pub fn put(&self, rumble: RumbleData) {
        self.buffer.put(rumble);
        self.signal.notify();
    }

    fn run(
        session: Arc<Mutex<GipSession>>,
        buffer: Arc<TripleBuffer<RumbleData>>,
        signal: Arc<Signal>,
        stop: Arc<AtomicBool>,
    ) {
        while !stop.load(Ordering::SeqCst) {
            match buffer.get() {
                Some(rumble) => {
                    if let Err(e) = session.lock().unwrap().rumble(&rumble) {
                        log::error!("Failed to send rumble command: {e}");
                    }

                    thread::sleep(RUMBLE_DELAY);
                }
                None => signal.wait(),
            }
        }
    }
}

impl Drop for RumblePump {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.signal.notify();

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
#[path = "rumble_test.rs"]
mod rumble_test;
