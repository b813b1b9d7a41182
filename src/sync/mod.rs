pub mod interrupt;
pub mod triple_buffer;

use std::sync::{Condvar, Mutex};

/// Wakes a sleeping consumer thread when a producer has published a value.
///
/// Used together with [`triple_buffer::TripleBuffer`]: the buffer itself never
/// blocks, so a separate notification is needed for the consumer to sleep on
/// when the buffer is drained.
#[derive(Default)]
pub struct Signal {
    pending: Mutex<bool>,
    condvar: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        let mut pending = self.pending.lock().unwrap();
        *pending = true;
        self.condvar.notify_one();
    }

    /// Blocks until [`Signal::notify`] is called, then consumes the wakeup.
    pub fn wait(&self) {
        let mut pending = self.pending.lock().unwrap();
        while !*pending {
            pending = self.condvar.wait(pending).unwrap();
        }
        *pending = false;
    }
}
