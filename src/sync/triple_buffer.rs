use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bit set on the middle-slot index while it holds a value the consumer has
/// not seen yet.
const DIRTY: usize = 0x4;
const INDEX: usize = 0x3;

/// Single-producer/single-consumer latest-value store.
///
/// `put` always succeeds and overwrites any unread value; `get` returns the
/// most recent value published since the last `get`, if any. Three slots
/// (back/middle/front) are rotated by atomically exchanging the middle slot,
/// so neither side ever blocks the other.
///
/// The rumble path uses this to let the force feedback callback publish at
/// whatever rate the host produces effects while the dongle consumer drains
/// at its own pace.
pub struct TripleBuffer<T> {
    slots: [UnsafeCell<T>; 3],
    /// Middle slot index, tagged with [`DIRTY`] when it holds fresh data.
    middle: AtomicUsize,
    /// Only touched by the producer.
    back: AtomicUsize,
    /// Only touched by the consumer.
    front: AtomicUsize,
}

// The producer and consumer each access a disjoint slot at any point in time;
// the middle-slot exchange transfers ownership with acquire/release ordering.
unsafe impl<T: Send> Sync for TripleBuffer<T> {}

impl<T: Copy + Default> TripleBuffer<T> {
    pub fn new() -> Self {
        Self {
            slots: [
                UnsafeCell::new(T::default()),
                UnsafeCell::new(T::default()),
                UnsafeCell::new(T::default()),
            ],
            middle: AtomicUsize::new(1),
            back: AtomicUsize::new(0),
            front: AtomicUsize::new(2),
        }
    }

    /// Publishes a value, replacing any value the consumer has not read yet.
    pub fn put(&self, value: T) {
        let back = self.back.load(Ordering::Relaxed);
        unsafe {
            *self.slots[back].get() = value;
        }
        let previous = self.middle.swap(back | DIRTY, Ordering::AcqRel);
        self.back.store(previous & INDEX, Ordering::Relaxed);
    }

    /// Takes the most recent published value, or `None` if nothing new has
    /// arrived since the last call.
    pub fn get(&self) -> Option<T> {
        if self.middle.load(Ordering::Acquire) & DIRTY == 0 {
            return None;
        }

        let front = self.front.load(Ordering::Relaxed);
        let previous = self.middle.swap(front, Ordering::AcqRel);
        let slot = previous & INDEX;

        self.front.store(slot, Ordering::Relaxed);

        Some(unsafe { *self.slots[slot].get() })
    }
}

impl<T: Copy + Default> Default for TripleBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}
