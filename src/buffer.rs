//! Fixed-capacity FIFO buffer shared by producers and consumers.
//!
//! Two semaphores count free slots (starting at `capacity`) and filled slots
//! (starting at zero); a mutex guards the queue itself. Every operation takes
//! its counting permit *before* the mutex and releases the opposite permit
//! *after* dropping the mutex, so nobody ever blocks while holding the lock.

use core::fmt;
use std::collections::VecDeque;

use tracing::trace;

use crate::error::ConfigError;
use crate::semaphore::Semaphore;
use crate::sync::{lock, Mutex};

/// Returned by [`BoundedBuffer::try_put`] when the buffer is full; carries the rejected item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryPutError<T>(pub T);
impl<T> fmt::Display for TryPutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "buffer is full") }
}
impl<T: fmt::Debug> std::error::Error for TryPutError<T> {}

/// Returned by [`BoundedBuffer::try_take`] when the buffer is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryTakeError;
impl fmt::Display for TryTakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "buffer is empty") }
}
impl std::error::Error for TryTakeError {}

struct Slots<T> {
    items: VecDeque<T>,
    peak: usize,
}

/// Bounded blocking FIFO coordinated by two counting semaphores and a mutex.
pub struct BoundedBuffer<T> {
    slots: Mutex<Slots<T>>,
    free: Semaphore,
    filled: Semaphore,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    /// Creates an empty buffer holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; see [`BoundedBuffer::try_new`].
    pub fn new(capacity: usize) -> Self {
        match Self::try_new(capacity) {
            Ok(buffer) => buffer,
            Err(_) => panic!("capacity must be greater than 0"),
        }
    }

    /// Creates an empty buffer, rejecting a zero capacity.
    pub fn try_new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(BoundedBuffer {
            slots: Mutex::new(Slots { items: VecDeque::with_capacity(capacity), peak: 0 }),
            free: Semaphore::new(capacity),
            filled: Semaphore::new(0),
            capacity,
        })
    }

    /// Appends `item`, blocking while the buffer is full.
    pub fn put(&self, item: T) {
        let slot = self.free.acquire();
        let len = self.push(item);
        // The slot now holds an item; it is handed back by `take`, not here.
        slot.forget();
        self.filled.release();
        trace!(len, capacity = self.capacity, "put");
    }

    /// Removes the oldest item, blocking while the buffer is empty.
    pub fn take(&self) -> T {
        let ready = self.filled.acquire();
        let (item, len) = self.pop();
        ready.forget();
        self.free.release();
        trace!(len, capacity = self.capacity, "take");
        item
    }

    /// Appends `item` if a slot is free, otherwise hands it back.
    pub fn try_put(&self, item: T) -> Result<(), TryPutError<T>> {
        let Some(slot) = self.free.try_acquire() else { return Err(TryPutError(item)) };
        let len = self.push(item);
        slot.forget();
        self.filled.release();
        trace!(len, capacity = self.capacity, "try_put");
        Ok(())
    }

    /// Removes the oldest item if there is one.
    pub fn try_take(&self) -> Result<T, TryTakeError> {
        let Some(ready) = self.filled.try_acquire() else { return Err(TryTakeError) };
        let (item, len) = self.pop();
        ready.forget();
        self.free.release();
        trace!(len, capacity = self.capacity, "try_take");
        Ok(item)
    }

    fn push(&self, item: T) -> usize {
        let mut slots = lock(&self.slots);
        slots.items.push_back(item);
        let len = slots.items.len();
        assert!(len <= self.capacity, "buffer overflow: {len} items in {} slots", self.capacity);
        slots.peak = slots.peak.max(len);
        len
    }

    fn pop(&self) -> (T, usize) {
        let mut slots = lock(&self.slots);
        match slots.items.pop_front() {
            Some(item) => (item, slots.items.len()),
            None => panic!("buffer underflow: item permit held but queue is empty"),
        }
    }

    /// Maximum number of items the buffer holds.
    pub const fn capacity(&self) -> usize { self.capacity }
    /// Number of items currently buffered.
    pub fn len(&self) -> usize { lock(&self.slots).items.len() }
    /// Whether the buffer currently holds no items.
    pub fn is_empty(&self) -> bool { self.len() == 0 }
    /// Highest number of items ever held at once.
    pub fn peak(&self) -> usize { lock(&self.slots).peak }
}

impl<T> fmt::Debug for BoundedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = lock(&self.slots);
        f.debug_struct("BoundedBuffer")
            .field("len", &slots.items.len())
            .field("capacity", &self.capacity)
            .field("peak", &slots.peak)
            .finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn smoke() {
        let b = BoundedBuffer::new(8);
        b.put(42);
        assert_eq!(b.take(), 42);
        assert!(b.is_empty());
    }

    #[test]
    fn fifo_order() {
        let b = BoundedBuffer::new(16);
        for i in 0..10 { b.put(i); }
        for i in 0..10 { assert_eq!(b.take(), i); }
    }

    #[test]
    fn try_put_try_take() {
        let b = BoundedBuffer::new(4);
        assert_eq!(b.try_take(), Err(TryTakeError));
        for i in 0..4 { assert!(b.try_put(i).is_ok()); }
        assert_eq!(b.try_put(99), Err(TryPutError(99)));
        assert_eq!(b.len(), 4);
        for i in 0..4 { assert_eq!(b.try_take(), Ok(i)); }
        assert!(b.try_take().is_err());
    }

    #[test]
    fn peak_tracks_high_water_mark() {
        let b = BoundedBuffer::new(4);
        b.put(1);
        b.put(2);
        b.put(3);
        b.take();
        b.take();
        b.put(4);
        assert_eq!(b.len(), 2);
        assert_eq!(b.peak(), 3);
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(matches!(BoundedBuffer::<u8>::try_new(0), Err(ConfigError::ZeroCapacity)));
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than 0")]
    fn zero_capacity_panics() {
        let _ = BoundedBuffer::<u8>::new(0);
    }

    #[test]
    fn put_blocks_until_take() {
        let b = Arc::new(BoundedBuffer::new(1));
        b.put(1);

        let (tx, rx) = crossbeam_channel::bounded(1);
        let producer = {
            let b = b.clone();
            thread::spawn(move || {
                b.put(2);
                tx.send(()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err(), "put must wait for a free slot");
        assert_eq!(b.take(), 1);
        rx.recv_timeout(Duration::from_secs(10)).unwrap();
        producer.join().unwrap();
        assert_eq!(b.take(), 2);
        assert_eq!(b.peak(), 1);
    }

    #[test]
    fn take_blocks_until_put() {
        let b = Arc::new(BoundedBuffer::<u32>::new(2));
        let consumer = {
            let b = b.clone();
            thread::spawn(move || b.take())
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!consumer.is_finished());
        b.put(7);
        assert_eq!(consumer.join().unwrap(), 7);
    }

    #[test]
    fn spsc_threaded_keeps_order() {
        let b = Arc::new(BoundedBuffer::new(4));
        let tx = b.clone();
        let producer = thread::spawn(move || {
            for i in 0..1000 { tx.put(i); }
        });
        for i in 0..1000 { assert_eq!(b.take(), i); }
        producer.join().unwrap();
        assert!(b.peak() <= 4);
    }
}
