//! Producer and consumer tasks and the counters they share.
//!
//! A task is a plain loop over a fixed quota: producers synthesize an item,
//! [`put`](BoundedBuffer::put) it and record it; consumers
//! [`take`](BoundedBuffer::take) an item and record it. Both pause for a
//! [`Pacing`] delay between iterations.
//!
//! Counter updates happen after the buffer operation has returned, i.e. after
//! the buffer's mutex is released. The buffer lock and a counter lock are
//! never held together.

use core::fmt;
use std::sync::Arc;

use rand::Rng;
use tracing::{info, trace};

use crate::buffer::BoundedBuffer;
use crate::config::Pacing;
use crate::sync::{lock, Mutex};

/// Which side of the buffer a task works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Puts items.
    Producer,
    /// Takes items.
    Consumer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Producer => "producer",
            Role::Consumer => "consumer",
        })
    }
}

/// The step a task was performing; reported when the task fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Not inside the loop.
    Idle,
    /// Synthesizing the next item.
    Produce,
    /// Inside [`BoundedBuffer::put`].
    Put,
    /// Inside [`BoundedBuffer::take`].
    Take,
    /// Handing a taken item to the caller's sink.
    Handle,
    /// Updating the shared counters.
    Record,
    /// Sleeping off the simulated work delay.
    Pause,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Idle => "idle",
            Operation::Produce => "produce",
            Operation::Put => "put",
            Operation::Take => "take",
            Operation::Handle => "handle",
            Operation::Record => "record",
            Operation::Pause => "pause",
        })
    }
}

/// Default item: a value in `1..=100`, tagged with its producer and that producer's sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Item {
    /// Id of the producer that made the item.
    pub producer: usize,
    /// Position of the item in its producer's output, starting at zero.
    pub seq: u64,
    /// Payload.
    pub value: u32,
}

/// Makes the item a producer puts next, from the producer id and sequence number.
pub type ItemSource<T> = Arc<dyn Fn(usize, u64) -> T + Send + Sync>;

/// [`ItemSource`] for [`Item`] with a uniformly random value.
pub fn random_item(producer: usize, seq: u64) -> Item {
    Item { producer, seq, value: rand::thread_rng().gen_range(1..=100) }
}

/// Running totals, each behind its own lock.
pub struct Tally {
    produced: Mutex<usize>,
    consumed: Mutex<usize>,
}

impl Tally {
    /// Both totals at zero.
    pub fn new() -> Self {
        Tally { produced: Mutex::new(0), consumed: Mutex::new(0) }
    }

    /// Counts one item put.
    pub fn record_produced(&self) { *lock(&self.produced) += 1; }
    /// Counts one item taken.
    pub fn record_consumed(&self) { *lock(&self.consumed) += 1; }
    /// Items put so far.
    pub fn produced(&self) -> usize { *lock(&self.produced) }
    /// Items taken so far.
    pub fn consumed(&self) -> usize { *lock(&self.consumed) }
}

impl Default for Tally {
    fn default() -> Self { Tally::new() }
}

impl fmt::Debug for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tally")
            .field("produced", &self.produced())
            .field("consumed", &self.consumed())
            .finish()
    }
}

/// Everything the tasks of one run share.
#[derive(Debug)]
pub struct Shared<T> {
    /// The buffer the tasks coordinate through.
    pub buffer: BoundedBuffer<T>,
    /// Produced and consumed totals.
    pub tally: Tally,
}

impl<T> Shared<T> {
    /// Fresh buffer of `capacity` slots and zeroed totals.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Shared { buffer: BoundedBuffer::new(capacity), tally: Tally::new() }
    }
}

/// Puts a fixed number of items into the shared buffer.
pub struct Producer<T> {
    id: usize,
    quota: usize,
    shared: Arc<Shared<T>>,
    source: ItemSource<T>,
    pacing: Pacing,
}

impl<T> Producer<T> {
    /// Producer `id`, putting `quota` items made by `source`.
    pub fn new(id: usize, quota: usize, shared: Arc<Shared<T>>, source: ItemSource<T>, pacing: Pacing) -> Self {
        Producer { id, quota, shared, source, pacing }
    }

    /// Runs the whole quota and returns the number of items put.
    pub fn run(&self) -> usize {
        let mut op = Operation::Idle;
        self.run_tracked(&mut op)
    }

    pub(crate) fn run_tracked(&self, op: &mut Operation) -> usize {
        for seq in 0..self.quota as u64 {
            *op = Operation::Produce;
            let item = (self.source)(self.id, seq);
            *op = Operation::Put;
            self.shared.buffer.put(item);
            *op = Operation::Record;
            self.shared.tally.record_produced();
            trace!(
                producer = self.id,
                seq,
                len = self.shared.buffer.len(),
                capacity = self.shared.buffer.capacity(),
                "produced"
            );
            *op = Operation::Pause;
            self.pacing.pause();
        }
        *op = Operation::Idle;
        info!(producer = self.id, items = self.quota, "producer finished");
        self.quota
    }
}

/// Takes a fixed number of items from the shared buffer.
pub struct Consumer<T> {
    id: usize,
    quota: usize,
    shared: Arc<Shared<T>>,
    pacing: Pacing,
}

impl<T> Consumer<T> {
    /// Consumer `id`, taking `quota` items.
    pub fn new(id: usize, quota: usize, shared: Arc<Shared<T>>, pacing: Pacing) -> Self {
        Consumer { id, quota, shared, pacing }
    }

    /// Runs the whole quota, dropping every item, and returns the number taken.
    pub fn run(&self) -> usize {
        self.run_with(drop)
    }

    /// Runs the whole quota, passing every item to `sink` in the order taken.
    pub fn run_with(&self, sink: impl FnMut(T)) -> usize {
        let mut op = Operation::Idle;
        self.run_tracked(&mut op, sink)
    }

    pub(crate) fn run_tracked(&self, op: &mut Operation, mut sink: impl FnMut(T)) -> usize {
        for n in 0..self.quota {
            *op = Operation::Take;
            let item = self.shared.buffer.take();
            *op = Operation::Record;
            self.shared.tally.record_consumed();
            trace!(
                consumer = self.id,
                n,
                len = self.shared.buffer.len(),
                capacity = self.shared.buffer.capacity(),
                "consumed"
            );
            *op = Operation::Handle;
            sink(item);
            *op = Operation::Pause;
            self.pacing.pause();
        }
        *op = Operation::Idle;
        info!(consumer = self.id, items = self.quota, "consumer finished");
        self.quota
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::thread;

    fn counting_source() -> ItemSource<(usize, u64)> {
        Arc::new(|producer, seq| (producer, seq))
    }

    #[test]
    fn producer_then_consumer() {
        let shared = Arc::new(Shared::new(4));
        let produced = Producer::new(0, 4, shared.clone(), counting_source(), Pacing::NONE).run();
        assert_eq!(produced, 4);
        assert_eq!(shared.buffer.len(), 4);

        let mut seen = Vec::new();
        let consumed = Consumer::new(0, 4, shared.clone(), Pacing::NONE).run_with(|item| seen.push(item));
        assert_eq!(consumed, 4);
        assert_eq!(seen, vec![(0, 0), (0, 1), (0, 2), (0, 3)]);
        assert_eq!(shared.tally.produced(), 4);
        assert_eq!(shared.tally.consumed(), 4);
        assert!(shared.buffer.is_empty());
    }

    #[test]
    fn zero_quota_does_nothing() {
        let shared = Arc::new(Shared::<(usize, u64)>::new(1));
        assert_eq!(Producer::new(0, 0, shared.clone(), counting_source(), Pacing::NONE).run(), 0);
        assert_eq!(Consumer::new(0, 0, shared.clone(), Pacing::NONE).run(), 0);
        assert_eq!(shared.tally.produced(), 0);
    }

    #[test]
    fn tracked_operation_points_at_failure() {
        let shared = Arc::new(Shared::new(2));
        let source: ItemSource<u64> = Arc::new(|_, seq| if seq == 1 { panic!("bad item") } else { seq });
        let producer = Producer::new(3, 5, shared.clone(), source, Pacing::NONE);

        let mut op = Operation::Idle;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| producer.run_tracked(&mut op)));
        assert!(result.is_err());
        assert_eq!(op, Operation::Produce);
        assert_eq!(shared.tally.produced(), 1);
        assert_eq!(shared.buffer.len(), 1);
    }

    #[test]
    fn threaded_totals_match() {
        let shared = Arc::new(Shared::new(2));
        let producers: Vec<_> = (0..3)
            .map(|id| {
                let p = Producer::new(id, 50, shared.clone(), counting_source(), Pacing::NONE);
                thread::spawn(move || p.run())
            })
            .collect();
        let consumer = Consumer::new(0, 150, shared.clone(), Pacing::NONE);
        assert_eq!(consumer.run(), 150);
        for p in producers {
            assert_eq!(p.join().unwrap(), 50);
        }
        assert_eq!(shared.tally.produced(), 150);
        assert_eq!(shared.tally.consumed(), 150);
        assert!(shared.buffer.peak() <= 2);
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn trace_events_carry_occupancy() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let shared = Arc::new(Shared::new(3));
            Producer::new(0, 2, shared.clone(), counting_source(), Pacing::NONE).run();
            Consumer::new(1, 2, shared, Pacing::NONE).run();
        });

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        let produced: Vec<_> = output.lines().filter(|l| l.contains("produced")).collect();
        assert!(produced[0].contains("len=1") && produced[0].contains("capacity=3"), "{output}");
        assert!(produced[1].contains("len=2"), "{output}");
        let consumed: Vec<_> = output.lines().filter(|l| l.contains(" consumed")).collect();
        assert!(consumed[0].contains("consumer=1") && consumed[0].contains("len=1"), "{output}");
        assert!(consumed[1].contains("len=0"), "{output}");
    }

    #[test]
    fn random_items_in_range() {
        for seq in 0..200 {
            let item = random_item(1, seq);
            assert!((1..=100).contains(&item.value));
            assert_eq!((item.producer, item.seq), (1, seq));
        }
    }
}
