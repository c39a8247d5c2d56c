//! Spawns the tasks of a run, waits for them and checks the totals.
//!
//! A run walks `Idle → Spawning → Running → Draining → Done`. Every task runs
//! on its own thread and reports exactly once over a channel: either its
//! item count or the panic that stopped it, together with the operation it
//! was in. The wait ends with the first failure, so a failed producer cannot
//! leave the coordinator waiting on consumers that will never be fed.
//!
//! Tasks blocked in [`put`](crate::BoundedBuffer::put) or
//! [`take`](crate::BoundedBuffer::take) cannot be cancelled. When a run ends
//! early (failure or interrupt) those threads are detached and stay blocked
//! until the process exits. The same holds when spawning fails part way:
//! the tasks already started keep running detached, and the spawn error is
//! logged with how many of them there are.

use core::fmt;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{ConfigError, Error, Result};
use crate::worker::{random_item, Consumer, Item, ItemSource, Operation, Producer, Role, Shared};

/// Where a coordinator is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Not started.
    Idle,
    /// Launching tasks.
    Spawning,
    /// Waiting for every task to report.
    Running,
    /// All tasks reported; collecting totals.
    Draining,
    /// Report produced.
    Done,
}

/// What one task reported on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSummary {
    /// Producer or consumer.
    pub role: Role,
    /// Index among tasks of the same role.
    pub id: usize,
    /// Items put or taken.
    pub items: usize,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Configuration the run used.
    pub config: Config,
    /// Items put, as counted by the tally.
    pub produced: usize,
    /// Items taken, as counted by the tally.
    pub consumed: usize,
    /// `producers * items_per_producer`.
    pub expected: usize,
    /// Items left in the buffer.
    pub remaining: usize,
    /// Highest buffer occupancy seen.
    pub peak: usize,
    /// Wall time from the first spawn to the last report.
    pub elapsed: Duration,
    /// Per-task summaries in completion order.
    pub tasks: Vec<TaskSummary>,
}

impl Report {
    /// Whether both totals equal the expected count.
    pub fn is_consistent(&self) -> bool {
        self.produced == self.expected && self.consumed == self.expected
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "total produced:      {}", self.produced)?;
        writeln!(f, "total consumed:      {}", self.consumed)?;
        writeln!(f, "remaining in buffer: {}", self.remaining)?;
        writeln!(f, "peak occupancy:      {}/{}", self.peak, self.config.capacity)?;
        write!(f, "elapsed:             {:.2}s", self.elapsed.as_secs_f64())
    }
}

enum Event {
    Finished(TaskSummary),
    Failed(Error),
}

/// Runs producers and consumers against a fresh buffer per run.
pub struct Coordinator<T = Item> {
    config: Config,
    source: ItemSource<T>,
    interrupt: Option<Receiver<()>>,
    phase: Phase,
}

impl Coordinator<Item> {
    /// Coordinator producing [`random_item`]s.
    pub fn new(config: Config) -> std::result::Result<Self, ConfigError> {
        Self::with_source(config, Arc::new(random_item))
    }
}

impl<T: Send + 'static> Coordinator<T> {
    /// Coordinator whose producers make items with `source`.
    pub fn with_source(config: Config, source: ItemSource<T>) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Coordinator { config, source, interrupt: None, phase: Phase::Idle })
    }

    /// Ends the wait with [`Error::Interrupted`] when a message arrives on `interrupt`.
    pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// The configuration runs use.
    pub fn config(&self) -> &Config { &self.config }

    /// Current phase.
    pub fn phase(&self) -> Phase { self.phase }

    /// Runs every task to completion against a fresh buffer and tally.
    ///
    /// Returns early with the first task failure, or on interrupt.
    pub fn run(&mut self) -> Result<Report> {
        self.enter(Phase::Spawning);
        let config = &self.config;
        let shared = Arc::new(Shared::new(config.capacity));
        let (events_tx, events_rx) = unbounded();
        let started = Instant::now();

        let mut handles = Vec::with_capacity(config.producers + config.consumers);
        for id in 0..config.producers {
            let producer = Producer::new(
                id,
                config.items_per_producer,
                shared.clone(),
                self.source.clone(),
                config.pacing,
            );
            let handle = spawn_task(Role::Producer, id, events_tx.clone(), move |op| producer.run_tracked(op))
                .map_err(spawn_failed(handles.len()))?;
            handles.push(handle);
        }
        for id in 0..config.consumers {
            let consumer = Consumer::new(id, config.consumer_quota(id), shared.clone(), config.pacing);
            let handle = spawn_task(Role::Consumer, id, events_tx.clone(), move |op| consumer.run_tracked(op, drop))
                .map_err(spawn_failed(handles.len()))?;
            handles.push(handle);
        }
        drop(events_tx);
        info!(producers = config.producers, consumers = config.consumers, "all tasks spawned");

        self.enter(Phase::Running);
        let tasks = self.wait(&events_rx, handles.len())?;

        self.enter(Phase::Draining);
        for handle in handles {
            // Every task already reported, so these joins return immediately.
            let _ = handle.join();
        }
        let report = Report {
            config: self.config.clone(),
            produced: shared.tally.produced(),
            consumed: shared.tally.consumed(),
            expected: self.config.expected_total(),
            remaining: shared.buffer.len(),
            peak: shared.buffer.peak(),
            elapsed: started.elapsed(),
            tasks,
        };
        if !report.is_consistent() {
            warn!(
                expected = report.expected,
                produced = report.produced,
                consumed = report.consumed,
                "totals do not match the expected count"
            );
        }

        self.enter(Phase::Done);
        Ok(report)
    }

    fn wait(&self, events: &Receiver<Event>, tasks: usize) -> Result<Vec<TaskSummary>> {
        let never = crossbeam_channel::never();
        let mut interruptible = self.interrupt.is_some();
        let mut finished = Vec::with_capacity(tasks);

        while finished.len() < tasks {
            let interrupt = match &self.interrupt {
                Some(rx) if interruptible => rx,
                _ => &never,
            };
            select! {
                recv(events) -> event => match event {
                    Ok(Event::Finished(summary)) => {
                        debug!(role = %summary.role, id = summary.id, items = summary.items, "task reported");
                        finished.push(summary);
                    }
                    Ok(Event::Failed(err)) => {
                        error!(error = %err, "task failed");
                        return Err(err);
                    }
                    Err(_) => return Err(Error::TasksLost { missing: tasks - finished.len() }),
                },
                recv(interrupt) -> signal => match signal {
                    Ok(()) => {
                        warn!(pending = tasks - finished.len(), "interrupted while tasks were running");
                        return Err(Error::Interrupted);
                    }
                    // Nobody can interrupt any more.
                    Err(_) => interruptible = false,
                },
            }
        }
        Ok(finished)
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
    }
}

impl<T> fmt::Debug for Coordinator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

fn spawn_task<F>(role: Role, id: usize, events: Sender<Event>, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce(&mut Operation) -> usize + Send + 'static,
{
    thread::Builder::new()
        .name(format!("{role}-{id}"))
        .spawn(move || {
            let mut op = Operation::Idle;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut op)));
            let event = match outcome {
                Ok(items) => Event::Finished(TaskSummary { role, id, items }),
                Err(payload) => Event::Failed(Error::TaskFailed {
                    role,
                    id,
                    operation: op,
                    message: panic_message(payload.as_ref()),
                }),
            };
            // The coordinator may have stopped listening after another failure.
            let _ = events.send(event);
        })
        .map_err(|source| Error::Spawn { role, id, source })
}

fn spawn_failed(running: usize) -> impl FnOnce(Error) -> Error {
    move |err| {
        error!(error = %err, running, "spawn failed; tasks already started are left detached");
        err
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
