//! semqueue - bounded producer-consumer buffer built on two counting semaphores and a mutex
//!
//! A [`BoundedBuffer`] counts free slots and filled slots with two
//! [`Semaphore`]s and guards its FIFO with a mutex. Producers wait on the
//! free-slot count before locking, consumers on the filled-slot count, so no
//! task ever blocks while holding the lock. [`Coordinator`] runs a configured
//! number of [`Producer`]s and [`Consumer`]s on their own threads and checks
//! that everything produced was consumed.
//!
//! ```
//! use semqueue::{Config, Coordinator};
//!
//! let mut coordinator = Coordinator::new(Config::new(4, 2, 2, 10)).unwrap();
//! let report = coordinator.run().unwrap();
//! assert!(report.is_consistent());
//! assert_eq!(report.produced, 20);
//! ```
#![warn(missing_docs)]

mod buffer;
mod config;
mod coordinator;
mod error;
mod semaphore;
mod sync;
mod worker;

pub use buffer::{BoundedBuffer, TryPutError, TryTakeError};
pub use config::{Config, Pacing};
pub use coordinator::{Coordinator, Phase, Report, TaskSummary};
pub use error::{ConfigError, Error, Result};
pub use semaphore::{Permit, Semaphore};
pub use worker::{random_item, Consumer, Item, ItemSource, Operation, Producer, Role, Shared, Tally};
