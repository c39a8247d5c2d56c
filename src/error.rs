// Variants and fields are described by their `#[error]` messages.
#![allow(missing_docs)]

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::worker::{Operation, Role};

/// Result alias for coordinator runs.
pub type Result<T> = std::result::Result<T, Error>;

/// A configuration that cannot run to a consistent finish.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("buffer capacity must be greater than 0")]
    ZeroCapacity,

    #[error("minimum delay {min:?} exceeds maximum delay {max:?}")]
    InvertedDelay { min: Duration, max: Duration },

    #[error("{tasks} tasks x {items} items overflows the item count")]
    TooManyItems { tasks: usize, items: usize },

    #[error("producers would supply {supply} items but there are no consumers")]
    NoConsumers { supply: usize },

    #[error("consumers expect {demand} items but there are no producers")]
    NoProducers { demand: usize },

    #[error("producers supply {supply} items but consumers expect {demand}")]
    Asymmetric { supply: usize, demand: usize },
}

/// Errors that end a coordinator run early.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{role} {id} failed during {operation}: {message}")]
    TaskFailed { role: Role, id: usize, operation: Operation, message: String },

    #[error("{missing} task(s) exited without reporting completion")]
    TasksLost { missing: usize },

    #[error("failed to spawn {role} {id}: {source}")]
    Spawn {
        role: Role,
        id: usize,
        #[source]
        source: io::Error,
    },

    #[error("run interrupted by operator")]
    Interrupted,
}
