//! Run configuration and its validation.

use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::error::ConfigError;

/// Bounds of the simulated work delay taken after every put or take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Shortest pause.
    pub min: Duration,
    /// Longest pause.
    pub max: Duration,
}

impl Pacing {
    /// No pause at all.
    pub const NONE: Pacing = Pacing { min: Duration::ZERO, max: Duration::ZERO };

    /// Pauses uniformly distributed in `min..=max`.
    pub const fn new(min: Duration, max: Duration) -> Self {
        Pacing { min, max }
    }

    /// Picks a pause length from the range.
    pub fn sample(&self) -> Duration {
        if self.max.is_zero() || self.min >= self.max {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }

    /// Sleeps the current thread for a sampled pause.
    pub fn pause(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing::new(Duration::from_millis(100), Duration::from_millis(500))
    }
}

/// Shape of a producer-consumer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Buffer capacity; must be positive.
    pub capacity: usize,
    /// Number of producer tasks.
    pub producers: usize,
    /// Number of consumer tasks.
    pub consumers: usize,
    /// Items every producer puts.
    pub items_per_producer: usize,
    /// Items every consumer takes. `None` spreads the total supply across
    /// consumers as evenly as possible.
    pub items_per_consumer: Option<usize>,
    /// Simulated work delay after each operation.
    pub pacing: Pacing,
}

impl Config {
    /// A configuration with no simulated delay and balanced consumer quotas.
    pub fn new(capacity: usize, producers: usize, consumers: usize, items_per_producer: usize) -> Self {
        Config {
            capacity,
            producers,
            consumers,
            items_per_producer,
            items_per_consumer: None,
            pacing: Pacing::NONE,
        }
    }

    /// Sets a fixed quota for every consumer.
    pub fn with_items_per_consumer(mut self, items: usize) -> Self {
        self.items_per_consumer = Some(items);
        self
    }

    /// Sets the simulated work delay.
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Total number of items the producers put, and the consumers must take.
    pub fn expected_total(&self) -> usize {
        self.producers.saturating_mul(self.items_per_producer)
    }

    /// Number of items consumer `id` takes.
    ///
    /// With balanced quotas the first `total % consumers` consumers take one
    /// extra item.
    pub fn consumer_quota(&self, id: usize) -> usize {
        if let Some(items) = self.items_per_consumer {
            return items;
        }
        if self.consumers == 0 {
            return 0;
        }
        let total = self.expected_total();
        let base = total / self.consumers;
        base + usize::from(id < total % self.consumers)
    }

    /// Rejects configurations whose run could not end with matching totals.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.pacing.min > self.pacing.max {
            return Err(ConfigError::InvertedDelay { min: self.pacing.min, max: self.pacing.max });
        }

        let supply = self
            .producers
            .checked_mul(self.items_per_producer)
            .ok_or(ConfigError::TooManyItems { tasks: self.producers, items: self.items_per_producer })?;
        let demand = match self.items_per_consumer {
            Some(items) => self
                .consumers
                .checked_mul(items)
                .ok_or(ConfigError::TooManyItems { tasks: self.consumers, items })?,
            None if self.consumers == 0 => 0,
            // Without producers there is nothing to balance; every consumer
            // would wait for `items_per_producer` items that never arrive.
            None if self.producers == 0 => self
                .consumers
                .checked_mul(self.items_per_producer)
                .ok_or(ConfigError::TooManyItems { tasks: self.consumers, items: self.items_per_producer })?,
            None => supply,
        };

        if supply > 0 && self.consumers == 0 {
            return Err(ConfigError::NoConsumers { supply });
        }
        if demand > 0 && self.producers == 0 {
            return Err(ConfigError::NoProducers { demand });
        }
        if supply != demand {
            return Err(ConfigError::Asymmetric { supply, demand });
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            capacity: 10,
            producers: 2,
            consumers: 2,
            items_per_producer: 10,
            items_per_consumer: None,
            pacing: Pacing::default(),
        }
    }
}
