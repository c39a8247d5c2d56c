//! Counting semaphore.
//!
//! A [`Semaphore`] holds a number of permits. [`Semaphore::acquire`] blocks
//! until a permit is available and takes it; [`Semaphore::release`] adds one
//! back and wakes a single waiter. The count lives behind a mutex and waiters
//! park on a condition variable, so a waiter never spins and a release is
//! never lost between the check and the park.
//!
//! Acquiring returns a [`Permit`]. Dropping the permit hands it back to the
//! semaphore it came from, which keeps the count correct when the holder
//! unwinds. A holder that passes the permit on somewhere else (the bounded
//! buffer turns a free-slot permit into an available-item permit) calls
//! [`Permit::forget`] instead.

use core::fmt;

use crate::sync::{lock, wait, Condvar, Mutex};

/// Counting semaphore built from a mutex-protected count and a condition variable.
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Creates a semaphore holding `permits` permits.
    pub fn new(permits: usize) -> Self {
        Semaphore {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Blocks until a permit is available, then takes it.
    pub fn acquire(&self) -> Permit<'_> {
        let mut permits = lock(&self.permits);
        while *permits == 0 {
            permits = wait(&self.available, permits);
        }
        *permits -= 1;
        Permit { semaphore: self }
    }

    /// Takes a permit if one is available right now.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut permits = lock(&self.permits);
        if *permits == 0 {
            return None;
        }
        *permits -= 1;
        Some(Permit { semaphore: self })
    }

    /// Adds one permit and wakes one waiter, if any.
    ///
    /// # Panics
    ///
    /// Panics if the count would overflow `usize`. That can only happen when
    /// permits are released that were never acquired.
    pub fn release(&self) {
        {
            let mut permits = lock(&self.permits);
            *permits = match permits.checked_add(1) {
                Some(n) => n,
                None => panic!("semaphore permit count overflow"),
            };
        }
        self.available.notify_one();
    }

    /// Number of permits available at the moment of the call.
    pub fn available(&self) -> usize {
        *lock(&self.permits)
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore").field("permits", &self.available()).finish()
    }
}

/// A permit taken from a [`Semaphore`]; returned to it on drop.
#[must_use = "dropping a permit immediately returns it to the semaphore"]
pub struct Permit<'a> {
    semaphore: &'a Semaphore,
}

impl Permit<'_> {
    /// Consumes the permit without returning it to its semaphore.
    pub fn forget(self) {
        core::mem::forget(self);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

impl fmt::Debug for Permit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit").finish_non_exhaustive()
    }
}
