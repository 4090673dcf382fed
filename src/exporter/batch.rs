//! Pending batch shared between `add_to_batch` and `flush`.
//!
//! Every access goes through a mutex. `take` swaps the pending items for an
//! empty buffer and returns the old ones, so a concurrent add either lands in
//! the batch being taken or in the fresh one, never in neither.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct Batch<T> {
    pending: Mutex<T>,
}

impl<T: Default> Batch<T> {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(T::default()),
        }
    }

    /// Run `f` with exclusive access to the pending batch.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }

    /// Swap the pending batch for an empty one, returning the old batch.
    pub fn take(&self) -> T {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        // A panic mid-update leaves at worst a partially built batch behind
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Default> Default for Batch<T> {
    fn default() -> Self {
        Self::new()
    }
}
