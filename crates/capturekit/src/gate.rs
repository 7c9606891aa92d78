// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Open/close exclusion.
//!
//! A binary semaphore serialising device open and close. It is acquired on
//! the caller's thread and released on the worker thread once the open
//! outcome is known, so it cannot be a mutex guard.

use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

#[derive(Debug, Default)]
pub(crate) struct OpenCloseGate {
    held: Mutex<bool>,
    changed: Condvar,
}

impl OpenCloseGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Acquire within `timeout`; false when the gate stayed held.
    pub(crate) fn try_acquire_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut held = self.lock();
        while *held {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            held = self
                .changed
                .wait_timeout(held, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|err| err.into_inner().0);
        }
        *held = true;
        true
    }

    /// Acquire, waiting as long as needed
    pub(crate) fn acquire(&self) {
        let mut held = self.lock();
        while *held {
            held = self
                .changed
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *held = true;
    }

    /// Release from any thread. Releasing a free gate is a no-op.
    pub(crate) fn release(&self) {
        let mut held = self.lock();
        if *held {
            *held = false;
            self.changed.notify_one();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_held(&self) -> bool {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn test_acquire_release() {
        let gate = OpenCloseGate::new();
        assert!(gate.try_acquire_for(Duration::from_millis(10)));
        assert!(gate.is_held());
        gate.release();
        assert!(!gate.is_held());
        gate.release();
        assert!(!gate.is_held());
    }

    #[test]
    fn test_times_out_when_held() {
        let gate = OpenCloseGate::new();
        gate.acquire();
        let start = Instant::now();
        assert!(!gate.try_acquire_for(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_release_from_other_thread() {
        let gate = Arc::new(OpenCloseGate::new());
        gate.acquire();

        let remote = Arc::clone(&gate);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.release();
        });

        assert!(gate.try_acquire_for(Duration::from_secs(5)));
        handle.join().unwrap();
    }
}
