//! Countdown completion barrier.
//!
//! A [`CounterBlocker`] holds the number of outstanding subtasks of one wait
//! episode. Workers call [`decrement_and_notify`](CounterBlocker::decrement_and_notify)
//! when their subtask finishes; the dispatching thread calls
//! [`wait_until_zero`](CounterBlocker::wait_until_zero). The count lives
//! under the same mutex the condition variable waits on, so a decrement can
//! never slip between a waiter's check and its sleep.
//!
//! ## Invariants
//! * `remaining` only decreases and never goes below zero.
//! * The transition to zero happens exactly once and wakes every waiter;
//!   waiters arriving later see zero and return without sleeping.

use parking_lot::{Condvar, Mutex};


/// Mutex + condvar countdown latch, scoped to one wait episode.
#[derive(Debug)]
pub struct CounterBlocker {
    remaining: Mutex<usize>,
    condvar: Condvar,
}

impl CounterBlocker {
    /// Creates a blocker expecting `remaining` decrements.
    pub fn new(remaining: usize) -> Self {
        Self { remaining: Mutex::new(remaining), condvar: Condvar::new() }
    }

    /// Current count.
    pub fn remaining(&self) -> usize {
        *self.remaining.lock()
    }

    /// Decrements the count and wakes all waiters if it reached zero.
    ///
    /// Decrementing a blocker that is already at zero is a programming
    /// error: it asserts in debug builds and is ignored in release builds.
    pub fn decrement_and_notify(&self) {
        let mut remaining = self.remaining.lock();
        debug_assert!(*remaining > 0, "counter blocker decremented below zero");
        if *remaining == 0 {
            return;
        }
        *remaining -= 1;
        if *remaining == 0 {
            self.condvar.notify_all();
        }
    }

    /// Blocks until the count is zero. Returns immediately if it already is.
    pub fn wait_until_zero(&self) {
        let mut remaining = self.remaining.lock();
        while *remaining != 0 {
            self.condvar.wait(&mut remaining);
        }
    }

    /// Guard that decrements when dropped, including during unwinding.
    pub fn decrement_on_drop(&self) -> DecrementGuard<'_> {
        DecrementGuard { blocker: self }
    }
}

/// Decrements its blocker on drop.
#[must_use = "the blocker is decremented as soon as the guard is dropped"]
pub struct DecrementGuard<'a> {
    blocker: &'a CounterBlocker,
}

impl Drop for DecrementGuard<'_> {
    fn drop(&mut self) {
        self.blocker.decrement_and_notify();
    }
}

/// Runs `f`, then blocks until `blocker` reaches zero.
pub fn execute_and_wait_until_zero<R>(blocker: &CounterBlocker, f: impl FnOnce() -> R) -> R {
    let result = f();
    blocker.wait_until_zero();
    result
}
