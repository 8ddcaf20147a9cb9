//! Bounded handoff queue between the sensor poller and the consumer loop
//!
//! A thread-safe FIFO with a blocking `push` (backpressure on the producer)
//! and a timed `pop` (the consumer never parks forever). Internally one
//! mutex guards the deque and two condvars signal "not full" / "not empty";
//! no lock is ever held across a sleep.
//!
//! `close` is the shutdown escape: without it a pusher blocked on a full
//! buffer with no consumer draining would deadlock shutdown under sustained
//! overload. A closed buffer rejects new pushes and wakes every blocked
//! pusher, while pops keep draining whatever is left.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Rejected push, handing the item back to the caller.
#[derive(Debug, thiserror::Error)]
pub enum PushError<T> {
    #[error("buffer is closed")]
    Closed(T),
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct BoundedBuffer<T> {
    state: Mutex<State<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an item, blocking the calling thread while the buffer is full.
    ///
    /// Returns `Err(PushError::Closed(item))` if the buffer is (or becomes)
    /// closed, so shutdown can always make progress past a full buffer.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        while state.items.len() >= self.capacity && !state.closed {
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }

        if state.closed {
            return Err(PushError::Closed(item));
        }

        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove and return the head item, waiting up to `timeout` for one to
    /// arrive. Returns `None` on timeout (nothing mutated) or when the
    /// buffer is closed and drained.
    pub fn pop(&self, timeout: Duration) -> Option<T> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let deadline = std::time::Instant::now() + timeout;
        while state.items.is_empty() {
            if state.closed {
                return None;
            }
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (next, result) = self
                .not_empty
                .wait_timeout(state, remaining)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            state = next;
            if result.timed_out() && state.items.is_empty() {
                return None;
            }
        }

        let item = state.items.pop_front();
        drop(state);
        self.not_full.notify_one();
        item
    }

    /// Point-in-time length; not synchronized with subsequent operations.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .items
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomically empty the buffer and wake all blocked pushers, which
    /// recheck capacity and may proceed or re-block.
    pub fn clear(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.items.clear();
        drop(state);
        self.not_full.notify_all();
    }

    /// Stop accepting pushes and wake every waiter. Remaining items stay
    /// poppable; an empty closed buffer pops `None` immediately.
    pub fn close(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.closed = true;
        drop(state);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }
}
