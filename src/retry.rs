//! Capped, jittered exponential backoff for delivery retries
//!
//! The policy is purely functional: `delay_for` maps an attempt number to a
//! delay, and `execute_with_retry` owns the attempt counter for exactly one
//! invocation. Jitter desynchronizes concurrent retriers so a broker outage
//! does not end in a synchronized retry storm.
//!
//! The outcome type keeps the three terminal states explicit without using
//! errors for control flow: an operation that keeps *returning* `false` is a
//! recoverable failure and ends in [`RetryOutcome::Exhausted`]; an operation
//! that *errors* on the final attempt ends in [`RetryOutcome::Failed`]
//! (errors on earlier attempts are swallowed and retried).

use std::time::Duration;

use rand::Rng;
use tracing::trace;

/// Result of one `execute_with_retry` invocation.
#[derive(Debug)]
pub enum RetryOutcome<E> {
    /// The operation returned `Ok(true)` on some attempt.
    Succeeded,
    /// Every attempt returned `Ok(false)`; gave up cleanly.
    Exhausted,
    /// The final attempt returned an error.
    Failed(E),
}

impl<E> RetryOutcome<E> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded)
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retrying after `attempt` (0-based):
    /// `min(initial * 2^attempt, max) * uniform(0.75, 1.25)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self
            .initial_delay
            .as_millis()
            .saturating_mul(1u128 << attempt.min(63));
        let capped_ms = base_ms.min(self.max_delay.as_millis()) as u64;

        let jitter: f64 = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_millis((capped_ms as f64 * jitter) as u64)
    }

    /// Run `op` up to `max_attempts` times, sleeping `delay_for(attempt)`
    /// between attempts. See the module docs for the success/error
    /// asymmetry this preserves.
    pub fn execute_with_retry<E, F>(&self, mut op: F) -> RetryOutcome<E>
    where
        F: FnMut() -> Result<bool, E>,
    {
        for attempt in 0..self.max_attempts {
            match op() {
                Ok(true) => return RetryOutcome::Succeeded,
                Ok(false) => {}
                Err(e) => {
                    if attempt + 1 == self.max_attempts {
                        return RetryOutcome::Failed(e);
                    }
                    // Recoverable until the last attempt.
                }
            }

            if attempt + 1 < self.max_attempts {
                let delay = self.delay_for(attempt);
                trace!(attempt, ?delay, "retrying after delay");
                std::thread::sleep(delay);
            }
        }

        RetryOutcome::Exhausted
    }
}
