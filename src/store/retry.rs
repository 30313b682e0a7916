//! Bounded exponential backoff for transient provider errors.
//! Only `StoreError::Transient` is retried; anything else is returned as-is.

use std::time::Duration;
use tracing::{debug, warn};

use super::StoreError;
use crate::shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// No waiting between attempts (tests).
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Delay after failed attempt number `attempt` (0-based): base * 2^attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }

    /// Run `f`, retrying transient failures. Exhaustion yields `StoreError::Exhausted`.
    pub fn run<T>(
        &self,
        op: &str,
        mut f: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut attempt: u32 = 0;
        loop {
            match f() {
                Ok(v) => {
                    if attempt > 0 {
                        debug!(op, attempts = attempt + 1, "request succeeded after retry");
                    }
                    return Ok(v);
                }
                Err(StoreError::Transient(message)) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || shutdown::is_requested() {
                        return Err(StoreError::Exhausted {
                            op: op.to_string(),
                            attempts: attempt,
                            message,
                        });
                    }
                    let wait = self.delay_for(attempt - 1);
                    warn!(op, attempt, wait_ms = wait.as_millis() as u64, error = %message, "transient provider error; backing off");
                    if !wait.is_zero() {
                        std::thread::sleep(wait);
                    }
                }
                Err(other) => return Err(other),
            }
        }
    }
}
