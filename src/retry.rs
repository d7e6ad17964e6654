//! Bounded retry with exponential backoff and jitter
//!
//! Only `SourceError::is_transient` failures are retried. The deadline is
//! checked before every retry: an attempt already in flight finishes, but no
//! new attempt starts once it has passed.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::SourceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryError {
    Source(SourceError),
    /// The deadline passed before a retry could start; carries the last failure
    DeadlineExceeded(Option<SourceError>),
}

/// Result of a retried operation plus how many attempts it took
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, RetryError>,
    pub attempts: u32,
}

impl RetryPolicy {
    /// Single attempt, never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`, without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.base_backoff.saturating_mul(1u32 << exp);
        delay.min(self.max_backoff)
    }

    /// Base delay plus uniform jitter in `[0, delay / 2]`
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);
        let half = (delay.as_millis() / 2) as u64;
        let jitter = if half == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=half)
        };
        delay + Duration::from_millis(jitter)
    }

    pub async fn run<T, F, Fut>(&self, deadline: Option<Instant>, mut op: F) -> Attempted<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if attempt > 0 && deadline.is_some_and(|d| Instant::now() >= d) {
                return Attempted {
                    result: Err(RetryError::DeadlineExceeded(None)),
                    attempts: attempt,
                };
            }

            attempt += 1;
            match op(attempt).await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.delay_with_jitter(attempt);
                    tracing::debug!(attempt, ?delay, error = %err, "Transient failure, backing off");

                    if let Some(deadline) = deadline {
                        if Instant::now() + delay >= deadline {
                            tokio::time::sleep_until(deadline).await;
                            return Attempted {
                                result: Err(RetryError::DeadlineExceeded(Some(err))),
                                attempts: attempt,
                            };
                        }
                    }
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    return Attempted {
                        result: Err(RetryError::Source(err)),
                        attempts: attempt,
                    }
                }
            }
        }
    }
}
