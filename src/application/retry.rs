use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::AppError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 32;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(2);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(100);

/// Outcome of one optimistic attempt at an operation.
pub(crate) enum Attempt<T> {
    Committed(T),
    /// Another writer got there first; re-read and try again.
    Conflict,
}

/// Bounded retry with capped, jittered exponential backoff for
/// compare-and-set conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay.max(base_delay);
        self
    }

    /// Upper bound of the pause after the given failed attempt (1-based).
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Pause drawn uniformly from [0, ceiling] so colliding writers spread out.
    fn backoff(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        if ceiling.is_zero() {
            return ceiling;
        }
        let micros = rand::thread_rng().gen_range(0..=ceiling.as_micros() as u64);
        Duration::from_micros(micros)
    }

    /// Run `attempt` until it commits, fails, or the attempt budget runs out.
    pub(crate) async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt: F,
    ) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Attempt<T>, AppError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        for n in 1..=max_attempts {
            match attempt().await? {
                Attempt::Committed(value) => {
                    if n > 1 {
                        tracing::debug!(operation, attempts = n, "committed after retry");
                    }
                    return Ok(value);
                }
                Attempt::Conflict if n < max_attempts => {
                    tokio::time::sleep(self.backoff(n)).await;
                }
                Attempt::Conflict => {}
            }
        }

        tracing::warn!(operation, attempts = max_attempts, "retry budget exhausted");
        Err(AppError::Busy {
            operation,
            attempts: max_attempts,
        })
    }
}
