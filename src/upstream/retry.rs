//! Retry policy and backoff loop for upstream calls.
//!
//! Every failed attempt that is classified as transient (non-2xx response,
//! transport failure, attempt timeout) is retried after an exponentially
//! growing delay, capped at the policy ceiling, until the attempt budget is
//! spent.

use crate::defaults;
use crate::error::{RelayError, Result};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

/// Bounded exponential backoff.
///
/// The delay after failed attempt `n` (1-based) is
/// `min(initial_delay × 2^(n-1), max_delay)`.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tokenrelay::upstream::RetryPolicy;
///
/// let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(5));
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
/// assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            defaults::MAX_ATTEMPTS,
            Duration::from_millis(defaults::INITIAL_RETRY_DELAY_MS),
            Duration::from_millis(defaults::MAX_RETRY_DELAY_MS),
        )
    }
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
        }
    }

    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Total number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = defaults::BACKOFF_MULTIPLIER.saturating_pow(exponent);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Whether a failed attempt may be retried.
pub fn is_retryable(error: &RelayError) -> bool {
    matches!(
        error,
        RelayError::Upstream { .. } | RelayError::Timeout { .. } | RelayError::Transport { .. }
    )
}

/// Receives retry events. Used for logging; must not influence the outcome.
pub trait RetryObserver: Send + Sync {
    /// Attempt `attempt` failed and another one follows after `delay`.
    fn on_retry(&self, attempt: u32, delay: Duration, error: &RelayError);

    /// The call failed for good after `attempts` attempts.
    fn on_give_up(&self, attempts: u32, error: &RelayError);
}

/// Observer that writes retry events to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl RetryObserver for LogObserver {
    fn on_retry(&self, attempt: u32, delay: Duration, error: &RelayError) {
        tracing::warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Upstream attempt failed, retrying"
        );
    }

    fn on_give_up(&self, attempts: u32, error: &RelayError) {
        tracing::error!(attempts, error = %error, "Upstream call failed");
    }
}

/// Observer that records retry events, for tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    retries: Mutex<Vec<(u32, Duration)>>,
    gave_up_after: Mutex<Option<u32>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(attempt, delay)` for every retry so far.
    pub fn retries(&self) -> Vec<(u32, Duration)> {
        self.retries.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Delays waited between attempts, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.retries().into_iter().map(|(_, delay)| delay).collect()
    }

    /// Number of attempts made before giving up, if the call failed.
    pub fn gave_up_after(&self) -> Option<u32> {
        self.gave_up_after.lock().ok().and_then(|g| *g)
    }
}

impl RetryObserver for RecordingObserver {
    fn on_retry(&self, attempt: u32, delay: Duration, _error: &RelayError) {
        if let Ok(mut retries) = self.retries.lock() {
            retries.push((attempt, delay));
        }
    }

    fn on_give_up(&self, attempts: u32, _error: &RelayError) {
        if let Ok(mut gave_up) = self.gave_up_after.lock() {
            *gave_up = Some(attempts);
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempt budget is spent.
///
/// `operation` receives the 1-based attempt number. On exhaustion the error
/// of the last attempt is returned unchanged.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    observer: &dyn RetryObserver,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if is_retryable(&error) && attempt < policy.max_attempts() => {
                let delay = policy.delay_for_attempt(attempt);
                observer.on_retry(attempt, delay, &error);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                observer.on_give_up(attempt, &error);
                return Err(error);
            }
        }
    }
}
