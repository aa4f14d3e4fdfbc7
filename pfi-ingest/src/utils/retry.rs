//! Retry policy and cancellable backoff
//!
//! Exponential backoff for transient parse-endpoint failures.
//!
//! **Backoff Strategy:**
//! - Attempts: 3 total
//! - First wait: 1s
//! - Multiplier: 2.0 (exponential: 1s, 2s, 4s)

use crate::error::{ImportError, ImportResult};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Total attempts per parse request
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Wait before the second attempt
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Growth factor between consecutive waits
pub const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Wait after the first failed attempt
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            multiplier: BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Policy with a custom first wait, keeping attempts and multiplier
    pub fn with_initial_backoff(initial_backoff: Duration) -> Self {
        Self {
            initial_backoff,
            ..Self::default()
        }
    }

    /// Wait after the failed attempt with 0-based index `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .mul_f64(self.multiplier.powi(attempt as i32))
    }

    /// Whether another attempt is allowed after the 0-based `attempt` failed
    pub fn has_attempts_after(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

/// Sleep for `duration` unless `cancel_token` fires first.
///
/// Returns `ImportError::Cancelled` on cancellation so callers can
/// propagate it with `?` and never count it as an ordinary failure.
pub async fn sleep_or_cancel(
    duration: Duration,
    cancel_token: &CancellationToken,
) -> ImportResult<()> {
    tokio::select! {
        biased;
        _ = cancel_token.cancelled() => Err(ImportError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Await `operation` unless `cancel_token` fires first.
///
/// The operation future is dropped on cancellation, which aborts any
/// in-flight request or child process it owns.
pub async fn or_cancel<F, T>(operation: F, cancel_token: &CancellationToken) -> ImportResult<T>
where
    F: std::future::Future<Output = ImportResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel_token.cancelled() => Err(ImportError::Cancelled),
        result = operation => result,
    }
}
