//! Retry utilities for network and chain calls
//!
//! Reverts and cancellations are permanent. Everything else is retried with
//! backoff until the attempt budget runs out.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::{Result, TransferError};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts; `None` retries forever
    pub max_retries: Option<u32>,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier, 1.0 for a fixed delay
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: None,
            initial_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 1.0,
        }
    }
}

impl RetryConfig {
    /// Fixed delay between a bounded (or unbounded) number of attempts
    pub fn fixed(max_retries: Option<u32>, backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff: backoff,
            max_backoff: backoff,
            backoff_multiplier: 1.0,
        }
    }

    /// Calculate backoff duration for a given attempt (0-indexed)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Check if another attempt is allowed after `attempt` failures
    pub fn should_retry(&self, attempt: u32) -> bool {
        match self.max_retries {
            Some(max) => attempt < max,
            None => true,
        }
    }
}

/// Classifies errors for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Temporary failure - should retry
    Transient,
    /// Explicit revert or cancellation - do not retry
    Permanent,
}

pub fn classify_error(error: &TransferError) -> ErrorClass {
    if error.is_revert() || matches!(error, TransferError::Cancelled) {
        ErrorClass::Permanent
    } else {
        ErrorClass::Transient
    }
}

/// Action to take after a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryAction {
    RetryAfter(Duration),
    GiveUp,
}

/// Decide what to do after `attempts` failed attempts ending in `error`
pub fn next_action(config: &RetryConfig, attempts: u32, error: &TransferError) -> RetryAction {
    if classify_error(error) == ErrorClass::Permanent {
        return RetryAction::GiveUp;
    }
    if !config.should_retry(attempts) {
        return RetryAction::GiveUp;
    }
    RetryAction::RetryAfter(config.backoff_for_attempt(attempts.saturating_sub(1)))
}

/// Run `op` until it succeeds, a permanent error occurs or the budget is spent
///
/// The last error is returned when giving up. Failures are logged at `error`
/// every tenth attempt and at `debug` otherwise.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts: u32 = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        attempts = attempts.saturating_add(1);

        if attempts % 10 == 0 {
            error!(operation = label, attempts, error = %err, "Operation still failing");
        } else {
            debug!(operation = label, attempts, error = %err, "Operation failed");
        }

        match next_action(config, attempts, &err) {
            RetryAction::RetryAfter(backoff) => tokio::time::sleep(backoff).await,
            RetryAction::GiveUp => {
                if !err.is_revert() {
                    warn!(operation = label, attempts, error = %err, "Giving up");
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_fixed_backoff() {
        let config = RetryConfig::fixed(Some(3), Duration::from_secs(10));
        assert_eq!(config.backoff_for_attempt(0), Duration::from_secs(10));
        assert_eq!(config.backoff_for_attempt(5), Duration::from_secs(10));
        assert!(config.should_retry(2));
        assert!(!config.should_retry(3));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let config = RetryConfig {
            max_retries: Some(10),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
            backoff_multiplier: 2.0,
        };
        assert_eq!(config.backoff_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.backoff_for_attempt(6), Duration::from_secs(8));
    }

    #[test]
    fn test_classify_error() {
        assert_eq!(
            classify_error(&TransferError::ChainTransactionReverted("x".into())),
            ErrorClass::Permanent
        );
        assert_eq!(classify_error(&TransferError::Cancelled), ErrorClass::Permanent);
        assert_eq!(
            classify_error(&TransferError::NetworkError("timeout".into())),
            ErrorClass::Transient
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_recovers() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::fixed(Some(5), Duration::from_secs(10));

        let counter = calls.clone();
        let result = with_retry(&config, "flaky", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TransferError::NetworkError("unavailable".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_stops_on_revert() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::fixed(None, Duration::from_secs(10));

        let counter = calls.clone();
        let result: Result<()> = with_retry(&config, "revert", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(TransferError::ChainTransactionReverted("nope".into())) }
        })
        .await;

        assert!(matches!(result, Err(TransferError::ChainTransactionReverted(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::fixed(Some(5), Duration::from_secs(1));

        let counter = calls.clone();
        let result: Result<()> = with_retry(&config, "always", || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Err(TransferError::NetworkError(format!("attempt {}", n))) }
        })
        .await;

        assert_eq!(result, Err(TransferError::NetworkError("attempt 4".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
