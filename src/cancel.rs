//! Cooperative cancellation for long-running loops
//!
//! Waits never get interrupted from the outside. Instead every polling loop
//! receives a [`CancellationContext`] and checks it at each suspension point.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, TransferError};

type CancelPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Explicit cancel flag plus an optional "should I stop" predicate
#[derive(Clone, Default)]
pub struct CancellationContext {
    flag: Arc<AtomicBool>,
    predicate: Option<CancelPredicate>,
}

impl CancellationContext {
    /// A context that only stops when [`cancel`](Self::cancel) is called
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that also stops whenever `predicate` returns true
    pub fn with_predicate<F>(predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            predicate: Some(Arc::new(predicate)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        self.predicate.as_ref().map(|p| p()).unwrap_or(false)
    }

    /// Fail with [`TransferError::Cancelled`] if the context fired
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(TransferError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep, then check the context
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::time::sleep(duration).await;
        self.check()
    }
}

impl fmt::Debug for CancellationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationContext")
            .field("cancelled", &self.flag.load(Ordering::SeqCst))
            .field("has_predicate", &self.predicate.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_explicit_cancel_is_shared_between_clones() {
        let ctx = CancellationContext::new();
        let clone = ctx.clone();
        assert!(ctx.check().is_ok());
        clone.cancel();
        assert_eq!(ctx.check(), Err(TransferError::Cancelled));
    }

    #[test]
    fn test_predicate_is_consulted() {
        let listeners = Arc::new(AtomicUsize::new(1));
        let observed = listeners.clone();
        let ctx = CancellationContext::with_predicate(move || observed.load(Ordering::SeqCst) == 0);

        assert!(!ctx.is_cancelled());
        listeners.store(0, Ordering::SeqCst);
        assert!(ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_reports_cancellation() {
        let ctx = CancellationContext::new();
        ctx.cancel();
        assert_eq!(
            ctx.sleep(Duration::from_secs(15)).await,
            Err(TransferError::Cancelled)
        );
    }
}
