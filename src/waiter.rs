//! Confirmation waiter for a known chain transaction

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cancel::CancellationContext;
use crate::chain::Chain;
use crate::error::Result;
use crate::tx::TxSubmitter;
use crate::types::{ChainTransaction, ChainTransactionProgress, ChainTransactionStatus};

/// Tracks confirmations of a chain transaction until `target` is reached
///
/// The transaction reference may be bound later with
/// [`set_transaction`](Self::set_transaction); until then the waiter has
/// nothing to poll.
pub struct DefaultTxWaiter {
    chain: Arc<dyn Chain>,
    poll_interval: Duration,
    progress: Mutex<ChainTransactionProgress>,
}

impl DefaultTxWaiter {
    pub fn new(
        chain: Arc<dyn Chain>,
        transaction: Option<ChainTransaction>,
        target: u64,
        poll_interval: Duration,
    ) -> Self {
        let mut progress = ChainTransactionProgress::new(chain.name(), target);
        progress.status = ChainTransactionStatus::Confirming;
        progress.transaction = transaction;
        Self {
            chain,
            poll_interval,
            progress: Mutex::new(progress),
        }
    }

    pub fn set_transaction(&self, transaction: ChainTransaction) {
        if let Ok(mut progress) = self.progress.lock() {
            progress.transaction = Some(transaction);
        }
    }

    /// Whether this waiter tracks `txid`/`txindex`
    pub fn refers_to(&self, txid: &str, txindex: u32) -> bool {
        self.progress()
            .transaction
            .map(|tx| tx.txid == txid && tx.txindex == txindex)
            .unwrap_or(false)
    }

    fn update<F: FnOnce(&mut ChainTransactionProgress)>(&self, f: F) -> ChainTransactionProgress {
        match self.progress.lock() {
            Ok(mut progress) => {
                f(&mut progress);
                progress.clone()
            }
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Poll confirmations once
    async fn poll(&self) -> Result<ChainTransactionProgress> {
        let current = self.progress();
        let Some(tx) = current.transaction.clone() else {
            return Ok(current);
        };
        if current.status == ChainTransactionStatus::Done {
            return Ok(current);
        }

        let confirmations = self.chain.transaction_confidence(&tx).await?;
        Ok(self.update(|p| {
            p.confirmations = Some(confirmations);
            if confirmations >= p.target {
                p.status = ChainTransactionStatus::Done;
            }
        }))
    }

    /// Poll until the target is reached or `cancel` fires
    pub async fn wait_with_cancel(
        &self,
        cancel: &CancellationContext,
    ) -> Result<ChainTransactionProgress> {
        loop {
            cancel.check()?;
            match self.poll().await {
                Ok(progress) if progress.status == ChainTransactionStatus::Done => {
                    return Ok(progress)
                }
                Ok(progress) => {
                    debug!(
                        chain = %progress.chain,
                        confirmations = ?progress.confirmations,
                        target = progress.target,
                        "Waiting for confirmations"
                    );
                }
                Err(e) if e.is_revert() => {
                    self.update(|p| {
                        p.status = ChainTransactionStatus::Reverted;
                        p.revert_reason = Some(e.to_string());
                    });
                    return Err(e);
                }
                Err(e) => {
                    warn!(chain = %self.chain.name(), error = %e, "Failed to fetch confirmations");
                }
            }
            cancel.sleep(self.poll_interval).await?;
        }
    }
}

#[async_trait]
impl TxSubmitter for DefaultTxWaiter {
    fn chain(&self) -> &str {
        self.chain.name()
    }

    fn progress(&self) -> ChainTransactionProgress {
        match self.progress.lock() {
            Ok(progress) => progress.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn wait(&self) -> Result<ChainTransactionProgress> {
        self.wait_with_cancel(&CancellationContext::new()).await
    }

    async fn refresh(&self) -> Result<ChainTransactionProgress> {
        self.poll().await
    }
}
