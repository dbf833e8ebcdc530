//! Lifecycle drivers
//!
//! [`TransactionHandler`] pushes a transfer through its legs in order:
//! origin transaction, network signature, destination setup, destination
//! transaction. Every leg is driven by [`chain_transaction_handler`], which
//! submits when the leg is ready and waits while it confirms.
//!
//! Failures are retried with a fixed backoff (unbounded by default). Reverts
//! are returned immediately.

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{Result, TransferError};
use crate::provider::NETWORK_CHAIN;
use crate::retry::{with_retry, RetryConfig};
use crate::transaction::GatewayTransaction;
use crate::tx::{SetupMap, TxSubmitter};
use crate::types::{ChainTransactionProgress, ChainTransactionStatus, TransactionStatus};

fn revert_error(progress: &ChainTransactionProgress) -> TransferError {
    let message = match &progress.revert_reason {
        Some(reason) => format!("{} transaction reverted with reason: {}", progress.chain, reason),
        None => format!("{} transaction reverted", progress.chain),
    };
    if progress.chain == NETWORK_CHAIN {
        TransferError::RenvmTransactionReverted(message)
    } else {
        TransferError::ChainTransactionReverted(message)
    }
}

/// Drive one leg until it is done
pub async fn chain_transaction_handler(tx: &dyn TxSubmitter, retry: &RetryConfig) -> Result<()> {
    loop {
        let progress = tx.progress();
        match progress.status {
            ChainTransactionStatus::Ready => {
                if !tx.can_submit() {
                    return Err(TransferError::ParameterError(format!(
                        "{} transaction doesn't have a submit handler.",
                        tx.chain()
                    )));
                }
                debug!(chain = %tx.chain(), "Submitting transaction");
                let label = format!("{} submit", tx.chain());
                with_retry(retry, &label, || tx.submit()).await?;
            }
            ChainTransactionStatus::Confirming => {
                let label = format!("{} wait", tx.chain());
                with_retry(retry, &label, || tx.wait()).await?;
            }
            ChainTransactionStatus::Reverted => return Err(revert_error(&progress)),
            ChainTransactionStatus::Done => return Ok(()),
        }
    }
}

/// Default driver for transfer transactions
#[derive(Debug, Clone)]
pub struct TransactionHandler {
    retry: RetryConfig,
}

impl Default for TransactionHandler {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl TransactionHandler {
    /// Unbounded retries with the configured driver backoff
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            retry: config.driver_retry(None),
        }
    }

    /// Same backoff, at most `max_retries` attempts per step (`None` = forever)
    pub fn with_retries(&self, max_retries: Option<u32>) -> Self {
        let mut retry = self.retry.clone();
        retry.max_retries = max_retries;
        Self { retry }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Drive setup transactions in name order
    pub async fn handle_setup(&self, setup: &SetupMap) -> Result<()> {
        for (name, tx) in setup {
            debug!(setup = %name, chain = %tx.chain(), "Handling setup transaction");
            chain_transaction_handler(tx.as_ref(), &self.retry).await?;
        }
        Ok(())
    }

    /// Drive `tx` from detection to a submitted destination transaction
    pub async fn handle(&self, tx: &GatewayTransaction) -> Result<TransactionStatus> {
        chain_transaction_handler(tx.in_tx().as_ref(), &self.retry).await?;
        debug!(hash = %tx.hash(), "Origin transaction confirmed");

        with_retry(&self.retry, "network signature", || tx.signed()).await?;
        debug!(hash = %tx.hash(), "Network signature ready");

        self.handle_setup(tx.out_setup()).await?;

        let out = tx.out().ok_or_else(|| {
            TransferError::InternalError(format!(
                "No output transaction for {} after signature.",
                tx.hash()
            ))
        })?;
        chain_transaction_handler(out.as_ref(), &self.retry).await?;

        let status = tx.refresh_status().await;
        info!(hash = %tx.hash(), status = %status, "Transaction handled");
        Ok(status)
    }
}
