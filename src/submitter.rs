//! Generic submit/query/wait protocol against the signing network
//!
//! A [`NetworkTxSubmitter`] owns one network transaction (selector plus
//! packed input) and its progress record:
//!
//! ```text
//! Ready ──submit──▶ Confirming ──query/wait──▶ Done
//!                                     └──────▶ Reverted
//! ```
//!
//! Terminal responses go through complete-handling: a revert reason marks the
//! transaction reverted and fails, anything else runs the completion
//! callback and marks it done.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cancel::CancellationContext;
use crate::error::{Result, TransferError};
use crate::hash::TRANSACTION_VERSION;
use crate::pack::PackValue;
use crate::provider::{NetworkProvider, TransactionInput, TransactionWithStatus, NETWORK_CHAIN};
use crate::tx::TxSubmitter;
use crate::types::{ChainTransaction, ChainTransactionProgress, ChainTransactionStatus};

/// Invoked with the terminal response before the transaction is marked done
pub type CompletionCallback =
    Arc<dyn Fn(TransactionWithStatus) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Progress record of the network leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkProgress {
    #[serde(flatten)]
    pub progress: ChainTransactionProgress,
    /// Last query response
    pub response: Option<TransactionWithStatus>,
}

/// Timing and retry knobs of the submitter
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Delay between queries in `wait`
    pub network_delay: Duration,
    /// Submit/query attempts in `submit`
    pub submit_attempts: u32,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            network_delay: Duration::from_secs(15),
            submit_attempts: 4,
        }
    }
}

pub struct NetworkTxSubmitter {
    provider: Arc<dyn NetworkProvider>,
    selector: String,
    input: PackValue,
    hash: String,
    callback: Option<CompletionCallback>,
    config: SubmitterConfig,
    state: Mutex<NetworkProgress>,
    events: broadcast::Sender<NetworkProgress>,
}

impl NetworkTxSubmitter {
    pub fn new(
        provider: Arc<dyn NetworkProvider>,
        selector: impl Into<String>,
        input: PackValue,
        callback: Option<CompletionCallback>,
        config: SubmitterConfig,
    ) -> Self {
        let selector = selector.into();
        let hash = provider.transaction_hash(TRANSACTION_VERSION, &selector, &input);
        let (events, _) = broadcast::channel(64);
        Self {
            provider,
            selector,
            input,
            hash,
            callback,
            config,
            state: Mutex::new(NetworkProgress {
                progress: ChainTransactionProgress::new(NETWORK_CHAIN, 0),
                response: None,
            }),
            events,
        }
    }

    /// Reject the transaction if `expected` differs from the computed hash
    pub fn with_expected_hash(self, expected: &str) -> Result<Self> {
        if expected != self.hash {
            return Err(TransferError::ParameterError(format!(
                "Invalid transaction hash: expected {} but computed {}",
                expected, self.hash
            )));
        }
        Ok(self)
    }

    /// URL-safe base64 transaction hash
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn network_progress(&self) -> NetworkProgress {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Receive every progress update
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkProgress> {
        self.events.subscribe()
    }

    fn update<F: FnOnce(&mut NetworkProgress)>(&self, f: F) -> NetworkProgress {
        let snapshot = match self.state.lock() {
            Ok(mut state) => {
                f(&mut state);
                state.clone()
            }
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        // No receivers is fine
        let _ = self.events.send(snapshot.clone());
        snapshot
    }

    fn transaction_input(&self) -> TransactionInput {
        TransactionInput {
            hash: self.hash.clone(),
            selector: self.selector.clone(),
            version: TRANSACTION_VERSION.to_string(),
            input: self.input.clone(),
        }
    }

    fn mark_confirming(&self) -> NetworkProgress {
        self.update(|s| {
            if s.progress.status == ChainTransactionStatus::Ready {
                s.progress.status = ChainTransactionStatus::Confirming;
            }
        })
    }

    // ========================================================================
    // Protocol
    // ========================================================================

    /// Fetch the current status, completing the transaction if terminal
    pub async fn query(&self, retries: u32) -> Result<NetworkProgress> {
        let response = self.provider.query_tx(&self.hash, retries).await?;
        if response.is_terminal() {
            return self.complete(response).await;
        }
        Ok(self.update(|s| {
            if !s.progress.status.is_terminal() {
                s.progress.status = ChainTransactionStatus::Confirming;
            }
            s.response = Some(response);
        }))
    }

    /// Submit the transaction, falling back to a query on each failure
    ///
    /// The network may already know the transaction, in which case the query
    /// succeeds. After all attempts fail the last submission error is
    /// returned.
    pub async fn submit_tx(&self) -> Result<NetworkProgress> {
        let tx = self.transaction_input();
        let mut last_error = None;

        for attempt in 0..self.config.submit_attempts.max(1) {
            let submit_err = match self.provider.submit_tx(&tx, 1).await {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(e) if e.is_revert() => return Err(e),
                Err(e) => e,
            };
            debug!(hash = %self.hash, attempt, error = %submit_err, "Submission failed, querying");

            match self.query(1).await {
                Ok(_) => {
                    last_error = None;
                    break;
                }
                Err(e) if e.is_revert() => return Err(e),
                Err(_) => last_error = Some(submit_err),
            }
        }

        if let Some(e) = last_error {
            warn!(hash = %self.hash, selector = %self.selector, error = %e, "Failed to submit to network");
            return Err(e);
        }

        info!(hash = %self.hash, selector = %self.selector, "Submitted transaction to network");
        Ok(self.mark_confirming())
    }

    /// One direct submission with a larger retry budget
    pub async fn resubmit(&self, retries: u32) -> Result<NetworkProgress> {
        self.provider
            .submit_tx(&self.transaction_input(), retries)
            .await?;
        Ok(self.mark_confirming())
    }

    /// Poll until terminal or until `cancel` fires
    ///
    /// Unknown-hash errors are expected right after submission and only
    /// logged at debug. Reverts end the loop.
    pub async fn wait_with_cancel(&self, cancel: &CancellationContext) -> Result<NetworkProgress> {
        loop {
            cancel.check()?;
            match self.query(1).await {
                Ok(state) if state.progress.status.is_terminal() => return Ok(state),
                Ok(state) => {
                    debug!(hash = %self.hash, status = ?state.response.map(|r| r.tx_status), "Network transaction pending");
                }
                Err(e) if e.is_revert() => return Err(e),
                Err(e) if e.is_not_found() => {
                    debug!(hash = %self.hash, "Transaction not yet known to network");
                }
                Err(e) => {
                    warn!(hash = %self.hash, error = %e, "Failed to query network transaction");
                }
            }
            cancel.sleep(self.config.network_delay).await?;
        }
    }

    async fn complete(&self, response: TransactionWithStatus) -> Result<NetworkProgress> {
        if let Some(reason) = response.revert_reason() {
            self.update(|s| {
                s.progress.status = ChainTransactionStatus::Reverted;
                s.progress.revert_reason = Some(reason.clone());
                s.response = Some(response);
            });
            warn!(hash = %self.hash, reason = %reason, "Network transaction reverted");
            return Err(TransferError::RenvmTransactionReverted(format!(
                "RenVM transaction reverted: {}",
                reason
            )));
        }

        if let Some(callback) = &self.callback {
            callback(response.clone()).await?;
        }

        let hash = self.hash.clone();
        Ok(self.update(|s| {
            s.progress.status = ChainTransactionStatus::Done;
            s.progress.transaction = Some(ChainTransaction {
                chain: NETWORK_CHAIN.to_string(),
                txid: hash.clone(),
                txindex: 0,
                txid_formatted: hash,
            });
            s.response = Some(response);
        }))
    }
}

#[async_trait]
impl TxSubmitter for NetworkTxSubmitter {
    fn chain(&self) -> &str {
        NETWORK_CHAIN
    }

    fn progress(&self) -> ChainTransactionProgress {
        self.network_progress().progress
    }

    fn can_submit(&self) -> bool {
        true
    }

    async fn submit(&self) -> Result<ChainTransactionProgress> {
        self.submit_tx().await.map(|s| s.progress)
    }

    async fn wait(&self) -> Result<ChainTransactionProgress> {
        self.wait_with_cancel(&CancellationContext::new())
            .await
            .map(|s| s.progress)
    }

    async fn refresh(&self) -> Result<ChainTransactionProgress> {
        self.query(1).await.map(|s| s.progress)
    }
}
