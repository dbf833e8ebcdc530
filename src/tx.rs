//! Transaction legs
//!
//! Every leg of a transfer (origin transaction, network signing, setup
//! transactions, destination transaction) is driven through the same
//! [`TxSubmitter`] interface. Waiters that cannot submit anything simply
//! report `can_submit() == false` and start out `Confirming`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, TransferError};
use crate::types::ChainTransactionProgress;

/// Named setup transactions (approvals and similar), ordered by name
pub type SetupMap = BTreeMap<String, Arc<dyn TxSubmitter>>;

#[async_trait]
pub trait TxSubmitter: Send + Sync {
    /// Chain the transaction belongs to
    fn chain(&self) -> &str;

    /// Snapshot of the current progress
    fn progress(&self) -> ChainTransactionProgress;

    fn can_submit(&self) -> bool {
        false
    }

    async fn submit(&self) -> Result<ChainTransactionProgress> {
        Err(TransferError::ParameterError(format!(
            "{} transaction doesn't have a submit handler",
            self.chain()
        )))
    }

    /// Wait until the transaction is final
    async fn wait(&self) -> Result<ChainTransactionProgress>;

    /// Update progress once without waiting
    async fn refresh(&self) -> Result<ChainTransactionProgress> {
        Ok(self.progress())
    }
}
