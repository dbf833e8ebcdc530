//! Error types for the transfer lifecycle engine
//!
//! Every fallible operation in the crate returns [`TransferError`]. The
//! variant is the error *kind* that callers match on; the message is free
//! text meant for logs.

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T, E = TransferError> = std::result::Result<T, E>;

/// Errors raised while deriving, registering or driving a transfer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    // ========================================================================
    // Caller Errors
    // ========================================================================
    /// Unsupported asset/chain/direction combination, or a chain lacks a
    /// required capability.
    #[error("{0}")]
    ParameterError(String),

    /// Burn-and-mint transfers (asset native to neither chain).
    #[error("{0}")]
    NotImplemented(String),

    // ========================================================================
    // Network Errors
    // ========================================================================
    /// Failed to retrieve required material (e.g. the shard public key).
    #[error("{0}")]
    NetworkError(String),

    /// The network does not know the queried transaction (yet).
    #[error("{0}")]
    TransactionNotFound(String),

    /// Gateway metadata could not be registered after all retries.
    #[error("{0}")]
    GatewaySubmissionFailed(String),

    // ========================================================================
    // Reverts
    // ========================================================================
    /// The signing network rejected the transaction.
    #[error("{0}")]
    RenvmTransactionReverted(String),

    /// The destination (or origin) chain rejected the transaction.
    #[error("{0}")]
    ChainTransactionReverted(String),

    // ========================================================================
    // Internal
    // ========================================================================
    /// Invariant violation.
    #[error("{0}")]
    InternalError(String),

    /// A cancellation context fired while waiting.
    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    UnknownError(String),
}

/// Plain error kind, without the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ParameterError,
    NotImplemented,
    NetworkError,
    TransactionNotFound,
    GatewaySubmissionFailed,
    RenvmTransactionReverted,
    ChainTransactionReverted,
    InternalError,
    Cancelled,
    UnknownError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ParameterError => "PARAMETER_ERROR",
            ErrorKind::NotImplemented => "NOT_IMPLEMENTED",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::TransactionNotFound => "TRANSACTION_NOT_FOUND",
            ErrorKind::GatewaySubmissionFailed => "GATEWAY_SUBMISSION_FAILED",
            ErrorKind::RenvmTransactionReverted => "RENVM_TRANSACTION_REVERTED",
            ErrorKind::ChainTransactionReverted => "CHAIN_TRANSACTION_REVERTED",
            ErrorKind::InternalError => "INTERNAL_ERROR",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::ParameterError(_) => ErrorKind::ParameterError,
            TransferError::NotImplemented(_) => ErrorKind::NotImplemented,
            TransferError::NetworkError(_) => ErrorKind::NetworkError,
            TransferError::TransactionNotFound(_) => ErrorKind::TransactionNotFound,
            TransferError::GatewaySubmissionFailed(_) => ErrorKind::GatewaySubmissionFailed,
            TransferError::RenvmTransactionReverted(_) => ErrorKind::RenvmTransactionReverted,
            TransferError::ChainTransactionReverted(_) => ErrorKind::ChainTransactionReverted,
            TransferError::InternalError(_) => ErrorKind::InternalError,
            TransferError::Cancelled => ErrorKind::Cancelled,
            TransferError::UnknownError(_) => ErrorKind::UnknownError,
        }
    }

    /// True for explicit rejections by the network or a chain. Reverts are
    /// never retried.
    pub fn is_revert(&self) -> bool {
        matches!(
            self,
            TransferError::RenvmTransactionReverted(_) | TransferError::ChainTransactionReverted(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TransferError::TransactionNotFound(_))
    }

    /// Prefix the message with `context`, keeping the kind
    pub fn with_context(self, context: impl fmt::Display) -> Self {
        let wrap = |msg: String| format!("{}: {}", context, msg);
        match self {
            TransferError::ParameterError(m) => TransferError::ParameterError(wrap(m)),
            TransferError::NotImplemented(m) => TransferError::NotImplemented(wrap(m)),
            TransferError::NetworkError(m) => TransferError::NetworkError(wrap(m)),
            TransferError::TransactionNotFound(m) => TransferError::TransactionNotFound(wrap(m)),
            TransferError::GatewaySubmissionFailed(m) => {
                TransferError::GatewaySubmissionFailed(wrap(m))
            }
            TransferError::RenvmTransactionReverted(m) => {
                TransferError::RenvmTransactionReverted(wrap(m))
            }
            TransferError::ChainTransactionReverted(m) => {
                TransferError::ChainTransactionReverted(wrap(m))
            }
            TransferError::InternalError(m) => TransferError::InternalError(wrap(m)),
            TransferError::Cancelled => TransferError::Cancelled,
            TransferError::UnknownError(m) => TransferError::UnknownError(wrap(m)),
        }
    }
}

impl From<hex::FromHexError> for TransferError {
    fn from(e: hex::FromHexError) -> Self {
        TransferError::ParameterError(format!("invalid hex: {}", e))
    }
}

impl From<base64::DecodeError> for TransferError {
    fn from(e: base64::DecodeError) -> Self {
        TransferError::ParameterError(format!("invalid base64: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_context_keeps_kind() {
        let err = TransferError::RenvmTransactionReverted("insufficient funds".into())
            .with_context("deposit abc_0");
        assert_eq!(err.kind(), ErrorKind::RenvmTransactionReverted);
        assert_eq!(err.to_string(), "deposit abc_0: insufficient funds");
        assert!(err.is_revert());
    }

    #[test]
    fn test_revert_classification() {
        assert!(TransferError::ChainTransactionReverted("x".into()).is_revert());
        assert!(!TransferError::NetworkError("x".into()).is_revert());
        assert!(TransferError::TransactionNotFound("x".into()).is_not_found());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(
            ErrorKind::GatewaySubmissionFailed.to_string(),
            "GATEWAY_SUBMISSION_FAILED"
        );
    }
}
