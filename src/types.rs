//! Common types for gateways and transfer transactions
//!
//! Parameter types here are the resumption format: a `GatewayParams` or
//! `TransactionParams` serialized by an integrator is enough to rebuild the
//! gateway or transaction without replaying earlier network interactions.

use std::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// 32-byte hash or nonce
pub type Bytes32 = [u8; 32];

/// All-zero 32 bytes, the default nonce
pub const ZERO_BYTES32: Bytes32 = [0u8; 32];

// ============================================================================
// Direction
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputType {
    Lock,
    Burn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputType {
    Mint,
    Release,
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputType::Lock => write!(f, "lock"),
            InputType::Burn => write!(f, "burn"),
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputType::Mint => write!(f, "mint"),
            OutputType::Release => write!(f, "release"),
        }
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Chain name plus chain-specific parameters (recipient, contract call...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainPayload {
    pub chain: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ChainPayload {
    pub fn new(chain: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
            params: serde_json::Value::Null,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// Key group of the signing network. An empty key is the placeholder used
/// for contract-based origins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    #[serde(with = "hex::serde")]
    pub g_pub_key: Vec<u8>,
}

impl Shard {
    pub fn new(g_pub_key: Vec<u8>) -> Self {
        Self { g_pub_key }
    }

    pub fn is_empty(&self) -> bool {
        self.g_pub_key.is_empty()
    }
}

/// Parameters identifying a gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayParams {
    pub asset: String,
    pub from: ChainPayload,
    pub to: ChainPayload,
    #[serde(default, with = "hex::serde")]
    pub nonce: Bytes32,
    /// Pre-selected shard, skips shard selection
    #[serde(default)]
    pub shard: Option<Shard>,
}

impl GatewayParams {
    pub fn new(asset: impl Into<String>, from: ChainPayload, to: ChainPayload) -> Self {
        Self {
            asset: asset.into(),
            from,
            to,
            nonce: ZERO_BYTES32,
            shard: None,
        }
    }

    pub fn with_nonce(mut self, nonce: Bytes32) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn with_shard(mut self, shard: Shard) -> Self {
        self.shard = Some(shard);
        self
    }
}

/// Parameters identifying a single transfer transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionParams {
    pub asset: String,
    pub from_tx: InputChainTransaction,
    pub to: ChainPayload,
    /// Shard selected when `from_tx` was submitted; empty for contract origins
    #[serde(default)]
    pub shard: Shard,
    #[serde(default, with = "hex::serde")]
    pub nonce: Bytes32,
    /// Explicit nonce hash. Computed from nonce, txid and txindex when absent.
    #[serde(default, with = "crate::encoding::hex_opt")]
    pub n_hash: Option<Bytes32>,
}

// ============================================================================
// Chain Transactions
// ============================================================================

/// Reference to a transaction on some chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainTransaction {
    pub chain: String,
    /// URL-safe base64
    pub txid: String,
    pub txindex: u32,
    pub txid_formatted: String,
}

impl ChainTransaction {
    /// Key used to deduplicate deposits within a gateway
    pub fn deposit_id(&self) -> String {
        format!("{}_{}", self.txid, self.txindex)
    }
}

/// Origin chain transaction (deposit or burn) that funds a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputChainTransaction {
    #[serde(flatten)]
    pub tx: ChainTransaction,
    pub amount: U256,
    /// Nonce emitted by the origin chain itself (e.g. burn events)
    #[serde(default, with = "crate::encoding::hex_opt")]
    pub nonce: Option<Bytes32>,
}

impl InputChainTransaction {
    pub fn deposit_id(&self) -> String {
        self.tx.deposit_id()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainTransactionStatus {
    Ready,
    Confirming,
    Done,
    Reverted,
}

impl ChainTransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChainTransactionStatus::Done | ChainTransactionStatus::Reverted
        )
    }
}

/// Progress of one leg (origin, network, destination or setup)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTransactionProgress {
    pub chain: String,
    pub status: ChainTransactionStatus,
    pub target: u64,
    pub confirmations: Option<u64>,
    pub transaction: Option<ChainTransaction>,
    pub revert_reason: Option<String>,
}

impl ChainTransactionProgress {
    pub fn new(chain: impl Into<String>, target: u64) -> Self {
        Self {
            chain: chain.into(),
            status: ChainTransactionStatus::Ready,
            target,
            confirmations: None,
            transaction: None,
            revert_reason: None,
        }
    }
}

// ============================================================================
// Transfer Status
// ============================================================================

/// Status of a transfer transaction
///
/// Ordered `FetchingStatus < Detected < Confirmed < Signed < Submitted`.
/// `Reverted` is terminal and reachable from every state except `Submitted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    FetchingStatus,
    Detected,
    Confirmed,
    Signed,
    Reverted,
    Submitted,
}

impl TransactionStatus {
    /// Whether moving from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        match (*self, next) {
            (TransactionStatus::Reverted, _) => false,
            (TransactionStatus::Submitted, _) => false,
            (_, TransactionStatus::Reverted) => true,
            (current, next) => next > current,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Reverted | TransactionStatus::Submitted
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::FetchingStatus => "fetching_status",
            TransactionStatus::Detected => "detected",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Signed => "signed",
            TransactionStatus::Reverted => "reverted",
            TransactionStatus::Submitted => "submitted",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_monotonic() {
        use TransactionStatus::*;
        assert!(FetchingStatus.can_transition_to(Detected));
        assert!(Detected.can_transition_to(Signed));
        assert!(Signed.can_transition_to(Submitted));
        assert!(!Signed.can_transition_to(Detected));
        assert!(!Confirmed.can_transition_to(Confirmed));
    }

    #[test]
    fn test_reverted_is_terminal() {
        use TransactionStatus::*;
        assert!(Detected.can_transition_to(Reverted));
        assert!(Signed.can_transition_to(Reverted));
        assert!(!Submitted.can_transition_to(Reverted));
        assert!(!Reverted.can_transition_to(Submitted));
        assert!(Reverted.is_terminal());
    }

    #[test]
    fn test_deposit_id() {
        let tx = ChainTransaction {
            chain: "Bitcoin".into(),
            txid: "abc".into(),
            txindex: 3,
            txid_formatted: "cba".into(),
        };
        assert_eq!(tx.deposit_id(), "abc_3");
    }

    #[test]
    fn test_params_resume_from_json() {
        let json = serde_json::json!({
            "asset": "BTC",
            "from": { "chain": "Bitcoin" },
            "to": { "chain": "Ethereum", "params": { "to": "0x00" } }
        });
        let params: GatewayParams = serde_json::from_value(json).unwrap();
        assert_eq!(params.nonce, ZERO_BYTES32);
        assert!(params.shard.is_none());

        let encoded = serde_json::to_value(&params).unwrap();
        let decoded: GatewayParams = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn test_input_tx_optional_nonce() {
        let json = serde_json::json!({
            "chain": "Ethereum",
            "txid": "AAEC",
            "txindex": 0,
            "txid_formatted": "0x000102",
            "amount": "0x64"
        });
        let tx: InputChainTransaction = serde_json::from_value(json).unwrap();
        assert_eq!(tx.amount, U256::from(100u64));
        assert!(tx.nonce.is_none());
    }
}
