//! Signing network provider interface and response types
//!
//! The RPC transport is out of scope; the engine talks to the network through
//! [`NetworkProvider`]. Response types mirror what the network reports for a
//! cross-chain transaction.

use std::collections::HashMap;

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::encoding::to_url_base64;
use crate::error::Result;
use crate::hash::generate_transaction_hash;
use crate::pack::PackValue;
use crate::types::{Bytes32, Shard};

/// Chain name used for the network leg in progress records
pub const NETWORK_CHAIN: &str = "RenVM";

/// Reason reported for a terminal revert that carries no message
pub const DEFAULT_REVERT_REASON: &str = "transaction reverted";

// ============================================================================
// Block State (fees)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainFees {
    pub chain: String,
    /// Basis points
    pub mint_fee: Option<u64>,
    /// Basis points
    pub burn_fee: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFees {
    pub chains: Vec<ChainFees>,
}

/// Per-asset risk and fee parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBlockState {
    pub gas_limit: U256,
    pub gas_cap: U256,
    pub dust_amount: U256,
    pub minimum_amount: U256,
    #[serde(default)]
    pub fees: AssetFees,
}

/// Block state keyed by asset
pub type BlockState = HashMap<String, AssetBlockState>;

// ============================================================================
// Gateway Registration
// ============================================================================

/// Metadata registered for a deposit address so the network can recognise it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayDetails {
    pub selector: String,
    #[serde(with = "hex::serde")]
    pub payload: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub p_hash: Bytes32,
    pub to: String,
    #[serde(with = "hex::serde")]
    pub nonce: Bytes32,
    /// Always zero: no deposit is known when a gateway is registered
    #[serde(with = "hex::serde")]
    pub n_hash: Bytes32,
    #[serde(with = "hex::serde")]
    pub g_pub_key: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub g_hash: Bytes32,
}

// ============================================================================
// Transactions
// ============================================================================

/// Transaction as submitted to the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub hash: String,
    pub selector: String,
    pub version: String,
    #[serde(rename = "in")]
    pub input: PackValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Nil,
    Confirming,
    Pending,
    Executing,
    Done,
    Reverted,
}

/// Output of an executed cross-chain transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainTxOutput {
    pub amount: U256,
    #[serde(default, with = "hex::serde")]
    pub sig: Vec<u8>,
    #[serde(default, with = "hex::serde")]
    pub sighash: Vec<u8>,
    #[serde(default)]
    pub revert: String,
    /// Set when the network submitted the destination transaction itself
    #[serde(default, with = "hex::serde")]
    pub txid: Vec<u8>,
    #[serde(default)]
    pub txindex: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTransaction {
    pub hash: String,
    pub selector: String,
    pub version: String,
    #[serde(default)]
    pub out: Option<CrossChainTxOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionWithStatus {
    pub tx: NetworkTransaction,
    pub tx_status: TxStatus,
}

impl TransactionWithStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self.tx_status, TxStatus::Done | TxStatus::Reverted)
    }

    /// Reason of a terminal revert, if any
    pub fn revert_reason(&self) -> Option<String> {
        let reason = self
            .tx
            .out
            .as_ref()
            .map(|out| out.revert.as_str())
            .filter(|r| !r.is_empty());
        match (reason, self.tx_status) {
            (Some(reason), _) => Some(reason.to_string()),
            (None, TxStatus::Reverted) => Some(DEFAULT_REVERT_REASON.to_string()),
            _ => None,
        }
    }

    /// Terminal and not reverted
    pub fn is_done(&self) -> bool {
        self.tx_status == TxStatus::Done && self.revert_reason().is_none()
    }
}

// ============================================================================
// Provider
// ============================================================================

#[async_trait]
pub trait NetworkProvider: Send + Sync {
    async fn query_block_state(&self, asset: &str, retries: u32) -> Result<BlockState>;

    /// Confirmations the network requires on `chain`
    async fn get_confirmation_target(&self, chain: &str) -> Result<u64>;

    async fn select_shard(&self, asset: &str) -> Result<Shard>;

    async fn selector_whitelisted(&self, selector: &str) -> Result<bool>;

    async fn submit_gateway(&self, gateway_address: &str, details: &GatewayDetails) -> Result<()>;

    async fn submit_tx(&self, tx: &TransactionInput, retries: u32) -> Result<()>;

    /// Fails with `TransactionNotFound` for unknown hashes
    async fn query_tx(&self, hash: &str, retries: u32) -> Result<TransactionWithStatus>;

    /// URL-safe base64 network transaction hash
    fn transaction_hash(&self, version: &str, selector: &str, input: &PackValue) -> String {
        to_url_base64(&generate_transaction_hash(version, selector, input))
    }
}
