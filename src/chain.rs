//! Chain collaborator interfaces
//!
//! Concrete blockchains live outside this crate. The engine only needs the
//! capability queries and transaction builders declared here:
//!
//! - [`Chain`]: every chain (origin or destination)
//! - [`DepositChain`]: transfers start by sending funds to a derived address
//! - [`ContractChain`]: transfers start or end with a contract call
//!
//! A chain exposes its optional capabilities through `as_deposit_chain` and
//! `as_contract_chain`.

use std::sync::Arc;

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationContext;
use crate::error::Result;
use crate::tx::{SetupMap, TxSubmitter};
use crate::types::{
    Bytes32, ChainPayload, ChainTransaction, InputChainTransaction, InputType, OutputType,
};

/// Destination encoding returned by the destination chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPayload {
    /// Recipient as the network expects it
    pub to: String,
    /// Recipient bytes used in gHash and sigHash
    #[serde(with = "hex::serde")]
    pub to_bytes: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub payload: Vec<u8>,
}

/// Values needed by a contract origin to build its input transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputParams {
    pub to_chain: String,
    pub to_payload: OutputPayload,
    /// Only known for deposit-style origins
    pub gateway_address: Option<String>,
}

/// Lazily evaluated input parameters
pub type InputParamsFn = Arc<dyn Fn() -> InputParams + Send + Sync>;

/// Called by a contract origin when its input transaction is known
pub type InputCallback = Arc<dyn Fn(InputChainTransaction) + Send + Sync>;

/// Signature split into its recoverable components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverableSignature {
    #[serde(with = "hex::serde")]
    pub r: Bytes32,
    #[serde(with = "hex::serde")]
    pub s: Bytes32,
    pub v: u8,
}

/// Everything a destination contract needs to mint or release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputParams {
    pub amount: U256,
    #[serde(with = "hex::serde")]
    pub s_hash: Bytes32,
    #[serde(with = "hex::serde")]
    pub p_hash: Bytes32,
    #[serde(with = "hex::serde")]
    pub n_hash: Bytes32,
    #[serde(with = "hex::serde")]
    pub sig_hash: Bytes32,
    pub signature: RecoverableSignature,
}

#[async_trait]
pub trait Chain: Send + Sync {
    /// Chain name as used in selectors, e.g. "Ethereum"
    fn name(&self) -> &str;

    /// Whether the asset is native to this chain
    async fn is_lock_asset(&self, asset: &str) -> Result<bool>;

    /// Whether the asset is the chain's own native currency
    async fn asset_is_native(&self, asset: &str) -> Result<bool>;

    async fn get_output_payload(
        &self,
        asset: &str,
        input_type: InputType,
        output_type: OutputType,
        to: &ChainPayload,
    ) -> Result<OutputPayload>;

    /// Current number of confirmations of a transaction
    async fn transaction_confidence(&self, tx: &ChainTransaction) -> Result<u64>;

    fn formatted_transaction_hash(&self, txid: &[u8], _txindex: u32) -> String {
        format!("0x{}", hex::encode(txid))
    }

    fn as_deposit_chain(&self) -> Option<&dyn DepositChain> {
        None
    }

    fn as_contract_chain(&self) -> Option<&dyn ContractChain> {
        None
    }
}

/// Receives deposits found by [`DepositChain::watch_for_deposits`]
pub trait DepositListener: Send + Sync {
    fn on_deposit(&self, deposit: InputChainTransaction);

    /// A previously reported deposit disappeared (e.g. reorg)
    fn on_cancel(&self, _deposit: &InputChainTransaction) {}
}

#[async_trait]
pub trait DepositChain: Chain {
    async fn is_deposit_asset(&self, asset: &str) -> Result<bool>;

    /// Derive the deposit address from the shard key and gateway hash
    async fn create_gateway_address(
        &self,
        asset: &str,
        from: &ChainPayload,
        g_pub_key: &[u8],
        g_hash: &Bytes32,
    ) -> Result<String>;

    /// Report deposits to `address` until `cancel` fires
    async fn watch_for_deposits(
        &self,
        asset: &str,
        from: &ChainPayload,
        address: &str,
        listener: &dyn DepositListener,
        cancel: &CancellationContext,
    ) -> Result<()>;
}

#[async_trait]
pub trait ContractChain: Chain {
    async fn is_mint_asset(&self, asset: &str) -> Result<bool>;

    /// Build the origin transaction (burn or contract lock)
    #[allow(clippy::too_many_arguments)]
    async fn get_input_tx(
        &self,
        input_type: InputType,
        output_type: OutputType,
        asset: &str,
        from: &ChainPayload,
        params: InputParamsFn,
        confirmation_target: u64,
        on_input: InputCallback,
    ) -> Result<Arc<dyn TxSubmitter>>;

    /// Transactions required before the input transaction
    async fn get_in_setup(
        &self,
        _asset: &str,
        _input_type: InputType,
        _output_type: OutputType,
        _from: &ChainPayload,
        _params: InputParamsFn,
    ) -> Result<SetupMap> {
        Ok(SetupMap::new())
    }

    /// Transactions required before the output transaction
    async fn get_out_setup(
        &self,
        _asset: &str,
        _output_type: OutputType,
        _to: &ChainPayload,
    ) -> Result<SetupMap> {
        Ok(SetupMap::new())
    }

    /// Build the destination transaction that spends the network signature
    async fn submit_output(
        &self,
        output_type: OutputType,
        asset: &str,
        to: &ChainPayload,
        params: OutputParams,
        confirmation_target: u64,
    ) -> Result<Arc<dyn TxSubmitter>>;
}
