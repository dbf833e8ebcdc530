//! Mock Signing Network
//!
//! Submitted transactions are executed immediately: once a hash has been
//! submitted, queries for it return a done response (or a revert, see
//! [`MockNetworkProvider::revert_all`]). Scripted responses pushed with
//! [`MockNetworkProvider::push_query_response`] take precedence.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use alloy_primitives::U256;
use async_trait::async_trait;

use crate::error::{Result, TransferError};
use crate::provider::{
    AssetBlockState, AssetFees, BlockState, ChainFees, CrossChainTxOutput, GatewayDetails,
    NetworkProvider, NetworkTransaction, TransactionInput, TransactionWithStatus, TxStatus,
};
use crate::types::Shard;

/// Output signed by the mock network
pub fn mock_output() -> CrossChainTxOutput {
    let mut sig = vec![0x11u8; 32];
    sig.extend_from_slice(&[0x22u8; 32]);
    sig.push(0);
    CrossChainTxOutput {
        amount: U256::from(99_000u64),
        sig,
        sighash: Vec::new(),
        revert: String::new(),
        txid: Vec::new(),
        txindex: 0,
    }
}

fn response(hash: &str, status: TxStatus, out: Option<CrossChainTxOutput>) -> TransactionWithStatus {
    TransactionWithStatus {
        tx: NetworkTransaction {
            hash: hash.to_string(),
            selector: String::new(),
            version: "1".to_string(),
            out,
        },
        tx_status: status,
    }
}

/// Terminal success with [`mock_output`]
pub fn done_response(hash: &str) -> TransactionWithStatus {
    response(hash, TxStatus::Done, Some(mock_output()))
}

/// Still executing
pub fn pending_response(hash: &str) -> TransactionWithStatus {
    response(hash, TxStatus::Executing, None)
}

/// Terminal revert with `reason`
pub fn reverted_response(hash: &str, reason: &str) -> TransactionWithStatus {
    let out = CrossChainTxOutput {
        revert: reason.to_string(),
        ..Default::default()
    };
    response(hash, TxStatus::Reverted, Some(out))
}

fn default_block_state() -> BlockState {
    let mut state = BlockState::new();
    state.insert(
        "BTC".to_string(),
        AssetBlockState {
            gas_limit: U256::from(400u64),
            gas_cap: U256::from(2u64),
            dust_amount: U256::from(546u64),
            minimum_amount: U256::from(547u64),
            fees: AssetFees {
                chains: vec![ChainFees {
                    chain: "Ethereum".to_string(),
                    mint_fee: Some(15),
                    burn_fee: Some(15),
                }],
            },
        },
    );
    state.insert(
        "DAI".to_string(),
        AssetBlockState {
            gas_limit: U256::ZERO,
            gas_cap: U256::ZERO,
            dust_amount: U256::ZERO,
            minimum_amount: U256::from(1u64),
            fees: AssetFees::default(),
        },
    );
    state
}

/// Scripted [`NetworkProvider`]
pub struct MockNetworkProvider {
    block_state: Mutex<BlockState>,
    confirmation_target: AtomicU64,
    shard: Mutex<Shard>,
    blocked_selectors: Mutex<HashSet<String>>,
    gateway_failures: AtomicU32,
    submit_failures: AtomicU32,
    query_responses: Mutex<VecDeque<Result<TransactionWithStatus>>>,
    submitted: Mutex<HashSet<String>>,
    output: Mutex<CrossChainTxOutput>,
    revert: Mutex<Option<String>>,
    gateways: Mutex<Vec<(String, GatewayDetails)>>,
    submit_count: AtomicUsize,
    query_count: AtomicUsize,
    gateway_submit_count: AtomicUsize,
}

impl Default for MockNetworkProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNetworkProvider {
    pub fn new() -> Self {
        Self {
            block_state: Mutex::new(default_block_state()),
            confirmation_target: AtomicU64::new(6),
            shard: Mutex::new(Shard::new(vec![0x02; 33])),
            blocked_selectors: Mutex::new(HashSet::new()),
            gateway_failures: AtomicU32::new(0),
            submit_failures: AtomicU32::new(0),
            query_responses: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(HashSet::new()),
            output: Mutex::new(mock_output()),
            revert: Mutex::new(None),
            gateways: Mutex::new(Vec::new()),
            submit_count: AtomicUsize::new(0),
            query_count: AtomicUsize::new(0),
            gateway_submit_count: AtomicUsize::new(0),
        }
    }

    // ========================================================================
    // Scripting
    // ========================================================================

    pub fn set_confirmation_target(&self, target: u64) {
        self.confirmation_target.store(target, Ordering::SeqCst);
    }

    pub fn set_shard(&self, shard: Shard) {
        *self.shard.lock().unwrap() = shard;
    }

    pub fn block_selector(&self, selector: &str) {
        self.blocked_selectors
            .lock()
            .unwrap()
            .insert(selector.to_string());
    }

    pub fn remove_asset(&self, asset: &str) {
        self.block_state.lock().unwrap().remove(asset);
    }

    /// Fail the next `n` gateway registrations
    pub fn fail_gateway_submissions(&self, n: u32) {
        self.gateway_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` transaction submissions
    pub fn fail_submissions(&self, n: u32) {
        self.submit_failures.store(n, Ordering::SeqCst);
    }

    /// Queue a response for the next query, whatever its hash
    pub fn push_query_response(&self, response: Result<TransactionWithStatus>) {
        self.query_responses.lock().unwrap().push_back(response);
    }

    /// Report the destination transaction as submitted by the network
    pub fn set_output_txid(&self, txid: Vec<u8>, txindex: u32) {
        let mut output = self.output.lock().unwrap();
        output.txid = txid;
        output.txindex = txindex;
    }

    /// Revert every submitted transaction with `reason`
    pub fn revert_all(&self, reason: &str) {
        *self.revert.lock().unwrap() = Some(reason.to_string());
    }

    // ========================================================================
    // Counters
    // ========================================================================

    pub fn submit_count(&self) -> usize {
        self.submit_count.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }

    /// Registration attempts, including failed ones
    pub fn gateway_submit_count(&self) -> usize {
        self.gateway_submit_count.load(Ordering::SeqCst)
    }

    /// Successful registrations
    pub fn registered_gateways(&self) -> Vec<(String, GatewayDetails)> {
        self.gateways.lock().unwrap().clone()
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl NetworkProvider for MockNetworkProvider {
    async fn query_block_state(&self, _asset: &str, _retries: u32) -> Result<BlockState> {
        Ok(self.block_state.lock().unwrap().clone())
    }

    async fn get_confirmation_target(&self, _chain: &str) -> Result<u64> {
        Ok(self.confirmation_target.load(Ordering::SeqCst))
    }

    async fn select_shard(&self, _asset: &str) -> Result<Shard> {
        Ok(self.shard.lock().unwrap().clone())
    }

    async fn selector_whitelisted(&self, selector: &str) -> Result<bool> {
        Ok(!self.blocked_selectors.lock().unwrap().contains(selector))
    }

    async fn submit_gateway(&self, gateway_address: &str, details: &GatewayDetails) -> Result<()> {
        self.gateway_submit_count.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.gateway_failures) {
            return Err(TransferError::NetworkError("gateway registration unavailable".into()));
        }
        self.gateways
            .lock()
            .unwrap()
            .push((gateway_address.to_string(), details.clone()));
        Ok(())
    }

    async fn submit_tx(&self, tx: &TransactionInput, _retries: u32) -> Result<()> {
        self.submit_count.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.submit_failures) {
            return Err(TransferError::NetworkError("submission unavailable".into()));
        }
        self.submitted.lock().unwrap().insert(tx.hash.clone());
        Ok(())
    }

    async fn query_tx(&self, hash: &str, _retries: u32) -> Result<TransactionWithStatus> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.query_responses.lock().unwrap().pop_front() {
            return scripted;
        }
        if !self.submitted.lock().unwrap().contains(hash) {
            return Err(TransferError::TransactionNotFound(format!(
                "transaction {} not found",
                hash
            )));
        }
        if let Some(reason) = self.revert.lock().unwrap().clone() {
            return Ok(reverted_response(hash, &reason));
        }
        let output = self.output.lock().unwrap().clone();
        Ok(response(hash, TxStatus::Done, Some(output)))
    }
}
