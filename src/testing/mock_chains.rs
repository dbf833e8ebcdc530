//! Mock Chains
//!
//! [`MockDepositChain`] behaves like a UTXO chain: transfers start with a
//! deposit to a derived address. [`MockContractChain`] behaves like an
//! EVM chain: transfers start with a burn and end with a contract call.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::cancel::CancellationContext;
use crate::chain::{
    Chain, ContractChain, DepositChain, DepositListener, InputCallback, InputParams,
    InputParamsFn, OutputParams, OutputPayload,
};
use crate::encoding::to_url_base64;
use crate::error::{Result, TransferError};
use crate::hash::keccak256;
use crate::tx::{SetupMap, TxSubmitter};
use crate::types::{
    Bytes32, ChainPayload, ChainTransaction, ChainTransactionProgress, ChainTransactionStatus,
    InputChainTransaction, InputType, OutputType,
};

fn asset_set(assets: &[&str]) -> HashSet<String> {
    assets.iter().map(|a| a.to_string()).collect()
}

fn recipient(to: &ChainPayload) -> Result<String> {
    to.params
        .get("to")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            TransferError::ParameterError(format!("No recipient provided for {}.", to.chain))
        })
}

/// Consume one scripted failure, if any are left
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn chain_transaction(chain: &str, txid: &[u8], txindex: u32) -> ChainTransaction {
    ChainTransaction {
        chain: chain.to_string(),
        txid: to_url_base64(txid),
        txindex,
        txid_formatted: format!("0x{}", hex::encode(txid)),
    }
}

// ============================================================================
// Transaction Submitter
// ============================================================================

/// Submitter that confirms immediately after `submit`
pub struct MockTxSubmitter {
    chain: String,
    transaction: ChainTransaction,
    progress: Mutex<ChainTransactionProgress>,
    revert: Option<String>,
    on_submit: Option<(InputParamsFn, InputCallback, InputChainTransaction)>,
    input_params: Mutex<Option<InputParams>>,
    submit_count: AtomicUsize,
}

impl MockTxSubmitter {
    pub fn new(chain: &str, txid: &[u8], target: u64) -> Self {
        Self {
            chain: chain.to_string(),
            transaction: chain_transaction(chain, txid, 0),
            progress: Mutex::new(ChainTransactionProgress::new(chain, target)),
            revert: None,
            on_submit: None,
            input_params: Mutex::new(None),
            submit_count: AtomicUsize::new(0),
        }
    }

    /// Fail `wait` with a chain revert
    pub fn with_revert(mut self, reason: &str) -> Self {
        self.revert = Some(reason.to_string());
        self
    }

    fn with_input(
        mut self,
        params: InputParamsFn,
        on_input: InputCallback,
        input: InputChainTransaction,
    ) -> Self {
        self.transaction = input.tx.clone();
        self.on_submit = Some((params, on_input, input));
        self
    }

    pub fn submit_count(&self) -> usize {
        self.submit_count.load(Ordering::SeqCst)
    }

    /// Parameters resolved when the input transaction was submitted
    pub fn input_params(&self) -> Option<InputParams> {
        self.input_params.lock().unwrap().clone()
    }
}

#[async_trait]
impl TxSubmitter for MockTxSubmitter {
    fn chain(&self) -> &str {
        &self.chain
    }

    fn progress(&self) -> ChainTransactionProgress {
        self.progress.lock().unwrap().clone()
    }

    fn can_submit(&self) -> bool {
        true
    }

    async fn submit(&self) -> Result<ChainTransactionProgress> {
        self.submit_count.fetch_add(1, Ordering::SeqCst);
        let progress = {
            let mut progress = self.progress.lock().unwrap();
            progress.status = ChainTransactionStatus::Confirming;
            progress.confirmations = Some(0);
            progress.transaction = Some(self.transaction.clone());
            progress.clone()
        };
        if let Some((params, on_input, input)) = &self.on_submit {
            *self.input_params.lock().unwrap() = Some(params());
            on_input(input.clone());
        }
        Ok(progress)
    }

    async fn wait(&self) -> Result<ChainTransactionProgress> {
        let mut progress = self.progress.lock().unwrap();
        if let Some(reason) = &self.revert {
            progress.status = ChainTransactionStatus::Reverted;
            progress.revert_reason = Some(reason.clone());
            return Err(TransferError::ChainTransactionReverted(format!(
                "{} transaction reverted with reason: {}",
                self.chain, reason
            )));
        }
        progress.status = ChainTransactionStatus::Done;
        progress.confirmations = Some(progress.target);
        if progress.transaction.is_none() {
            progress.transaction = Some(self.transaction.clone());
        }
        Ok(progress.clone())
    }
}

// ============================================================================
// Deposit Chain
// ============================================================================

/// UTXO-style chain with scripted deposits and confirmations
pub struct MockDepositChain {
    name: String,
    assets: HashSet<String>,
    confirmations: AtomicU64,
    deposits: Mutex<Vec<InputChainTransaction>>,
    watch_calls: AtomicUsize,
    watch_failures: AtomicUsize,
    active_watches: AtomicUsize,
    address_calls: AtomicUsize,
}

impl MockDepositChain {
    pub fn new(name: &str, assets: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            assets: asset_set(assets),
            confirmations: AtomicU64::new(0),
            deposits: Mutex::new(Vec::new()),
            watch_calls: AtomicUsize::new(0),
            watch_failures: AtomicUsize::new(0),
            active_watches: AtomicUsize::new(0),
            address_calls: AtomicUsize::new(0),
        }
    }

    pub fn bitcoin() -> Self {
        Self::new("Bitcoin", &["BTC"])
    }

    /// Confirmations reported for every transaction
    pub fn set_confirmations(&self, confirmations: u64) {
        self.confirmations.store(confirmations, Ordering::SeqCst);
    }

    /// Make a deposit visible to watchers
    pub fn add_deposit(&self, deposit: InputChainTransaction) {
        self.deposits.lock().unwrap().push(deposit);
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    /// Watches currently running
    pub fn active_watches(&self) -> usize {
        self.active_watches.load(Ordering::SeqCst)
    }

    pub fn address_calls(&self) -> usize {
        self.address_calls.load(Ordering::SeqCst)
    }

    /// Fail the next `n` watch calls right away
    pub fn fail_watches(&self, n: usize) {
        self.watch_failures.store(n, Ordering::SeqCst);
    }

    async fn report_deposits(
        &self,
        listener: &dyn DepositListener,
        cancel: &CancellationContext,
    ) -> Result<()> {
        let mut reported = 0;
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let fresh: Vec<InputChainTransaction> = {
                let deposits = self.deposits.lock().unwrap();
                deposits[reported..].to_vec()
            };
            reported += fresh.len();
            for deposit in fresh {
                listener.on_deposit(deposit);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

#[async_trait]
impl Chain for MockDepositChain {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_lock_asset(&self, asset: &str) -> Result<bool> {
        Ok(self.assets.contains(asset))
    }

    async fn asset_is_native(&self, asset: &str) -> Result<bool> {
        Ok(self.assets.contains(asset))
    }

    async fn get_output_payload(
        &self,
        _asset: &str,
        _input_type: InputType,
        _output_type: OutputType,
        to: &ChainPayload,
    ) -> Result<OutputPayload> {
        let to = recipient(to)?;
        Ok(OutputPayload {
            to_bytes: to.as_bytes().to_vec(),
            to,
            payload: Vec::new(),
        })
    }

    async fn transaction_confidence(&self, _tx: &ChainTransaction) -> Result<u64> {
        Ok(self.confirmations.load(Ordering::SeqCst))
    }

    fn as_deposit_chain(&self) -> Option<&dyn DepositChain> {
        Some(self)
    }
}

#[async_trait]
impl DepositChain for MockDepositChain {
    async fn is_deposit_asset(&self, asset: &str) -> Result<bool> {
        Ok(self.assets.contains(asset))
    }

    async fn create_gateway_address(
        &self,
        _asset: &str,
        _from: &ChainPayload,
        g_pub_key: &[u8],
        g_hash: &Bytes32,
    ) -> Result<String> {
        self.address_calls.fetch_add(1, Ordering::SeqCst);
        let mut data = g_pub_key.to_vec();
        data.extend_from_slice(g_hash);
        Ok(format!("mock1{}", &hex::encode(keccak256(&data))[..40]))
    }

    async fn watch_for_deposits(
        &self,
        _asset: &str,
        _from: &ChainPayload,
        _address: &str,
        listener: &dyn DepositListener,
        cancel: &CancellationContext,
    ) -> Result<()> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.watch_failures) {
            return Err(TransferError::NetworkError(format!("{} node unavailable", self.name)));
        }
        self.active_watches.fetch_add(1, Ordering::SeqCst);
        let result = self.report_deposits(listener, cancel).await;
        self.active_watches.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ============================================================================
// Contract Chain
// ============================================================================

/// EVM-style chain that mints foreign assets
pub struct MockContractChain {
    name: String,
    mint_assets: HashSet<String>,
    lock_assets: HashSet<String>,
    confirmations: AtomicU64,
    in_setup: SetupMap,
    out_setup: SetupMap,
    burn: Option<InputChainTransaction>,
    report_burn_on_create: bool,
    output_revert: Option<String>,
    output_payload_calls: AtomicUsize,
    output_payload_failures: AtomicUsize,
    output_payload_delay: Mutex<Duration>,
    outputs: Mutex<Vec<OutputParams>>,
    input_txs: Mutex<Vec<Arc<MockTxSubmitter>>>,
}

impl MockContractChain {
    pub fn new(name: &str, mint_assets: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            mint_assets: asset_set(mint_assets),
            lock_assets: HashSet::new(),
            confirmations: AtomicU64::new(0),
            in_setup: SetupMap::new(),
            out_setup: SetupMap::new(),
            burn: None,
            report_burn_on_create: false,
            output_revert: None,
            output_payload_calls: AtomicUsize::new(0),
            output_payload_failures: AtomicUsize::new(0),
            output_payload_delay: Mutex::new(Duration::ZERO),
            outputs: Mutex::new(Vec::new()),
            input_txs: Mutex::new(Vec::new()),
        }
    }

    /// Mints BTC and ZEC, locks ETH
    pub fn ethereum() -> Self {
        Self::new("Ethereum", &["BTC", "ZEC"]).with_lock_assets(&["ETH"])
    }

    pub fn with_mint_assets(mut self, assets: &[&str]) -> Self {
        self.mint_assets = asset_set(assets);
        self
    }

    pub fn with_lock_assets(mut self, assets: &[&str]) -> Self {
        self.lock_assets = asset_set(assets);
        self
    }

    pub fn with_in_setup(mut self, name: &str, tx: Arc<dyn TxSubmitter>) -> Self {
        self.in_setup.insert(name.to_string(), tx);
        self
    }

    pub fn with_out_setup(mut self, name: &str, tx: Arc<dyn TxSubmitter>) -> Self {
        self.out_setup.insert(name.to_string(), tx);
        self
    }

    /// Burn reported when an input transaction is submitted
    pub fn with_burn(mut self, burn: InputChainTransaction) -> Self {
        self.burn = Some(burn);
        self
    }

    /// Report the scripted burn from inside `get_input_tx`, as a chain does
    /// when the burn already happened
    pub fn report_burn_on_create(mut self) -> Self {
        self.report_burn_on_create = true;
        self
    }

    /// Revert every output transaction with `reason`
    pub fn revert_outputs(mut self, reason: &str) -> Self {
        self.output_revert = Some(reason.to_string());
        self
    }

    pub fn set_confirmations(&self, confirmations: u64) {
        self.confirmations.store(confirmations, Ordering::SeqCst);
    }

    /// Fail the next `n` output payload requests after `delay`
    pub fn fail_output_payloads(&self, n: usize, delay: Duration) {
        *self.output_payload_delay.lock().unwrap() = delay;
        self.output_payload_failures.store(n, Ordering::SeqCst);
    }

    pub fn output_payload_calls(&self) -> usize {
        self.output_payload_calls.load(Ordering::SeqCst)
    }

    /// Number of output transactions built
    pub fn outputs_built(&self) -> usize {
        self.outputs.lock().unwrap().len()
    }

    pub fn output_params(&self) -> Vec<OutputParams> {
        self.outputs.lock().unwrap().clone()
    }

    /// Input transactions handed out by `get_input_tx`
    pub fn input_txs(&self) -> Vec<Arc<MockTxSubmitter>> {
        self.input_txs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Chain for MockContractChain {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_lock_asset(&self, asset: &str) -> Result<bool> {
        Ok(self.lock_assets.contains(asset))
    }

    async fn asset_is_native(&self, asset: &str) -> Result<bool> {
        Ok(self.lock_assets.contains(asset))
    }

    async fn get_output_payload(
        &self,
        _asset: &str,
        _input_type: InputType,
        _output_type: OutputType,
        to: &ChainPayload,
    ) -> Result<OutputPayload> {
        self.output_payload_calls.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.output_payload_failures) {
            let delay = *self.output_payload_delay.lock().unwrap();
            tokio::time::sleep(delay).await;
            return Err(TransferError::NetworkError(format!("{} node unavailable", self.name)));
        }
        let to_address = recipient(to)?;
        let to_bytes = hex::decode(to_address.trim_start_matches("0x"))?;
        let payload = match to.params.get("payload").and_then(|v| v.as_str()) {
            Some(payload) => hex::decode(payload.trim_start_matches("0x"))?,
            None => Vec::new(),
        };
        Ok(OutputPayload {
            to: to_address,
            to_bytes,
            payload,
        })
    }

    async fn transaction_confidence(&self, _tx: &ChainTransaction) -> Result<u64> {
        Ok(self.confirmations.load(Ordering::SeqCst))
    }

    fn as_contract_chain(&self) -> Option<&dyn ContractChain> {
        Some(self)
    }
}

#[async_trait]
impl ContractChain for MockContractChain {
    async fn is_mint_asset(&self, asset: &str) -> Result<bool> {
        Ok(self.mint_assets.contains(asset))
    }

    async fn get_input_tx(
        &self,
        _input_type: InputType,
        _output_type: OutputType,
        asset: &str,
        _from: &ChainPayload,
        params: InputParamsFn,
        confirmation_target: u64,
        on_input: InputCallback,
    ) -> Result<Arc<dyn TxSubmitter>> {
        let burn = self.burn.clone().ok_or_else(|| {
            TransferError::ParameterError(format!("No {} burn scripted on {}.", asset, self.name))
        })?;
        let txid = crate::encoding::from_base64(&burn.tx.txid)?;
        if self.report_burn_on_create {
            on_input(burn.clone());
        }
        let tx = Arc::new(
            MockTxSubmitter::new(&self.name, &txid, confirmation_target)
                .with_input(params, on_input, burn),
        );
        self.input_txs.lock().unwrap().push(tx.clone());
        Ok(tx)
    }

    async fn get_in_setup(
        &self,
        _asset: &str,
        _input_type: InputType,
        _output_type: OutputType,
        _from: &ChainPayload,
        _params: InputParamsFn,
    ) -> Result<SetupMap> {
        Ok(self.in_setup.clone())
    }

    async fn get_out_setup(
        &self,
        _asset: &str,
        _output_type: OutputType,
        _to: &ChainPayload,
    ) -> Result<SetupMap> {
        Ok(self.out_setup.clone())
    }

    async fn submit_output(
        &self,
        _output_type: OutputType,
        _asset: &str,
        _to: &ChainPayload,
        params: OutputParams,
        confirmation_target: u64,
    ) -> Result<Arc<dyn TxSubmitter>> {
        let txid = keccak256(&params.sig_hash);
        self.outputs.lock().unwrap().push(params);
        let mut tx = MockTxSubmitter::new(&self.name, &txid, confirmation_target);
        if let Some(reason) = &self.output_revert {
            tx = tx.with_revert(reason);
        }
        Ok(Arc::new(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collector(Mutex<Vec<String>>);

    impl DepositListener for Collector {
        fn on_deposit(&self, deposit: InputChainTransaction) {
            self.0.lock().unwrap().push(deposit.deposit_id());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_reports_until_cancelled() {
        let chain = MockDepositChain::bitcoin();
        chain.add_deposit(crate::testing::MockDepositBuilder::new().build());

        let collector = Collector(Mutex::new(Vec::new()));
        let cancel = CancellationContext::new();
        let from = ChainPayload::new("Bitcoin");

        let watch = chain.watch_for_deposits("BTC", &from, "addr", &collector, &cancel);
        let stop = async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            cancel.cancel();
        };
        let (result, _) = tokio::join!(watch, stop);
        result.unwrap();

        assert_eq!(collector.0.lock().unwrap().len(), 1);
        assert_eq!(chain.watch_calls(), 1);
    }

    #[tokio::test]
    async fn test_contract_output_payload() {
        let chain = MockContractChain::ethereum();
        let to = ChainPayload::new("Ethereum")
            .with_params(serde_json::json!({ "to": "0x00aa", "payload": "beef" }));
        let payload = chain
            .get_output_payload("BTC", InputType::Lock, OutputType::Mint, &to)
            .await
            .unwrap();
        assert_eq!(payload.to_bytes, vec![0x00, 0xaa]);
        assert_eq!(payload.payload, vec![0xbe, 0xef]);

        let missing = ChainPayload::new("Ethereum");
        assert!(chain
            .get_output_payload("BTC", InputType::Lock, OutputType::Mint, &missing)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_reverting_submitter() {
        let tx = MockTxSubmitter::new("Ethereum", &[1u8; 32], 1).with_revert("out of gas");
        tx.submit().await.unwrap();
        let err = tx.wait().await.unwrap_err();
        assert!(err.is_revert());
        assert_eq!(tx.progress().status, ChainTransactionStatus::Reverted);
    }
}
