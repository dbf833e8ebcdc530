//! Transfer transaction: one deposit (or burn) moving through the network
//!
//! A transaction coordinates three legs:
//!
//! 1. `in_tx`: the origin chain transaction, tracked until confirmed
//! 2. `network`: the signing network transaction ([`NetworkTxSubmitter`])
//! 3. `out`: the destination transaction, available once signed
//!
//! Construction is two-phase. [`PendingGatewayTransaction`] only exposes
//! `initialize`, which derives every hash and returns the ready
//! [`GatewayTransaction`].
//!
//! Status only moves forward (see [`TransactionStatus`]); a stale query
//! result can never regress it.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, info, warn};

use crate::chain::{Chain, OutputParams, OutputPayload, RecoverableSignature};
use crate::config::EngineConfig;
use crate::encoding::{from_base64, to_url_base64};
use crate::error::{Result, TransferError};
use crate::hash::{
    generate_g_hash, generate_n_hash, generate_p_hash, generate_s_hash, generate_sighash,
    keccak256,
};
use crate::pack::CrossChainTxInput;
use crate::provider::{NetworkProvider, TransactionWithStatus};
use crate::selector::classify;
use crate::submitter::{CompletionCallback, NetworkTxSubmitter};
use crate::tx::{SetupMap, TxSubmitter};
use crate::types::{
    Bytes32, ChainTransaction, ChainTransactionProgress, ChainTransactionStatus, InputType,
    OutputType, TransactionParams, TransactionStatus,
};
use crate::waiter::DefaultTxWaiter;

/// Retries of the final resubmission in `signed`
const RESUBMIT_RETRIES: u32 = 5;

/// Events published by a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransactionEvent {
    /// Network transaction hash, emitted before submission
    TxHash(String),
    Status(TransactionStatus),
    NetworkProgress(ChainTransactionProgress),
}

#[derive(Debug)]
struct TxState {
    status: TransactionStatus,
    revert_reason: Option<String>,
    query_result: Option<TransactionWithStatus>,
}

// ============================================================================
// Construction
// ============================================================================

/// A transaction whose hashes have not been derived yet
pub struct PendingGatewayTransaction {
    provider: Arc<dyn NetworkProvider>,
    from_chain: Arc<dyn Chain>,
    to_chain: Arc<dyn Chain>,
    params: TransactionParams,
    in_tx: Option<Arc<dyn TxSubmitter>>,
    confirmation_target: Option<u64>,
    config: EngineConfig,
}

impl PendingGatewayTransaction {
    pub fn new(
        provider: Arc<dyn NetworkProvider>,
        from_chain: Arc<dyn Chain>,
        to_chain: Arc<dyn Chain>,
        params: TransactionParams,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            from_chain,
            to_chain,
            params,
            in_tx: None,
            confirmation_target: None,
            config,
        }
    }

    /// Reuse an existing origin transaction leg
    pub fn with_input_tx(mut self, in_tx: Arc<dyn TxSubmitter>) -> Self {
        self.in_tx = Some(in_tx);
        self
    }

    /// Known origin confirmation target, skips asking the network
    pub fn with_confirmation_target(mut self, target: u64) -> Self {
        self.confirmation_target = Some(target);
        self
    }

    pub async fn initialize(self) -> Result<Arc<GatewayTransaction>> {
        let PendingGatewayTransaction {
            provider,
            from_chain,
            to_chain,
            params,
            in_tx,
            confirmation_target,
            config,
        } = self;

        let classification = classify(&params.asset, from_chain.as_ref(), to_chain.as_ref()).await?;
        let payload = to_chain
            .get_output_payload(
                &params.asset,
                classification.input_type,
                classification.output_type,
                &params.to,
            )
            .await?;

        let p_hash = generate_p_hash(&payload.payload);
        let s_hash = generate_s_hash(&format!("{}/to{}", params.asset, params.to.chain));
        let g_hash = generate_g_hash(&p_hash, &s_hash, &payload.to_bytes, &params.nonce);

        let txid = from_base64(&params.from_tx.tx.txid)?;
        let n_hash = params
            .n_hash
            .unwrap_or_else(|| generate_n_hash(&params.nonce, &txid, params.from_tx.tx.txindex));

        let in_tx = match in_tx {
            Some(in_tx) => in_tx,
            None => {
                let target = match confirmation_target {
                    Some(target) => target,
                    None => provider.get_confirmation_target(from_chain.name()).await?,
                };
                Arc::new(DefaultTxWaiter::new(
                    from_chain.clone(),
                    Some(params.from_tx.tx.clone()),
                    target,
                    config.confirmation_poll_interval(),
                )) as Arc<dyn TxSubmitter>
            }
        };

        let out_setup = match to_chain.as_contract_chain() {
            Some(contract) => {
                contract
                    .get_out_setup(&params.asset, classification.output_type, &params.to)
                    .await?
            }
            None => SetupMap::new(),
        };

        let input = CrossChainTxInput {
            txid,
            txindex: params.from_tx.tx.txindex,
            amount: params.from_tx.amount,
            payload: payload.payload.clone(),
            phash: p_hash,
            to: payload.to.clone(),
            nonce: params.nonce,
            nhash: n_hash,
            gpubkey: params.shard.g_pub_key.clone(),
            ghash: g_hash,
        };

        let (events, _) = broadcast::channel(64);
        let selector = classification.selector.clone();

        let transaction = Arc::new_cyclic(|weak: &Weak<GatewayTransaction>| {
            let weak = weak.clone();
            // Keep the terminal response so signature handling can reuse it
            let callback: CompletionCallback = Arc::new(move |response: TransactionWithStatus| {
                let weak = weak.clone();
                async move {
                    if let Some(tx) = weak.upgrade() {
                        tx.store_query_result(response);
                    }
                    Ok::<(), TransferError>(())
                }
                .boxed()
            });

            let network = NetworkTxSubmitter::new(
                provider.clone(),
                selector.clone(),
                input.to_pack_value(),
                Some(callback),
                config.submitter_config(),
            );

            GatewayTransaction {
                hash: network.hash().to_string(),
                network: Arc::new(network),
                selector,
                input_type: classification.input_type,
                output_type: classification.output_type,
                params,
                from_chain,
                to_chain,
                output_payload: payload,
                p_hash,
                s_hash,
                g_hash,
                n_hash,
                in_tx,
                out_setup,
                out: OnceCell::new(),
                state: Mutex::new(TxState {
                    status: TransactionStatus::FetchingStatus,
                    revert_reason: None,
                    query_result: None,
                }),
                events,
                config,
            }
        });

        transaction.forward_network_progress();
        let status = transaction.refresh_status().await;
        debug!(
            hash = %transaction.hash,
            selector = %transaction.selector,
            status = %status,
            "Transaction initialized"
        );
        Ok(transaction)
    }
}

// ============================================================================
// Ready Transaction
// ============================================================================

pub struct GatewayTransaction {
    params: TransactionParams,
    hash: String,
    selector: String,
    input_type: InputType,
    output_type: OutputType,
    from_chain: Arc<dyn Chain>,
    to_chain: Arc<dyn Chain>,
    output_payload: OutputPayload,
    p_hash: Bytes32,
    s_hash: Bytes32,
    g_hash: Bytes32,
    n_hash: Bytes32,
    in_tx: Arc<dyn TxSubmitter>,
    network: Arc<NetworkTxSubmitter>,
    out_setup: SetupMap,
    out: OnceCell<Arc<dyn TxSubmitter>>,
    state: Mutex<TxState>,
    events: broadcast::Sender<TransactionEvent>,
    config: EngineConfig,
}

impl fmt::Debug for GatewayTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayTransaction")
            .field("hash", &self.hash)
            .field("selector", &self.selector)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl GatewayTransaction {
    // ========================================================================
    // Accessors
    // ========================================================================

    /// URL-safe base64 network transaction hash
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn params(&self) -> &TransactionParams {
        &self.params
    }

    pub fn input_type(&self) -> InputType {
        self.input_type
    }

    pub fn output_type(&self) -> OutputType {
        self.output_type
    }

    pub fn from_chain(&self) -> &Arc<dyn Chain> {
        &self.from_chain
    }

    pub fn to_chain(&self) -> &Arc<dyn Chain> {
        &self.to_chain
    }

    pub fn p_hash(&self) -> &Bytes32 {
        &self.p_hash
    }

    /// Selector hash used in the gateway hash
    pub fn s_hash(&self) -> &Bytes32 {
        &self.s_hash
    }

    pub fn g_hash(&self) -> &Bytes32 {
        &self.g_hash
    }

    pub fn n_hash(&self) -> &Bytes32 {
        &self.n_hash
    }

    /// Origin transaction leg
    pub fn in_tx(&self) -> &Arc<dyn TxSubmitter> {
        &self.in_tx
    }

    /// Network signing leg
    pub fn network(&self) -> &Arc<NetworkTxSubmitter> {
        &self.network
    }

    pub fn out_setup(&self) -> &SetupMap {
        &self.out_setup
    }

    /// Destination leg, available once the signature is ready
    pub fn out(&self) -> Option<Arc<dyn TxSubmitter>> {
        self.out.get().cloned()
    }

    pub fn status(&self) -> TransactionStatus {
        self.lock_state().status
    }

    pub fn revert_reason(&self) -> Option<String> {
        self.lock_state().revert_reason.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransactionEvent> {
        self.events.subscribe()
    }

    // ========================================================================
    // State
    // ========================================================================

    fn lock_state(&self) -> std::sync::MutexGuard<'_, TxState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit(&self, event: TransactionEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn store_query_result(&self, response: TransactionWithStatus) {
        self.lock_state().query_result = Some(response);
    }

    fn cached_terminal_result(&self) -> Option<TransactionWithStatus> {
        self.lock_state()
            .query_result
            .clone()
            .filter(|r| r.is_terminal())
    }

    /// Move to `next` if allowed; returns the resulting status
    fn apply_status(&self, next: TransactionStatus, revert_reason: Option<String>) -> TransactionStatus {
        let changed = {
            let mut state = self.lock_state();
            if state.status.can_transition_to(next) {
                state.status = next;
                if next == TransactionStatus::Reverted {
                    state.revert_reason = revert_reason;
                }
                true
            } else {
                false
            }
        };
        if changed {
            debug!(hash = %self.hash, status = %next, "Transaction status changed");
            self.emit(TransactionEvent::Status(next));
        }
        self.status()
    }

    fn mark_reverted(&self, reason: String) {
        warn!(hash = %self.hash, reason = %reason, "Transaction reverted");
        self.apply_status(TransactionStatus::Reverted, Some(reason));
    }

    fn forward_network_progress(self: &Arc<Self>) {
        let mut progress = self.network.subscribe();
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match progress.recv().await {
                    Ok(update) => {
                        let Some(tx) = weak.upgrade() else { return };
                        if let Some(response) = update.response.clone() {
                            tx.store_query_result(response);
                        }
                        tx.emit(TransactionEvent::NetworkProgress(update.progress));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Network progress events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Query the network, reusing a cached successful result
    ///
    /// Done results never change for a given hash, so they are returned
    /// without another network call.
    pub async fn query_tx(&self, retries: u32) -> Result<TransactionWithStatus> {
        if let Some(cached) = self.lock_state().query_result.clone().filter(|r| r.is_done()) {
            return Ok(cached);
        }
        let response = self.network_query(retries).await?;
        self.store_query_result(response.clone());
        Ok(response)
    }

    async fn network_query(&self, retries: u32) -> Result<TransactionWithStatus> {
        match self.network.query(retries).await {
            Ok(state) => state.response.ok_or_else(|| {
                TransferError::InternalError("network query returned no response".into())
            }),
            Err(e) if e.is_revert() => Ok(self
                .network
                .network_progress()
                .response
                .ok_or(e)?),
            Err(e) => Err(e),
        }
    }

    /// Recompute the status from the three legs
    ///
    /// First match wins: destination submitted, network terminal, origin
    /// confirmed, detected. Failing queries fall through to the next check.
    pub async fn refresh_status(&self) -> TransactionStatus {
        if let Some(out) = self.out.get() {
            let progress = match out.refresh().await {
                Ok(progress) => progress,
                Err(_) => out.progress(),
            };
            if progress.transaction.is_some() {
                return self.apply_status(TransactionStatus::Submitted, None);
            }
        }

        match self.query_tx(1).await {
            Ok(response) if response.is_terminal() => {
                if let Some(reason) = response.revert_reason() {
                    return self.apply_status(TransactionStatus::Reverted, Some(reason));
                }
                return self.apply_status(TransactionStatus::Signed, None);
            }
            Ok(_) => {}
            Err(e) => debug!(hash = %self.hash, error = %e, "Network status unavailable"),
        }

        let progress = match self.in_tx.refresh().await {
            Ok(progress) => progress,
            Err(e) => {
                debug!(hash = %self.hash, error = %e, "Origin status unavailable");
                self.in_tx.progress()
            }
        };
        let confirmed = progress.status == ChainTransactionStatus::Done
            || progress
                .confirmations
                .map(|c| c >= progress.target)
                .unwrap_or(false);
        if confirmed {
            return self.apply_status(TransactionStatus::Confirmed, None);
        }

        self.apply_status(TransactionStatus::Detected, None)
    }

    /// Make sure the network has signed the transaction
    ///
    /// Submits (or finds) the transaction, waits for a terminal result and
    /// prepares the destination leg. Fails on a network revert.
    pub async fn signed(&self) -> Result<TransactionWithStatus> {
        let response = match self.cached_terminal_result() {
            Some(response) => response,
            None => self.submit_and_wait().await?,
        };

        if let Some(reason) = response.revert_reason() {
            self.mark_reverted(reason.clone());
            return Err(TransferError::RenvmTransactionReverted(format!(
                "RenVM transaction reverted: {}",
                reason
            )));
        }

        self.store_query_result(response.clone());
        self.apply_status(TransactionStatus::Signed, None);
        self.on_signature_ready(&response).await?;
        Ok(response)
    }

    async fn submit_and_wait(&self) -> Result<TransactionWithStatus> {
        self.emit(TransactionEvent::TxHash(self.hash.clone()));

        if let Err(submit_err) = self.network.submit_tx().await {
            if submit_err.is_revert() {
                return Err(self.reverted_from_network(submit_err));
            }
            match self.network.query(1).await {
                Ok(_) => {}
                Err(e) if e.is_revert() => return Err(self.reverted_from_network(e)),
                Err(_) => {
                    warn!(hash = %self.hash, error = %submit_err, "Resubmitting to network");
                    self.network.resubmit(RESUBMIT_RETRIES).await?;
                }
            }
        }

        match self.network.wait().await {
            Ok(_) => {}
            Err(e) if e.is_revert() => return Err(self.reverted_from_network(e)),
            Err(e) => return Err(e),
        }

        self.network.network_progress().response.ok_or_else(|| {
            TransferError::InternalError("network wait finished without a response".into())
        })
    }

    fn reverted_from_network(&self, error: TransferError) -> TransferError {
        let reason = self
            .network
            .progress()
            .revert_reason
            .unwrap_or_else(|| error.to_string());
        self.mark_reverted(reason);
        error
    }

    /// Bind the destination leg once a signature exists (idempotent)
    async fn on_signature_ready(&self, response: &TransactionWithStatus) -> Result<()> {
        self.out
            .get_or_try_init(|| self.build_output(response))
            .await?;
        Ok(())
    }

    async fn build_output(&self, response: &TransactionWithStatus) -> Result<Arc<dyn TxSubmitter>> {
        let out = response.tx.out.as_ref().ok_or_else(|| {
            TransferError::InternalError("Expected output details in network response.".into())
        })?;

        // The network submitted the destination transaction itself
        if !out.txid.is_empty() {
            let txid = to_url_base64(&out.txid);
            let transaction = ChainTransaction {
                chain: self.to_chain.name().to_string(),
                txid,
                txindex: out.txindex,
                txid_formatted: self.to_chain.formatted_transaction_hash(&out.txid, out.txindex),
            };
            info!(
                hash = %self.hash,
                chain = %transaction.chain,
                txid = %transaction.txid_formatted,
                "Output submitted by network"
            );
            let waiter = DefaultTxWaiter::new(
                self.to_chain.clone(),
                Some(transaction),
                0,
                self.config.confirmation_poll_interval(),
            );
            return Ok(Arc::new(waiter));
        }

        let Some(contract) = self.to_chain.as_contract_chain() else {
            return Err(TransferError::InternalError(format!(
                "Unable to submit output to non-contract chain {}.",
                self.to_chain.name()
            )));
        };

        let signature = split_signature(&out.sig)?;
        let s_hash = keccak256(self.selector.as_bytes());
        let sig_hash = match <Bytes32>::try_from(out.sighash.as_slice()) {
            Ok(sig_hash) => sig_hash,
            Err(_) => generate_sighash(
                &self.p_hash,
                out.amount,
                &self.output_payload.to_bytes,
                &s_hash,
                &self.n_hash,
            )?,
        };

        let params = OutputParams {
            amount: out.amount,
            s_hash,
            p_hash: self.p_hash,
            n_hash: self.n_hash,
            sig_hash,
            signature,
        };

        debug!(hash = %self.hash, chain = %self.to_chain.name(), "Building output transaction");
        contract
            .submit_output(self.output_type, &self.params.asset, &self.params.to, params, 1)
            .await
    }
}

/// Split a 65-byte `r ‖ s ‖ v` signature, normalising `v` to 27/28
pub fn split_signature(signature: &[u8]) -> Result<RecoverableSignature> {
    if signature.len() != 65 {
        return Err(TransferError::ParameterError(format!(
            "Invalid signature length - {} instead of 65.",
            signature.len()
        )));
    }
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&signature[..32]);
    s.copy_from_slice(&signature[32..64]);
    let mut v = signature[64];
    if v < 27 {
        v += 27;
    }
    Ok(RecoverableSignature { r, s, v })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        done_response, init_test_logging, pending_response, reverted_response, MockContractChain,
        MockDepositBuilder, MockDepositChain, MockNetworkProvider,
    };
    use crate::types::ChainPayload;
    use alloy_primitives::U256;

    struct Fixture {
        provider: Arc<MockNetworkProvider>,
        bitcoin: Arc<MockDepositChain>,
        ethereum: Arc<MockContractChain>,
    }

    fn fixture() -> Fixture {
        init_test_logging();
        Fixture {
            provider: Arc::new(MockNetworkProvider::new()),
            bitcoin: Arc::new(MockDepositChain::bitcoin()),
            ethereum: Arc::new(MockContractChain::ethereum()),
        }
    }

    fn params() -> TransactionParams {
        TransactionParams {
            asset: "BTC".into(),
            from_tx: MockDepositBuilder::new().amount(U256::from(100_000u64)).build(),
            to: ChainPayload::new("Ethereum")
                .with_params(serde_json::json!({ "to": "0x00000000000000000000000000000000000000aa" })),
            shard: crate::types::Shard::new(vec![2u8; 33]),
            nonce: [0u8; 32],
            n_hash: None,
        }
    }

    async fn build(f: &Fixture, params: TransactionParams) -> Arc<GatewayTransaction> {
        PendingGatewayTransaction::new(
            f.provider.clone(),
            f.bitcoin.clone(),
            f.ethereum.clone(),
            params,
            EngineConfig::default(),
        )
        .initialize()
        .await
        .unwrap()
    }

    #[test]
    fn test_split_signature() {
        let mut sig = vec![1u8; 64];
        sig.push(1);
        let split = split_signature(&sig).unwrap();
        assert_eq!(split.r, [1u8; 32]);
        assert_eq!(split.v, 28);

        sig[64] = 27;
        assert_eq!(split_signature(&sig).unwrap().v, 27);
        assert!(split_signature(&sig[..64]).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hash_is_deterministic() {
        let f = fixture();
        let a = build(&f, params()).await;
        let b = build(&f, params()).await;
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.n_hash(), b.n_hash());

        let mut other = params();
        other.nonce = [1u8; 32];
        let c = build(&f, other).await;
        assert_ne!(a.hash(), c.hash());
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_n_hash_is_used() {
        let f = fixture();
        let mut p = params();
        p.n_hash = Some([9u8; 32]);
        let tx = build(&f, p).await;
        assert_eq!(tx.n_hash(), &[9u8; 32]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_never_regresses() {
        let f = fixture();
        let tx = build(&f, params()).await;
        assert_eq!(tx.status(), TransactionStatus::Detected);

        f.bitcoin.set_confirmations(6);
        assert_eq!(tx.refresh_status().await, TransactionStatus::Confirmed);

        // A pending network result on its own would only mean Detected
        f.provider.push_query_response(Ok(pending_response(tx.hash())));
        assert_eq!(tx.refresh_status().await, TransactionStatus::Confirmed);

        f.provider.push_query_response(Ok(done_response(tx.hash())));
        assert_eq!(tx.refresh_status().await, TransactionStatus::Signed);

        // Stale pending result after the signature was observed
        f.provider.push_query_response(Ok(pending_response(tx.hash())));
        f.bitcoin.set_confirmations(0);
        assert_eq!(tx.refresh_status().await, TransactionStatus::Signed);
        assert_eq!(tx.status(), TransactionStatus::Signed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_is_terminal() {
        let f = fixture();
        let tx = build(&f, params()).await;

        f.provider.push_query_response(Ok(reverted_response(tx.hash(), "bad nonce")));
        assert_eq!(tx.refresh_status().await, TransactionStatus::Reverted);
        assert_eq!(tx.revert_reason().as_deref(), Some("bad nonce"));

        f.provider.push_query_response(Ok(done_response(tx.hash())));
        assert_eq!(tx.refresh_status().await, TransactionStatus::Reverted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signed_binds_output() {
        let f = fixture();
        let tx = build(&f, params()).await;
        let mut events = tx.subscribe();

        let response = tx.signed().await.unwrap();
        assert!(response.is_done());
        assert_eq!(tx.status(), TransactionStatus::Signed);
        assert!(tx.out().is_some());
        assert_eq!(f.ethereum.outputs_built(), 1);

        // Idempotent
        tx.signed().await.unwrap();
        assert_eq!(f.ethereum.outputs_built(), 1);

        let first = events.recv().await.unwrap();
        assert_eq!(first, TransactionEvent::TxHash(tx.hash().to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signed_reverted() {
        let f = fixture();
        let tx = build(&f, params()).await;
        f.provider.revert_all("insufficient funds");

        let err = tx.signed().await.unwrap_err();
        assert!(err.is_revert());
        assert_eq!(tx.status(), TransactionStatus::Reverted);
        assert_eq!(tx.revert_reason().as_deref(), Some("insufficient funds"));
        assert!(tx.out().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_paid_output_uses_passive_waiter() {
        let f = fixture();
        let tx = build(&f, params()).await;
        f.provider.set_output_txid(vec![0xab; 32], 1);

        tx.signed().await.unwrap();
        let out = tx.out().unwrap();
        assert_eq!(out.chain(), "Ethereum");
        assert_eq!(out.progress().transaction.unwrap().txindex, 1);
        assert_eq!(f.ethereum.outputs_built(), 0);
        assert_eq!(tx.refresh_status().await, TransactionStatus::Submitted);
    }
}
