//! Gateway: one (asset, from, to, nonce) transfer channel
//!
//! A gateway derives its identity and, for deposit-style origins, a deposit
//! address registered with the network. Deposits found on the origin chain
//! (or inputs reported by a contract origin) become [`GatewayTransaction`]s.
//!
//! ## Deduplication
//!
//! Transactions are keyed by `"{txid}_{txindex}"`. The map entry is inserted
//! under a lock before any suspension point; construction runs at most once
//! per entry and its outcome, success or failure, is shared by every caller
//! waiting on that entry. A failed entry is then dropped, so only a later
//! report builds again.
//!
//! ## Events
//!
//! [`Gateway::subscribe`] replays every published transaction before
//! streaming new ones. The deposit watch only polls the origin chain while
//! at least one subscription is alive.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::Stream;
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, error, info, warn};

use crate::cancel::CancellationContext;
use crate::chain::{Chain, DepositListener, InputCallback, InputParams, InputParamsFn, OutputPayload};
use crate::config::EngineConfig;
use crate::error::{Result, TransferError};
use crate::fees::{estimate_transaction_fee, GatewayFees};
use crate::hash::{generate_g_hash, generate_p_hash, generate_s_hash};
use crate::provider::{GatewayDetails, NetworkProvider};
use crate::redact::redact_url;
use crate::retry::with_retry;
use crate::selector::classify;
use crate::transaction::{GatewayTransaction, PendingGatewayTransaction};
use crate::tx::{SetupMap, TxSubmitter};
use crate::types::{
    Bytes32, GatewayParams, InputChainTransaction, InputType, OutputType, Shard,
    TransactionParams, ZERO_BYTES32,
};

/// Capacity of the transaction event channel
const EVENT_CAPACITY: usize = 256;

/// Timeout of the best-effort registration mirror
const MIRROR_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Transaction Map
// ============================================================================

struct DepositEntry {
    /// Outcome of the one construction for this deposit
    transaction: OnceCell<Result<Arc<GatewayTransaction>>>,
    published: AtomicBool,
}

#[derive(Default)]
struct TransactionMap {
    /// Deposit ids in first-seen order
    order: Vec<String>,
    entries: HashMap<String, Arc<DepositEntry>>,
}

impl TransactionMap {
    /// Existing entry for `id`, or a fresh one
    fn entry(&mut self, id: &str) -> Arc<DepositEntry> {
        if let Some(entry) = self.entries.get(id) {
            return entry.clone();
        }
        let entry = Arc::new(DepositEntry {
            transaction: OnceCell::new(),
            published: AtomicBool::new(false),
        });
        self.order.push(id.to_string());
        self.entries.insert(id.to_string(), entry.clone());
        entry
    }

    fn remove(&mut self, id: &str, entry: &Arc<DepositEntry>) {
        let current = self.entries.get(id).is_some_and(|e| Arc::ptr_eq(e, entry));
        if current {
            self.entries.remove(id);
            self.order.retain(|o| o != id);
        }
    }

    fn published(&self) -> Vec<Arc<GatewayTransaction>> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .filter(|e| e.published.load(Ordering::SeqCst))
            .filter_map(|e| e.transaction.get().and_then(|r| r.as_ref().ok()).cloned())
            .collect()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Stream of a gateway's transactions, history first
pub struct TransactionSubscription {
    replay: VecDeque<Arc<GatewayTransaction>>,
    receiver: broadcast::Receiver<Arc<GatewayTransaction>>,
}

impl TransactionSubscription {
    /// Next transaction; `None` once the gateway is gone
    pub async fn next(&mut self) -> Option<Arc<GatewayTransaction>> {
        if let Some(tx) = self.replay.pop_front() {
            return Some(tx);
        }
        loop {
            match self.receiver.recv().await {
                Ok(tx) => return Some(tx),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Transaction subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Arc<GatewayTransaction>> {
        futures::stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|tx| (tx, sub))
        })
    }
}

// ============================================================================
// Construction
// ============================================================================

/// A gateway that has not been initialized yet
pub struct PendingGateway {
    provider: Arc<dyn NetworkProvider>,
    from_chain: Arc<dyn Chain>,
    to_chain: Arc<dyn Chain>,
    params: GatewayParams,
    config: EngineConfig,
}

impl PendingGateway {
    pub fn new(
        provider: Arc<dyn NetworkProvider>,
        from_chain: Arc<dyn Chain>,
        to_chain: Arc<dyn Chain>,
        params: GatewayParams,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            from_chain,
            to_chain,
            params,
            config,
        }
    }

    /// Derive the gateway, register it and start watching for deposits
    pub async fn initialize(self) -> Result<Arc<Gateway>> {
        let PendingGateway {
            provider,
            from_chain,
            to_chain,
            mut params,
            config,
        } = self;
        let asset = params.asset.clone();

        let classification = classify(&asset, from_chain.as_ref(), to_chain.as_ref()).await?;
        let (input_type, output_type) = (classification.input_type, classification.output_type);

        if output_type == OutputType::Release && from_chain.as_contract_chain().is_none() {
            return Err(TransferError::ParameterError(format!(
                "Cannot release from non-contract chain {}",
                from_chain.name()
            )));
        }
        if output_type == OutputType::Mint && to_chain.as_contract_chain().is_none() {
            return Err(TransferError::ParameterError(format!(
                "Cannot mint {} to non-contract chain {}",
                asset,
                to_chain.name()
            )));
        }

        let deposit_and_shard = async {
            let is_deposit_asset = match from_chain.as_deposit_chain() {
                Some(chain) => chain.is_deposit_asset(&asset).await?,
                None => false,
            };
            let shard = match params.shard.clone() {
                Some(shard) => shard,
                None if input_type == InputType::Lock && is_deposit_asset => {
                    provider.select_shard(&asset).await?
                }
                None => Shard::default(),
            };
            Ok::<_, TransferError>((is_deposit_asset, shard))
        };

        let (fees, confirmation_target, (is_deposit_asset, shard), payload) = tokio::try_join!(
            estimate_transaction_fee(provider.as_ref(), &asset, from_chain.as_ref(), to_chain.as_ref()),
            provider.get_confirmation_target(from_chain.name()),
            deposit_and_shard,
            to_chain.get_output_payload(&asset, input_type, output_type, &params.to),
        )?;
        params.shard = Some(shard.clone());

        if !provider.selector_whitelisted(&classification.selector).await? {
            return Err(TransferError::ParameterError(format!(
                "Selector {} is not whitelisted by the network.",
                classification.selector
            )));
        }

        let p_hash = generate_p_hash(&payload.payload);
        let s_hash = generate_s_hash(&format!("{}/to{}", asset, params.to.chain));

        // Deposit-style origin: derive and register the deposit address
        let mut g_hash = None;
        let mut gateway_address = None;
        if let (Some(deposit_chain), true) = (from_chain.as_deposit_chain(), is_deposit_asset) {
            if to_chain.as_contract_chain().is_none() {
                return Err(TransferError::ParameterError(format!(
                    "Cannot mint {} to non-contract chain {}.",
                    asset,
                    to_chain.name()
                )));
            }
            if shard.is_empty() {
                return Err(TransferError::NetworkError(
                    "Unable to fetch RenVM shard public key.".into(),
                ));
            }

            let hash = generate_g_hash(&p_hash, &s_hash, &payload.to_bytes, &params.nonce);
            let address = deposit_chain
                .create_gateway_address(&asset, &params.from, &shard.g_pub_key, &hash)
                .await?;

            let details = GatewayDetails {
                selector: classification.selector.clone(),
                payload: payload.payload.clone(),
                p_hash,
                to: payload.to.clone(),
                nonce: params.nonce,
                n_hash: ZERO_BYTES32,
                g_pub_key: shard.g_pub_key.clone(),
                g_hash: hash,
            };

            if let Some(endpoint) = config.secondary_gateway_endpoint.clone() {
                mirror_registration(endpoint, address.clone(), details.clone());
            }

            with_retry(&config.gateway_submit_retry(), "submit_gateway", || {
                provider.submit_gateway(&address, &details)
            })
            .await
            .map_err(|e| {
                TransferError::GatewaySubmissionFailed(format!(
                    "Error submitting gateway details: {}",
                    e
                ))
            })?;

            debug!(address = %address, selector = %classification.selector, "Gateway registered");
            g_hash = Some(hash);
            gateway_address = Some(address);
        }

        // Contract origin: inputs are reported back through `on_input`
        let relay = Arc::new(InputRelay::default());
        let (in_tx, in_setup) = match from_chain.as_contract_chain() {
            Some(contract) => {
                let input_params: InputParamsFn = {
                    let to_chain = params.to.chain.clone();
                    let to_payload = payload.clone();
                    let gateway_address = gateway_address.clone();
                    Arc::new(move || InputParams {
                        to_chain: to_chain.clone(),
                        to_payload: to_payload.clone(),
                        gateway_address: gateway_address.clone(),
                    })
                };
                let on_input: InputCallback = {
                    let relay = relay.clone();
                    Arc::new(move |input: InputChainTransaction| relay.report(input))
                };

                let in_tx = contract
                    .get_input_tx(
                        input_type,
                        output_type,
                        &asset,
                        &params.from,
                        input_params.clone(),
                        confirmation_target,
                        on_input,
                    )
                    .await?;
                let in_setup = contract
                    .get_in_setup(&asset, input_type, output_type, &params.from, input_params)
                    .await?;
                (Some(in_tx), in_setup)
            }
            None => (None, SetupMap::new()),
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let gateway = Arc::new(Gateway {
            provider,
            from_chain,
            to_chain,
            params,
            config,
            selector: classification.selector,
            input_type,
            output_type,
            confirmation_target,
            fees,
            shard,
            output_payload: payload,
            p_hash,
            s_hash,
            g_hash,
            gateway_address,
            in_tx,
            in_setup,
            transactions: Mutex::new(TransactionMap::default()),
            events,
        });
        relay.attach(&gateway);

        info!(
            asset = %gateway.params.asset,
            from = %gateway.from_chain.name(),
            to = %gateway.to_chain.name(),
            selector = %gateway.selector,
            address = ?gateway.gateway_address,
            "Gateway created"
        );

        gateway.spawn_deposit_watch();
        Ok(gateway)
    }
}

// ============================================================================
// Input Relay
// ============================================================================

/// Routes inputs from a contract origin to the gateway
///
/// Inputs reported before the gateway exists (for example from inside
/// `get_input_tx`) are held and replayed by `attach`.
#[derive(Default)]
struct InputRelay {
    state: Mutex<RelayState>,
}

#[derive(Default)]
struct RelayState {
    gateway: Option<Weak<Gateway>>,
    early: Vec<InputChainTransaction>,
}

impl InputRelay {
    fn lock_state(&self) -> MutexGuard<'_, RelayState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn report(&self, input: InputChainTransaction) {
        let gateway = {
            let mut state = self.lock_state();
            match state.gateway.clone() {
                Some(weak) => weak.upgrade(),
                None => {
                    debug!(deposit = %input.deposit_id(), "Holding input until gateway is ready");
                    state.early.push(input);
                    return;
                }
            }
        };
        match gateway {
            Some(gateway) => spawn_process_input(gateway, input),
            None => debug!(deposit = %input.deposit_id(), "Input reported after gateway was dropped"),
        }
    }

    fn attach(&self, gateway: &Arc<Gateway>) {
        let early = {
            let mut state = self.lock_state();
            state.gateway = Some(Arc::downgrade(gateway));
            std::mem::take(&mut state.early)
        };
        for input in early {
            spawn_process_input(gateway.clone(), input);
        }
    }
}

fn spawn_process_input(gateway: Arc<Gateway>, input: InputChainTransaction) {
    tokio::spawn(async move {
        if let Err(e) = gateway.process_deposit(input).await {
            error!(error = %e, "Failed to process input");
        }
    });
}

/// Post the registration to the secondary endpoint, ignoring any failure
fn mirror_registration(endpoint: String, address: String, details: GatewayDetails) {
    tokio::spawn(async move {
        let client = match reqwest::Client::builder().timeout(MIRROR_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                debug!(error = %e, "Failed to create mirror client");
                return;
            }
        };
        let body = serde_json::json!({
            "gateway": address,
            "gatewayDetails": details,
        });
        match client.post(&endpoint).json(&body).send().await {
            Ok(response) => {
                debug!(endpoint = %redact_url(&endpoint), status = %response.status(), "Gateway mirrored")
            }
            Err(e) => debug!(endpoint = %redact_url(&endpoint), error = %e, "Gateway mirror failed"),
        }
    });
}

// ============================================================================
// Ready Gateway
// ============================================================================

pub struct Gateway {
    provider: Arc<dyn NetworkProvider>,
    from_chain: Arc<dyn Chain>,
    to_chain: Arc<dyn Chain>,
    params: GatewayParams,
    config: EngineConfig,

    selector: String,
    input_type: InputType,
    output_type: OutputType,
    confirmation_target: u64,
    fees: GatewayFees,
    shard: Shard,
    output_payload: OutputPayload,
    p_hash: Bytes32,
    s_hash: Bytes32,
    g_hash: Option<Bytes32>,
    gateway_address: Option<String>,

    in_tx: Option<Arc<dyn TxSubmitter>>,
    in_setup: SetupMap,

    transactions: Mutex<TransactionMap>,
    events: broadcast::Sender<Arc<GatewayTransaction>>,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("asset", &self.params.asset)
            .field("from", &self.from_chain.name())
            .field("to", &self.to_chain.name())
            .field("selector", &self.selector)
            .field("gateway_address", &self.gateway_address)
            .field("confirmation_target", &self.confirmation_target)
            .finish()
    }
}

impl Gateway {
    // ========================================================================
    // Accessors
    // ========================================================================

    /// Parameters with the selected shard filled in
    pub fn params(&self) -> &GatewayParams {
        &self.params
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn input_type(&self) -> InputType {
        self.input_type
    }

    pub fn output_type(&self) -> OutputType {
        self.output_type
    }

    pub fn confirmation_target(&self) -> u64 {
        self.confirmation_target
    }

    pub fn fees(&self) -> &GatewayFees {
        &self.fees
    }

    pub fn output_payload(&self) -> &OutputPayload {
        &self.output_payload
    }

    pub fn p_hash(&self) -> &Bytes32 {
        &self.p_hash
    }

    pub fn s_hash(&self) -> &Bytes32 {
        &self.s_hash
    }

    /// Only set for deposit-style origins
    pub fn g_hash(&self) -> Option<&Bytes32> {
        self.g_hash.as_ref()
    }

    /// Deposit address; only set for deposit-style origins
    pub fn gateway_address(&self) -> Option<&str> {
        self.gateway_address.as_deref()
    }

    /// Origin transaction built by a contract origin
    pub fn in_tx(&self) -> Option<&Arc<dyn TxSubmitter>> {
        self.in_tx.as_ref()
    }

    /// Setup transactions to run before `in_tx`
    pub fn in_setup(&self) -> &SetupMap {
        &self.in_setup
    }

    /// Transactions published so far, in detection order
    pub fn transactions(&self) -> Vec<Arc<GatewayTransaction>> {
        self.lock_transactions().published()
    }

    /// Number of live subscriptions
    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Subscribe to transactions, replaying those already published
    pub fn subscribe(&self) -> TransactionSubscription {
        // Snapshot and subscribe under one lock so nothing is missed or doubled
        let map = self.lock_transactions();
        let replay = map.published().into();
        let receiver = self.events.subscribe();
        drop(map);
        TransactionSubscription { replay, receiver }
    }

    fn lock_transactions(&self) -> MutexGuard<'_, TransactionMap> {
        match self.transactions.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn publish(&self, entry: &DepositEntry, tx: &Arc<GatewayTransaction>) {
        let map = self.lock_transactions();
        if !entry.published.swap(true, Ordering::SeqCst) {
            // No receivers is fine
            let _ = self.events.send(tx.clone());
        }
        drop(map);
    }

    // ========================================================================
    // Deposits
    // ========================================================================

    /// Turn a deposit into its transfer transaction
    ///
    /// Repeated and concurrent calls for the same `txid`/`txindex` return the
    /// same transaction. Callers waiting on a failed construction all get its
    /// error; the deposit is then forgotten so a later report can retry.
    pub async fn process_deposit(
        &self,
        deposit: InputChainTransaction,
    ) -> Result<Arc<GatewayTransaction>> {
        let id = deposit.deposit_id();
        let entry = self.lock_transactions().entry(&id);

        let result = entry
            .transaction
            .get_or_init(|| self.build_transaction(deposit))
            .await
            .clone();

        match result {
            Ok(tx) => {
                self.publish(&entry, &tx);
                Ok(tx)
            }
            Err(e) => {
                self.lock_transactions().remove(&id, &entry);
                warn!(deposit = %id, error = %e, "Failed to process deposit");
                Err(e.with_context(format!("deposit {}", id)))
            }
        }
    }

    async fn build_transaction(
        &self,
        deposit: InputChainTransaction,
    ) -> Result<Arc<GatewayTransaction>> {
        let nonce = deposit.nonce.unwrap_or(self.params.nonce);
        let reuse_in_tx = self.in_tx.as_ref().filter(|in_tx| {
            in_tx.progress().transaction.is_some_and(|t| {
                t.txid == deposit.tx.txid && t.txindex == deposit.tx.txindex
            })
        });

        let params = TransactionParams {
            asset: self.params.asset.clone(),
            from_tx: deposit,
            to: self.params.to.clone(),
            shard: self.shard.clone(),
            nonce,
            n_hash: None,
        };

        let mut pending = PendingGatewayTransaction::new(
            self.provider.clone(),
            self.from_chain.clone(),
            self.to_chain.clone(),
            params,
            self.config.clone(),
        )
        .with_confirmation_target(self.confirmation_target);
        if let Some(in_tx) = reuse_in_tx {
            pending = pending.with_input_tx(in_tx.clone());
        }

        let tx = pending.initialize().await?;
        info!(
            hash = %tx.hash(),
            deposit = %tx.params().from_tx.deposit_id(),
            amount = %tx.params().from_tx.amount,
            "New transaction"
        );
        Ok(tx)
    }

    // ========================================================================
    // Deposit Watch
    // ========================================================================

    fn spawn_deposit_watch(self: &Arc<Self>) {
        let Some(address) = self.gateway_address.clone() else {
            return;
        };
        let weak = Arc::downgrade(self);
        let from_chain = self.from_chain.clone();
        let asset = self.params.asset.clone();
        let from = self.params.from.clone();
        let listener_poll = self.config.listener_poll_interval();
        let network_delay = self.config.network_delay();

        tokio::spawn(async move {
            let Some(deposit_chain) = from_chain.as_deposit_chain() else {
                return;
            };
            let listener = DepositForwarder {
                gateway: weak.clone(),
            };

            loop {
                let idle = match weak.upgrade() {
                    Some(gateway) => gateway.listener_count() == 0,
                    None => return,
                };
                if idle {
                    tokio::time::sleep(listener_poll).await;
                    continue;
                }

                let cancel = {
                    let weak = weak.clone();
                    CancellationContext::with_predicate(move || {
                        weak.upgrade()
                            .map(|gateway| gateway.listener_count() == 0)
                            .unwrap_or(true)
                    })
                };

                debug!(address = %address, "Watching for deposits");
                if let Err(e) = deposit_chain
                    .watch_for_deposits(&asset, &from, &address, &listener, &cancel)
                    .await
                {
                    error!(address = %address, error = %e, "Deposit watch failed");
                }
                tokio::time::sleep(network_delay).await;
            }
        });
    }
}

/// Forwards deposits from the chain watcher to the gateway
struct DepositForwarder {
    gateway: Weak<Gateway>,
}

impl DepositListener for DepositForwarder {
    fn on_deposit(&self, deposit: InputChainTransaction) {
        let Some(gateway) = self.gateway.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = gateway.process_deposit(deposit).await {
                error!(error = %e, "Failed to process deposit");
            }
        });
    }

    fn on_cancel(&self, deposit: &InputChainTransaction) {
        debug!(deposit = %deposit.deposit_id(), "Deposit cancelled by origin chain");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        init_test_logging, MockContractChain, MockDepositBuilder, MockDepositChain,
        MockNetworkProvider,
    };
    use crate::types::ChainPayload;
    use alloy_primitives::U256;

    const RECIPIENT: &str = "0x00000000000000000000000000000000000000aa";

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

    fn lock_params() -> GatewayParams {
        GatewayParams::new(
            "BTC",
            ChainPayload::new("Bitcoin"),
            ChainPayload::new("Ethereum").with_params(serde_json::json!({ "to": RECIPIENT })),
        )
    }

    async fn lock_gateway(f: &Fixture) -> Result<Arc<Gateway>> {
        PendingGateway::new(
            f.provider.clone(),
            f.bitcoin.clone(),
            f.ethereum.clone(),
            lock_params(),
            EngineConfig::default(),
        )
        .initialize()
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_and_mint_gateway() {
        let f = fixture();
        f.provider.set_confirmation_target(3);
        let gateway = lock_gateway(&f).await.unwrap();

        assert_eq!(gateway.input_type(), InputType::Lock);
        assert_eq!(gateway.output_type(), OutputType::Mint);
        assert_eq!(gateway.selector(), "BTC/toEthereum");
        assert_eq!(gateway.confirmation_target(), 3);
        assert!(!gateway.gateway_address().unwrap().is_empty());
        assert_eq!(f.bitcoin.address_calls(), 1);
        assert!(gateway.g_hash().is_some());
        assert!(gateway.fees().minimum_amount > U256::ZERO);
        assert!(gateway.in_tx().is_none());

        let registered = f.provider.registered_gateways();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].0, gateway.gateway_address().unwrap());
        assert_eq!(registered[0].1.n_hash, ZERO_BYTES32);
        assert_eq!(&registered[0].1.g_hash, gateway.g_hash().unwrap());

        // Deposits wait for the gateway's target
        let tx = gateway
            .process_deposit(MockDepositBuilder::new().build())
            .await
            .unwrap();
        assert_eq!(tx.in_tx().progress().target, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_params_same_address() {
        let f = fixture();
        let a = lock_gateway(&f).await.unwrap();
        let b = lock_gateway(&f).await.unwrap();
        assert_eq!(a.gateway_address(), b.gateway_address());

        let other = PendingGateway::new(
            f.provider.clone(),
            f.bitcoin.clone(),
            f.ethereum.clone(),
            lock_params().with_nonce([1u8; 32]),
            EngineConfig::default(),
        )
        .initialize()
        .await
        .unwrap();
        assert_ne!(a.gateway_address(), other.gateway_address());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_deposits_are_deduplicated() {
        let f = fixture();
        let gateway = lock_gateway(&f).await.unwrap();
        let payload_calls = f.ethereum.output_payload_calls();

        let deposit = MockDepositBuilder::new().build();
        let (a, b) = tokio::join!(
            gateway.process_deposit(deposit.clone()),
            gateway.process_deposit(deposit.clone()),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(f.ethereum.output_payload_calls(), payload_calls + 1);

        let c = gateway.process_deposit(deposit).await.unwrap();
        assert!(Arc::ptr_eq(&a, &c));
        assert_eq!(gateway.transactions().len(), 1);

        let other = gateway
            .process_deposit(MockDepositBuilder::new().txindex(1).build())
            .await
            .unwrap();
        assert_ne!(a.hash(), other.hash());
        assert_eq!(gateway.transactions().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_deposit_is_forgotten() {
        let f = fixture();
        let gateway = lock_gateway(&f).await.unwrap();

        let mut deposit = MockDepositBuilder::new().build();
        deposit.tx.txid = "***".into();
        let err = gateway.process_deposit(deposit).await.unwrap_err();
        assert!(err.to_string().starts_with("deposit ***_0: "));
        assert!(gateway.transactions().is_empty());
        assert!(gateway.lock_transactions().entries.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_share_a_failed_construction() {
        let f = fixture();
        let gateway = lock_gateway(&f).await.unwrap();
        let mut subscription = gateway.subscribe();
        f.ethereum.fail_output_payloads(1, Duration::from_secs(1));

        let deposit = MockDepositBuilder::new().build();
        let (a, b) = tokio::join!(
            gateway.process_deposit(deposit.clone()),
            gateway.process_deposit(deposit.clone()),
        );
        let (a, b) = (a.unwrap_err(), b.unwrap_err());
        assert_eq!(a, b);
        assert!(matches!(a, TransferError::NetworkError(_)));
        assert!(gateway.transactions().is_empty());
        assert!(gateway.lock_transactions().entries.is_empty());

        // A later report builds it once, and it is published once
        let c = gateway.process_deposit(deposit.clone()).await.unwrap();
        let d = gateway.process_deposit(deposit).await.unwrap();
        assert!(Arc::ptr_eq(&c, &d));
        assert_eq!(gateway.transactions().len(), 1);
        assert!(Arc::ptr_eq(&gateway.transactions()[0], &c));

        assert!(Arc::ptr_eq(&subscription.next().await.unwrap(), &c));
        assert!(subscription.receiver.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_subscriber_sees_history() {
        let f = fixture();
        let gateway = lock_gateway(&f).await.unwrap();
        let first = gateway
            .process_deposit(MockDepositBuilder::new().build())
            .await
            .unwrap();

        let mut subscription = gateway.subscribe();
        let second = gateway
            .process_deposit(MockDepositBuilder::new().txindex(1).build())
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&subscription.next().await.unwrap(), &first));
        assert!(Arc::ptr_eq(&subscription.next().await.unwrap(), &second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_only_runs_with_subscribers() {
        let f = fixture();
        let gateway = lock_gateway(&f).await.unwrap();
        f.bitcoin.add_deposit(MockDepositBuilder::new().build());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(f.bitcoin.watch_calls(), 0);

        let mut subscription = gateway.subscribe();
        let tx = tokio::time::timeout(Duration::from_secs(30), subscription.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.params().from_tx.tx.txindex, 0);
        assert_eq!(f.bitcoin.watch_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_retries_after_error() {
        let f = fixture();
        f.bitcoin.fail_watches(1);
        let gateway = lock_gateway(&f).await.unwrap();
        let mut subscription = gateway.subscribe();
        f.bitcoin.add_deposit(MockDepositBuilder::new().build());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(f.bitcoin.watch_calls(), 1);
        assert!(gateway.transactions().is_empty());

        // Next attempt after the network delay
        let tx = tokio::time::timeout(Duration::from_secs(30), subscription.next())
            .await
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&tx, &gateway.transactions()[0]));
        assert_eq!(f.bitcoin.watch_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_stops_without_subscribers() {
        let f = fixture();
        let gateway = lock_gateway(&f).await.unwrap();
        let mut subscription = gateway.subscribe();
        f.bitcoin.add_deposit(MockDepositBuilder::new().build());

        tokio::time::timeout(Duration::from_secs(30), subscription.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(f.bitcoin.active_watches(), 1);

        drop(subscription);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(gateway.listener_count(), 0);
        assert_eq!(f.bitcoin.active_watches(), 0);
        assert_eq!(f.bitcoin.watch_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_reported_during_setup_is_kept() {
        let f = fixture();
        let burn = MockDepositBuilder::new()
            .chain("Ethereum")
            .txid(&[0xcc; 32])
            .nonce([7u8; 32])
            .build();
        let ethereum = Arc::new(
            MockContractChain::ethereum()
                .with_burn(burn)
                .report_burn_on_create(),
        );
        let params = GatewayParams::new(
            "BTC",
            ChainPayload::new("Ethereum"),
            ChainPayload::new("Bitcoin").with_params(serde_json::json!({ "to": "miMi2VET41YV1j6SDNTeZoPBbmH8B4nEx6" })),
        );
        let gateway = PendingGateway::new(
            f.provider.clone(),
            ethereum.clone(),
            f.bitcoin.clone(),
            params,
            EngineConfig::default(),
        )
        .initialize()
        .await
        .unwrap();

        let mut subscription = gateway.subscribe();
        let tx = tokio::time::timeout(Duration::from_secs(5), subscription.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.params().nonce, [7u8; 32]);
        assert_eq!(ethereum.input_txs()[0].submit_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burn_gateway_reuses_input() {
        let f = fixture();
        let burn = MockDepositBuilder::new()
            .chain("Ethereum")
            .txid(&[0xbb; 32])
            .nonce([7u8; 32])
            .build();
        let ethereum = Arc::new(MockContractChain::ethereum().with_burn(burn));
        let params = GatewayParams::new(
            "BTC",
            ChainPayload::new("Ethereum"),
            ChainPayload::new("Bitcoin").with_params(serde_json::json!({ "to": "miMi2VET41YV1j6SDNTeZoPBbmH8B4nEx6" })),
        );
        let gateway = PendingGateway::new(
            f.provider.clone(),
            ethereum.clone(),
            f.bitcoin.clone(),
            params,
            EngineConfig::default(),
        )
        .initialize()
        .await
        .unwrap();

        assert_eq!(gateway.input_type(), InputType::Burn);
        assert_eq!(gateway.selector(), "BTC/fromEthereum");
        assert!(gateway.gateway_address().is_none());
        assert!(gateway.params().shard.as_ref().unwrap().is_empty());

        let mut subscription = gateway.subscribe();
        let in_tx = gateway.in_tx().unwrap().clone();
        in_tx.submit().await.unwrap();

        let tx = subscription.next().await.unwrap();
        assert_eq!(tx.params().nonce, [7u8; 32]);
        assert_eq!(
            Arc::as_ptr(tx.in_tx()) as *const (),
            Arc::as_ptr(&in_tx) as *const ()
        );

        let input_params = ethereum.input_txs()[0].input_params().unwrap();
        assert_eq!(input_params.to_chain, "Bitcoin");
        assert!(input_params.gateway_address.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_selector_not_whitelisted() {
        let f = fixture();
        f.provider.block_selector("BTC/toEthereum");
        let err = lock_gateway(&f).await.unwrap_err();
        assert!(matches!(err, TransferError::ParameterError(_)));
        assert!(f.provider.registered_gateways().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_shard_is_network_error() {
        let f = fixture();
        f.provider.set_shard(Shard::default());
        let err = lock_gateway(&f).await.unwrap_err();
        assert!(matches!(err, TransferError::NetworkError(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_failure_is_fatal() {
        let f = fixture();
        f.provider.fail_gateway_submissions(5);
        let err = lock_gateway(&f).await.unwrap_err();
        assert!(matches!(err, TransferError::GatewaySubmissionFailed(_)));
        assert!(err.to_string().starts_with("Error submitting gateway details: "));
        assert_eq!(f.provider.gateway_submit_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_recovers_within_budget() {
        let f = fixture();
        f.provider.fail_gateway_submissions(4);
        lock_gateway(&f).await.unwrap();
        assert_eq!(f.provider.gateway_submit_count(), 5);
        assert_eq!(f.provider.registered_gateways().len(), 1);
    }
}
