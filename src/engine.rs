//! Transfer engine facade
//!
//! Holds the network provider, the chains known to the integrator and the
//! engine configuration, and builds gateways and transactions from their
//! serializable parameters.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::chain::Chain;
use crate::config::EngineConfig;
use crate::error::{Result, TransferError};
use crate::fees::{estimate_transaction_fee, GatewayFees};
use crate::gateway::{Gateway, PendingGateway};
use crate::handler::TransactionHandler;
use crate::provider::NetworkProvider;
use crate::transaction::{GatewayTransaction, PendingGatewayTransaction};
use crate::types::{GatewayParams, TransactionParams};

pub struct TransferEngine {
    provider: Arc<dyn NetworkProvider>,
    chains: HashMap<String, Arc<dyn Chain>>,
    config: EngineConfig,
}

impl fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chains: Vec<&String> = self.chains.keys().collect();
        chains.sort();
        f.debug_struct("TransferEngine")
            .field("chains", &chains)
            .field("config", &self.config)
            .finish()
    }
}

impl TransferEngine {
    pub fn new(provider: Arc<dyn NetworkProvider>, config: EngineConfig) -> Self {
        Self {
            provider,
            chains: HashMap::new(),
            config,
        }
    }

    /// Register a chain under its own name, replacing any previous one
    pub fn with_chain(mut self, chain: Arc<dyn Chain>) -> Self {
        debug!(chain = %chain.name(), "Registered chain");
        self.chains.insert(chain.name().to_string(), chain);
        self
    }

    pub fn get_chain(&self, name: &str) -> Result<Arc<dyn Chain>> {
        self.chains.get(name).cloned().ok_or_else(|| {
            TransferError::ParameterError(format!(
                "Chain {} not found. (Must be one of {})",
                name,
                self.chain_names().join(", ")
            ))
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Default lifecycle driver using the engine configuration
    pub fn transaction_handler(&self) -> TransactionHandler {
        TransactionHandler::new(&self.config)
    }

    fn chain_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.chains.keys().cloned().collect();
        names.sort();
        names
    }

    /// Create and initialize a gateway
    pub async fn gateway(&self, params: GatewayParams) -> Result<Arc<Gateway>> {
        let from = self.get_chain(&params.from.chain)?;
        let to = self.get_chain(&params.to.chain)?;
        PendingGateway::new(self.provider.clone(), from, to, params, self.config.clone())
            .initialize()
            .await
    }

    /// Resume a transaction from persisted parameters
    pub async fn gateway_transaction(
        &self,
        params: TransactionParams,
    ) -> Result<Arc<GatewayTransaction>> {
        let from = self.get_chain(&params.from_tx.tx.chain)?;
        let to = self.get_chain(&params.to.chain)?;
        PendingGatewayTransaction::new(self.provider.clone(), from, to, params, self.config.clone())
            .initialize()
            .await
    }

    /// Fee schedule for moving `asset` between two registered chains
    pub async fn get_fees(&self, asset: &str, from: &str, to: &str) -> Result<GatewayFees> {
        let from = self.get_chain(from)?;
        let to = self.get_chain(to)?;
        estimate_transaction_fee(self.provider.as_ref(), asset, from.as_ref(), to.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockContractChain, MockDepositBuilder, MockDepositChain, MockNetworkProvider};
    use crate::types::{ChainPayload, Shard, TransactionStatus};
    use alloy_primitives::U256;

    fn engine() -> TransferEngine {
        TransferEngine::new(Arc::new(MockNetworkProvider::new()), EngineConfig::default())
            .with_chain(Arc::new(MockDepositChain::bitcoin()))
            .with_chain(Arc::new(MockContractChain::ethereum()))
    }

    fn to_ethereum() -> ChainPayload {
        ChainPayload::new("Ethereum")
            .with_params(serde_json::json!({ "to": "0x00000000000000000000000000000000000000aa" }))
    }

    #[test]
    fn test_unknown_chain() {
        let Err(err) = engine().get_chain("Solana") else {
            panic!("expected unknown chain error");
        };
        assert!(matches!(err, TransferError::ParameterError(_)));
        assert!(err.to_string().contains("Bitcoin, Ethereum"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gateway_from_params() {
        let engine = engine();
        let gateway = engine
            .gateway(GatewayParams::new("BTC", ChainPayload::new("Bitcoin"), to_ethereum()))
            .await
            .unwrap();
        assert_eq!(gateway.selector(), "BTC/toEthereum");

        let err = engine
            .gateway(GatewayParams::new("BTC", ChainPayload::new("Dogecoin"), to_ethereum()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::ParameterError(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumed_transaction_matches_gateway_transaction() {
        let engine = engine();
        let gateway = engine
            .gateway(GatewayParams::new("BTC", ChainPayload::new("Bitcoin"), to_ethereum()))
            .await
            .unwrap();
        let detected = gateway
            .process_deposit(MockDepositBuilder::new().build())
            .await
            .unwrap();

        // Persist and resume
        let json = serde_json::to_string(detected.params()).unwrap();
        let params: TransactionParams = serde_json::from_str(&json).unwrap();
        let resumed = engine.gateway_transaction(params).await.unwrap();

        assert_eq!(resumed.hash(), detected.hash());
        assert_eq!(resumed.status(), TransactionStatus::Detected);
        assert_eq!(resumed.params().shard, Shard::new(vec![0x02; 33]));
    }

    #[tokio::test]
    async fn test_get_fees() {
        let fees = engine().get_fees("BTC", "Bitcoin", "Ethereum").await.unwrap();
        assert!(fees.minimum_amount > U256::ZERO);
        assert!(engine().get_fees("BTC", "Bitcoin", "Fantom").await.is_err());
    }
}
