//! xchain-gateway: Transfer Lifecycle Engine for Cross-Chain Gateways
//!
//! This crate moves assets between chains through an MPC signing network
//! that lock/mints or burns/releases them:
//!
//! - **Hashes** - Payload, selector, gateway, nonce and signature hashes plus
//!   the canonical network transaction hash
//! - **Gateway** - Deterministic channel per (asset, from, to, nonce): deposit
//!   address, registration, deposit watching and deduplication
//! - **Transaction** - One transfer as a monotonic state machine over the
//!   origin, network and destination legs
//! - **Submitter** - Submit/query/wait protocol against the signing network
//! - **Handler** - Default lifecycle driver with retries
//! - **Fees** - Fixed and variable fee schedule with minimum amounts
//! - **Testing Module** - Mock network and chains (`testing` feature)
//!
//! Chains and the network provider are supplied by the integrator through the
//! traits in [`chain`] and [`provider`].
//!
//! ## Feature Flags
//!
//! - `testing` - Enable mock collaborators for integration tests
//! - `full` - Enable all features

// Core modules
pub mod cancel;
pub mod config;
pub mod encoding;
pub mod error;
pub mod hash;
pub mod pack;
pub mod redact;
pub mod retry;
pub mod types;

// Collaborator interfaces
pub mod chain;
pub mod provider;
pub mod tx;

// Lifecycle
pub mod engine;
pub mod fees;
pub mod gateway;
pub mod handler;
pub mod selector;
pub mod submitter;
pub mod transaction;
pub mod waiter;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used items at the crate root
pub use cancel::CancellationContext;
pub use chain::{
    Chain, ContractChain, DepositChain, DepositListener, InputParams, OutputParams, OutputPayload,
    RecoverableSignature,
};
pub use config::EngineConfig;
pub use engine::TransferEngine;
pub use error::{ErrorKind, Result, TransferError};
pub use fees::{estimate_transaction_fee, FeeDirection, GatewayFees};
pub use gateway::{Gateway, PendingGateway, TransactionSubscription};
pub use handler::{chain_transaction_handler, TransactionHandler};
pub use hash::{
    generate_g_hash, generate_n_hash, generate_p_hash, generate_s_hash, generate_sighash,
    generate_transaction_hash, keccak256,
};
pub use provider::{NetworkProvider, TransactionWithStatus, TxStatus};
pub use selector::{classify, Classification};
pub use submitter::NetworkTxSubmitter;
pub use transaction::{GatewayTransaction, PendingGatewayTransaction, TransactionEvent};
pub use tx::{SetupMap, TxSubmitter};
pub use types::{
    Bytes32, ChainPayload, ChainTransaction, ChainTransactionProgress, ChainTransactionStatus,
    GatewayParams, InputChainTransaction, InputType, OutputType, Shard, TransactionParams,
    TransactionStatus,
};
pub use waiter::DefaultTxWaiter;
