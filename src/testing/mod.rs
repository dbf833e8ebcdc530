//! Testing Utilities Module
//!
//! Deterministic stand-ins for the external collaborators of the engine.
//!
//! ## Submodules
//!
//! - `mock_network` - Scripted signing network provider with call counters
//! - `mock_chains` - A deposit-style chain ("Bitcoin") and a contract chain ("Ethereum")
//! - `mock_deposits` - Builder for origin chain transactions

pub mod mock_chains;
pub mod mock_deposits;
pub mod mock_network;

// Re-export commonly used items
pub use mock_chains::*;
pub use mock_deposits::*;
pub use mock_network::*;

/// Install a test subscriber once; `RUST_LOG` overrides the default level
pub fn init_test_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init()
        .ok();
}
