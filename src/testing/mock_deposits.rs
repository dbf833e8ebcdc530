//! Mock Deposit Helpers

use alloy_primitives::U256;

use crate::encoding::to_url_base64;
use crate::types::{Bytes32, ChainTransaction, InputChainTransaction};

/// Builder for origin chain transactions
pub struct MockDepositBuilder {
    chain: String,
    txid: Vec<u8>,
    txindex: u32,
    amount: U256,
    nonce: Option<Bytes32>,
}

impl Default for MockDepositBuilder {
    fn default() -> Self {
        Self {
            chain: "Bitcoin".to_string(),
            txid: vec![0xaa; 32],
            txindex: 0,
            amount: U256::from(100_000u64),
            nonce: None,
        }
    }
}

impl MockDepositBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chain(mut self, chain: &str) -> Self {
        self.chain = chain.to_string();
        self
    }

    /// Set the raw transaction id
    pub fn txid(mut self, txid: &[u8]) -> Self {
        self.txid = txid.to_vec();
        self
    }

    pub fn txindex(mut self, txindex: u32) -> Self {
        self.txindex = txindex;
        self
    }

    pub fn amount(mut self, amount: U256) -> Self {
        self.amount = amount;
        self
    }

    /// Nonce reported by the origin chain (burns)
    pub fn nonce(mut self, nonce: Bytes32) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn build(self) -> InputChainTransaction {
        InputChainTransaction {
            tx: ChainTransaction {
                chain: self.chain,
                txid: to_url_base64(&self.txid),
                txindex: self.txindex,
                txid_formatted: hex::encode(&self.txid),
            },
            amount: self.amount,
            nonce: self.nonce,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let deposit = MockDepositBuilder::new().txindex(2).build();
        assert_eq!(deposit.tx.chain, "Bitcoin");
        assert_eq!(deposit.deposit_id(), format!("{}_2", to_url_base64(&[0xaa; 32])));
        assert!(deposit.nonce.is_none());
    }
}
