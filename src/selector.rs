//! Transfer direction and selector classification

use serde::{Deserialize, Serialize};

use crate::chain::Chain;
use crate::error::{Result, TransferError};
use crate::types::{InputType, OutputType};

/// Direction and selector of a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub input_type: InputType,
    pub output_type: OutputType,
    pub selector: String,
}

async fn is_mint_asset(chain: &dyn Chain, asset: &str) -> Result<bool> {
    match chain.as_contract_chain() {
        Some(contract) => contract.is_mint_asset(asset).await,
        None => Ok(false),
    }
}

/// Classify a transfer of `asset` from `from` to `to`
///
/// - asset native to `to`: burn-and-release, selector `asset/from{from}`
/// - asset native to `from`: lock-and-mint, selector `asset/to{to}`
/// - otherwise burn-and-mint, which is not supported
pub async fn classify(asset: &str, from: &dyn Chain, to: &dyn Chain) -> Result<Classification> {
    let (lock_on_from, lock_on_to, mint_on_from, mint_on_to) = tokio::try_join!(
        from.is_lock_asset(asset),
        to.is_lock_asset(asset),
        is_mint_asset(from, asset),
        is_mint_asset(to, asset),
    )?;

    if lock_on_to {
        if from.as_contract_chain().is_none() {
            return Err(TransferError::ParameterError(format!(
                "Cannot burn from non-contract chain {}.",
                from.name()
            )));
        }
        if !mint_on_from {
            return Err(TransferError::ParameterError(format!(
                "Asset '{}' is not supported on {}.",
                asset,
                from.name()
            )));
        }
        return Ok(Classification {
            input_type: InputType::Burn,
            output_type: OutputType::Release,
            selector: format!("{}/from{}", asset, from.name()),
        });
    }

    if lock_on_from {
        if to.as_contract_chain().is_none() {
            return Err(TransferError::ParameterError(format!(
                "Cannot mint to non-contract chain {}.",
                to.name()
            )));
        }
        if !mint_on_to {
            return Err(TransferError::ParameterError(format!(
                "Asset '{}' is not supported on {}.",
                asset,
                to.name()
            )));
        }
        return Ok(Classification {
            input_type: InputType::Lock,
            output_type: OutputType::Mint,
            selector: format!("{}/to{}", asset, to.name()),
        });
    }

    Err(TransferError::NotImplemented(format!(
        "Burning {} from {} and minting to {} is not supported.",
        asset,
        from.name(),
        to.name()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockContractChain, MockDepositChain};

    #[tokio::test]
    async fn test_lock_and_mint() {
        let bitcoin = MockDepositChain::bitcoin();
        let ethereum = MockContractChain::ethereum();

        let c = classify("BTC", &bitcoin, &ethereum).await.unwrap();
        assert_eq!(c.input_type, InputType::Lock);
        assert_eq!(c.output_type, OutputType::Mint);
        assert_eq!(c.selector, "BTC/toEthereum");

        // Pure function of the chains' answers
        assert_eq!(classify("BTC", &bitcoin, &ethereum).await.unwrap(), c);
    }

    #[tokio::test]
    async fn test_burn_and_release() {
        let bitcoin = MockDepositChain::bitcoin();
        let ethereum = MockContractChain::ethereum();

        let c = classify("BTC", &ethereum, &bitcoin).await.unwrap();
        assert_eq!(c.input_type, InputType::Burn);
        assert_eq!(c.output_type, OutputType::Release);
        assert_eq!(c.selector, "BTC/fromEthereum");
    }

    #[tokio::test]
    async fn test_unsupported_asset_is_parameter_error() {
        let bitcoin = MockDepositChain::bitcoin();
        let ethereum = MockContractChain::ethereum().with_mint_assets(&[]);

        let err = classify("BTC", &bitcoin, &ethereum).await.unwrap_err();
        assert!(matches!(err, TransferError::ParameterError(_)));
    }

    #[tokio::test]
    async fn test_mint_to_deposit_chain_is_parameter_error() {
        let bitcoin = MockDepositChain::bitcoin();
        let zcash = MockDepositChain::new("Zcash", &["ZEC"]);

        let err = classify("BTC", &bitcoin, &zcash).await.unwrap_err();
        assert!(matches!(err, TransferError::ParameterError(_)));
    }

    #[tokio::test]
    async fn test_burn_and_mint_not_implemented() {
        let ethereum = MockContractChain::ethereum();
        let fantom = MockContractChain::new("Fantom", &["BTC"]);

        let err = classify("BTC", &ethereum, &fantom).await.unwrap_err();
        assert!(matches!(err, TransferError::NotImplemented(_)));
    }
}
