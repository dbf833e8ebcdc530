//! Fee schedule of a gateway
//!
//! Fees have two parts:
//! - a fixed fee, charged only when the deposit side is a deposit-style chain
//!   (moving funds from the gateway address costs gas on that chain)
//! - a variable fee in basis points, the destination chain's mint fee for
//!   lock-and-mint and its burn fee otherwise
//!
//! All arithmetic is integer arithmetic on `U256` with half-up rounding.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chain::Chain;
use crate::error::{Result, TransferError};
use crate::provider::NetworkProvider;

/// 1 BPS = 1/10000
pub const BIP_DENOMINATOR: u64 = 10_000;

/// Fee used when the network reports none for a chain
pub const DEFAULT_FEE_BPS: u64 = 15;

const BLOCK_STATE_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeDirection {
    LockAndMint,
    BurnAndRelease,
    BurnAndMint,
}

/// Fees charged for transfers through one gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayFees {
    pub direction: FeeDirection,
    pub fixed_fee: U256,
    /// Basis points
    pub variable_fee: u64,
    /// Smallest input that is guaranteed to be processed
    pub minimum_amount: U256,
}

/// round(value * numerator / denominator), half up
fn mul_div_round(value: U256, numerator: u64, denominator: u64) -> U256 {
    let denominator = U256::from(denominator);
    value
        .saturating_mul(U256::from(numerator))
        .saturating_add(denominator / U256::from(2u64))
        / denominator
}

impl GatewayFees {
    /// Expected output for `input` after the fixed and variable fees
    ///
    /// Inputs below the minimum amount yield zero.
    pub fn estimate_output(&self, input: U256) -> U256 {
        if input < self.minimum_amount {
            return U256::ZERO;
        }
        let keep = BIP_DENOMINATOR.saturating_sub(self.variable_fee);
        match self.direction {
            FeeDirection::LockAndMint => mul_div_round(
                input.saturating_sub(self.fixed_fee),
                keep,
                BIP_DENOMINATOR,
            ),
            FeeDirection::BurnAndRelease => {
                mul_div_round(input, keep, BIP_DENOMINATOR).saturating_sub(self.fixed_fee)
            }
            FeeDirection::BurnAndMint => mul_div_round(input, keep, BIP_DENOMINATOR),
        }
    }
}

/// Compute the fee schedule for moving `asset` from `from` to `to`
pub async fn estimate_transaction_fee(
    provider: &dyn NetworkProvider,
    asset: &str,
    from: &dyn Chain,
    to: &dyn Chain,
) -> Result<GatewayFees> {
    let block_state = provider.query_block_state(asset, BLOCK_STATE_RETRIES).await?;
    let state = block_state
        .get(asset)
        .ok_or_else(|| TransferError::UnknownError(format!("No fee details found for {}", asset)))?;

    let chain_fees = state.fees.chains.iter().find(|c| c.chain == to.name());
    let mint_fee = chain_fees
        .and_then(|c| c.mint_fee)
        .filter(|f| *f > 0)
        .unwrap_or(DEFAULT_FEE_BPS);
    let burn_fee = chain_fees
        .and_then(|c| c.burn_fee)
        .filter(|f| *f > 0)
        .unwrap_or(DEFAULT_FEE_BPS);

    let is_lock_and_mint = from.is_lock_asset(asset).await?;
    let is_burn_and_release = !is_lock_and_mint && to.is_lock_asset(asset).await?;

    let direction = if is_lock_and_mint {
        FeeDirection::LockAndMint
    } else if is_burn_and_release {
        FeeDirection::BurnAndRelease
    } else {
        FeeDirection::BurnAndMint
    };

    let deposit_side = match direction {
        FeeDirection::LockAndMint => Some(from),
        FeeDirection::BurnAndRelease => Some(to),
        FeeDirection::BurnAndMint => None,
    };
    let requires_transfer = match deposit_side.and_then(|c| c.as_deposit_chain()) {
        Some(chain) => chain.is_deposit_asset(asset).await?,
        None => false,
    };

    let fixed_fee = if requires_transfer {
        state
            .gas_limit
            .saturating_mul(state.gas_cap)
            .saturating_add(state.dust_amount)
            .saturating_add(U256::from(1u64))
    } else {
        U256::ZERO
    };

    let variable_fee = match direction {
        FeeDirection::LockAndMint => mint_fee,
        FeeDirection::BurnAndRelease => burn_fee,
        FeeDirection::BurnAndMint => (mint_fee + burn_fee) / 2,
    };

    let minimum_fee = if is_lock_and_mint { mint_fee } else { burn_fee };
    let minimum_amount = mul_div_round(
        state.minimum_amount.saturating_add(fixed_fee),
        minimum_fee + BIP_DENOMINATOR,
        BIP_DENOMINATOR,
    );

    debug!(
        asset = %asset,
        from = %from.name(),
        to = %to.name(),
        fixed_fee = %fixed_fee,
        variable_fee,
        minimum_amount = %minimum_amount,
        "Estimated gateway fees"
    );

    Ok(GatewayFees {
        direction,
        fixed_fee,
        variable_fee,
        minimum_amount,
    })
}
