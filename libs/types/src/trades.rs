//! Quote records produced by the pricing models
//!
//! A [`TradeResult`] is built once per quote and never mutated. `market_result`
//! and `user_result` describe the same trade from the pool's and the trader's
//! side; signs are relative to the holder (positive = received).

use crate::common::fixed_point::FixedPointMath;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Audit view of a quote: pre-fee, post-fee and fee-only amounts
///
/// All four figures are in the unit the trader receives (out-given-in) or
/// pays (in-given-out).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TradeBreakdown {
    /// Price at the current spot, no curve slippage, no fee
    pub without_fee_or_slippage: Decimal,
    /// Curve-implied amount before fees
    pub without_fee: Decimal,
    /// Total fee (curve + flat)
    pub fee: Decimal,
    /// Amount actually received or paid
    pub with_fee: Decimal,
}

/// Pool-side balance changes of a trade
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketActionResult {
    pub d_base: Decimal,
    pub d_bonds: Decimal,
}

/// Trader-side balance changes of a trade
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UserTradeResult {
    pub d_base: Decimal,
    pub d_bonds: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TradeResult {
    pub breakdown: TradeBreakdown,
    pub market_result: MarketActionResult,
    pub user_result: UserTradeResult,
}

impl TradeResult {
    /// Round every figure to the working scale
    pub fn narrowed(self, scale: u32) -> Self {
        let n = |value| FixedPointMath::narrow(value, scale);
        Self {
            breakdown: TradeBreakdown {
                without_fee_or_slippage: n(self.breakdown.without_fee_or_slippage),
                without_fee: n(self.breakdown.without_fee),
                fee: n(self.breakdown.fee),
                with_fee: n(self.breakdown.with_fee),
            },
            market_result: MarketActionResult {
                d_base: n(self.market_result.d_base),
                d_bonds: n(self.market_result.d_bonds),
            },
            user_result: UserTradeResult {
                d_base: n(self.user_result.d_base),
                d_bonds: n(self.user_result.d_bonds),
            },
        }
    }
}
