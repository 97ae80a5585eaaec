//! Hyperdrive curve: flat + curve split
//!
//! A position with normalized time `t` left splits every trade in two:
//!
//! - **curve** `amount·t`, priced on the YieldSpace curve at full-term
//!   stretched time and charged `curve_fee_multiple`
//! - **flat** `amount·(1 - t)`, traded 1:1 at par and charged
//!   `flat_fee_multiple`
//!
//! The flat leg never touches bond reserves: `market_result.d_bonds` carries
//! only the curve leg while `market_result.d_base` carries both.

use crate::pool_traits::{PoolReserves, PricingModel};
use crate::yieldspace::YieldSpacePricingModel;
use hyperdrive_types::{
    AmmResult, Decimal, FixedPointMath, MarketActionResult, Quantity, StretchedTime, TokenType,
    TradeBreakdown, TradeResult, UserTradeResult, DEFAULT_SCALE, WEI,
};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct HyperdrivePricingModel {
    curve: YieldSpacePricingModel,
    scale: u32,
}

impl Default for HyperdrivePricingModel {
    fn default() -> Self {
        Self::with_scale(DEFAULT_SCALE)
    }
}

/// One trade cut into its two legs
struct Split {
    curve: Decimal,
    flat: Decimal,
    flat_fee: Decimal,
}

impl HyperdrivePricingModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scale(scale: u32) -> Self {
        Self {
            curve: YieldSpacePricingModel::with_scale(scale),
            scale,
        }
    }

    fn split(
        amount: Decimal,
        reserves: &PoolReserves,
        time_remaining: &StretchedTime,
    ) -> AmmResult<Split> {
        let normalized_time = time_remaining.normalized_time();
        let curve = FixedPointMath::mul(amount, normalized_time, "hyperdrive split")?;
        let flat = FixedPointMath::sub(amount, curve, "hyperdrive split")?;
        let flat_fee = FixedPointMath::mul(flat, reserves.flat_fee_multiple, "hyperdrive split")?;
        Ok(Split {
            curve,
            flat,
            flat_fee,
        })
    }

    /// Curve-leg quote, empty when the leg is below one wei
    fn curve_leg<F>(&self, amount: Decimal, unit: TokenType, quote: F) -> AmmResult<TradeResult>
    where
        F: FnOnce(Quantity) -> AmmResult<TradeResult>,
    {
        if amount < WEI {
            return Ok(TradeResult::default());
        }
        quote(Quantity::new(amount, unit))
    }

    fn finish(&self, result: TradeResult) -> AmmResult<TradeResult> {
        let result = result.narrowed(self.scale);
        self.check_output_assertions(&result)?;
        Ok(result)
    }
}

impl PricingModel for HyperdrivePricingModel {
    fn model_name(&self) -> &'static str {
        "Hyperdrive"
    }

    fn model_type(&self) -> &'static str {
        "hyperdrive"
    }

    fn scale(&self) -> u32 {
        self.scale
    }

    fn calc_in_given_out(
        &self,
        out: Quantity,
        reserves: &PoolReserves,
        time_remaining: &StretchedTime,
    ) -> AmmResult<TradeResult> {
        self.check_input_assertions(out, reserves, time_remaining)?;
        let split = Self::split(out.amount, reserves, time_remaining)?;
        let full_term = time_remaining.full_term();
        let curve = self.curve_leg(split.curve, out.unit, |quantity| {
            self.curve.calc_in_given_out(quantity, reserves, &full_term)
        })?;

        let legs = &curve.breakdown;
        let without_fee_or_slippage =
            FixedPointMath::add(legs.without_fee_or_slippage, split.flat, "in given out")?;
        let without_fee = FixedPointMath::add(legs.without_fee, split.flat, "in given out")?;
        let fee = FixedPointMath::add(legs.fee, split.flat_fee, "in given out")?;
        let with_fee = FixedPointMath::add(
            FixedPointMath::add(legs.with_fee, split.flat, "in given out")?,
            split.flat_fee,
            "in given out",
        )?;

        let (market_result, user_result) = match out.unit {
            // buying bonds: base in, curve bonds out of reserves
            TokenType::Pt => (
                MarketActionResult {
                    d_base: with_fee,
                    d_bonds: -split.curve,
                },
                UserTradeResult {
                    d_base: -with_fee,
                    d_bonds: out.amount,
                },
            ),
            // withdrawing base: bonds in, only the curve leg lands in reserves
            TokenType::Base => (
                MarketActionResult {
                    d_base: -out.amount,
                    d_bonds: curve.breakdown.with_fee,
                },
                UserTradeResult {
                    d_base: out.amount,
                    d_bonds: -with_fee,
                },
            ),
        };

        debug!(
            %out,
            curve = %split.curve,
            flat = %split.flat,
            %with_fee,
            "hyperdrive in given out"
        );
        self.finish(TradeResult {
            breakdown: TradeBreakdown {
                without_fee_or_slippage,
                without_fee,
                fee,
                with_fee,
            },
            market_result,
            user_result,
        })
    }

    fn calc_out_given_in(
        &self,
        in_: Quantity,
        reserves: &PoolReserves,
        time_remaining: &StretchedTime,
    ) -> AmmResult<TradeResult> {
        self.check_input_assertions(in_, reserves, time_remaining)?;
        let split = Self::split(in_.amount, reserves, time_remaining)?;
        let full_term = time_remaining.full_term();
        let curve = self.curve_leg(split.curve, in_.unit, |quantity| {
            self.curve.calc_out_given_in(quantity, reserves, &full_term)
        })?;

        let legs = &curve.breakdown;
        let without_fee_or_slippage =
            FixedPointMath::add(legs.without_fee_or_slippage, split.flat, "out given in")?;
        let without_fee = FixedPointMath::add(legs.without_fee, split.flat, "out given in")?;
        let fee = FixedPointMath::add(legs.fee, split.flat_fee, "out given in")?;
        let with_fee = FixedPointMath::sub(
            FixedPointMath::add(legs.with_fee, split.flat, "out given in")?,
            split.flat_fee,
            "out given in",
        )?;

        let (market_result, user_result) = match in_.unit {
            // opening a long: all base in, curve bonds out of reserves
            TokenType::Base => (
                MarketActionResult {
                    d_base: in_.amount,
                    d_bonds: -curve.breakdown.with_fee,
                },
                UserTradeResult {
                    d_base: -in_.amount,
                    d_bonds: with_fee,
                },
            ),
            // selling bonds: curve bonds into reserves, base out
            TokenType::Pt => (
                MarketActionResult {
                    d_base: -with_fee,
                    d_bonds: split.curve,
                },
                UserTradeResult {
                    d_base: with_fee,
                    d_bonds: -in_.amount,
                },
            ),
        };

        debug!(
            %in_,
            curve = %split.curve,
            flat = %split.flat,
            %with_fee,
            "hyperdrive out given in"
        );
        self.finish(TradeResult {
            breakdown: TradeBreakdown {
                without_fee_or_slippage,
                without_fee,
                fee,
                with_fee,
            },
            market_result,
            user_result,
        })
    }
}
