//! Pricing-model interface shared by every curve family
//!
//! A [`PricingModel`] is stateless: each call receives a [`PoolReserves`]
//! snapshot and a [`StretchedTime`] and returns a quote. Implementations only
//! supply the two trade solves; spot price, APR, liquidity, maximum-trade and
//! calibration math are provided on top of them.

use crate::price::calc_apr_from_spot_price;
use hyperdrive_types::{
    AmmError, AmmResult, Decimal, FixedPointMath, Quantity, StretchedTime, TradeResult,
    MAX_RESERVES_DIFFERENCE, WEI,
};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Reserve snapshot a pricing model reads
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolReserves {
    /// z, in shares
    pub share_reserves: Decimal,
    /// y, in bonds
    pub bond_reserves: Decimal,
    /// s, LP supply (acts as virtual bond liquidity)
    pub lp_total_supply: Decimal,
    /// c
    pub share_price: Decimal,
    /// μ
    pub init_share_price: Decimal,
    pub curve_fee_multiple: Decimal,
    pub flat_fee_multiple: Decimal,
    /// Base the pool must keep to redeem outstanding longs
    pub base_buffer: Decimal,
    /// Bonds the pool must keep to cover outstanding shorts
    pub bond_buffer: Decimal,
    pub longs_outstanding: Decimal,
    pub shorts_outstanding: Decimal,
}

impl Default for PoolReserves {
    fn default() -> Self {
        Self {
            share_reserves: Decimal::ZERO,
            bond_reserves: Decimal::ZERO,
            lp_total_supply: Decimal::ZERO,
            share_price: Decimal::ONE,
            init_share_price: Decimal::ONE,
            curve_fee_multiple: Decimal::ZERO,
            flat_fee_multiple: Decimal::ZERO,
            base_buffer: Decimal::ZERO,
            bond_buffer: Decimal::ZERO,
            longs_outstanding: Decimal::ZERO,
            shorts_outstanding: Decimal::ZERO,
        }
    }
}

impl PoolReserves {
    /// `y + s`, the bond side of the invariant
    pub fn bond_term(&self) -> AmmResult<Decimal> {
        FixedPointMath::add(self.bond_reserves, self.lp_total_supply, "bond term")
    }

    /// Share value net of outstanding obligations: `z + shorts/c - longs/c`
    pub fn present_value(&self) -> AmmResult<Decimal> {
        let shorts =
            FixedPointMath::div(self.shorts_outstanding, self.share_price, "present value")?;
        let longs = FixedPointMath::div(self.longs_outstanding, self.share_price, "present value")?;
        FixedPointMath::sub(
            FixedPointMath::add(self.share_reserves, shorts, "present value")?,
            longs,
            "present value",
        )
    }
}

/// Signed pool-side effect of minting or burning LP tokens
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LiquidityQuote {
    pub lp_tokens: Decimal,
    pub d_base: Decimal,
    pub d_bonds: Decimal,
}

/// Bonding-curve capability
pub trait PricingModel: fmt::Debug + Send + Sync {
    fn model_name(&self) -> &'static str;

    /// Identifier matching the configuration key
    fn model_type(&self) -> &'static str;

    /// Decimal places results are narrowed to
    fn scale(&self) -> u32;

    /// Amount the trader pays to receive `out`
    fn calc_in_given_out(
        &self,
        out: Quantity,
        reserves: &PoolReserves,
        time_remaining: &StretchedTime,
    ) -> AmmResult<TradeResult>;

    /// Amount the trader receives for paying `in_`
    fn calc_out_given_in(
        &self,
        in_: Quantity,
        reserves: &PoolReserves,
        time_remaining: &StretchedTime,
    ) -> AmmResult<TradeResult>;

    /// `k = (c/μ)·(μz)^(1-τ) + (y+s)^(1-τ)`
    fn calc_k(
        &self,
        reserves: &PoolReserves,
        time_remaining: &StretchedTime,
    ) -> AmmResult<Decimal> {
        let exponent = Decimal::ONE - time_remaining.stretched_time();
        let c_over_mu = FixedPointMath::div(
            reserves.share_price,
            reserves.init_share_price,
            "curve constant",
        )?;
        let share_term = FixedPointMath::pow(
            FixedPointMath::mul(
                reserves.init_share_price,
                reserves.share_reserves,
                "curve constant",
            )?,
            exponent,
        )?;
        let bond_term = FixedPointMath::pow(reserves.bond_term()?, exponent)?;
        FixedPointMath::add(
            FixedPointMath::mul(c_over_mu, share_term, "curve constant")?,
            bond_term,
            "curve constant",
        )
    }

    /// `p = (μz / (y+s))^τ`, `None` when `y + s == 0`
    fn calc_spot_price_from_reserves(
        &self,
        reserves: &PoolReserves,
        time_remaining: &StretchedTime,
    ) -> AmmResult<Option<Decimal>> {
        let bond_term = reserves.bond_term()?;
        if bond_term.is_zero() {
            return Ok(None);
        }
        let ratio = FixedPointMath::div(
            FixedPointMath::mul(reserves.init_share_price, reserves.share_reserves, "spot price")?,
            bond_term,
            "spot price",
        )?;
        let price = FixedPointMath::pow(ratio, time_remaining.stretched_time())?;
        Ok(Some(FixedPointMath::narrow(price, self.scale())))
    }

    /// Fixed rate implied by the reserves, `None` when the spot price is undefined
    fn calc_apr_from_reserves(
        &self,
        reserves: &PoolReserves,
        time_remaining: &StretchedTime,
    ) -> AmmResult<Option<Decimal>> {
        match self.calc_spot_price_from_reserves(reserves, time_remaining)? {
            Some(price) => calc_apr_from_spot_price(price, time_remaining)
                .map(|apr| Some(FixedPointMath::narrow(apr, self.scale()))),
            None => Ok(None),
        }
    }

    /// Mint LP tokens for a base contribution at the pool's present value
    ///
    /// Bond reserves grow with the share reserves so `μz / (y+s)`, and with it
    /// the APR, is unchanged.
    fn calc_lp_out_given_tokens_in(
        &self,
        d_base: Decimal,
        reserves: &PoolReserves,
    ) -> AmmResult<LiquidityQuote> {
        if d_base < WEI {
            return Err(AmmError::InvalidAmount {
                amount: d_base,
                reason: "liquidity contribution must be at least one wei",
            });
        }
        if reserves.share_reserves.is_zero() || reserves.lp_total_supply.is_zero() {
            return Err(AmmError::InsufficientLiquidity {
                reason: "pool has no liquidity to price LP tokens against".to_string(),
            });
        }
        let present_value = reserves.present_value()?;
        if present_value <= Decimal::ZERO {
            return Err(AmmError::InsufficientLiquidity {
                reason: format!("present value {present_value} is not positive"),
            });
        }

        let d_shares = FixedPointMath::div(d_base, reserves.share_price, "lp out")?;
        let lp_tokens = FixedPointMath::div(
            FixedPointMath::mul(d_shares, reserves.lp_total_supply, "lp out")?,
            present_value,
            "lp out",
        )?;
        let d_bonds = apr_preserving_bond_delta(
            reserves,
            FixedPointMath::add(reserves.share_reserves, d_shares, "lp out")?,
            FixedPointMath::add(reserves.lp_total_supply, lp_tokens, "lp out")?,
        )?;

        let scale = self.scale();
        Ok(LiquidityQuote {
            lp_tokens: FixedPointMath::narrow(lp_tokens, scale),
            d_base: FixedPointMath::narrow(d_base, scale),
            d_bonds: FixedPointMath::narrow(d_bonds, scale),
        })
    }

    /// Burn LP tokens for their share of present value
    fn calc_tokens_out_given_lp_in(
        &self,
        lp_in: Decimal,
        reserves: &PoolReserves,
    ) -> AmmResult<LiquidityQuote> {
        if lp_in < WEI || lp_in > reserves.lp_total_supply {
            return Err(AmmError::InvalidAmount {
                amount: lp_in,
                reason: "LP amount must be positive and within the total supply",
            });
        }
        if reserves.share_reserves.is_zero() {
            return Err(AmmError::InsufficientLiquidity {
                reason: "pool has no share reserves".to_string(),
            });
        }
        let present_value = reserves.present_value()?.max(Decimal::ZERO);
        let d_shares = FixedPointMath::div(
            FixedPointMath::mul(lp_in, present_value, "tokens out")?,
            reserves.lp_total_supply,
            "tokens out",
        )?;
        let share_reserves = FixedPointMath::sub(reserves.share_reserves, d_shares, "tokens out")?;
        if share_reserves.is_sign_negative() {
            return Err(AmmError::InsufficientLiquidity {
                reason: format!("withdrawal of {d_shares} shares exceeds reserves"),
            });
        }
        let lp_total_supply = FixedPointMath::sub(reserves.lp_total_supply, lp_in, "tokens out")?;
        let d_bonds = apr_preserving_bond_delta(reserves, share_reserves, lp_total_supply)?;

        let scale = self.scale();
        Ok(LiquidityQuote {
            lp_tokens: -lp_in,
            d_base: FixedPointMath::narrow(
                -FixedPointMath::mul(d_shares, reserves.share_price, "tokens out")?,
                scale,
            ),
            d_bonds: FixedPointMath::narrow(d_bonds, scale),
        })
    }

    /// Largest long the bond headroom `y - bond_buffer` supports
    ///
    /// The boundary is solved without fees; the round trip through
    /// `calc_out_given_in` then charges them, so the reported bonds never
    /// cross the buffer.
    fn get_max_long(
        &self,
        reserves: &PoolReserves,
        time_remaining: &StretchedTime,
    ) -> AmmResult<(Decimal, Decimal)> {
        let headroom =
            FixedPointMath::sub(reserves.bond_reserves, reserves.bond_buffer, "max long")?;
        if headroom < WEI {
            return Ok((Decimal::ZERO, Decimal::ZERO));
        }
        let base = self
            .calc_in_given_out(Quantity::pt(headroom), reserves, time_remaining)?
            .breakdown
            .without_fee;
        if base < WEI {
            return Ok((Decimal::ZERO, Decimal::ZERO));
        }
        let bonds = self
            .calc_out_given_in(Quantity::base(base), reserves, time_remaining)?
            .breakdown
            .with_fee;
        debug!(model = self.model_name(), %base, %bonds, "max long");
        Ok((base, bonds))
    }

    /// Largest short the share headroom `z - base_buffer/c` supports
    fn get_max_short(
        &self,
        reserves: &PoolReserves,
        time_remaining: &StretchedTime,
    ) -> AmmResult<(Decimal, Decimal)> {
        let buffer_shares =
            FixedPointMath::div(reserves.base_buffer, reserves.share_price, "max short")?;
        let free_shares = FixedPointMath::sub(reserves.share_reserves, buffer_shares, "max short")?;
        let headroom = FixedPointMath::narrow(
            FixedPointMath::mul(free_shares, reserves.share_price, "max short")?,
            self.scale(),
        );
        if headroom < WEI {
            return Ok((Decimal::ZERO, Decimal::ZERO));
        }
        let bonds = self
            .calc_in_given_out(Quantity::base(headroom), reserves, time_remaining)?
            .breakdown
            .without_fee;
        if bonds < WEI {
            return Ok((Decimal::ZERO, Decimal::ZERO));
        }
        let base = self
            .calc_out_given_in(Quantity::pt(bonds), reserves, time_remaining)?
            .breakdown
            .with_fee;
        debug!(model = self.model_name(), %base, %bonds, "max short");
        Ok((base, bonds))
    }

    /// Curve curvature for a target rate: `3.09396 / (0.02789 · apr · 100)`
    fn calc_time_stretch(&self, apr: Decimal) -> AmmResult<Decimal> {
        if apr <= Decimal::ZERO {
            return Err(AmmError::Domain {
                function: "calc_time_stretch",
                value: apr,
            });
        }
        let scaled_apr = FixedPointMath::mul(apr, dec!(100), "time stretch")?;
        let denominator = FixedPointMath::mul(dec!(0.02789), scaled_apr, "time stretch")?;
        FixedPointMath::div(dec!(3.09396), denominator, "time stretch")
    }

    /// Bond reserves that seed a fresh pool at `target_apr`
    ///
    /// `y = z/2 · (μ·(1 + r·t)^(1/τ) - c)`, which with `s = cz + y` makes
    /// `(μz / (y+s))^τ` the target spot price.
    fn calc_initial_bond_reserves(
        &self,
        target_apr: Decimal,
        time_remaining: &StretchedTime,
        reserves: &PoolReserves,
    ) -> AmmResult<Decimal> {
        let factor = interest_factor(target_apr, time_remaining)?;
        let scaled =
            FixedPointMath::mul(reserves.init_share_price, factor, "initial bond reserves")?;
        let y = FixedPointMath::mul(
            reserves.share_reserves / dec!(2),
            FixedPointMath::sub(scaled, reserves.share_price, "initial bond reserves")?,
            "initial bond reserves",
        )?;
        Ok(FixedPointMath::narrow(y, self.scale()))
    }

    /// Bond reserves that realize `target_apr` given the current `z` and `s`
    fn calc_bond_reserves(
        &self,
        target_apr: Decimal,
        time_remaining: &StretchedTime,
        reserves: &PoolReserves,
    ) -> AmmResult<Decimal> {
        let factor = interest_factor(target_apr, time_remaining)?;
        let bond_term = FixedPointMath::mul(
            FixedPointMath::mul(
                reserves.init_share_price,
                reserves.share_reserves,
                "bond reserves",
            )?,
            factor,
            "bond reserves",
        )?;
        let y = FixedPointMath::sub(bond_term, reserves.lp_total_supply, "bond reserves")?;
        Ok(FixedPointMath::narrow(y, self.scale()))
    }

    /// Preconditions every trade solve checks before touching the curve
    fn check_input_assertions(
        &self,
        quantity: Quantity,
        reserves: &PoolReserves,
        time_remaining: &StretchedTime,
    ) -> AmmResult<()> {
        if quantity.amount < WEI {
            return Err(AmmError::InvalidAmount {
                amount: quantity.amount,
                reason: "trade amount must be at least one wei",
            });
        }
        for (field, value) in [
            ("share_reserves", reserves.share_reserves),
            ("bond_reserves", reserves.bond_reserves),
            ("lp_total_supply", reserves.lp_total_supply),
            ("base_buffer", reserves.base_buffer),
            ("bond_buffer", reserves.bond_buffer),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(AmmError::InvariantViolation {
                    field,
                    value,
                    reason: "must be non-negative",
                });
            }
        }
        if reserves.init_share_price.is_zero() {
            return Err(AmmError::DivisionByZero {
                context: "init_share_price",
            });
        }
        if reserves.init_share_price < Decimal::ONE {
            return Err(AmmError::InvariantViolation {
                field: "init_share_price",
                value: reserves.init_share_price,
                reason: "must be at least 1",
            });
        }
        if reserves.share_price.is_zero() {
            return Err(AmmError::DivisionByZero { context: "share_price" });
        }
        if reserves.share_price < reserves.init_share_price {
            warn!(
                share_price = %reserves.share_price,
                init_share_price = %reserves.init_share_price,
                "share price below its initial value"
            );
        }
        let share_value = FixedPointMath::mul(
            reserves.share_reserves,
            reserves.share_price,
            "reserves difference",
        )?;
        let difference =
            FixedPointMath::sub(share_value, reserves.bond_reserves, "reserves difference")?.abs();
        if difference >= MAX_RESERVES_DIFFERENCE {
            return Err(AmmError::InvariantViolation {
                field: "reserves_difference",
                value: difference,
                reason: "share and bond reserves diverged",
            });
        }
        for (field, value) in [
            ("curve_fee_multiple", reserves.curve_fee_multiple),
            ("flat_fee_multiple", reserves.flat_fee_multiple),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(AmmError::InvariantViolation {
                    field,
                    value,
                    reason: "must be within [0, 1]",
                });
            }
        }
        time_remaining.check_bounds()
    }

    /// Fees and pre-fee amounts are never negative
    fn check_output_assertions(&self, trade_result: &TradeResult) -> AmmResult<()> {
        let breakdown = &trade_result.breakdown;
        if breakdown.fee.is_sign_negative() && !breakdown.fee.is_zero() {
            return Err(AmmError::InvariantViolation {
                field: "fee",
                value: breakdown.fee,
                reason: "must be non-negative",
            });
        }
        if breakdown.without_fee.is_sign_negative() && !breakdown.without_fee.is_zero() {
            return Err(AmmError::InvariantViolation {
                field: "without_fee",
                value: breakdown.without_fee,
                reason: "must be non-negative",
            });
        }
        Ok(())
    }
}

/// `(1 + r·t)^(1/τ)`
fn interest_factor(apr: Decimal, time_remaining: &StretchedTime) -> AmmResult<Decimal> {
    let rate = FixedPointMath::mul(apr, time_remaining.annualized_time(), "interest factor")?;
    let growth = FixedPointMath::add(Decimal::ONE, rate, "interest factor")?;
    let exponent =
        FixedPointMath::div(Decimal::ONE, time_remaining.stretched_time(), "interest factor")?;
    FixedPointMath::pow(growth, exponent)
}

/// Bond delta that keeps `(y+s)/z` fixed when `z` and `s` move to new levels
///
/// `y' = (y+s)·z'/z - s'`
pub fn apr_preserving_bond_delta(
    reserves: &PoolReserves,
    share_reserves: Decimal,
    lp_total_supply: Decimal,
) -> AmmResult<Decimal> {
    let ratio = FixedPointMath::div(share_reserves, reserves.share_reserves, "liquidity update")?;
    let bond_term = FixedPointMath::mul(reserves.bond_term()?, ratio, "liquidity update")?;
    let bond_reserves = FixedPointMath::sub(bond_term, lp_total_supply, "liquidity update")?;
    FixedPointMath::sub(bond_reserves, reserves.bond_reserves, "liquidity update")
}
