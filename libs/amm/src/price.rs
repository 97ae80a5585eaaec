//! Conversions between principal-token spot price and fixed APR
//!
//! A principal token redeems for one unit of base at maturity, so a price `p`
//! with `t` years left implies `apr = (1 - p) / (p·t)`.

use hyperdrive_types::{AmmResult, Decimal, FixedPointMath, StretchedTime};

/// APR implied by a spot price over the remaining term
pub fn calc_apr_from_spot_price(
    price: Decimal,
    time_remaining: &StretchedTime,
) -> AmmResult<Decimal> {
    let years = time_remaining.annualized_time();
    let denominator = FixedPointMath::mul(price, years, "apr from spot price")?;
    FixedPointMath::div(Decimal::ONE - price, denominator, "apr from spot price")
}

/// Spot price that realizes `apr` over the remaining term
pub fn calc_spot_price_from_apr(
    apr: Decimal,
    time_remaining: &StretchedTime,
) -> AmmResult<Decimal> {
    let years = time_remaining.annualized_time();
    let rate = FixedPointMath::mul(apr, years, "spot price from apr")?;
    let growth = FixedPointMath::add(Decimal::ONE, rate, "spot price from apr")?;
    FixedPointMath::div(Decimal::ONE, growth, "spot price from apr")
}
