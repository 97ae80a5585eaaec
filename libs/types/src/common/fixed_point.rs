//! Fixed-point working precision and high-precision exponentiation
//!
//! All reserve and trade arithmetic runs on [`Decimal`]. Values that leave the
//! pricing model are narrowed to a fixed number of decimal places (18 by
//! default, one wei) with banker's rounding, so repeated runs produce identical
//! ledgers.
//!
//! ## Exponentiation
//!
//! The curve needs non-integer powers such as `(μz)^(1-τ)` with `z` in the
//! hundreds of millions. `Decimal::powd` evaluates `exp(y·ln x)` with a single
//! Taylor series cut off at a 2e-7 tolerance and overflows once `y·ln x`
//! grows past ~20. [`FixedPointMath::pow`] uses its own range-reduced `ln` and
//! `exp` series summed to the full 28 digits instead.

use crate::common::errors::{AmmError, AmmResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Default working scale: 18 decimal places
pub const DEFAULT_SCALE: u32 = 18;

/// Smallest tradable amount (1e-18)
pub const WEI: Decimal = dec!(0.000000000000000001);

/// Tolerance for time bands and negative dust
pub const PRECISION_THRESHOLD: Decimal = dec!(0.00000001);

/// Maximum allowed gap between `share_reserves * share_price` and `bond_reserves`
pub const MAX_RESERVES_DIFFERENCE: Decimal = dec!(20000000000);

/// Integer exponents up to this size go through exact repeated multiplication
const MAX_INTEGER_EXPONENT: i64 = 64;

/// ln(2) to 28 significant digits
const LN_2: Decimal = dec!(0.6931471805599453094172321215);

const HALF: Decimal = dec!(0.5);
const TWO: Decimal = dec!(2);

/// Upper bound on series terms; both series converge well before this
const SERIES_TERMS: u32 = 96;

/// Numeric kernel helpers
pub struct FixedPointMath;

impl FixedPointMath {
    /// Round to `scale` decimal places, ties to even
    pub fn narrow(value: Decimal, scale: u32) -> Decimal {
        value.round_dp_with_strategy(scale, RoundingStrategy::MidpointNearestEven)
    }

    /// Checked division that reports a zero denominator with context
    pub fn div(
        numerator: Decimal,
        denominator: Decimal,
        context: &'static str,
    ) -> AmmResult<Decimal> {
        if denominator.is_zero() {
            return Err(AmmError::DivisionByZero { context });
        }
        numerator
            .checked_div(denominator)
            .ok_or(AmmError::Overflow { context })
    }

    pub fn mul(lhs: Decimal, rhs: Decimal, context: &'static str) -> AmmResult<Decimal> {
        lhs.checked_mul(rhs).ok_or(AmmError::Overflow { context })
    }

    pub fn add(lhs: Decimal, rhs: Decimal, context: &'static str) -> AmmResult<Decimal> {
        lhs.checked_add(rhs).ok_or(AmmError::Overflow { context })
    }

    pub fn sub(lhs: Decimal, rhs: Decimal, context: &'static str) -> AmmResult<Decimal> {
        lhs.checked_sub(rhs).ok_or(AmmError::Overflow { context })
    }

    /// `base^exponent` for a non-negative base
    ///
    /// * `x^0 = 1`
    /// * `0^e = 0` for `e > 0`, division by zero for `e < 0`
    /// * negative bases are a domain error
    pub fn pow(base: Decimal, exponent: Decimal) -> AmmResult<Decimal> {
        if exponent.is_zero() || base == Decimal::ONE {
            return Ok(Decimal::ONE);
        }
        if base.is_zero() {
            return if exponent.is_sign_positive() {
                Ok(Decimal::ZERO)
            } else {
                Err(AmmError::DivisionByZero { context: "pow" })
            };
        }
        if base.is_sign_negative() {
            return Err(AmmError::Domain {
                function: "pow",
                value: base,
            });
        }

        if exponent.fract().is_zero() {
            if let Some(n) = exponent.to_i64() {
                if n.abs() <= MAX_INTEGER_EXPONENT {
                    return Self::powi(base, n);
                }
            }
        }

        Self::exp(Self::mul(Self::ln(base)?, exponent, "pow")?)
    }

    /// Exact integer power by repeated squaring
    fn powi(base: Decimal, exponent: i64) -> AmmResult<Decimal> {
        let mut result = Decimal::ONE;
        let mut factor = base;
        let mut remaining = exponent.unsigned_abs();
        while remaining > 0 {
            if remaining & 1 == 1 {
                result = Self::mul(result, factor, "powi")?;
            }
            remaining >>= 1;
            if remaining > 0 {
                factor = Self::mul(factor, factor, "powi")?;
            }
        }
        if exponent < 0 {
            Self::div(Decimal::ONE, result, "powi")
        } else {
            Ok(result)
        }
    }

    /// Natural logarithm
    ///
    /// The argument is scaled by powers of two into `[0.5, 2]`, then
    /// `ln x = 2·atanh((x-1)/(x+1))` is summed to full precision.
    pub fn ln(x: Decimal) -> AmmResult<Decimal> {
        if x <= Decimal::ZERO {
            return Err(AmmError::Domain {
                function: "ln",
                value: x,
            });
        }

        let mut mantissa = x;
        let mut exponent = 0i64;
        while mantissa > TWO {
            mantissa /= TWO;
            exponent += 1;
        }
        while mantissa < HALF {
            mantissa *= TWO;
            exponent -= 1;
        }

        let y = Self::div(mantissa - Decimal::ONE, mantissa + Decimal::ONE, "ln")?;
        let y_squared = y * y;
        let mut power = y;
        let mut sum = Decimal::ZERO;
        let mut denominator = Decimal::ONE;
        for _ in 0..SERIES_TERMS {
            let term = power / denominator;
            if term.is_zero() {
                break;
            }
            sum += term;
            power *= y_squared;
            denominator += TWO;
        }

        Ok(TWO * sum + Decimal::from(exponent) * LN_2)
    }

    /// `e^x`; the argument is halved below `1/2`, the series summed, and the
    /// result squared back up
    pub fn exp(x: Decimal) -> AmmResult<Decimal> {
        let mut reduced = x;
        let mut halvings = 0u32;
        while reduced.abs() > HALF {
            reduced /= TWO;
            halvings += 1;
        }

        let mut term = Decimal::ONE;
        let mut result = Decimal::ONE;
        for n in 1..=SERIES_TERMS {
            term = term * reduced / Decimal::from(n);
            if term.is_zero() {
                break;
            }
            result += term;
        }

        for _ in 0..halvings {
            result = Self::mul(result, result, "exp")?;
        }
        Ok(result)
    }

    /// Maintain a weighted mean when weight is added or removed
    ///
    /// Removing all remaining weight resets the average to zero.
    pub fn update_weighted_average(
        average: Decimal,
        total_weight: Decimal,
        delta: Decimal,
        delta_weight: Decimal,
        is_adding: bool,
    ) -> AmmResult<Decimal> {
        if is_adding {
            let weight = Self::add(total_weight, delta_weight, "weighted average")?;
            if weight.is_zero() {
                return Ok(Decimal::ZERO);
            }
            let numerator = Self::add(
                Self::mul(average, total_weight, "weighted average")?,
                Self::mul(delta, delta_weight, "weighted average")?,
                "weighted average",
            )?;
            Self::div(numerator, weight, "weighted average")
        } else {
            let weight = Self::sub(total_weight, delta_weight, "weighted average")?;
            if weight <= Decimal::ZERO {
                return Ok(Decimal::ZERO);
            }
            let numerator = Self::sub(
                Self::mul(average, total_weight, "weighted average")?,
                Self::mul(delta, delta_weight, "weighted average")?,
                "weighted average",
            )?;
            Self::div(numerator, weight, "weighted average")
        }
    }

    /// Clamp values in `(-PRECISION_THRESHOLD, 0)` to zero
    pub fn clamp_dust(value: Decimal) -> Decimal {
        if value.is_sign_negative() && value > -PRECISION_THRESHOLD {
            Decimal::ZERO
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_close(actual: Decimal, expected: Decimal, tolerance: Decimal) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_narrow_uses_bankers_rounding() {
        assert_eq!(FixedPointMath::narrow(dec!(1.25), 1), dec!(1.2));
        assert_eq!(FixedPointMath::narrow(dec!(1.35), 1), dec!(1.4));
        assert_eq!(
            FixedPointMath::narrow(dec!(0.1234567890123456789), DEFAULT_SCALE),
            dec!(0.123456789012345679)
        );
    }

    #[test]
    fn test_pow_edge_cases() {
        assert_eq!(FixedPointMath::pow(dec!(123.4), dec!(0)).unwrap(), Decimal::ONE);
        assert_eq!(FixedPointMath::pow(dec!(0), dec!(0.5)).unwrap(), Decimal::ZERO);
        assert!(matches!(
            FixedPointMath::pow(dec!(0), dec!(-1)),
            Err(AmmError::DivisionByZero { .. })
        ));
        assert!(matches!(
            FixedPointMath::pow(dec!(-2), dec!(0.5)),
            Err(AmmError::Domain { .. })
        ));
        assert_eq!(FixedPointMath::pow(dec!(1.5), dec!(2)).unwrap(), dec!(2.25));
    }

    #[test]
    fn test_pow_fractional() {
        // sqrt(2)
        assert_close(
            FixedPointMath::pow(dec!(2), dec!(0.5)).unwrap(),
            dec!(1.4142135623730950488016887242),
            dec!(0.000000000000000001),
        );
        // 500000^0.25 = 26.591479484724942
        assert_close(
            FixedPointMath::pow(dec!(500000), dec!(0.25)).unwrap(),
            dec!(26.591479484724942),
            dec!(0.000000000001),
        );
    }

    #[test]
    fn test_pow_large_argument_does_not_overflow() {
        // ln(5e8) * 0.955 ~ 19.1, beyond what a single exp series handles
        let value = FixedPointMath::pow(dec!(500000000), dec!(0.955)).unwrap();
        let expected = dec!(203009496.5302530951828415);
        assert!((value - expected).abs() / expected < dec!(0.000000000000000001));
    }

    #[test]
    fn test_exp_round_trip_with_ln() {
        let x = dec!(12.75);
        let value = FixedPointMath::exp(x).unwrap();
        assert_close(FixedPointMath::ln(value).unwrap(), x, dec!(0.0000000000000000001));
        assert_close(
            FixedPointMath::exp(dec!(1)).unwrap(),
            dec!(2.7182818284590452353602874714),
            dec!(0.000000000000000000001),
        );
        assert_close(
            FixedPointMath::ln(dec!(500000000)).unwrap(),
            dec!(20.030118656386465846744691),
            dec!(0.00000000000000000001),
        );
    }

    #[test]
    fn test_weighted_average() {
        let update = FixedPointMath::update_weighted_average;
        let avg = update(dec!(0), dec!(0), dec!(365), dec!(10), true).unwrap();
        assert_eq!(avg, dec!(365));
        let avg = update(avg, dec!(10), dec!(366), dec!(10), true).unwrap();
        assert_eq!(avg, dec!(365.5));
        let avg = update(avg, dec!(20), dec!(366), dec!(10), false).unwrap();
        assert_eq!(avg, dec!(365));
        let avg = update(avg, dec!(10), dec!(365), dec!(10), false).unwrap();
        assert_eq!(avg, Decimal::ZERO);
    }

    #[test]
    fn test_clamp_dust() {
        assert_eq!(FixedPointMath::clamp_dust(dec!(-0.000000001)), Decimal::ZERO);
        assert_eq!(FixedPointMath::clamp_dust(dec!(-0.1)), dec!(-0.1));
        assert_eq!(FixedPointMath::clamp_dust(dec!(3)), dec!(3));
    }

    #[test]
    fn test_div_by_zero_is_reported() {
        assert_eq!(
            FixedPointMath::div(dec!(1), dec!(0), "k"),
            Err(AmmError::DivisionByZero { context: "k" })
        );
    }

    proptest! {
        #[test]
        fn prop_pow_adds_exponents(
            base in 1u64..1_000_000_000u64,
            a in 0i64..1000,
            b in 0i64..1000,
        ) {
            let x = Decimal::from(base);
            let (ea, eb) = (Decimal::new(a, 3), Decimal::new(b, 3));
            let lhs = FixedPointMath::pow(x, ea).unwrap() * FixedPointMath::pow(x, eb).unwrap();
            let rhs = FixedPointMath::pow(x, ea + eb).unwrap();
            prop_assert!((lhs - rhs).abs() / rhs < dec!(0.00000000000000000001));
        }

        #[test]
        fn prop_ln_inverts_exp(x in -10_000i64..40_000i64) {
            let x = Decimal::new(x, 3);
            let value = FixedPointMath::exp(x).unwrap();
            let recovered = FixedPointMath::ln(value).unwrap();
            prop_assert!((recovered - x).abs() < dec!(0.000000000000000001));
        }
    }
}
