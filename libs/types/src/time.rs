//! Time-to-maturity as seen by the bonding curve
//!
//! All times are measured in days. A [`StretchedTime`] carries the days left
//! on a position together with the curve calibration (`time_stretch`) and the
//! length of a full term (`normalizing_constant`):
//!
//! - `normalized_time = days / normalizing_constant` (1 at issue, 0 at maturity)
//! - `stretched_time = normalized_time / time_stretch` (the curve exponent `τ`)
//! - `annualized_time = days / 365` (used to quote rates)

use crate::common::errors::{AmmError, AmmResult};
use crate::common::fixed_point::PRECISION_THRESHOLD;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Days in a year for annualizing rates
pub const DAYS_PER_YEAR: Decimal = dec!(365);

/// Remaining term plus curve calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StretchedTime {
    days: Decimal,
    time_stretch: Decimal,
    normalizing_constant: Decimal,
}

impl StretchedTime {
    /// Fails if `time_stretch` or `normalizing_constant` is zero
    pub fn new(
        days: Decimal,
        time_stretch: Decimal,
        normalizing_constant: Decimal,
    ) -> AmmResult<Self> {
        if time_stretch.is_zero() {
            return Err(AmmError::DivisionByZero {
                context: "stretched time (time_stretch)",
            });
        }
        if normalizing_constant.is_zero() {
            return Err(AmmError::DivisionByZero {
                context: "stretched time (normalizing_constant)",
            });
        }
        Ok(Self {
            days,
            time_stretch,
            normalizing_constant,
        })
    }

    pub fn days(&self) -> Decimal {
        self.days
    }

    pub fn time_stretch(&self) -> Decimal {
        self.time_stretch
    }

    pub fn normalizing_constant(&self) -> Decimal {
        self.normalizing_constant
    }

    pub fn normalized_time(&self) -> Decimal {
        self.days / self.normalizing_constant
    }

    pub fn stretched_time(&self) -> Decimal {
        self.normalized_time() / self.time_stretch
    }

    pub fn annualized_time(&self) -> Decimal {
        self.days / DAYS_PER_YEAR
    }

    /// Same calibration with a different number of days remaining
    pub fn with_days(&self, days: Decimal) -> Self {
        Self { days, ..*self }
    }

    /// A freshly issued position: the whole term remains
    pub fn full_term(&self) -> Self {
        self.with_days(self.normalizing_constant)
    }

    /// Both derived times must sit in `[-ε, 1 + ε]`
    pub fn check_bounds(&self) -> AmmResult<()> {
        let upper = Decimal::ONE + PRECISION_THRESHOLD;
        let lower = -PRECISION_THRESHOLD;
        let normalized = self.normalized_time();
        if normalized < lower || normalized > upper {
            return Err(AmmError::InvariantViolation {
                field: "normalized_time",
                value: normalized,
                reason: "must be within [0, 1]",
            });
        }
        let stretched = self.stretched_time();
        if stretched < lower || stretched > upper {
            return Err(AmmError::InvariantViolation {
                field: "stretched_time",
                value: stretched,
                reason: "must be within [0, 1]",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_times() {
        let time = StretchedTime::new(dec!(91.25), dec!(20), dec!(365)).unwrap();
        assert_eq!(time.normalized_time(), dec!(0.25));
        assert_eq!(time.stretched_time(), dec!(0.0125));
        assert_eq!(time.annualized_time(), dec!(0.25));
        assert_eq!(time.full_term().normalized_time(), Decimal::ONE);
    }

    #[test]
    fn test_zero_calibration_is_rejected() {
        assert!(matches!(
            StretchedTime::new(dec!(1), dec!(0), dec!(365)),
            Err(AmmError::DivisionByZero { .. })
        ));
        assert!(matches!(
            StretchedTime::new(dec!(1), dec!(20), dec!(0)),
            Err(AmmError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn test_bounds() {
        let ok = StretchedTime::new(dec!(365), dec!(22.186877016851916), dec!(365)).unwrap();
        assert!(ok.check_bounds().is_ok());

        let past_term = StretchedTime::new(dec!(400), dec!(22), dec!(365)).unwrap();
        assert!(matches!(
            past_term.check_bounds(),
            Err(AmmError::InvariantViolation {
                field: "normalized_time",
                ..
            })
        ));

        // a stretch below one pushes the exponent past 1
        let over_stretched = StretchedTime::new(dec!(365), dec!(0.5), dec!(365)).unwrap();
        assert!(matches!(
            over_stretched.check_bounds(),
            Err(AmmError::InvariantViolation {
                field: "stretched_time",
                ..
            })
        ));
    }
}
