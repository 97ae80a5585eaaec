//! # Hyperdrive Types Library
//!
//! Shared vocabulary for the Hyperdrive pricing and market crates.
//!
//! ## Contents
//!
//! - **Numeric kernel** ([`FixedPointMath`]): `Decimal` working precision,
//!   range-reduced `ln`/`exp`/`pow`, checked arithmetic with contextual errors,
//!   weighted averages
//! - **Amounts** ([`Quantity`], [`TokenType`]): base or principal-token amounts
//! - **Time** ([`StretchedTime`]): days to maturity plus curve calibration
//! - **Quotes** ([`TradeResult`]): immutable pricing-model output
//! - **Errors** ([`AmmError`]): fatal invariant violations vs. reported rejections
//!
//! ## Precision
//!
//! There is exactly one numeric type, [`Decimal`]. Reserve levels in the
//! hundreds of millions keep 18 fractional digits (one wei) inside its 28
//! significant digits. Pricing models narrow their outputs to a configurable
//! scale ([`DEFAULT_SCALE`]) with banker's rounding.
//!
//! ```rust
//! use hyperdrive_types::{FixedPointMath, DEFAULT_SCALE};
//! use rust_decimal_macros::dec;
//!
//! let root = FixedPointMath::pow(dec!(2), dec!(0.5)).unwrap();
//! assert_eq!(FixedPointMath::narrow(root, DEFAULT_SCALE), dec!(1.414213562373095049));
//! ```

pub mod common;
pub mod quantity;
pub mod time;
pub mod trades;

pub use common::errors::{AmmError, AmmResult};
pub use common::fixed_point::{
    FixedPointMath, DEFAULT_SCALE, MAX_RESERVES_DIFFERENCE, PRECISION_THRESHOLD, WEI,
};
pub use quantity::{Quantity, TokenType};
pub use time::{StretchedTime, DAYS_PER_YEAR};
pub use trades::{MarketActionResult, TradeBreakdown, TradeResult, UserTradeResult};

pub use rust_decimal::Decimal;
