//! # Hyperdrive AMM Library - Bonding Curve Pricing Engine
//!
//! ## Purpose
//!
//! Stateless pricing models for a fixed-maturity yield AMM. Given a reserve
//! snapshot and the time left on a position, a model quotes trades between the
//! base asset and principal tokens, prices LP contributions, bounds the
//! largest trade the pool can absorb, and calibrates a new pool to a target
//! rate.
//!
//! ## Models
//!
//! - [`YieldSpacePricingModel`]: the curve `k = (c/μ)·(μz)^(1-τ) + (y+s)^(1-τ)`
//!   evaluated at the trade's own stretched time
//! - [`HyperdrivePricingModel`]: splits a trade into a curve leg priced at
//!   full-term time and a flat leg redeemed at par
//!
//! Both implement [`PricingModel`]; callers hold `Box<dyn PricingModel>`.
//!
//! ## Integration Points
//!
//! - **Input**: [`PoolReserves`] snapshots built by the market state machine
//! - **Output**: [`TradeResult`](hyperdrive_types::TradeResult) quotes and
//!   [`LiquidityQuote`]s applied as market deltas by the caller
//! - **Precision**: `Decimal` throughout, narrowed to the model's scale
//!
//! ```rust
//! use hyperdrive_amm::{HyperdrivePricingModel, PricingModel};
//! use rust_decimal_macros::dec;
//!
//! let model = HyperdrivePricingModel::new();
//! let stretch = model.calc_time_stretch(dec!(0.05)).unwrap();
//! assert!((stretch - dec!(22.186877016851916)).abs() < dec!(0.000000000000001));
//! ```

pub mod hyperdrive;
pub mod pool_traits;
pub mod price;
pub mod yieldspace;

pub use hyperdrive::HyperdrivePricingModel;
pub use pool_traits::{apr_preserving_bond_delta, LiquidityQuote, PoolReserves, PricingModel};
pub use price::{calc_apr_from_spot_price, calc_spot_price_from_apr};
pub use yieldspace::{YieldSpaceCurve, YieldSpacePricingModel};

pub use hyperdrive_types::Decimal;
