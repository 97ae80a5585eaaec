//! # Hyperdrive Market Configuration
//!
//! Parameters a market is constructed from: pricing model, term and
//! checkpoint widths, fee multiples, target and variable rates, and the
//! initial liquidity.
//!
//! ## Usage
//!
//! ```rust
//! use hyperdrive_config::MarketConfig;
//!
//! let config = MarketConfig::from_toml_str("target_apr = 0.07").unwrap();
//! assert_eq!(config.target_apr.to_string(), "0.07");
//! ```

pub mod market_config;

pub use market_config::{load_config, MarketConfig, PricingModelKind, DEFAULT_CONFIG_PATH};
