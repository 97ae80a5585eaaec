//! Market Configuration Module
//!
//! Loads the parameters a market is built from. Values come from a TOML file
//! with `HYPERDRIVE_`-prefixed environment variable overrides; any field left
//! out falls back to [`MarketConfig::default`].

use anyhow::{bail, ensure, Context, Result};
use config_crate::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Default location of the market configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/market.toml";

/// Largest decimal scale a `Decimal` can carry
const MAX_SCALE: u32 = 28;

/// Curve family the market prices trades with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingModelKind {
    #[default]
    Hyperdrive,
    YieldSpace,
}

impl fmt::Display for PricingModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PricingModelKind::Hyperdrive => write!(f, "hyperdrive"),
            PricingModelKind::YieldSpace => write!(f, "yieldspace"),
        }
    }
}

/// Market construction parameters
///
/// Durations are in days. Rates and fee multiples are fractions (`0.05` is 5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub pricing_model: PricingModelKind,
    /// μ, also the starting share price
    pub init_share_price: Decimal,
    /// Term of every position
    pub position_duration_days: Decimal,
    /// Width of one checkpoint bucket
    pub checkpoint_duration_days: Decimal,
    pub curve_fee_multiple: Decimal,
    pub flat_fee_multiple: Decimal,
    /// Fixed rate the pool is seeded at; also calibrates the time stretch
    pub target_apr: Decimal,
    /// Rate the underlying yield source accrues at
    pub variable_apr: Decimal,
    /// Base contributed by the initial LP
    pub target_liquidity: Decimal,
    /// Curve calibration override; derived from `target_apr` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_stretch: Option<Decimal>,
    /// Decimal places quotes are narrowed to
    pub scale: u32,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            pricing_model: PricingModelKind::Hyperdrive,
            init_share_price: Decimal::ONE,
            position_duration_days: Decimal::from(365),
            checkpoint_duration_days: Decimal::ONE,
            curve_fee_multiple: Decimal::new(1, 1),
            flat_fee_multiple: Decimal::new(1, 1),
            target_apr: Decimal::new(5, 2),
            variable_apr: Decimal::new(5, 2),
            target_liquidity: Decimal::from(500_000_000),
            time_stretch: None,
            scale: 18,
        }
    }
}

impl MarketConfig {
    /// Load from a TOML file with environment variable overrides
    ///
    /// `HYPERDRIVE_TARGET_APR=0.07` overrides `target_apr`.
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading market config: {:?}", path);

        let config = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(
                Environment::with_prefix("HYPERDRIVE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build market configuration")?;

        let market: MarketConfig = config
            .try_deserialize()
            .context("Failed to deserialize market configuration")?;
        market
            .validate()
            .with_context(|| format!("Invalid market configuration in {}", path.display()))?;

        debug!(?market, "market config loaded");
        Ok(market)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let market: MarketConfig =
            toml::from_str(contents).context("Failed to parse market configuration")?;
        market.validate().context("Invalid market configuration")?;
        Ok(market)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize market configuration")
    }

    /// Reject parameters no market can be built from
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.init_share_price >= Decimal::ONE,
            "init_share_price must be at least 1, got {}",
            self.init_share_price
        );
        for (name, fee) in [
            ("curve_fee_multiple", self.curve_fee_multiple),
            ("flat_fee_multiple", self.flat_fee_multiple),
        ] {
            ensure!(
                fee >= Decimal::ZERO && fee <= Decimal::ONE,
                "{name} must be within [0, 1], got {fee}"
            );
        }
        ensure!(
            self.position_duration_days > Decimal::ZERO,
            "position_duration_days must be positive, got {}",
            self.position_duration_days
        );
        ensure!(
            self.checkpoint_duration_days > Decimal::ZERO,
            "checkpoint_duration_days must be positive, got {}",
            self.checkpoint_duration_days
        );
        if !(self.position_duration_days % self.checkpoint_duration_days).is_zero() {
            bail!(
                "position_duration_days ({}) must be a whole number of checkpoints ({})",
                self.position_duration_days,
                self.checkpoint_duration_days
            );
        }
        ensure!(
            self.target_apr > Decimal::ZERO,
            "target_apr must be positive, got {}",
            self.target_apr
        );
        ensure!(
            self.target_liquidity > Decimal::ZERO,
            "target_liquidity must be positive, got {}",
            self.target_liquidity
        );
        if let Some(time_stretch) = self.time_stretch {
            ensure!(
                time_stretch >= Decimal::ONE,
                "time_stretch must be at least 1, got {time_stretch}"
            );
        }
        ensure!(self.scale <= MAX_SCALE, "scale must be at most {MAX_SCALE}, got {}", self.scale);
        Ok(())
    }
}

/// Convenience function to load the market configuration
///
/// Falls back to [`DEFAULT_CONFIG_PATH`] when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<MarketConfig> {
    MarketConfig::load(path.unwrap_or(Path::new(DEFAULT_CONFIG_PATH)))
}
