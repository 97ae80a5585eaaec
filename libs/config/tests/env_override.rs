//! Environment overrides live in their own test binary so the variables
//! never leak into other config tests.

use hyperdrive_config::{MarketConfig, PricingModelKind};
use rust_decimal_macros::dec;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_environment_overrides_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("market.toml");
    fs::write(&config_path, "target_apr = 0.05\ncurve_fee_multiple = 0.1\n").unwrap();

    std::env::set_var("HYPERDRIVE_TARGET_APR", "0.07");
    std::env::set_var("HYPERDRIVE_PRICING_MODEL", "yieldspace");
    let config = MarketConfig::load(&config_path).unwrap();
    std::env::remove_var("HYPERDRIVE_TARGET_APR");
    std::env::remove_var("HYPERDRIVE_PRICING_MODEL");

    assert_eq!(config.target_apr, dec!(0.07));
    assert_eq!(config.pricing_model, PricingModelKind::YieldSpace);
    assert_eq!(config.curve_fee_multiple, dec!(0.1));
}
