//! Shared market fixtures

#![allow(dead_code)]

use hyperdrive_config::MarketConfig;
use hyperdrive_market::{Market, Wallet};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const CONTRIBUTION: Decimal = dec!(500000000);
pub const TARGET_APR: Decimal = dec!(0.05);

/// Default market (Hyperdrive model, 365-day term, 1-day checkpoints), seeded
pub fn seeded_market() -> (Market, Wallet) {
    let mut market = Market::from_config(&MarketConfig::default()).unwrap();
    let mut lp = Wallet::new(0, CONTRIBUTION);
    let (_, agent_deltas) = market.initialize(CONTRIBUTION, TARGET_APR).unwrap();
    lp.update(&agent_deltas).unwrap();
    (market, lp)
}

/// Same as [`seeded_market`] with interest switched off
pub fn flat_rate_market() -> (Market, Wallet) {
    let (mut market, lp) = seeded_market();
    market.set_variable_apr(Decimal::ZERO).unwrap();
    (market, lp)
}

pub fn trader(budget: Decimal) -> Wallet {
    Wallet::new(1, budget)
}

pub fn apr(market: &Market) -> Decimal {
    market.fixed_apr().unwrap().unwrap()
}

pub fn assert_close(actual: Decimal, expected: Decimal, tolerance: Decimal) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "{actual} differs from {expected} by more than {tolerance}"
    );
}

/// `c·z ≥ base_buffer`, `y ≥ bond_buffer`, non-negative APR
pub fn assert_solvent(market: &Market) {
    let state = market.market_state();
    let share_value = state.share_value().unwrap();
    assert!(share_value >= state.base_buffer, "base buffer exceeds share value");
    assert!(state.bond_reserves >= state.bond_buffer, "bond buffer exceeds bond reserves");
    assert!(apr(market) >= Decimal::ZERO, "negative fixed APR");
}
