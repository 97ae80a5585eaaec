//! Checkpoint recording and maturity settlement

mod common;

use common::*;
use hyperdrive_market::{MarketAction, MarketError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[test_log::test]
fn test_checkpoint_is_idempotent() {
    let (mut market, _) = seeded_market();
    market.advance_time(dec!(3)).unwrap();

    let first = market.checkpoint(dec!(3)).unwrap();
    assert!(first.checkpoint.is_some());
    let state = market.market_state().clone();

    let second = market.checkpoint(dec!(3)).unwrap();
    assert!(second.is_empty());
    assert_eq!(market.market_state(), &state);
}

#[test_log::test]
fn test_checkpoint_rejects_bad_times() {
    let (mut market, _) = seeded_market();
    market.advance_time(dec!(2)).unwrap();
    let before = market.market_state().clone();

    assert!(matches!(
        market.checkpoint(dec!(3)),
        Err(MarketError::InvalidTimestamp { .. })
    ));
    assert!(matches!(
        market.checkpoint(dec!(1.5)),
        Err(MarketError::InvalidTimestamp { .. })
    ));
    assert_eq!(market.market_state(), &before);
}

#[test_log::test]
fn test_missed_checkpoint_borrows_the_next_share_price() {
    let (mut market, _) = seeded_market();
    market.advance_time(dec!(2)).unwrap();
    let share_price = market.market_state().share_price;
    assert!(share_price > dec!(1));

    market.checkpoint(dec!(2)).unwrap();
    market.checkpoint(dec!(1)).unwrap();
    let state = market.market_state();
    assert_eq!(state.checkpoint(1).unwrap().share_price, share_price);
    assert_eq!(state.checkpoint(2).unwrap().share_price, share_price);
}

#[test_log::test]
fn test_positions_mint_into_the_latest_checkpoint() {
    let (mut market, _) = seeded_market();
    let mut trader = trader(dec!(1000));
    market.advance_time(dec!(7.5)).unwrap();
    assert_eq!(market.latest_checkpoint_time(), dec!(7));

    market
        .perform_action(&mut trader, &MarketAction::OpenLong { base_amount: dec!(10) })
        .unwrap();
    let state = market.market_state();
    assert!(trader.long(dec!(7)).is_some());
    assert!(state.total_supply_longs.contains_key(&7));
    assert_close(state.long_average_maturity_time, dec!(372), dec!(0.000000000000001));
    assert_eq!(state.checkpoint(7).unwrap().share_price, state.share_price);
}

#[test_log::test]
fn test_settlement_zeroes_aggregates_and_keeps_the_rate() {
    let (mut market, _) = flat_rate_market();
    let mut longer = trader(dec!(1000));
    let mut shorter = trader(dec!(1000));
    market
        .perform_action(&mut longer, &MarketAction::OpenLong { base_amount: dec!(100) })
        .unwrap();
    market
        .perform_action(&mut shorter, &MarketAction::OpenShort { bond_amount: dec!(40) })
        .unwrap();
    let longs = longer.long(dec!(0)).unwrap().balance;

    market.block_time_mut().tick(dec!(365)).unwrap();
    let apr_before = apr(&market);
    let share_reserves = market.market_state().share_reserves;
    let deltas = market.checkpoint(dec!(365)).unwrap();

    let state = market.market_state();
    assert_eq!(deltas.d_base_asset, dec!(40) - longs);
    assert_close(state.share_reserves, share_reserves + dec!(40) - longs, dec!(0.000000000000001));
    assert_eq!(state.longs_outstanding, Decimal::ZERO);
    assert_eq!(state.shorts_outstanding, Decimal::ZERO);
    assert_eq!(state.base_buffer, Decimal::ZERO);
    assert_eq!(state.bond_buffer, Decimal::ZERO);
    assert_eq!(state.long_base_volume, Decimal::ZERO);
    assert_eq!(state.short_base_volume, Decimal::ZERO);
    assert_eq!(state.long_average_maturity_time, Decimal::ZERO);
    assert_eq!(state.short_average_maturity_time, Decimal::ZERO);
    // trader claims are still outstanding until redeemed
    assert_eq!(state.total_supply_longs.get(&0), Some(&longs));
    assert_eq!(state.total_supply_shorts.get(&0), Some(&dec!(40)));
    assert_close(apr(&market), apr_before, dec!(0.000000000001));
    assert_solvent(&market);

    // settling again is a no-op
    assert!(market.checkpoint(dec!(365)).unwrap().is_empty());
}

#[test_log::test]
fn test_late_close_settles_the_maturity_checkpoint() {
    let (mut market, _) = flat_rate_market();
    let mut trader = trader(dec!(1000));
    market
        .perform_action(&mut trader, &MarketAction::OpenLong { base_amount: dec!(10) })
        .unwrap();
    let bonds = trader.long(dec!(0)).unwrap().balance;

    // nobody checkpointed day 365
    market.block_time_mut().tick(dec!(400)).unwrap();
    market
        .perform_action(
            &mut trader,
            &MarketAction::CloseLong {
                bond_amount: bonds,
                mint_time: dec!(0),
            },
        )
        .unwrap();
    let state = market.market_state();
    assert!(state.checkpoint(365).is_some());
    assert!(state.checkpoint(400).is_some());
    assert_eq!(state.longs_outstanding, Decimal::ZERO);
    assert_eq!(trader.balance.amount, dec!(990) + bonds);
}
