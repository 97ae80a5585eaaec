//! Property tests over market operations

mod common;

use common::*;
use hyperdrive_market::MarketAction;
use proptest::prelude::*;
use rust_decimal::Decimal;

prop_compose! {
    fn base_amount()(units in 1u64..10_000_000u64) -> Decimal {
        Decimal::from(units)
    }
}

prop_compose! {
    fn bond_amount()(units in 1u64..10_000_000u64) -> Decimal {
        Decimal::from(units)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_long_round_trip_never_profits(amount in base_amount()) {
        let (mut market, _) = flat_rate_market();
        let mut trader = trader(amount);
        let open = MarketAction::OpenLong { base_amount: amount };
        market.perform_action(&mut trader, &open).unwrap();
        let bonds = trader.long(Decimal::ZERO).unwrap().balance;
        assert_solvent(&market);

        let close = MarketAction::CloseLong {
            bond_amount: bonds,
            mint_time: Decimal::ZERO,
        };
        market.perform_action(&mut trader, &close).unwrap();
        let state = market.market_state();
        prop_assert!(trader.balance.amount <= amount);
        prop_assert_eq!(state.longs_outstanding, Decimal::ZERO);
        prop_assert_eq!(state.base_buffer, Decimal::ZERO);
        assert_solvent(&market);
    }

    #[test]
    fn prop_short_raises_apr(amount in bond_amount()) {
        let (mut market, _) = seeded_market();
        let before = apr(&market);
        market.open_short(amount).unwrap();
        prop_assert!(apr(&market) > before);
        assert_solvent(&market);
    }

    #[test]
    fn prop_long_lowers_apr(amount in base_amount()) {
        let (mut market, _) = seeded_market();
        let before = apr(&market);
        market.open_long(amount).unwrap();
        prop_assert!(apr(&market) < before);
        assert_solvent(&market);
    }

    #[test]
    fn prop_rejected_trades_leave_no_trace(multiple in 2u32..10u32) {
        let (mut market, _) = flat_rate_market();
        let (_, max_shorted) = market.get_max_short().unwrap();
        let before = market.market_state().clone();
        prop_assert!(market.open_short(max_shorted * Decimal::from(multiple)).is_err());
        prop_assert_eq!(market.market_state(), &before);
    }
}
