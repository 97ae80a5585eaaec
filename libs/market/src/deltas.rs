//! Signed increments to the market state
//!
//! Every operation builds one [`MarketDeltas`] and hands it to the state
//! machine. Per-bucket maps are keyed by checkpoint bucket id.

use hyperdrive_types::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opens checkpoint bucket `bucket` at `share_price`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub bucket: u64,
    pub share_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketDeltas {
    /// Base units; converted to shares at the pre-delta share price
    pub d_base_asset: Decimal,
    pub d_bond_asset: Decimal,
    pub d_lp_total_supply: Decimal,
    pub d_share_price: Decimal,
    pub d_variable_apr: Decimal,
    pub d_base_buffer: Decimal,
    pub d_bond_buffer: Decimal,
    pub longs_outstanding: Decimal,
    pub shorts_outstanding: Decimal,
    pub long_average_maturity_time: Decimal,
    pub short_average_maturity_time: Decimal,
    pub long_base_volume: Decimal,
    pub short_base_volume: Decimal,
    pub long_checkpoints: BTreeMap<u64, Decimal>,
    pub short_checkpoints: BTreeMap<u64, Decimal>,
    pub total_supply_longs: BTreeMap<u64, Decimal>,
    pub total_supply_shorts: BTreeMap<u64, Decimal>,
    pub checkpoint: Option<CheckpointRecord>,
}

impl MarketDeltas {
    /// True when applying the deltas would change nothing
    pub fn is_empty(&self) -> bool {
        let scalars = [
            self.d_base_asset,
            self.d_bond_asset,
            self.d_lp_total_supply,
            self.d_share_price,
            self.d_variable_apr,
            self.d_base_buffer,
            self.d_bond_buffer,
            self.longs_outstanding,
            self.shorts_outstanding,
            self.long_average_maturity_time,
            self.short_average_maturity_time,
            self.long_base_volume,
            self.short_base_volume,
        ];
        scalars.iter().all(Decimal::is_zero)
            && [
                &self.long_checkpoints,
                &self.short_checkpoints,
                &self.total_supply_longs,
                &self.total_supply_shorts,
            ]
            .iter()
            .all(|map| map.values().all(Decimal::is_zero))
            && self.checkpoint.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_is_empty() {
        let mut deltas = MarketDeltas::default();
        assert!(deltas.is_empty());

        deltas.total_supply_longs.insert(4, dec!(0));
        assert!(deltas.is_empty());

        deltas.long_checkpoints.insert(4, dec!(10));
        assert!(!deltas.is_empty());

        let record = MarketDeltas {
            checkpoint: Some(CheckpointRecord {
                bucket: 0,
                share_price: dec!(1),
            }),
            ..MarketDeltas::default()
        };
        assert!(!record.is_empty());
    }
}
