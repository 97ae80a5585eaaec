//! Market state machine
//!
//! [`MarketState`] is the reserve ledger. It is only ever changed through
//! [`Stateful::apply_delta`], which stages the whole update on a copy, checks
//! the post-conditions and then commits. A rejected delta leaves the state
//! untouched.

use crate::deltas::MarketDeltas;
use crate::error::{MarketError, MarketResult};
use hyperdrive_amm::PoolReserves;
use hyperdrive_types::{AmmError, Decimal, FixedPointMath, MAX_RESERVES_DIFFERENCE};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// State that changes only by applying deltas
pub trait Stateful: Sized {
    /// Increment type this state accepts
    type Delta;

    /// Error type for rejected deltas
    type Error: std::error::Error + Send + Sync + 'static;

    /// Apply a delta atomically
    fn apply_delta(&mut self, delta: &Self::Delta) -> Result<(), Self::Error>;

    /// Deep copy of the current state
    fn snapshot(&self) -> Self;

    /// Roll back to a snapshot
    fn restore(&mut self, snapshot: Self);
}

/// Per-bucket record, created once
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Share price when the bucket was opened; never overwritten
    pub share_price: Decimal,
    /// Base paid for longs minted in this bucket and still open
    pub long_base_volume: Decimal,
    /// Base received for shorts minted in this bucket and still open
    pub short_base_volume: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    pub share_reserves: Decimal,
    pub bond_reserves: Decimal,
    pub lp_total_supply: Decimal,
    pub share_price: Decimal,
    pub init_share_price: Decimal,
    pub variable_apr: Decimal,
    pub curve_fee_multiple: Decimal,
    pub flat_fee_multiple: Decimal,
    pub base_buffer: Decimal,
    pub bond_buffer: Decimal,
    pub longs_outstanding: Decimal,
    pub shorts_outstanding: Decimal,
    pub long_average_maturity_time: Decimal,
    pub short_average_maturity_time: Decimal,
    pub long_base_volume: Decimal,
    pub short_base_volume: Decimal,
    /// Width of one bucket, in days
    pub checkpoint_duration: Decimal,
    pub checkpoints: BTreeMap<u64, Checkpoint>,
    /// Open long bonds by mint bucket
    pub total_supply_longs: BTreeMap<u64, Decimal>,
    /// Open short bonds by mint bucket
    pub total_supply_shorts: BTreeMap<u64, Decimal>,
}

impl MarketState {
    /// Empty pool; reserves arrive with initialization
    pub fn new(
        init_share_price: Decimal,
        share_price: Decimal,
        variable_apr: Decimal,
        curve_fee_multiple: Decimal,
        flat_fee_multiple: Decimal,
        checkpoint_duration: Decimal,
    ) -> MarketResult<Self> {
        if init_share_price.is_zero() {
            return Err(AmmError::DivisionByZero {
                context: "init_share_price",
            }
            .into());
        }
        if init_share_price < Decimal::ONE {
            return Err(invariant("init_share_price", init_share_price, "must be at least 1"));
        }
        if share_price <= Decimal::ZERO {
            return Err(invariant("share_price", share_price, "must be positive"));
        }
        for (field, value) in [
            ("curve_fee_multiple", curve_fee_multiple),
            ("flat_fee_multiple", flat_fee_multiple),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(invariant(field, value, "must be within [0, 1]"));
            }
        }
        if checkpoint_duration <= Decimal::ZERO {
            return Err(invariant("checkpoint_duration", checkpoint_duration, "must be positive"));
        }
        Ok(Self {
            share_reserves: Decimal::ZERO,
            bond_reserves: Decimal::ZERO,
            lp_total_supply: Decimal::ZERO,
            share_price,
            init_share_price,
            variable_apr,
            curve_fee_multiple,
            flat_fee_multiple,
            base_buffer: Decimal::ZERO,
            bond_buffer: Decimal::ZERO,
            longs_outstanding: Decimal::ZERO,
            shorts_outstanding: Decimal::ZERO,
            long_average_maturity_time: Decimal::ZERO,
            short_average_maturity_time: Decimal::ZERO,
            long_base_volume: Decimal::ZERO,
            short_base_volume: Decimal::ZERO,
            checkpoint_duration,
            checkpoints: BTreeMap::new(),
            total_supply_longs: BTreeMap::new(),
            total_supply_shorts: BTreeMap::new(),
        })
    }

    /// Snapshot handed to the pricing model
    pub fn pool_reserves(&self) -> PoolReserves {
        PoolReserves {
            share_reserves: self.share_reserves,
            bond_reserves: self.bond_reserves,
            lp_total_supply: self.lp_total_supply,
            share_price: self.share_price,
            init_share_price: self.init_share_price,
            curve_fee_multiple: self.curve_fee_multiple,
            flat_fee_multiple: self.flat_fee_multiple,
            base_buffer: self.base_buffer,
            bond_buffer: self.bond_buffer,
            longs_outstanding: self.longs_outstanding,
            shorts_outstanding: self.shorts_outstanding,
        }
    }

    /// Bucket id of an aligned, non-negative time
    pub fn bucket_for(&self, time: Decimal) -> MarketResult<u64> {
        if time.is_sign_negative() && !time.is_zero() {
            return Err(MarketError::InvalidTimestamp {
                time,
                reason: "time is before the market opened",
            });
        }
        if !(time % self.checkpoint_duration).is_zero() {
            return Err(MarketError::InvalidTimestamp {
                time,
                reason: "not aligned to a checkpoint",
            });
        }
        (time / self.checkpoint_duration)
            .to_u64()
            .ok_or(MarketError::InvalidTimestamp {
                time,
                reason: "checkpoint bucket out of range",
            })
    }

    /// Start time of bucket `bucket`
    pub fn bucket_time(&self, bucket: u64) -> Decimal {
        Decimal::from(bucket) * self.checkpoint_duration
    }

    pub fn checkpoint(&self, bucket: u64) -> Option<&Checkpoint> {
        self.checkpoints.get(&bucket)
    }

    /// Value of the pool's shares in base
    pub fn share_value(&self) -> MarketResult<Decimal> {
        Ok(FixedPointMath::mul(self.share_reserves, self.share_price, "share value")?)
    }

    /// Precondition checks run before every delta is applied
    pub fn check_market_updates(&self, deltas: &MarketDeltas) -> MarketResult<()> {
        for (field, value) in [
            ("curve_fee_multiple", self.curve_fee_multiple),
            ("flat_fee_multiple", self.flat_fee_multiple),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(invariant(field, value, "must be within [0, 1]"));
            }
        }
        let lp_total_supply = FixedPointMath::clamp_dust(FixedPointMath::add(
            self.lp_total_supply,
            deltas.d_lp_total_supply,
            "lp_total_supply",
        )?);
        if lp_total_supply.is_sign_negative() && !lp_total_supply.is_zero() {
            return Err(invariant("lp_total_supply", lp_total_supply, "must be non-negative"));
        }
        let share_price =
            FixedPointMath::add(self.share_price, deltas.d_share_price, "share_price")?;
        if share_price <= Decimal::ZERO {
            return Err(invariant("share_price", share_price, "must be positive"));
        }
        if let Some(record) = &deltas.checkpoint {
            if self.checkpoints.contains_key(&record.bucket) {
                return Err(MarketError::Checkpoint {
                    bucket: record.bucket,
                    reason: "already recorded",
                });
            }
            if record.share_price <= Decimal::ZERO {
                return Err(invariant(
                    "checkpoint_share_price",
                    record.share_price,
                    "must be positive",
                ));
            }
        }
        Ok(())
    }

    /// State the deltas would produce, without committing it
    pub fn preview(&self, deltas: &MarketDeltas) -> MarketResult<MarketState> {
        let mut next = self.clone();
        let d_shares = FixedPointMath::div(deltas.d_base_asset, self.share_price, "apply delta")?;
        next.share_reserves = FixedPointMath::add(self.share_reserves, d_shares, "share_reserves")?;
        next.bond_reserves =
            FixedPointMath::add(self.bond_reserves, deltas.d_bond_asset, "bond_reserves")?;
        next.lp_total_supply = FixedPointMath::add(
            self.lp_total_supply,
            deltas.d_lp_total_supply,
            "lp_total_supply",
        )?;
        next.share_price =
            FixedPointMath::add(self.share_price, deltas.d_share_price, "share_price")?;
        next.variable_apr =
            FixedPointMath::add(self.variable_apr, deltas.d_variable_apr, "variable_apr")?;
        next.base_buffer =
            FixedPointMath::add(self.base_buffer, deltas.d_base_buffer, "base_buffer")?;
        next.bond_buffer =
            FixedPointMath::add(self.bond_buffer, deltas.d_bond_buffer, "bond_buffer")?;
        next.longs_outstanding = FixedPointMath::add(
            self.longs_outstanding,
            deltas.longs_outstanding,
            "longs_outstanding",
        )?;
        next.shorts_outstanding = FixedPointMath::add(
            self.shorts_outstanding,
            deltas.shorts_outstanding,
            "shorts_outstanding",
        )?;
        next.long_average_maturity_time = FixedPointMath::add(
            self.long_average_maturity_time,
            deltas.long_average_maturity_time,
            "long_average_maturity_time",
        )?;
        next.short_average_maturity_time = FixedPointMath::add(
            self.short_average_maturity_time,
            deltas.short_average_maturity_time,
            "short_average_maturity_time",
        )?;
        next.long_base_volume = FixedPointMath::add(
            self.long_base_volume,
            deltas.long_base_volume,
            "long_base_volume",
        )?;
        next.short_base_volume = FixedPointMath::add(
            self.short_base_volume,
            deltas.short_base_volume,
            "short_base_volume",
        )?;

        if let Some(record) = &deltas.checkpoint {
            if next.checkpoints.contains_key(&record.bucket) {
                return Err(MarketError::Checkpoint {
                    bucket: record.bucket,
                    reason: "already recorded",
                });
            }
            next.checkpoints.insert(
                record.bucket,
                Checkpoint {
                    share_price: record.share_price,
                    ..Checkpoint::default()
                },
            );
        }
        for (bucket, volume) in &deltas.long_checkpoints {
            let checkpoint = recorded(&mut next.checkpoints, *bucket)?;
            let field = "checkpoint_long_base_volume";
            let volume = FixedPointMath::add(checkpoint.long_base_volume, *volume, field)?;
            checkpoint.long_base_volume = clamped(volume, field)?;
        }
        for (bucket, volume) in &deltas.short_checkpoints {
            let checkpoint = recorded(&mut next.checkpoints, *bucket)?;
            let field = "checkpoint_short_base_volume";
            let volume = FixedPointMath::add(checkpoint.short_base_volume, *volume, field)?;
            checkpoint.short_base_volume = clamped(volume, field)?;
        }
        apply_supply(
            &mut next.total_supply_longs,
            &deltas.total_supply_longs,
            "total_supply_longs",
        )?;
        apply_supply(
            &mut next.total_supply_shorts,
            &deltas.total_supply_shorts,
            "total_supply_shorts",
        )?;

        next.check_post_conditions()?;
        Ok(next)
    }

    fn check_post_conditions(&mut self) -> MarketResult<()> {
        self.share_reserves = clamped(self.share_reserves, "share_reserves")?;
        self.bond_reserves = clamped(self.bond_reserves, "bond_reserves")?;
        self.lp_total_supply = clamped(self.lp_total_supply, "lp_total_supply")?;
        self.base_buffer = clamped(self.base_buffer, "base_buffer")?;
        self.bond_buffer = clamped(self.bond_buffer, "bond_buffer")?;
        self.longs_outstanding = clamped(self.longs_outstanding, "longs_outstanding")?;
        self.shorts_outstanding = clamped(self.shorts_outstanding, "shorts_outstanding")?;
        self.long_base_volume = clamped(self.long_base_volume, "long_base_volume")?;
        self.short_base_volume = clamped(self.short_base_volume, "short_base_volume")?;

        if self.share_price <= Decimal::ZERO {
            return Err(invariant("share_price", self.share_price, "must be positive"));
        }
        if self.share_price < self.init_share_price {
            warn!(share_price = %self.share_price, "share price below its initial value");
        }
        let difference =
            FixedPointMath::sub(self.share_value()?, self.bond_reserves, "reserves difference")?
                .abs();
        if difference >= MAX_RESERVES_DIFFERENCE {
            return Err(invariant(
                "reserves_difference",
                difference,
                "share and bond reserves diverged",
            ));
        }
        Ok(())
    }
}

impl Stateful for MarketState {
    type Delta = MarketDeltas;
    type Error = MarketError;

    fn apply_delta(&mut self, delta: &MarketDeltas) -> MarketResult<()> {
        let next = self.preview(delta)?;
        debug!(
            share_reserves = %next.share_reserves,
            bond_reserves = %next.bond_reserves,
            lp_total_supply = %next.lp_total_supply,
            "market delta applied"
        );
        *self = next;
        Ok(())
    }

    fn snapshot(&self) -> Self {
        self.clone()
    }

    fn restore(&mut self, snapshot: Self) {
        *self = snapshot;
    }
}

fn invariant(field: &'static str, value: Decimal, reason: &'static str) -> MarketError {
    AmmError::InvariantViolation { field, value, reason }.into()
}

/// Clamp sub-threshold dust, reject anything more negative
fn clamped(value: Decimal, field: &'static str) -> MarketResult<Decimal> {
    let value = FixedPointMath::clamp_dust(value);
    if value.is_sign_negative() && !value.is_zero() {
        return Err(invariant(field, value, "must be non-negative"));
    }
    Ok(value)
}

fn recorded(
    checkpoints: &mut BTreeMap<u64, Checkpoint>,
    bucket: u64,
) -> MarketResult<&mut Checkpoint> {
    checkpoints.get_mut(&bucket).ok_or(MarketError::Checkpoint {
        bucket,
        reason: "not recorded",
    })
}

fn apply_supply(
    supplies: &mut BTreeMap<u64, Decimal>,
    deltas: &BTreeMap<u64, Decimal>,
    field: &'static str,
) -> MarketResult<()> {
    for (bucket, delta) in deltas {
        let current = supplies.get(bucket).copied().unwrap_or_default();
        let supply = clamped(FixedPointMath::add(current, *delta, field)?, field)?;
        if supply.is_zero() {
            supplies.remove(bucket);
        } else {
            supplies.insert(*bucket, supply);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deltas::CheckpointRecord;
    use rust_decimal_macros::dec;

    fn state() -> MarketState {
        MarketState::new(dec!(1), dec!(1), dec!(0.05), dec!(0.1), dec!(0.1), dec!(1)).unwrap()
    }

    fn seeded() -> MarketState {
        let mut state = state();
        state
            .apply_delta(&MarketDeltas {
                d_base_asset: dec!(1000),
                d_bond_asset: dec!(900),
                d_lp_total_supply: dec!(1900),
                checkpoint: Some(CheckpointRecord {
                    bucket: 0,
                    share_price: dec!(1),
                }),
                ..MarketDeltas::default()
            })
            .unwrap();
        state
    }

    #[test]
    fn test_construction_is_validated() {
        assert!(matches!(
            MarketState::new(dec!(0), dec!(1), dec!(0), dec!(0), dec!(0), dec!(1)),
            Err(MarketError::Amm(AmmError::DivisionByZero { .. }))
        ));
        assert!(matches!(
            MarketState::new(dec!(0.9), dec!(1), dec!(0), dec!(0), dec!(0), dec!(1)),
            Err(MarketError::Amm(AmmError::InvariantViolation {
                field: "init_share_price",
                ..
            }))
        ));
        assert!(MarketState::new(dec!(1), dec!(1), dec!(0), dec!(1.1), dec!(0), dec!(1)).is_err());
        assert!(MarketState::new(dec!(1), dec!(1), dec!(0), dec!(0), dec!(0), dec!(0)).is_err());
    }

    #[test]
    fn test_base_converts_at_pre_delta_share_price() {
        let mut state = seeded();
        state
            .apply_delta(&MarketDeltas {
                d_share_price: dec!(1),
                ..MarketDeltas::default()
            })
            .unwrap();
        state
            .apply_delta(&MarketDeltas {
                d_base_asset: dec!(100),
                d_share_price: dec!(2),
                ..MarketDeltas::default()
            })
            .unwrap();
        // 100 base at a share price of 2
        assert_eq!(state.share_reserves, dec!(1050));
        assert_eq!(state.share_price, dec!(4));
    }

    #[test]
    fn test_rejected_delta_leaves_state_untouched() {
        let mut state = seeded();
        let before = state.clone();
        let overdraw = MarketDeltas {
            d_base_asset: dec!(-2000),
            d_lp_total_supply: dec!(5),
            ..MarketDeltas::default()
        };
        assert!(matches!(
            state.apply_delta(&overdraw),
            Err(MarketError::Amm(AmmError::InvariantViolation {
                field: "share_reserves",
                ..
            }))
        ));
        assert_eq!(state, before);
    }

    #[test]
    fn test_dust_is_clamped() {
        let mut state = seeded();
        state
            .apply_delta(&MarketDeltas {
                d_bond_buffer: dec!(-0.000000001),
                ..MarketDeltas::default()
            })
            .unwrap();
        assert_eq!(state.bond_buffer, dec!(0));
    }

    #[test]
    fn test_checkpoints_open_once() {
        let mut state = seeded();
        let reopen = MarketDeltas {
            checkpoint: Some(CheckpointRecord {
                bucket: 0,
                share_price: dec!(2),
            }),
            ..MarketDeltas::default()
        };
        assert!(matches!(
            state.check_market_updates(&reopen),
            Err(MarketError::Checkpoint { .. })
        ));
        assert!(state.apply_delta(&reopen).is_err());
        assert_eq!(state.checkpoint(0).unwrap().share_price, dec!(1));

        let mut unrecorded = MarketDeltas::default();
        unrecorded.long_checkpoints.insert(9, dec!(10));
        assert!(matches!(
            state.apply_delta(&unrecorded),
            Err(MarketError::Checkpoint { bucket: 9, .. })
        ));
    }

    #[test]
    fn test_supplies_drop_empty_buckets() {
        let mut state = seeded();
        let mut open = MarketDeltas::default();
        open.total_supply_longs.insert(0, dec!(25));
        state.apply_delta(&open).unwrap();
        assert_eq!(state.total_supply_longs.get(&0), Some(&dec!(25)));

        let mut close = MarketDeltas::default();
        close.total_supply_longs.insert(0, dec!(-25));
        state.apply_delta(&close).unwrap();
        assert!(state.total_supply_longs.is_empty());
    }

    #[test]
    fn test_reserve_consistency() {
        let mut state = seeded();
        let skewed = MarketDeltas {
            d_bond_asset: dec!(30000000000),
            ..MarketDeltas::default()
        };
        assert!(matches!(
            state.apply_delta(&skewed),
            Err(MarketError::Amm(AmmError::InvariantViolation {
                field: "reserves_difference",
                ..
            }))
        ));
    }

    #[test]
    fn test_overflowing_delta_is_rejected() {
        let mut state = seeded();
        let before = state.clone();
        let inflated = MarketDeltas {
            d_share_price: Decimal::MAX - dec!(1),
            ..MarketDeltas::default()
        };
        assert!(matches!(
            state.apply_delta(&inflated),
            Err(MarketError::Amm(AmmError::Overflow { .. }))
        ));
        let minted = MarketDeltas {
            d_lp_total_supply: Decimal::MAX,
            ..MarketDeltas::default()
        };
        assert!(matches!(
            state.check_market_updates(&minted),
            Err(MarketError::Amm(AmmError::Overflow { .. }))
        ));
        assert_eq!(state, before);
    }

    #[test]
    fn test_bucket_alignment() {
        let mut state = state();
        state.checkpoint_duration = dec!(0.5);
        assert_eq!(state.bucket_for(dec!(3)).unwrap(), 6);
        assert_eq!(state.bucket_time(6), dec!(3));
        assert!(matches!(
            state.bucket_for(dec!(3.25)),
            Err(MarketError::InvalidTimestamp { .. })
        ));
        assert!(matches!(
            state.bucket_for(dec!(-1)),
            Err(MarketError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_snapshot_restore() {
        let mut state = seeded();
        let snapshot = state.snapshot();
        state
            .apply_delta(&MarketDeltas {
                d_variable_apr: dec!(0.01),
                ..MarketDeltas::default()
            })
            .unwrap();
        assert_eq!(state.variable_apr, dec!(0.06));
        state.restore(snapshot);
        assert_eq!(state.variable_apr, dec!(0.05));
    }
}
