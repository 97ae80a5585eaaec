//! Checkpoint subsystem
//!
//! Time is cut into buckets of `checkpoint_duration` days. The first time a
//! bucket is checkpointed it records a share price and settles every position
//! that matures at the bucket's start. Settlement is a flat redemption at par
//! followed by a liquidity update that keeps `μz / (y+s)` fixed, so it never
//! moves the pool's fixed rate. Checkpointing a recorded bucket does nothing.

use crate::deltas::{CheckpointRecord, MarketDeltas};
use crate::error::{MarketError, MarketResult};
use crate::market::Market;
use hyperdrive_amm::apr_preserving_bond_delta;
use hyperdrive_types::{AmmError, Decimal, FixedPointMath};
use tracing::{debug, info};

impl Market {
    /// Record bucket `time` and settle positions maturing at it
    ///
    /// Returns the applied deltas; empty if the bucket was already recorded.
    pub fn checkpoint(&mut self, time: Decimal) -> MarketResult<MarketDeltas> {
        let deltas = self.checkpoint_deltas(time)?;
        if deltas.is_empty() {
            debug!(%time, "checkpoint already recorded");
            return Ok(deltas);
        }
        self.update_market(&deltas)?;
        info!(
            %time,
            share_price = ?deltas.checkpoint.map(|record| record.share_price),
            "checkpoint recorded"
        );
        Ok(deltas)
    }

    fn checkpoint_deltas(&self, time: Decimal) -> MarketResult<MarketDeltas> {
        if time > self.block_time.time() {
            return Err(MarketError::InvalidTimestamp {
                time,
                reason: "checkpoint is in the future",
            });
        }
        let bucket = self.state.bucket_for(time)?;
        if self.state.checkpoints.contains_key(&bucket) {
            return Ok(MarketDeltas::default());
        }

        // an older bucket borrows the price of the next recorded one
        let share_price = if time == self.latest_checkpoint_time() {
            self.state.share_price
        } else {
            self.state
                .checkpoints
                .range(bucket..)
                .next()
                .map(|(_, checkpoint)| checkpoint.share_price)
                .unwrap_or(self.state.share_price)
        };

        let mut deltas = MarketDeltas {
            checkpoint: Some(CheckpointRecord { bucket, share_price }),
            ..MarketDeltas::default()
        };
        let term = self.position_duration.days();
        if time >= term {
            let mint_bucket = self.state.bucket_for(time - term)?;
            self.settle_matured(mint_bucket, time, &mut deltas)?;
        }
        Ok(deltas)
    }

    /// Flat-redeem everything minted in `mint_bucket`
    fn settle_matured(
        &self,
        mint_bucket: u64,
        maturity_time: Decimal,
        deltas: &mut MarketDeltas,
    ) -> MarketResult<()> {
        let state = &self.state;
        let longs = state.total_supply_longs.get(&mint_bucket).copied().unwrap_or_default();
        let shorts = state.total_supply_shorts.get(&mint_bucket).copied().unwrap_or_default();
        if longs.is_zero() && shorts.is_zero() {
            return Ok(());
        }
        let mint_checkpoint = state.checkpoint(mint_bucket).copied();

        if !longs.is_zero() {
            let average = FixedPointMath::update_weighted_average(
                state.long_average_maturity_time,
                state.longs_outstanding,
                maturity_time,
                longs,
                false,
            )?;
            deltas.longs_outstanding = -longs;
            deltas.d_base_buffer = -longs;
            deltas.long_average_maturity_time =
                FixedPointMath::sub(average, state.long_average_maturity_time, "settlement")?;
            if let Some(checkpoint) = mint_checkpoint {
                deltas.long_base_volume = -checkpoint.long_base_volume;
                deltas.long_checkpoints.insert(mint_bucket, -checkpoint.long_base_volume);
            }
        }
        if !shorts.is_zero() {
            let average = FixedPointMath::update_weighted_average(
                state.short_average_maturity_time,
                state.shorts_outstanding,
                maturity_time,
                shorts,
                false,
            )?;
            deltas.shorts_outstanding = -shorts;
            deltas.d_bond_buffer = -shorts;
            deltas.short_average_maturity_time =
                FixedPointMath::sub(average, state.short_average_maturity_time, "settlement")?;
            if let Some(checkpoint) = mint_checkpoint {
                deltas.short_base_volume = -checkpoint.short_base_volume;
                deltas.short_checkpoints.insert(mint_bucket, -checkpoint.short_base_volume);
            }
        }

        // longs are paid their face value, shorts pay theirs in
        let d_base = FixedPointMath::sub(shorts, longs, "settlement")?;
        let d_shares = FixedPointMath::div(d_base, state.share_price, "settlement")?;
        let share_reserves = FixedPointMath::add(state.share_reserves, d_shares, "settlement")?;
        if share_reserves.is_sign_negative() || state.share_reserves.is_zero() {
            return Err(AmmError::InsufficientLiquidity {
                reason: format!("settling bucket {mint_bucket} needs {} shares", -d_shares),
            }
            .into());
        }
        deltas.d_base_asset = d_base;
        deltas.d_bond_asset = apr_preserving_bond_delta(
            &state.pool_reserves(),
            share_reserves,
            state.lp_total_supply,
        )?;

        info!(
            mint_time = %state.bucket_time(mint_bucket),
            %maturity_time,
            %longs,
            %shorts,
            "matured positions settled"
        );
        Ok(())
    }
}
