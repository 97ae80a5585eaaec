//! Long and short positions
//!
//! Positions are minted into the latest checkpoint bucket and mature one
//! term later. Before maturity a close trades on the curve at the remaining
//! time; at or after maturity the pool side was already settled by the
//! maturity checkpoint and the trader redeems at the recorded share price.

use crate::deltas::MarketDeltas;
use crate::error::{MarketError, MarketResult};
use crate::market::{ensure_amount, Market};
use crate::wallet::{AgentDeltas, Long, Short, Wallet};
use hyperdrive_types::{Decimal, FixedPointMath, Quantity, StretchedTime, WEI};
use tracing::debug;

impl Market {
    /// Buy bonds with `base_amount` base
    pub fn open_long(
        &mut self,
        base_amount: Decimal,
    ) -> MarketResult<(MarketDeltas, AgentDeltas)> {
        self.ensure_initialized()?;
        ensure_amount(base_amount, "trade amount must be at least one wei")?;
        self.transact(|market| {
            let mint_time = market.latest_checkpoint_time();
            market.checkpoint(mint_time)?;
            let bucket = market.state.bucket_for(mint_time)?;
            let maturity_time = market.maturity_of(mint_time)?;
            let time_remaining = market.time_remaining(maturity_time);

            let trade = market.pricing_model.calc_out_given_in(
                Quantity::base(base_amount),
                &market.state.pool_reserves(),
                &time_remaining,
            )?;
            let bonds = trade.user_result.d_bonds;

            let state = &market.state;
            let average = FixedPointMath::update_weighted_average(
                state.long_average_maturity_time,
                state.longs_outstanding,
                maturity_time,
                bonds,
                true,
            )?;
            let mut deltas = MarketDeltas {
                d_base_asset: trade.market_result.d_base,
                d_bond_asset: trade.market_result.d_bonds,
                d_base_buffer: bonds,
                longs_outstanding: bonds,
                long_average_maturity_time: FixedPointMath::sub(
                    average,
                    state.long_average_maturity_time,
                    "open long",
                )?,
                long_base_volume: base_amount,
                ..MarketDeltas::default()
            };
            deltas.long_checkpoints.insert(bucket, base_amount);
            deltas.total_supply_longs.insert(bucket, bonds);
            market.check_headroom(&deltas)?;
            market.update_market(&deltas)?;

            let mut agent_deltas = AgentDeltas {
                balance: Quantity::base(-base_amount),
                fees_paid: trade.breakdown.fee,
                ..AgentDeltas::default()
            };
            agent_deltas.longs.insert(mint_time, Long { balance: bonds });
            debug!(%base_amount, %bonds, %mint_time, "long opened");
            Ok((deltas, agent_deltas))
        })
    }

    /// Sell `bond_amount` long bonds minted at `mint_time`
    pub fn close_long(
        &mut self,
        wallet: &Wallet,
        bond_amount: Decimal,
        mint_time: Decimal,
    ) -> MarketResult<(MarketDeltas, AgentDeltas)> {
        self.ensure_initialized()?;
        let held = wallet.long(mint_time).map(|long| long.balance);
        let mint_bucket = self.validate_close(mint_time, bond_amount, held)?;
        self.transact(|market| {
            market.checkpoint(market.latest_checkpoint_time())?;
            let maturity_time = market.maturity_of(mint_time)?;
            ensure_supply(
                market.state.total_supply_longs.get(&mint_bucket).copied(),
                bond_amount,
            )?;

            let mut deltas = MarketDeltas::default();
            deltas.total_supply_longs.insert(mint_bucket, -bond_amount);
            let mut agent_deltas = AgentDeltas::default();
            agent_deltas.longs.insert(mint_time, Long { balance: -bond_amount });

            if market.block_time.time() >= maturity_time {
                market.checkpoint(maturity_time)?;
                let c_maturity = market.recorded_share_price(maturity_time)?;
                let c_open = market.recorded_share_price(mint_time)?;
                let mut shares = FixedPointMath::div(bond_amount, c_maturity, "close long")?;
                // negative interest is passed on to the long
                if c_maturity < c_open {
                    let scaled = FixedPointMath::mul(shares, c_maturity, "close long")?;
                    shares = FixedPointMath::div(scaled, c_open, "close long")?;
                }
                let base = FixedPointMath::mul(shares, market.state.share_price, "close long")?;
                agent_deltas.balance = Quantity::base(base);
                market.update_market(&deltas)?;
                debug!(%bond_amount, %base, %mint_time, "matured long redeemed");
                return Ok((deltas, agent_deltas));
            }

            let time_remaining = market.time_remaining(maturity_time);
            let trade = market.pricing_model.calc_out_given_in(
                Quantity::pt(bond_amount),
                &market.state.pool_reserves(),
                &time_remaining,
            )?;
            let state = &market.state;
            let volume = closed_volume(
                state.checkpoint(mint_bucket).map(|checkpoint| checkpoint.long_base_volume),
                state.total_supply_longs.get(&mint_bucket).copied(),
                bond_amount,
            )?;
            let average = FixedPointMath::update_weighted_average(
                state.long_average_maturity_time,
                state.longs_outstanding,
                maturity_time,
                bond_amount,
                false,
            )?;
            deltas.d_base_asset = trade.market_result.d_base;
            deltas.d_bond_asset = trade.market_result.d_bonds;
            deltas.d_base_buffer = -bond_amount;
            deltas.longs_outstanding = -bond_amount;
            deltas.long_average_maturity_time =
                FixedPointMath::sub(average, state.long_average_maturity_time, "close long")?;
            deltas.long_base_volume = -volume;
            deltas.long_checkpoints.insert(mint_bucket, -volume);
            market.check_headroom(&deltas)?;
            market.update_market(&deltas)?;

            agent_deltas.balance = Quantity::base(trade.user_result.d_base);
            agent_deltas.fees_paid = trade.breakdown.fee;
            debug!(
                %bond_amount,
                base = %trade.user_result.d_base,
                %mint_time,
                "long closed"
            );
            Ok((deltas, agent_deltas))
        })
    }

    /// Sell `bond_amount` bonds short; the trader deposits the collateral
    pub fn open_short(
        &mut self,
        bond_amount: Decimal,
    ) -> MarketResult<(MarketDeltas, AgentDeltas)> {
        self.ensure_initialized()?;
        ensure_amount(bond_amount, "trade amount must be at least one wei")?;
        self.transact(|market| {
            let mint_time = market.latest_checkpoint_time();
            market.checkpoint(mint_time)?;
            let bucket = market.state.bucket_for(mint_time)?;
            let maturity_time = market.maturity_of(mint_time)?;
            let time_remaining = market.time_remaining(maturity_time);

            let trade = market.pricing_model.calc_out_given_in(
                Quantity::pt(bond_amount),
                &market.state.pool_reserves(),
                &time_remaining,
            )?;
            let proceeds = trade.user_result.d_base;
            let c_open = market.recorded_share_price(mint_time)?;
            let collateral = FixedPointMath::div(
                FixedPointMath::mul(bond_amount, market.state.share_price, "open short")?,
                c_open,
                "open short",
            )?;
            let deposit = FixedPointMath::sub(collateral, proceeds, "open short")?;

            let state = &market.state;
            let average = FixedPointMath::update_weighted_average(
                state.short_average_maturity_time,
                state.shorts_outstanding,
                maturity_time,
                bond_amount,
                true,
            )?;
            let mut deltas = MarketDeltas {
                d_base_asset: trade.market_result.d_base,
                d_bond_asset: trade.market_result.d_bonds,
                d_bond_buffer: bond_amount,
                shorts_outstanding: bond_amount,
                short_average_maturity_time: FixedPointMath::sub(
                    average,
                    state.short_average_maturity_time,
                    "open short",
                )?,
                short_base_volume: proceeds,
                ..MarketDeltas::default()
            };
            deltas.short_checkpoints.insert(bucket, proceeds);
            deltas.total_supply_shorts.insert(bucket, bond_amount);
            market.check_headroom(&deltas)?;
            market.update_market(&deltas)?;

            let mut agent_deltas = AgentDeltas {
                balance: Quantity::base(-deposit),
                fees_paid: trade.breakdown.fee,
                ..AgentDeltas::default()
            };
            agent_deltas.shorts.insert(
                mint_time,
                Short {
                    balance: bond_amount,
                    open_share_price: c_open,
                },
            );
            debug!(%bond_amount, %deposit, %mint_time, "short opened");
            Ok((deltas, agent_deltas))
        })
    }

    /// Buy back `bond_amount` short bonds minted at `mint_time`
    pub fn close_short(
        &mut self,
        wallet: &Wallet,
        bond_amount: Decimal,
        mint_time: Decimal,
    ) -> MarketResult<(MarketDeltas, AgentDeltas)> {
        self.ensure_initialized()?;
        let held = wallet.short(mint_time).copied();
        let balance = held.map(|short| short.balance);
        let mint_bucket = self.validate_close(mint_time, bond_amount, balance)?;
        self.transact(|market| {
            market.checkpoint(market.latest_checkpoint_time())?;
            let maturity_time = market.maturity_of(mint_time)?;
            ensure_supply(
                market.state.total_supply_shorts.get(&mint_bucket).copied(),
                bond_amount,
            )?;
            let c_open = match held {
                Some(short) if short.open_share_price > Decimal::ZERO => short.open_share_price,
                _ => market.recorded_share_price(mint_time)?,
            };

            let mut deltas = MarketDeltas::default();
            deltas.total_supply_shorts.insert(mint_bucket, -bond_amount);
            let mut agent_deltas = AgentDeltas::default();

            let (c_close, share_cost) = if market.block_time.time() >= maturity_time {
                market.checkpoint(maturity_time)?;
                let c_close = market.recorded_share_price(maturity_time)?;
                (c_close, FixedPointMath::div(bond_amount, c_close, "close short")?)
            } else {
                let time_remaining = market.time_remaining(maturity_time);
                let trade = market.pricing_model.calc_in_given_out(
                    Quantity::pt(bond_amount),
                    &market.state.pool_reserves(),
                    &time_remaining,
                )?;
                let state = &market.state;
                let volume = closed_volume(
                    state.checkpoint(mint_bucket).map(|checkpoint| checkpoint.short_base_volume),
                    state.total_supply_shorts.get(&mint_bucket).copied(),
                    bond_amount,
                )?;
                let average = FixedPointMath::update_weighted_average(
                    state.short_average_maturity_time,
                    state.shorts_outstanding,
                    maturity_time,
                    bond_amount,
                    false,
                )?;
                deltas.d_base_asset = trade.market_result.d_base;
                deltas.d_bond_asset = trade.market_result.d_bonds;
                deltas.d_bond_buffer = -bond_amount;
                deltas.shorts_outstanding = -bond_amount;
                deltas.short_average_maturity_time = FixedPointMath::sub(
                    average,
                    state.short_average_maturity_time,
                    "close short",
                )?;
                deltas.short_base_volume = -volume;
                deltas.short_checkpoints.insert(mint_bucket, -volume);
                market.check_headroom(&deltas)?;
                agent_deltas.fees_paid = trade.breakdown.fee;

                let c = state.share_price;
                (c, FixedPointMath::div(-trade.user_result.d_base, c, "close short")?)
            };

            // collateral value grown by interest, less the cost of the bonds
            let c = market.state.share_price;
            let owed = FixedPointMath::div(
                FixedPointMath::mul(bond_amount, c_close, "close short")?,
                FixedPointMath::mul(c_open, c, "close short")?,
                "close short",
            )?;
            let proceeds_shares =
                FixedPointMath::sub(owed, share_cost, "close short")?.max(Decimal::ZERO);
            let base = FixedPointMath::mul(proceeds_shares, c, "close short")?;
            market.update_market(&deltas)?;

            agent_deltas.balance = Quantity::base(base);
            agent_deltas.shorts.insert(
                mint_time,
                Short {
                    balance: -bond_amount,
                    open_share_price: c_open,
                },
            );
            debug!(%bond_amount, %base, %mint_time, "short closed");
            Ok((deltas, agent_deltas))
        })
    }

    fn maturity_of(&self, mint_time: Decimal) -> MarketResult<Decimal> {
        let term = self.position_duration.days();
        Ok(FixedPointMath::add(mint_time, term, "maturity time")?)
    }

    /// Remaining term of a position maturing at `maturity_time`
    pub(crate) fn time_remaining(&self, maturity_time: Decimal) -> StretchedTime {
        let days = (maturity_time - self.block_time.time()).max(Decimal::ZERO);
        self.position_duration.with_days(days)
    }

    fn recorded_share_price(&self, time: Decimal) -> MarketResult<Decimal> {
        let bucket = self.state.bucket_for(time)?;
        self.state
            .checkpoint(bucket)
            .map(|checkpoint| checkpoint.share_price)
            .ok_or(MarketError::Checkpoint {
                bucket,
                reason: "not recorded",
            })
    }

    /// Mint time must be a past, aligned checkpoint; amount within the position
    fn validate_close(
        &self,
        mint_time: Decimal,
        bond_amount: Decimal,
        held: Option<Decimal>,
    ) -> MarketResult<u64> {
        if mint_time > self.block_time.time() {
            return Err(MarketError::InvalidTimestamp {
                time: mint_time,
                reason: "mint time is in the future",
            });
        }
        let bucket = self.state.bucket_for(mint_time)?;
        let balance = held.ok_or(MarketError::PositionNotFound { mint_time })?;
        if bond_amount < WEI {
            return Err(MarketError::InvalidAmount {
                amount: bond_amount,
                reason: "trade amount must be at least one wei",
            });
        }
        if bond_amount > balance {
            return Err(MarketError::InvalidAmount {
                amount: bond_amount,
                reason: "exceeds the wallet's position",
            });
        }
        Ok(bucket)
    }
}

/// Share of a bucket's base volume that leaves with `bond_amount` bonds
fn closed_volume(
    checkpoint_volume: Option<Decimal>,
    supply: Option<Decimal>,
    bond_amount: Decimal,
) -> MarketResult<Decimal> {
    match (checkpoint_volume, supply) {
        (Some(volume), Some(supply)) if !supply.is_zero() => Ok(FixedPointMath::div(
            FixedPointMath::mul(volume, bond_amount, "closed volume")?,
            supply,
            "closed volume",
        )?),
        _ => Ok(Decimal::ZERO),
    }
}

fn ensure_supply(supply: Option<Decimal>, bond_amount: Decimal) -> MarketResult<()> {
    if supply.unwrap_or_default() < bond_amount {
        return Err(MarketError::InvalidAmount {
            amount: bond_amount,
            reason: "exceeds the bonds outstanding for this mint time",
        });
    }
    Ok(())
}
