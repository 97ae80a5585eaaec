//! Market orchestrator
//!
//! [`Market`] owns the pricing model, the reserve ledger and the clock. Every
//! operation follows the same shape: checkpoint the latest bucket, quote with
//! the pricing model, build one [`MarketDeltas`], validate it, apply it. An
//! operation that fails at any step is rolled back as a whole.

use crate::block_time::BlockTime;
use crate::deltas::MarketDeltas;
use crate::error::{MarketError, MarketResult};
use crate::state::{MarketState, Stateful};
use crate::wallet::{AgentDeltas, Wallet};
use hyperdrive_amm::{HyperdrivePricingModel, PricingModel, YieldSpacePricingModel};
use hyperdrive_config::{MarketConfig, PricingModelKind};
use hyperdrive_types::{
    AmmError, Decimal, FixedPointMath, Quantity, StretchedTime, DAYS_PER_YEAR, PRECISION_THRESHOLD,
    WEI,
};
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct Market {
    pub(crate) pricing_model: Box<dyn PricingModel>,
    pub(crate) state: MarketState,
    pub(crate) block_time: BlockTime,
    /// Full term of every position; `days == normalizing_constant`
    pub(crate) position_duration: StretchedTime,
    pub(crate) initialized: bool,
}

impl Market {
    pub fn new(
        pricing_model: Box<dyn PricingModel>,
        state: MarketState,
        block_time: BlockTime,
        position_duration: StretchedTime,
    ) -> MarketResult<Self> {
        if position_duration.days() <= Decimal::ZERO
            || position_duration.days() != position_duration.normalizing_constant()
        {
            return Err(MarketError::InvalidConfig {
                reason: format!(
                    "position duration must be a full, positive term \
                     (days {}, normalizing constant {})",
                    position_duration.days(),
                    position_duration.normalizing_constant()
                ),
            });
        }
        if !(position_duration.days() % state.checkpoint_duration).is_zero() {
            return Err(MarketError::InvalidConfig {
                reason: format!(
                    "position duration {} is not a whole number of checkpoints ({})",
                    position_duration.days(),
                    state.checkpoint_duration
                ),
            });
        }
        position_duration.check_bounds()?;
        Ok(Self {
            pricing_model,
            state,
            block_time,
            position_duration,
            initialized: false,
        })
    }

    /// Build an empty market from configuration
    pub fn from_config(config: &MarketConfig) -> MarketResult<Self> {
        config.validate().map_err(|err| MarketError::InvalidConfig {
            reason: format!("{err:#}"),
        })?;

        let pricing_model: Box<dyn PricingModel> = match config.pricing_model {
            PricingModelKind::Hyperdrive => {
                Box::new(HyperdrivePricingModel::with_scale(config.scale))
            }
            PricingModelKind::YieldSpace => {
                Box::new(YieldSpacePricingModel::with_scale(config.scale))
            }
        };
        let time_stretch = match config.time_stretch {
            Some(time_stretch) => time_stretch,
            None => pricing_model.calc_time_stretch(config.target_apr)?,
        };
        let position_duration = StretchedTime::new(
            config.position_duration_days,
            time_stretch,
            config.position_duration_days,
        )?;
        let state = MarketState::new(
            config.init_share_price,
            config.init_share_price,
            config.variable_apr,
            config.curve_fee_multiple,
            config.flat_fee_multiple,
            config.checkpoint_duration_days,
        )?;

        info!(
            model = %config.pricing_model,
            term = %config.position_duration_days,
            %time_stretch,
            "market created"
        );
        Self::new(pricing_model, state, BlockTime::new(), position_duration)
    }

    /// Build a market and seed it with the configured liquidity and rate
    pub fn initialized_from_config(
        config: &MarketConfig,
    ) -> MarketResult<(Self, MarketDeltas, AgentDeltas)> {
        let mut market = Self::from_config(config)?;
        let (market_deltas, agent_deltas) =
            market.initialize(config.target_liquidity, config.target_apr)?;
        Ok((market, market_deltas, agent_deltas))
    }

    pub fn market_state(&self) -> &MarketState {
        &self.state
    }

    pub fn pricing_model(&self) -> &dyn PricingModel {
        self.pricing_model.as_ref()
    }

    pub fn block_time(&self) -> &BlockTime {
        &self.block_time
    }

    pub fn block_time_mut(&mut self) -> &mut BlockTime {
        &mut self.block_time
    }

    pub fn position_duration(&self) -> &StretchedTime {
        &self.position_duration
    }

    /// Term length in years
    pub fn annualized_position_duration(&self) -> Decimal {
        self.position_duration.days() / DAYS_PER_YEAR
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn latest_checkpoint_time(&self) -> Decimal {
        latest_checkpoint_time(self.block_time.time(), self.state.checkpoint_duration)
    }

    /// Spot price of a freshly minted bond; `None` on an empty pool
    pub fn spot_price(&self) -> MarketResult<Option<Decimal>> {
        Ok(self
            .pricing_model
            .calc_spot_price_from_reserves(&self.state.pool_reserves(), &self.position_duration)?)
    }

    /// Fixed rate implied by the reserves over a full term
    pub fn fixed_apr(&self) -> MarketResult<Option<Decimal>> {
        Ok(self
            .pricing_model
            .calc_apr_from_reserves(&self.state.pool_reserves(), &self.position_duration)?)
    }

    /// Largest long as `(base paid, bonds received)`
    pub fn get_max_long(&self) -> MarketResult<(Decimal, Decimal)> {
        self.ensure_initialized()?;
        Ok(self
            .pricing_model
            .get_max_long(&self.state.pool_reserves(), &self.position_duration)?)
    }

    /// Largest short as `(base proceeds, bonds shorted)`
    pub fn get_max_short(&self) -> MarketResult<(Decimal, Decimal)> {
        self.ensure_initialized()?;
        Ok(self
            .pricing_model
            .get_max_short(&self.state.pool_reserves(), &self.position_duration)?)
    }

    /// Validate, then apply
    pub fn update_market(&mut self, deltas: &MarketDeltas) -> MarketResult<()> {
        self.state.check_market_updates(deltas)?;
        self.state.apply_delta(deltas)
    }

    /// Seed an empty pool so it quotes `target_apr`
    ///
    /// The contributor receives `z·c + y` LP tokens.
    pub fn initialize(
        &mut self,
        contribution: Decimal,
        target_apr: Decimal,
    ) -> MarketResult<(MarketDeltas, AgentDeltas)> {
        if self.initialized {
            return Err(MarketError::AlreadyInitialized);
        }
        ensure_amount(contribution, "contribution must be at least one wei")?;
        if target_apr <= Decimal::ZERO {
            return Err(MarketError::InvalidAmount {
                amount: target_apr,
                reason: "target APR must be positive",
            });
        }

        let result = self.transact(|market| {
            market.checkpoint(market.latest_checkpoint_time())?;

            let mut reserves = market.state.pool_reserves();
            reserves.share_reserves =
                FixedPointMath::div(contribution, market.state.share_price, "initialize")?;
            let bond_reserves = market.pricing_model.calc_initial_bond_reserves(
                target_apr,
                &market.position_duration,
                &reserves,
            )?;
            let lp_tokens = FixedPointMath::add(contribution, bond_reserves, "initialize")?;

            let market_deltas = MarketDeltas {
                d_base_asset: contribution,
                d_bond_asset: bond_reserves,
                d_lp_total_supply: lp_tokens,
                ..MarketDeltas::default()
            };
            market.update_market(&market_deltas)?;

            let agent_deltas = AgentDeltas {
                balance: Quantity::base(-contribution),
                lp_tokens,
                ..AgentDeltas::default()
            };
            Ok((market_deltas, agent_deltas))
        })?;

        self.initialized = true;
        info!(
            model = self.pricing_model.model_type(),
            %contribution,
            %target_apr,
            share_reserves = %self.state.share_reserves,
            bond_reserves = %self.state.bond_reserves,
            "market initialized"
        );
        Ok(result)
    }

    /// Mint LP tokens against the pool's present value
    pub fn add_liquidity(
        &mut self,
        base_amount: Decimal,
    ) -> MarketResult<(MarketDeltas, AgentDeltas)> {
        self.ensure_initialized()?;
        ensure_amount(base_amount, "liquidity must be at least one wei")?;
        self.transact(|market| {
            market.checkpoint(market.latest_checkpoint_time())?;
            let quote = market
                .pricing_model
                .calc_lp_out_given_tokens_in(base_amount, &market.state.pool_reserves())?;

            let market_deltas = MarketDeltas {
                d_base_asset: quote.d_base,
                d_bond_asset: quote.d_bonds,
                d_lp_total_supply: quote.lp_tokens,
                ..MarketDeltas::default()
            };
            market.update_market(&market_deltas)?;
            debug!(%base_amount, lp_tokens = %quote.lp_tokens, "liquidity added");

            let agent_deltas = AgentDeltas {
                balance: Quantity::base(-base_amount),
                lp_tokens: quote.lp_tokens,
                ..AgentDeltas::default()
            };
            Ok((market_deltas, agent_deltas))
        })
    }

    /// Burn LP tokens for their share of present value
    pub fn remove_liquidity(
        &mut self,
        wallet: &Wallet,
        lp_amount: Decimal,
    ) -> MarketResult<(MarketDeltas, AgentDeltas)> {
        self.ensure_initialized()?;
        ensure_amount(lp_amount, "LP amount must be at least one wei")?;
        if lp_amount > wallet.lp_tokens {
            return Err(MarketError::InvalidAmount {
                amount: lp_amount,
                reason: "exceeds the wallet's LP balance",
            });
        }
        self.transact(|market| {
            market.checkpoint(market.latest_checkpoint_time())?;
            let quote = market
                .pricing_model
                .calc_tokens_out_given_lp_in(lp_amount, &market.state.pool_reserves())?;

            let market_deltas = MarketDeltas {
                d_base_asset: quote.d_base,
                d_bond_asset: quote.d_bonds,
                d_lp_total_supply: quote.lp_tokens,
                ..MarketDeltas::default()
            };
            market.check_headroom(&market_deltas)?;
            market.update_market(&market_deltas)?;
            let base_out = -quote.d_base;
            debug!(%lp_amount, %base_out, "liquidity removed");

            let agent_deltas = AgentDeltas {
                balance: Quantity::base(-quote.d_base),
                lp_tokens: -lp_amount,
                ..AgentDeltas::default()
            };
            Ok((market_deltas, agent_deltas))
        })
    }

    pub fn update_share_price(&mut self, share_price: Decimal) -> MarketResult<MarketDeltas> {
        if share_price <= Decimal::ZERO {
            return Err(MarketError::InvalidAmount {
                amount: share_price,
                reason: "share price must be positive",
            });
        }
        let deltas = MarketDeltas {
            d_share_price: FixedPointMath::sub(share_price, self.state.share_price, "share price")?,
            ..MarketDeltas::default()
        };
        self.update_market(&deltas)?;
        Ok(deltas)
    }

    pub fn set_variable_apr(&mut self, variable_apr: Decimal) -> MarketResult<MarketDeltas> {
        let deltas = MarketDeltas {
            d_variable_apr: FixedPointMath::sub(
                variable_apr,
                self.state.variable_apr,
                "variable apr",
            )?,
            ..MarketDeltas::default()
        };
        self.update_market(&deltas)?;
        Ok(deltas)
    }

    /// Grow the share price by `days` of variable interest
    pub fn accrue_interest(&mut self, days: Decimal) -> MarketResult<MarketDeltas> {
        if days.is_sign_negative() && !days.is_zero() {
            return Err(MarketError::InvalidTimestamp {
                time: days,
                reason: "interest cannot accrue over negative time",
            });
        }
        let years = days / DAYS_PER_YEAR;
        let growth = FixedPointMath::mul(self.state.variable_apr, years, "accrue interest")?;
        let factor = FixedPointMath::add(Decimal::ONE, growth, "accrue interest")?;
        let share_price = FixedPointMath::mul(self.state.share_price, factor, "accrue interest")?;
        self.update_share_price(share_price)
    }

    /// Advance the clock and accrue interest over the elapsed days
    ///
    /// The clock only moves once the accrual has been applied.
    pub fn advance_time(&mut self, days: Decimal) -> MarketResult<()> {
        let mut block_time = self.block_time;
        block_time.tick(days)?;
        self.accrue_interest(days)?;
        self.block_time = block_time;
        Ok(())
    }

    pub(crate) fn ensure_initialized(&self) -> MarketResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(MarketError::NotInitialized)
        }
    }

    /// Post-trade headroom: `z·c ≥ base_buffer` and `y ≥ bond_buffer`
    ///
    /// Checked on the raw sums so an overdrawn reserve reports as missing
    /// liquidity rather than a broken invariant.
    pub(crate) fn check_headroom(&self, deltas: &MarketDeltas) -> MarketResult<()> {
        let state = &self.state;
        let d_shares = FixedPointMath::div(deltas.d_base_asset, state.share_price, "headroom")?;
        let share_reserves = FixedPointMath::add(state.share_reserves, d_shares, "headroom")?;
        let share_value = FixedPointMath::mul(share_reserves, state.share_price, "headroom")?;
        let base_buffer = FixedPointMath::add(state.base_buffer, deltas.d_base_buffer, "headroom")?;
        if FixedPointMath::add(share_value, PRECISION_THRESHOLD, "headroom")? < base_buffer {
            return Err(AmmError::InsufficientLiquidity {
                reason: format!(
                    "share value {share_value} would fall below the base buffer {base_buffer}"
                ),
            }
            .into());
        }
        let bond_reserves =
            FixedPointMath::add(state.bond_reserves, deltas.d_bond_asset, "headroom")?;
        let bond_buffer = FixedPointMath::add(state.bond_buffer, deltas.d_bond_buffer, "headroom")?;
        if FixedPointMath::add(bond_reserves, PRECISION_THRESHOLD, "headroom")? < bond_buffer {
            return Err(AmmError::InsufficientLiquidity {
                reason: format!(
                    "bond reserves {bond_reserves} would fall below the bond buffer {bond_buffer}"
                ),
            }
            .into());
        }
        Ok(())
    }

    /// Run `operation` against the state, rolling back if it fails
    pub(crate) fn transact<T>(
        &mut self,
        operation: impl FnOnce(&mut Self) -> MarketResult<T>,
    ) -> MarketResult<T> {
        let snapshot = self.state.snapshot();
        let result = operation(self);
        if let Err(err) = &result {
            self.state.restore(snapshot);
            if err.is_fatal() {
                error!(%err, "market operation violated an invariant");
            } else {
                warn!(%err, "market operation rejected");
            }
        }
        result
    }
}

/// Start of the bucket containing `now`
pub fn latest_checkpoint_time(now: Decimal, checkpoint_duration: Decimal) -> Decimal {
    (now / checkpoint_duration).floor() * checkpoint_duration
}

pub(crate) fn ensure_amount(amount: Decimal, reason: &'static str) -> MarketResult<()> {
    if amount < WEI {
        return Err(MarketError::InvalidAmount { amount, reason });
    }
    Ok(())
}
