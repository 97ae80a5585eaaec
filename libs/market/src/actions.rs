//! Agent-facing action dispatch

use crate::deltas::MarketDeltas;
use crate::error::MarketResult;
use crate::market::Market;
use crate::wallet::{AgentDeltas, Wallet};
use hyperdrive_types::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// One trade or liquidity action an agent can submit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MarketAction {
    OpenLong { base_amount: Decimal },
    CloseLong { bond_amount: Decimal, mint_time: Decimal },
    OpenShort { bond_amount: Decimal },
    CloseShort { bond_amount: Decimal, mint_time: Decimal },
    AddLiquidity { base_amount: Decimal },
    RemoveLiquidity { lp_amount: Decimal },
}

impl fmt::Display for MarketAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenLong { base_amount } => write!(f, "open_long({base_amount} base)"),
            Self::CloseLong { bond_amount, mint_time } => {
                write!(f, "close_long({bond_amount} bonds @ {mint_time})")
            }
            Self::OpenShort { bond_amount } => write!(f, "open_short({bond_amount} bonds)"),
            Self::CloseShort { bond_amount, mint_time } => {
                write!(f, "close_short({bond_amount} bonds @ {mint_time})")
            }
            Self::AddLiquidity { base_amount } => write!(f, "add_liquidity({base_amount} base)"),
            Self::RemoveLiquidity { lp_amount } => write!(f, "remove_liquidity({lp_amount} lp)"),
        }
    }
}

impl Market {
    /// Execute `action` for `wallet` and settle the result into it
    ///
    /// The wallet is only touched when the market accepted the action.
    pub fn perform_action(
        &mut self,
        wallet: &mut Wallet,
        action: &MarketAction,
    ) -> MarketResult<(MarketDeltas, AgentDeltas)> {
        let (market_deltas, agent_deltas) = match *action {
            MarketAction::OpenLong { base_amount } => self.open_long(base_amount)?,
            MarketAction::CloseLong { bond_amount, mint_time } => {
                self.close_long(wallet, bond_amount, mint_time)?
            }
            MarketAction::OpenShort { bond_amount } => self.open_short(bond_amount)?,
            MarketAction::CloseShort { bond_amount, mint_time } => {
                self.close_short(wallet, bond_amount, mint_time)?
            }
            MarketAction::AddLiquidity { base_amount } => self.add_liquidity(base_amount)?,
            MarketAction::RemoveLiquidity { lp_amount } => {
                self.remove_liquidity(wallet, lp_amount)?
            }
        };
        wallet.update(&agent_deltas)?;
        debug!(address = wallet.address, %action, "action performed");
        Ok((market_deltas, agent_deltas))
    }
}
