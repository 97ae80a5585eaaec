//! Trader-side ledger
//!
//! Positions are keyed by mint time. A [`Wallet`] only changes by applying
//! [`AgentDeltas`] returned from market operations.

use crate::error::{MarketError, MarketResult};
use hyperdrive_types::{Decimal, FixedPointMath, Quantity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Long {
    pub balance: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Short {
    pub balance: Decimal,
    /// Share price of the mint checkpoint
    pub open_share_price: Decimal,
}

/// Trader-side effect of one operation; position balances are signed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDeltas {
    pub balance: Quantity,
    pub lp_tokens: Decimal,
    pub longs: BTreeMap<Decimal, Long>,
    pub shorts: BTreeMap<Decimal, Short>,
    pub fees_paid: Decimal,
}

impl Default for AgentDeltas {
    fn default() -> Self {
        Self {
            balance: Quantity::base(Decimal::ZERO),
            lp_tokens: Decimal::ZERO,
            longs: BTreeMap::new(),
            shorts: BTreeMap::new(),
            fees_paid: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub address: u64,
    /// Base held
    pub balance: Quantity,
    pub lp_tokens: Decimal,
    pub longs: BTreeMap<Decimal, Long>,
    pub shorts: BTreeMap<Decimal, Short>,
    pub fees_paid: Decimal,
}

impl Wallet {
    pub fn new(address: u64, budget: Decimal) -> Self {
        Self {
            address,
            balance: Quantity::base(budget),
            lp_tokens: Decimal::ZERO,
            longs: BTreeMap::new(),
            shorts: BTreeMap::new(),
            fees_paid: Decimal::ZERO,
        }
    }

    pub fn long(&self, mint_time: Decimal) -> Option<&Long> {
        self.longs.get(&mint_time)
    }

    pub fn short(&self, mint_time: Decimal) -> Option<&Short> {
        self.shorts.get(&mint_time)
    }

    /// Apply deltas; nothing changes if any position would go negative
    pub fn update(&mut self, deltas: &AgentDeltas) -> MarketResult<()> {
        let mut next = self.clone();
        let balance = FixedPointMath::add(next.balance.amount, deltas.balance.amount, "balance")?;
        next.balance = next.balance.with_amount(balance);
        let lp_tokens = FixedPointMath::add(next.lp_tokens, deltas.lp_tokens, "lp tokens")?;
        next.lp_tokens = non_negative(lp_tokens, "LP balance would go negative")?;
        next.fees_paid = FixedPointMath::add(next.fees_paid, deltas.fees_paid, "fees paid")?;

        for (mint_time, long) in &deltas.longs {
            let balance = next.longs.get(mint_time).map(|held| held.balance).unwrap_or_default();
            let balance = FixedPointMath::add(balance, long.balance, "long balance")?;
            let balance = non_negative(balance, "long balance would go negative")?;
            if balance.is_zero() {
                next.longs.remove(mint_time);
            } else {
                next.longs.insert(*mint_time, Long { balance });
            }
        }
        for (mint_time, short) in &deltas.shorts {
            let held = next.shorts.get(mint_time).copied().unwrap_or(Short {
                balance: Decimal::ZERO,
                open_share_price: short.open_share_price,
            });
            let balance = FixedPointMath::add(held.balance, short.balance, "short balance")?;
            let balance = non_negative(balance, "short balance would go negative")?;
            if balance.is_zero() {
                next.shorts.remove(mint_time);
            } else {
                next.shorts.insert(
                    *mint_time,
                    Short {
                        balance,
                        open_share_price: held.open_share_price,
                    },
                );
            }
        }

        *self = next;
        Ok(())
    }
}

fn non_negative(value: Decimal, reason: &'static str) -> MarketResult<Decimal> {
    let value = FixedPointMath::clamp_dust(value);
    if value.is_sign_negative() && !value.is_zero() {
        return Err(MarketError::InvalidAmount { amount: value, reason });
    }
    Ok(value)
}
