//! Simulation clock
//!
//! Time is measured in days and only moves forward.

use crate::error::{MarketError, MarketResult};
use hyperdrive_types::{Decimal, FixedPointMath};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockTime {
    time: Decimal,
}

impl BlockTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time(&self) -> Decimal {
        self.time
    }

    /// Advance by `delta` days
    pub fn tick(&mut self, delta: Decimal) -> MarketResult<()> {
        if delta.is_sign_negative() && !delta.is_zero() {
            return Err(MarketError::InvalidTimestamp {
                time: self.time + delta,
                reason: "clock cannot move backwards",
            });
        }
        self.time = FixedPointMath::add(self.time, delta, "block time")?;
        Ok(())
    }

    pub fn set_time(&mut self, time: Decimal) -> MarketResult<()> {
        if time < self.time {
            return Err(MarketError::InvalidTimestamp {
                time,
                reason: "clock cannot move backwards",
            });
        }
        self.time = time;
        Ok(())
    }
}
