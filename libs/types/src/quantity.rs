//! Token-tagged amounts

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the curve an amount refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    /// The base asset
    Base,
    /// Principal tokens (bonds)
    Pt,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Base => write!(f, "base"),
            TokenType::Pt => write!(f, "pt"),
        }
    }
}

/// An amount of either base or principal tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub amount: Decimal,
    pub unit: TokenType,
}

impl Quantity {
    pub fn new(amount: Decimal, unit: TokenType) -> Self {
        Self { amount, unit }
    }

    pub fn base(amount: Decimal) -> Self {
        Self::new(amount, TokenType::Base)
    }

    pub fn pt(amount: Decimal) -> Self {
        Self::new(amount, TokenType::Pt)
    }

    /// Same unit, different amount
    pub fn with_amount(&self, amount: Decimal) -> Self {
        Self::new(amount, self.unit)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.unit)
    }
}
