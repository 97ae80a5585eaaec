//! Error types for curve arithmetic and pricing-model preconditions
//!
//! Failures split into two classes. Fatal errors (invariant violations,
//! overflow, sub-wei trade amounts) mean the model or its caller produced a
//! state the curve cannot represent. Reported errors (degenerate inputs,
//! domain errors, missing liquidity) are ordinary rejections of a request.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by the numeric kernel and the pricing models
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AmmError {
    /// A state or input value left its allowed range
    #[error("Invariant violation: {field} = {value} ({reason})")]
    InvariantViolation {
        field: &'static str,
        value: Decimal,
        reason: &'static str,
    },

    /// Checked arithmetic exceeded the representable range
    #[error("Arithmetic overflow in {context}")]
    Overflow { context: &'static str },

    /// Denominator was zero, e.g. an initial share price of zero
    #[error("Division by zero in {context}")]
    DivisionByZero { context: &'static str },

    /// Function evaluated outside its domain
    #[error("{function} is undefined for {value}")]
    Domain {
        function: &'static str,
        value: Decimal,
    },

    /// Trade amount rejected by the pricing model
    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount {
        amount: Decimal,
        reason: &'static str,
    },

    /// The curve cannot absorb the requested trade
    #[error("Insufficient liquidity: {reason}")]
    InsufficientLiquidity { reason: String },
}

impl AmmError {
    /// Fatal errors signal a modeling bug rather than a rejected request
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AmmError::InvariantViolation { .. }
                | AmmError::Overflow { .. }
                | AmmError::InvalidAmount { .. }
        )
    }
}

/// Result alias used across the pricing crates
pub type AmmResult<T> = Result<T, AmmError>;
