//! Market error types

use hyperdrive_types::{AmmError, Decimal};
use thiserror::Error;

/// Failures of market operations
///
/// Pricing and invariant failures surface as [`MarketError::Amm`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MarketError {
    #[error("Invalid timestamp {time}: {reason}")]
    InvalidTimestamp { time: Decimal, reason: &'static str },

    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Decimal, reason: &'static str },

    #[error("No position minted at {mint_time}")]
    PositionNotFound { mint_time: Decimal },

    #[error("Checkpoint {bucket}: {reason}")]
    Checkpoint { bucket: u64, reason: &'static str },

    #[error("Invalid market configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Market is already initialized")]
    AlreadyInitialized,

    #[error("Market is not initialized")]
    NotInitialized,

    #[error(transparent)]
    Amm(#[from] AmmError),
}

impl MarketError {
    /// Invariant breaches that mean the simulation itself is wrong
    pub fn is_fatal(&self) -> bool {
        match self {
            MarketError::Amm(err) => err.is_fatal(),
            MarketError::Checkpoint { .. } => true,
            _ => false,
        }
    }
}

pub type MarketResult<T> = Result<T, MarketError>;
