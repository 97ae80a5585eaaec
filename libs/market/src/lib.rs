//! # Hyperdrive Market - Reserve State Machine and Trade Orchestration
//!
//! ## Purpose
//!
//! Holds a pool's reserves, the checkpoint ledger and the simulation clock,
//! and turns trader intents into validated state transitions. Prices come from
//! a [`PricingModel`](hyperdrive_amm::PricingModel); this crate decides what a
//! quote does to the pool and to the trader.
//!
//! ## Flow
//!
//! ```text
//! Market::open_long(..) ─► checkpoint(latest) ─► pricing model quote
//!                                                      │
//!        AgentDeltas ◄── (MarketDeltas, AgentDeltas) ◄─┘
//!             │                    │
//!     Wallet::update     MarketState::apply_delta (validated, atomic)
//! ```
//!
//! Every operation is all-or-nothing: a rejected step rolls the state back
//! and the wallet is never touched.
//!
//! ## Time
//!
//! Time is in days. It is cut into checkpoint buckets; each bucket records a
//! share price once and settles the positions maturing at its start.
//!
//! ```rust
//! use hyperdrive_config::MarketConfig;
//! use hyperdrive_market::{Market, MarketAction, Wallet};
//! use rust_decimal_macros::dec;
//!
//! let (mut market, _, _) = Market::initialized_from_config(&MarketConfig::default()).unwrap();
//! let mut trader = Wallet::new(1, dec!(1000));
//! market
//!     .perform_action(&mut trader, &MarketAction::OpenShort { bond_amount: dec!(100) })
//!     .unwrap();
//! assert_eq!(trader.short(dec!(0)).unwrap().balance, dec!(100));
//! assert!(market.fixed_apr().unwrap().unwrap() > dec!(0.05));
//! ```

pub mod actions;
pub mod block_time;
mod checkpoint;
pub mod deltas;
pub mod error;
pub mod market;
pub mod state;
mod trades;
pub mod wallet;

pub use actions::MarketAction;
pub use block_time::BlockTime;
pub use deltas::{CheckpointRecord, MarketDeltas};
pub use error::{MarketError, MarketResult};
pub use market::{latest_checkpoint_time, Market};
pub use state::{Checkpoint, MarketState, Stateful};
pub use wallet::{AgentDeltas, Long, Short, Wallet};
