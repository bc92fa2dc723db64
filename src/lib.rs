//! Predict402 Round Keeper Library
//!
//! Off-chain automation for the Predict402 BTC UP/DOWN prediction game.
//! The keeper polls the game contract and drives each round through its
//! lifecycle:
//!
//! 1. **Start**: open a round with the current BTC/USD price as strike.
//! 2. **Resolve**: once the round has ended (plus a short grace period),
//!    submit a fresh closing price and a proof tag.
//! 3. **Repeat**: start the next round as soon as resolution is confirmed.
//!
//! Accrued dev fees are distributed on the side whenever the contract allows.

pub mod config;
pub mod keeper;
pub mod services;
pub mod types;

pub use config::{Config, ConfigError};
pub use keeper::{Clock, LifecycleDriver, PriceSource, RoundChain, SystemClock, TickOutcome};
pub use services::{BinancePriceFeed, ChainError, KeeperMetrics, Predict402Client, RpcClient, TxSubmitter};
pub use types::{PriceSample, Round, RoundCall, RoundPhase};
