//! Round lifecycle keeper
//!
//! The driver only talks to the outside world through the traits below, so
//! the same state machine runs against the live contract and against
//! in-memory stubs in tests.

mod driver;

pub use driver::{LifecycleDriver, TickOutcome};

use crate::services::chain_errors::ChainError;
use crate::types::{DevFeeStatus, PriceSample, Round, RoundCall, TxReceipt};
use std::future::Future;

/// Contract surface the keeper reads and writes
pub trait RoundChain: Send + Sync {
    /// Latest round id, 0 before the first round
    fn current_round_id(&self) -> impl Future<Output = Result<u64, ChainError>> + Send;

    fn get_round(&self, id: u64) -> impl Future<Output = Result<Round, ChainError>> + Send;

    fn dev_fee_status(&self) -> impl Future<Output = Result<DevFeeStatus, ChainError>> + Send;

    /// Submit a state-changing call and wait until it is mined
    fn submit(&self, call: RoundCall) -> impl Future<Output = Result<TxReceipt, ChainError>> + Send;
}

/// Source of BTC/USD prices. Infallible: implementations fall back internally.
pub trait PriceSource: Send + Sync {
    fn fetch_price(&self) -> impl Future<Output = PriceSample> + Send;
}

/// Wall clock in unix seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}
