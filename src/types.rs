//! Core types for the round keeper

use alloy::primitives::U256;
use serde::Serialize;
use std::fmt;

/// One betting epoch as recorded on-chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    pub id: u64,
    pub start_time: u64,
    pub end_time: u64,
    /// Strike price in cents (price x 100)
    pub strike_price_cents: u64,
    /// Closing price in cents, zero until resolved
    pub closing_price_cents: u64,
    pub up_pool_wei: U256,
    pub down_pool_wei: U256,
    pub total_pool_wei: U256,
    pub total_bets: u64,
    pub resolved: bool,
    pub up_won: bool,
    pub proof_hash: String,
}

impl Round {
    /// Seconds left until `end_time`, negative once expired
    pub fn seconds_left(&self, now: u64) -> i64 {
        seconds_until(self.end_time, now)
    }

    /// Whether the round is past its end time plus the clock-skew grace
    pub fn is_expired(&self, now: u64, grace_secs: u64) -> bool {
        now >= self.end_time.saturating_add(grace_secs)
    }
}

/// Where a price sample came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PriceOrigin {
    Primary,
    Fallback,
}

impl PriceOrigin {
    /// Short tag used in proof hashes
    pub fn tag(&self) -> &'static str {
        match self {
            PriceOrigin::Primary => "binance",
            PriceOrigin::Fallback => "fallback",
        }
    }
}

/// Price observation, fetched fresh for every decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceSample {
    pub value_cents: u64,
    pub origin: PriceOrigin,
}

impl PriceSample {
    pub fn primary(value_cents: u64) -> Self {
        Self {
            value_cents,
            origin: PriceOrigin::Primary,
        }
    }

    pub fn fallback(value_cents: u64) -> Self {
        Self {
            value_cents,
            origin: PriceOrigin::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.origin == PriceOrigin::Fallback
    }

    /// Proof string recorded with a resolution
    pub fn proof_hash(&self, now: u64) -> String {
        format!("{}-{}", self.origin.tag(), now)
    }
}

impl fmt::Display for PriceSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${}.{:02}",
            self.value_cents / 100,
            self.value_cents % 100
        )?;
        if self.is_fallback() {
            write!(f, " (fallback)")?;
        }
        Ok(())
    }
}

/// State-changing calls the keeper submits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundCall {
    StartFirstRound { strike_cents: u64 },
    StartNewRound { strike_cents: u64 },
    ResolveRound { closing_cents: u64, proof_hash: String },
    DistributeDevFee,
}

impl RoundCall {
    /// Name used in logs
    pub fn label(&self) -> &'static str {
        match self {
            RoundCall::StartFirstRound { .. } => "startFirstRound",
            RoundCall::StartNewRound { .. } => "startNewRound",
            RoundCall::ResolveRound { .. } => "resolveRound",
            RoundCall::DistributeDevFee => "distributeDevFee",
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(
            self,
            RoundCall::StartFirstRound { .. } | RoundCall::StartNewRound { .. }
        )
    }
}

/// Which contract function starts the next round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartCall {
    /// `startFirstRound`, reused for every round
    First,
    /// `startNewRound`
    New,
}

impl StartCall {
    pub fn build(&self, strike_cents: u64) -> RoundCall {
        match self {
            StartCall::First => RoundCall::StartFirstRound { strike_cents },
            StartCall::New => RoundCall::StartNewRound { strike_cents },
        }
    }
}

/// Mined transaction summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub gas_used: u64,
    pub success: bool,
}

/// Dev fee accrual read from the contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DevFeeStatus {
    pub accrued_wei: U256,
    pub seconds_until_next: u64,
}

impl DevFeeStatus {
    /// Distribution is allowed and there is something to distribute
    pub fn is_due(&self) -> bool {
        self.seconds_until_next == 0 && !self.accrued_wei.is_zero()
    }
}

/// Lifecycle phase as seen by the keeper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoundPhase {
    NoRound,
    RoundActive,
    RoundExpiredUnresolved,
    RoundResolved,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundPhase::NoRound => write!(f, "no round"),
            RoundPhase::RoundActive => write!(f, "active"),
            RoundPhase::RoundExpiredUnresolved => write!(f, "expired, unresolved"),
            RoundPhase::RoundResolved => write!(f, "resolved"),
        }
    }
}

/// `end_time - now` in signed seconds, saturating at the `i64` range
pub fn seconds_until(end_time: u64, now: u64) -> i64 {
    let end = i64::try_from(end_time).unwrap_or(i64::MAX);
    let now = i64::try_from(now).unwrap_or(i64::MAX);
    end.saturating_sub(now)
}
