//! Counters for monitoring keeper activity

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Point-in-time copy of the keeper counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Loop iterations
    pub ticks: u64,
    /// Rounds opened by this keeper
    pub rounds_started: u64,
    /// Rounds resolved by this keeper
    pub rounds_resolved: u64,
    /// Transitions another actor beat us to
    pub already_done: u64,
    /// Submissions that failed for any other reason
    pub tx_failures: u64,
    /// Price samples taken from the fallback
    pub price_fallbacks: u64,
    /// Ticks that ended in error
    pub loop_errors: u64,
    pub dev_fees_distributed: u64,
}

/// Thread-safe metrics collector
#[derive(Debug, Clone, Default)]
pub struct KeeperMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    ticks: AtomicU64,
    rounds_started: AtomicU64,
    rounds_resolved: AtomicU64,
    already_done: AtomicU64,
    tx_failures: AtomicU64,
    price_fallbacks: AtomicU64,
    loop_errors: AtomicU64,
    dev_fees_distributed: AtomicU64,
}

impl KeeperMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_ticks(&self) {
        self.inner.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rounds_started(&self) {
        self.inner.rounds_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rounds_resolved(&self) {
        self.inner.rounds_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_already_done(&self) {
        self.inner.already_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tx_failures(&self) {
        self.inner.tx_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_price_fallbacks(&self) {
        self.inner.price_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_loop_errors(&self) {
        self.inner.loop_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dev_fees_distributed(&self) {
        self.inner.dev_fees_distributed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.inner.ticks.load(Ordering::Relaxed),
            rounds_started: self.inner.rounds_started.load(Ordering::Relaxed),
            rounds_resolved: self.inner.rounds_resolved.load(Ordering::Relaxed),
            already_done: self.inner.already_done.load(Ordering::Relaxed),
            tx_failures: self.inner.tx_failures.load(Ordering::Relaxed),
            price_fallbacks: self.inner.price_fallbacks.load(Ordering::Relaxed),
            loop_errors: self.inner.loop_errors.load(Ordering::Relaxed),
            dev_fees_distributed: self.inner.dev_fees_distributed.load(Ordering::Relaxed),
        }
    }
}
