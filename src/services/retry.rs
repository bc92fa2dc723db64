//! Read retry policy for the JSON-RPC client
//!
//! Each failure kind gets its own wait. Throttling answers (`-32005`, or
//! HTTP 429 folded into it) back off in whole seconds; dropped connections
//! and `-32603` from flaky public nodes get a short doubling delay.
//! Timeouts, reverts and other node answers are returned at once.

use super::chain_errors::{ChainError, RetryClass};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReadRetryPolicy {
    /// Extra attempts after the first request
    pub max_retries: u32,
    /// First wait after a transient failure, doubled per retry
    pub transient_delay_ms: u64,
    /// First wait after a rate-limit answer, doubled per retry
    pub rate_limit_delay_ms: u64,
    /// Cap on any single wait
    pub max_delay_ms: u64,
}

impl Default for ReadRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            transient_delay_ms: 250,
            rate_limit_delay_ms: 2_000,
            max_delay_ms: 8_000,
        }
    }
}

impl ReadRetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Wait before retry number `retry` (1-based) of a read that failed
    /// with `err`, or `None` to give up.
    pub fn delay_for(&self, err: &ChainError, retry: u32) -> Option<Duration> {
        if retry == 0 || retry > self.max_retries {
            return None;
        }

        let base_ms = match err.retry_class() {
            RetryClass::RateLimited => self.rate_limit_delay_ms,
            RetryClass::Transient => self.transient_delay_ms,
            RetryClass::Never => return None,
        };

        let factor = 1u64.checked_shl(retry - 1).unwrap_or(u64::MAX);
        Some(Duration::from_millis(base_ms.saturating_mul(factor).min(self.max_delay_ms)))
    }
}
