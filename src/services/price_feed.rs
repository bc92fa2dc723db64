//! BTC/USD price feed
//!
//! Fetches the last trade price from an exchange ticker and converts it to
//! integer cents. Never fails: any feed problem produces a fallback sample
//! (baseline plus bounded jitter) so the round lifecycle does not stall on a
//! price hiccup. No retries here; the keeper's poll cadence is the retry.

use crate::config::PriceFeedConfig;
use crate::keeper::PriceSource;
use crate::types::PriceSample;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Why the primary feed could not be used
#[derive(Debug, Error)]
pub enum PriceFeedError {
    #[error("price request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("price feed returned HTTP {0}")]
    Status(u16),
    #[error("malformed price payload: {0}")]
    Malformed(String),
}

/// Exchange ticker client with fallback pricing
pub struct BinancePriceFeed {
    client: reqwest::Client,
    config: PriceFeedConfig,
    rng: Mutex<StdRng>,
}

impl BinancePriceFeed {
    /// Feed whose fallback jitter is seeded from OS entropy
    pub fn new(config: PriceFeedConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Feed with a caller-provided RNG, for reproducible fallbacks
    pub fn with_rng(config: PriceFeedConfig, rng: StdRng) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Fetch from the primary ticker only
    pub async fn fetch_primary(&self) -> Result<u64, PriceFeedError> {
        let response = self.client.get(&self.config.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PriceFeedError::Status(status.as_u16()));
        }

        let body: Value = response.json().await?;
        parse_price_cents(&body)
    }

    /// Baseline plus uniform jitter in `[-jitter, +jitter]`
    pub fn fallback_cents(&self) -> u64 {
        let jitter = i64::try_from(self.config.fallback_jitter_cents).unwrap_or(i64::MAX);
        let offset = match self.rng.lock() {
            Ok(mut rng) if jitter > 0 => rng.gen_range(-jitter..=jitter),
            _ => 0,
        };
        let baseline = i64::try_from(self.config.fallback_cents).unwrap_or(i64::MAX);
        u64::try_from(baseline.saturating_add(offset).max(1)).unwrap_or(1)
    }
}

impl PriceSource for BinancePriceFeed {
    async fn fetch_price(&self) -> PriceSample {
        match self.fetch_primary().await {
            Ok(cents) => {
                debug!("Price feed: {} cents", cents);
                PriceSample::primary(cents)
            }
            Err(e) => {
                let sample = PriceSample::fallback(self.fallback_cents());
                warn!("Price feed unavailable ({}), using {}", e, sample);
                sample
            }
        }
    }
}

/// Extract `price` from a ticker payload and convert to cents with `floor(price * 100)`.
///
/// Accepts both string (`"68500.12"`, Binance) and numeric prices.
pub fn parse_price_cents(body: &Value) -> Result<u64, PriceFeedError> {
    let raw = body
        .get("price")
        .ok_or_else(|| PriceFeedError::Malformed(format!("no price field in {}", body)))?;

    let price = match raw {
        Value::String(s) => Decimal::from_str(s.trim())
            .map_err(|e| PriceFeedError::Malformed(format!("{}: {}", s, e)))?,
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .map_err(|e| PriceFeedError::Malformed(format!("{}: {}", n, e)))?,
        other => return Err(PriceFeedError::Malformed(format!("price is {}", other))),
    };

    price_to_cents(price).ok_or_else(|| PriceFeedError::Malformed(format!("unusable price {}", price)))
}

/// `floor(price * 100)`, `None` unless that is at least one cent
pub fn price_to_cents(price: Decimal) -> Option<u64> {
    if price <= Decimal::ZERO {
        return None;
    }
    price.checked_mul(Decimal::ONE_HUNDRED)?.floor().to_u64().filter(|cents| *cents > 0)
}
