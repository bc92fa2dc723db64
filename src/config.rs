//! Configuration management for the round keeper

use crate::types::StartCall;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Startup configuration problems; all are fatal
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Keeper configuration loaded from environment
#[derive(Clone)]
pub struct Config {
    /// JSON-RPC endpoint
    pub rpc_url: String,

    /// Keeper wallet; pays gas for every lifecycle transaction
    pub signer: PrivateKeySigner,

    /// Predict402 game contract
    pub contract_address: Address,

    /// EIP-155 chain id used when signing
    pub chain_id: u64,

    /// Price feed settings
    pub price: PriceFeedConfig,

    /// Lifecycle loop settings
    pub keeper: KeeperConfig,

    /// Transaction submission settings
    pub tx: TxConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("rpc_url", &self.rpc_url)
            .field("signer", &self.signer.address())
            .field("contract_address", &self.contract_address)
            .field("chain_id", &self.chain_id)
            .field("price", &self.price)
            .field("keeper", &self.keeper)
            .field("tx", &self.tx)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PriceFeedConfig {
    /// Ticker endpoint returning `{"price": ...}`
    pub url: String,
    /// Request timeout (default: 5)
    pub timeout_secs: u64,
    /// Fallback baseline in cents (default: $68,500.00)
    pub fallback_cents: u64,
    /// Fallback jitter bound in cents, either side (default: $100.00)
    pub fallback_jitter_cents: u64,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            url: BinanceApi::btc_ticker_url(),
            timeout_secs: 5,
            fallback_cents: 6_850_000,
            fallback_jitter_cents: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeeperConfig {
    /// Delay between ticks (default: 10)
    pub poll_interval_secs: u64,
    /// Seconds past endTime before resolving, absorbs clock skew (default: 5)
    pub grace_secs: u64,
    /// Delay after a failed tick (default: 5)
    pub error_backoff_secs: u64,
    /// Contract function used to open rounds (default: startFirstRound)
    pub start_call: StartCall,
    /// Dev fee check interval, 0 disables (default: 600)
    pub dev_fee_check_secs: u64,
    /// Heartbeat log interval (default: 60)
    pub heartbeat_secs: u64,
    /// Minimum gap between info-level "round active" lines (default: 30)
    pub log_every_secs: u64,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            grace_secs: 5,
            error_backoff_secs: 5,
            start_call: StartCall::First,
            dev_fee_check_secs: 600,
            heartbeat_secs: 60,
            log_every_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TxConfig {
    /// Added on top of eth_estimateGas (default: 20)
    pub gas_limit_margin_percent: u64,
    /// Added on top of eth_gasPrice (default: 20)
    pub gas_price_bump_percent: u64,
    /// How long to wait for a receipt (default: 30)
    pub receipt_timeout_secs: u64,
    /// Receipt poll interval in milliseconds (default: 1000)
    pub receipt_poll_ms: u64,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            gas_limit_margin_percent: 20,
            gas_price_bump_percent: 20,
            receipt_timeout_secs: 30,
            receipt_poll_ms: 1_000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup (environment, map in tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let number = |key: &str, default: u64| get(key).and_then(|v| v.parse().ok()).unwrap_or(default);

        let rpc_url = get("RPC_URL")
            .or_else(|| get("API_URL"))
            .ok_or(ConfigError::Missing("RPC_URL"))?;

        let private_key = get("PRIVATE_KEY").ok_or(ConfigError::Missing("PRIVATE_KEY"))?;
        let signer = PrivateKeySigner::from_str(private_key.trim_start_matches("0x")).map_err(|e| {
            ConfigError::Invalid {
                var: "PRIVATE_KEY",
                reason: e.to_string(),
            }
        })?;

        let contract_address = get("CONTRACT_ADDRESS")
            .ok_or(ConfigError::Missing("CONTRACT_ADDRESS"))
            .and_then(|v| {
                Address::from_str(&v).map_err(|e| ConfigError::Invalid {
                    var: "CONTRACT_ADDRESS",
                    reason: e.to_string(),
                })
            })?;

        let chain_id = number("CHAIN_ID", 10740);

        let price_defaults = PriceFeedConfig::default();
        let price = PriceFeedConfig {
            url: get("PRICE_FEED_URL").unwrap_or(price_defaults.url),
            timeout_secs: number("PRICE_TIMEOUT_SECS", price_defaults.timeout_secs),
            fallback_cents: number("PRICE_FALLBACK_CENTS", price_defaults.fallback_cents),
            fallback_jitter_cents: number("PRICE_FALLBACK_JITTER_CENTS", price_defaults.fallback_jitter_cents),
        };

        let start_call = match get("START_ROUND_CALL").map(|v| v.to_lowercase()).as_deref() {
            None | Some("first") => StartCall::First,
            Some("new") => StartCall::New,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "START_ROUND_CALL",
                    reason: format!("expected 'first' or 'new', got '{}'", other),
                })
            }
        };

        let keeper_defaults = KeeperConfig::default();
        let keeper = KeeperConfig {
            poll_interval_secs: number("POLL_INTERVAL_SECS", keeper_defaults.poll_interval_secs).max(1),
            grace_secs: number("GRACE_PERIOD_SECS", keeper_defaults.grace_secs),
            error_backoff_secs: number("ERROR_BACKOFF_SECS", keeper_defaults.error_backoff_secs),
            start_call,
            dev_fee_check_secs: number("DEV_FEE_CHECK_SECS", keeper_defaults.dev_fee_check_secs),
            heartbeat_secs: number("HEARTBEAT_SECS", keeper_defaults.heartbeat_secs),
            log_every_secs: keeper_defaults.log_every_secs,
        };

        let tx_defaults = TxConfig::default();
        let tx = TxConfig {
            gas_price_bump_percent: number("GAS_PRICE_BUMP_PERCENT", tx_defaults.gas_price_bump_percent),
            receipt_timeout_secs: number("RECEIPT_TIMEOUT_SECS", tx_defaults.receipt_timeout_secs),
            ..tx_defaults
        };

        Ok(Self {
            rpc_url,
            signer,
            contract_address,
            chain_id,
            price,
            keeper,
            tx,
        })
    }

    /// Keeper wallet address
    pub fn keeper_address(&self) -> Address {
        self.signer.address()
    }
}

/// Binance public market data API
pub struct BinanceApi;

impl BinanceApi {
    pub const BASE_URL: &'static str = "https://api.binance.com";

    pub fn ticker_price_url(symbol: &str) -> String {
        format!("{}/api/v3/ticker/price?symbol={}", Self::BASE_URL, symbol)
    }

    pub fn btc_ticker_url() -> String {
        Self::ticker_price_url("BTCUSDT")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const CONTRACT: &str = "0x5A3949aE67a37e7e37bFC77F5b7832Cc93f40A2a";

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("RPC_URL", "http://localhost:8545"),
            ("PRIVATE_KEY", TEST_KEY),
            ("CONTRACT_ADDRESS", CONTRACT),
        ]
    }

    #[test]
    fn test_defaults_applied() {
        let config = load(&required()).unwrap();

        assert_eq!(config.chain_id, 10740);
        assert_eq!(config.keeper.poll_interval_secs, 10);
        assert_eq!(config.keeper.grace_secs, 5);
        assert_eq!(config.keeper.start_call, StartCall::First);
        assert_eq!(config.price.fallback_cents, 6_850_000);
        assert_eq!(config.price.fallback_jitter_cents, 10_000);
        assert_eq!(config.tx.receipt_timeout_secs, 30);
        assert!(config.price.url.contains("BTCUSDT"));
        assert_eq!(
            format!("{:?}", config.keeper_address()).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_missing_required() {
        let err = load(&[("RPC_URL", "http://localhost:8545")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PRIVATE_KEY")));

        let err = load(&[("PRIVATE_KEY", TEST_KEY), ("CONTRACT_ADDRESS", CONTRACT)]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("RPC_URL")));

        let err = load(&[("RPC_URL", "http://x"), ("PRIVATE_KEY", TEST_KEY)]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("CONTRACT_ADDRESS")));
    }

    #[test]
    fn test_api_url_alias() {
        let config = load(&[
            ("API_URL", "http://node:8545"),
            ("PRIVATE_KEY", TEST_KEY),
            ("CONTRACT_ADDRESS", CONTRACT),
        ])
        .unwrap();
        assert_eq!(config.rpc_url, "http://node:8545");
    }

    #[test]
    fn test_invalid_key_and_address() {
        let mut vars = required();
        vars[1] = ("PRIVATE_KEY", "not-a-key");
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { var: "PRIVATE_KEY", .. })));

        let mut vars = required();
        vars[2] = ("CONTRACT_ADDRESS", "0x1234");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { var: "CONTRACT_ADDRESS", .. })
        ));
    }

    #[test]
    fn test_overrides_and_unparsable_tunables() {
        let mut vars = required();
        vars.extend([
            ("CHAIN_ID", "31337"),
            ("POLL_INTERVAL_SECS", "3"),
            ("GRACE_PERIOD_SECS", "soon"),
            ("START_ROUND_CALL", "NEW"),
            ("DEV_FEE_CHECK_SECS", "0"),
        ]);
        let config = load(&vars).unwrap();

        assert_eq!(config.chain_id, 31337);
        assert_eq!(config.keeper.poll_interval_secs, 3);
        assert_eq!(config.keeper.grace_secs, 5);
        assert_eq!(config.keeper.start_call, StartCall::New);
        assert_eq!(config.keeper.dev_fee_check_secs, 0);
    }

    #[test]
    fn test_bad_start_call_rejected() {
        let mut vars = required();
        vars.push(("START_ROUND_CALL", "both"));
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { var: "START_ROUND_CALL", .. })
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = load(&required()).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"));
        assert!(debug.contains("chain_id"));
    }
}
