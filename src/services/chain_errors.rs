//! Chain Error Differentiation
//!
//! Parses JSON-RPC failures and contract reverts into structured types so the
//! lifecycle driver can tell expected races ("already resolved") apart from
//! real failures without string matching at every call site.

use super::contract::IPredict402;
use alloy::sol_types::{decode_revert_reason, SolError};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// JSON-RPC code used by geth-style nodes for `execution reverted`
const EXECUTION_REVERTED_CODE: i64 = 3;

/// Decoded reason a contract call reverted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revert {
    /// Round was already resolved by someone else
    AlreadyResolved,
    /// Round end time has not been reached on-chain yet
    RoundNotEnded,
    /// A round is already running, so a start call is redundant
    RoundActive,
    /// Any other revert reason string
    Reason(String),
    /// Reverted without a reason we could recover
    Unexplained,
}

/// How the caller should treat a failed submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The intended effect already happened; treat as success
    AlreadyDone,
    /// Too early; retry on a later tick without escalating
    NotYetEligible,
    /// Log and retry with backoff
    Unknown,
}

/// Structured chain/RPC error types
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// Network/connection error (DNS, refused, reset, 5xx from a proxy)
    #[error("network error: {0}")]
    Network(String),
    /// Request hit the client timeout
    #[error("rpc request timed out")]
    Timeout,
    /// Node answered with a JSON-RPC error object
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// Call or transaction reverted
    #[error("contract reverted: {0}")]
    Reverted(Revert),
    /// Transaction was broadcast but no receipt arrived in time
    #[error("transaction {tx_hash} not mined after {waited_secs}s")]
    ReceiptTimeout { tx_hash: String, waited_secs: u64 },
    /// Response did not have the expected shape
    #[error("malformed rpc response: {0}")]
    Decode(String),
    /// Local signing failed
    #[error("signing failed: {0}")]
    Signing(String),
}

/// EIP-1474 "limit exceeded"; HTTP 429 is folded into it
pub const LIMIT_EXCEEDED: i64 = -32005;
const INTERNAL_ERROR: i64 = -32603;

/// How a failed read should be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Provider throttling: wait out the limit window
    RateLimited,
    /// Dropped connection or flaky node: retry quickly
    Transient,
    /// Answer is final for this tick
    Never,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl Revert {
    /// Decode raw revert data: custom error selectors first, then `Error(string)`.
    pub fn from_data(data: &[u8]) -> Self {
        if data.len() >= 4 {
            let selector = &data[..4];
            if selector == IPredict402::AlreadyResolved::SELECTOR {
                return Revert::AlreadyResolved;
            }
            if selector == IPredict402::RoundNotEnded::SELECTOR {
                return Revert::RoundNotEnded;
            }
            if selector == IPredict402::RoundActive::SELECTOR {
                return Revert::RoundActive;
            }
        }

        match decode_revert_reason(data) {
            Some(reason) => Self::from_reason(&reason),
            None => Revert::Unexplained,
        }
    }

    /// Classify a revert reason string
    pub fn from_reason(reason: &str) -> Self {
        let lower = reason.to_lowercase();

        if lower.contains("already resolved") {
            return Revert::AlreadyResolved;
        }

        // "still active" comes from resolve attempts on a running round
        if lower.contains("not ended") || lower.contains("not over") || lower.contains("still active") {
            return Revert::RoundNotEnded;
        }

        if lower.contains("round active")
            || lower.contains("already active")
            || lower.contains("already started")
        {
            return Revert::RoundActive;
        }

        // Node messages and decoded `Error(string)` payloads carry different prefixes
        let mut trimmed = reason.trim();
        for prefix in ["execution reverted", ":", "revert:"] {
            trimmed = trimmed.strip_prefix(prefix).unwrap_or(trimmed).trim();
        }
        if trimmed.is_empty() {
            Revert::Unexplained
        } else {
            Revert::Reason(trimmed.to_string())
        }
    }
}

impl fmt::Display for Revert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revert::AlreadyResolved => write!(f, "round already resolved"),
            Revert::RoundNotEnded => write!(f, "round not ended yet"),
            Revert::RoundActive => write!(f, "round already active"),
            Revert::Reason(reason) => write!(f, "{}", reason),
            Revert::Unexplained => write!(f, "no revert reason"),
        }
    }
}

impl ChainError {
    /// Parse a JSON-RPC error object, recognising reverts
    pub fn from_rpc_error(err: RpcErrorObject) -> Self {
        let revert_data = err.data.as_ref().and_then(extract_revert_data);

        if let Some(data) = revert_data {
            return ChainError::Reverted(Revert::from_data(&data));
        }

        let msg_lower = err.message.to_lowercase();
        if err.code == EXECUTION_REVERTED_CODE || msg_lower.contains("revert") {
            return ChainError::Reverted(Revert::from_reason(&err.message));
        }

        ChainError::Rpc {
            code: err.code,
            message: err.message,
        }
    }

    /// Parse a network/reqwest error
    pub fn from_network_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ChainError::Timeout
        } else if err.is_connect() {
            ChainError::Network("connection failed".to_string())
        } else {
            ChainError::Network(err.to_string())
        }
    }

    pub fn retry_class(&self) -> RetryClass {
        match self {
            ChainError::Rpc { code: LIMIT_EXCEEDED, .. } => RetryClass::RateLimited,
            ChainError::Rpc { code: INTERNAL_ERROR, .. } | ChainError::Network(_) => RetryClass::Transient,
            // A timed-out read already cost the full client timeout; the next tick retries it
            _ => RetryClass::Never,
        }
    }

    /// Whether a read can be retried within the same call
    pub fn is_retryable(&self) -> bool {
        self.retry_class() != RetryClass::Never
    }

    /// JSON-RPC error code, if the node answered with one
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            ChainError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// How the lifecycle driver should treat this failure
    pub fn disposition(&self) -> Disposition {
        match self {
            ChainError::Reverted(Revert::AlreadyResolved | Revert::RoundActive) => {
                Disposition::AlreadyDone
            }
            ChainError::Reverted(Revert::RoundNotEnded) => Disposition::NotYetEligible,
            _ => Disposition::Unknown,
        }
    }
}

/// Revert data can come back as a bare hex string or nested as `{ "data": "0x..." }`.
fn extract_revert_data(value: &serde_json::Value) -> Option<Vec<u8>> {
    match value {
        serde_json::Value::String(s) => {
            let hex_str = s.strip_prefix("0x")?;
            let bytes = hex::decode(hex_str).ok()?;
            if bytes.is_empty() {
                None
            } else {
                Some(bytes)
            }
        }
        serde_json::Value::Object(map) => map.get("data").and_then(extract_revert_data),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::Revert as SolRevert;

    fn revert_string(reason: &str) -> String {
        let payload = SolRevert {
            reason: reason.to_string(),
        }
        .abi_encode();
        format!("0x{}", hex::encode(payload))
    }

    #[test]
    fn test_error_string_already_resolved() {
        let err = ChainError::from_rpc_error(RpcErrorObject {
            code: 3,
            message: "execution reverted: Already resolved".to_string(),
            data: Some(serde_json::Value::String(revert_string("Already resolved"))),
        });
        assert!(matches!(err, ChainError::Reverted(Revert::AlreadyResolved)));
        assert_eq!(err.disposition(), Disposition::AlreadyDone);
    }

    #[test]
    fn test_custom_selector_not_ended() {
        let data = IPredict402::RoundNotEnded {}.abi_encode();
        assert_eq!(Revert::from_data(&data), Revert::RoundNotEnded);

        let err = ChainError::Reverted(Revert::from_data(&data));
        assert_eq!(err.disposition(), Disposition::NotYetEligible);
    }

    #[test]
    fn test_nested_data_object() {
        let err = ChainError::from_rpc_error(RpcErrorObject {
            code: -32000,
            message: "gas required exceeds allowance".to_string(),
            data: Some(serde_json::json!({ "data": revert_string("Round not ended yet") })),
        });
        assert!(matches!(err, ChainError::Reverted(Revert::RoundNotEnded)));
    }

    #[test]
    fn test_message_only_fallback() {
        let err = ChainError::from_rpc_error(RpcErrorObject {
            code: -32000,
            message: "execution reverted: Already resolved".to_string(),
            data: None,
        });
        assert_eq!(err.disposition(), Disposition::AlreadyDone);
    }

    #[test]
    fn test_unknown_reason_kept() {
        let err = ChainError::from_rpc_error(RpcErrorObject {
            code: 3,
            message: "execution reverted: Only owner".to_string(),
            data: None,
        });
        match err {
            ChainError::Reverted(Revert::Reason(reason)) => assert_eq!(reason, "Only owner"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_error_string_data_reason_is_clean() {
        let err = ChainError::from_rpc_error(RpcErrorObject {
            code: 3,
            message: "execution reverted".to_string(),
            data: Some(serde_json::Value::String(revert_string("Only keeper"))),
        });
        match err {
            ChainError::Reverted(Revert::Reason(reason)) => assert_eq!(reason, "Only keeper"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_bare_revert_is_unexplained() {
        assert_eq!(Revert::from_reason("execution reverted"), Revert::Unexplained);
        assert_eq!(Revert::from_data(&[]), Revert::Unexplained);
    }

    #[test]
    fn test_plain_rpc_error() {
        let err = ChainError::from_rpc_error(RpcErrorObject {
            code: -32000,
            message: "nonce too low".to_string(),
            data: None,
        });
        assert!(matches!(err, ChainError::Rpc { code: -32000, .. }));
        assert_eq!(err.disposition(), Disposition::Unknown);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_network_is_retryable() {
        let err = ChainError::Network("connection failed".to_string());
        assert!(err.is_retryable());
        assert_eq!(err.retry_class(), RetryClass::Transient);
        assert_eq!(err.disposition(), Disposition::Unknown);
    }

    #[test]
    fn test_retry_classes() {
        let limited = ChainError::from_rpc_error(RpcErrorObject {
            code: LIMIT_EXCEEDED,
            message: "daily request count exceeded".to_string(),
            data: None,
        });
        assert_eq!(limited.retry_class(), RetryClass::RateLimited);
        assert_eq!(limited.rpc_code(), Some(-32005));

        let internal = ChainError::Rpc {
            code: -32603,
            message: "internal error".to_string(),
        };
        assert_eq!(internal.retry_class(), RetryClass::Transient);

        assert_eq!(ChainError::Timeout.retry_class(), RetryClass::Never);
        assert!(!ChainError::Timeout.is_retryable());
        assert_eq!(ChainError::Timeout.rpc_code(), None);
        assert_eq!(
            ChainError::Reverted(Revert::AlreadyResolved).retry_class(),
            RetryClass::Never
        );
    }
}
