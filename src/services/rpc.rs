//! Ethereum JSON-RPC transport
//!
//! Minimal HTTP JSON-RPC client covering the handful of methods the keeper
//! needs. Read-only methods retry throttling and dropped connections per
//! [`ReadRetryPolicy`]; `eth_sendRawTransaction` is sent exactly once.

use super::chain_errors::{ChainError, RpcErrorObject, LIMIT_EXCEEDED};
use super::retry::ReadRetryPolicy;
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const RPC_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Receipt fields the keeper cares about
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    pub transaction_hash: String,
    pub block_number: Option<String>,
    pub gas_used: Option<String>,
    /// "0x1" success, "0x0" reverted
    pub status: Option<String>,
}

/// JSON-RPC client over HTTP
#[derive(Clone)]
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
    retry: ReadRetryPolicy,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(RPC_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
            url: url.into(),
            retry: ReadRetryPolicy::default(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn with_read_retry(mut self, policy: ReadRetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one JSON-RPC request with no retry
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChainError::from_network_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(ChainError::Rpc {
                    code: LIMIT_EXCEEDED,
                    message: format!("HTTP 429 from RPC: {}", body),
                });
            }
            // 5xx from load balancers is transport trouble, not a node answer
            if status.is_server_error() {
                return Err(ChainError::Network(format!("HTTP {} from RPC: {}", status, body)));
            }
            return Err(ChainError::Decode(format!("HTTP {} from RPC: {}", status, body)));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(format!("{}: {}", method, e)))?;

        if let Some(err) = body.error {
            debug!("{} returned error {}: {}", method, err.code, err.message);
            return Err(ChainError::from_rpc_error(err));
        }

        let result = body.result.unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| ChainError::Decode(format!("{}: {}", method, e)))
    }

    /// Read-only request, retried on throttling and dropped connections
    pub async fn read<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let mut retry = 0;

        loop {
            let err = match self.request(method, params.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            retry += 1;

            let Some(delay) = self.retry.delay_for(&err, retry) else {
                if err.is_retryable() {
                    match err.rpc_code() {
                        Some(code) => warn!("{} gave up after {} attempts (rpc code {}): {}", method, retry, code, err),
                        None => warn!("{} gave up after {} attempts: {}", method, retry, err),
                    }
                }
                return Err(err);
            };

            debug!(
                "{} failed ({}), retry {}/{} in {}ms",
                method,
                err,
                retry,
                self.retry.max_retries,
                delay.as_millis()
            );
            sleep(delay).await;
        }
    }

    /// `eth_call` an ABI-encoded view function and decode its return value
    pub async fn call<C: SolCall>(&self, to: Address, call: &C) -> Result<C::Return, ChainError> {
        let data = self.eth_call(None, to, &call.abi_encode(), "latest").await?;
        C::abi_decode_returns(&data).map_err(|e| ChainError::Decode(format!("{}: {}", C::SIGNATURE, e)))
    }

    /// Raw `eth_call`, optionally with a sender, at a given block tag
    pub async fn eth_call(
        &self,
        from: Option<Address>,
        to: Address,
        data: &[u8],
        block: &str,
    ) -> Result<Vec<u8>, ChainError> {
        let tx = call_object(from, to, data);
        let result: String = self.read("eth_call", json!([tx, block])).await?;
        decode_hex(&result)
    }

    pub async fn estimate_gas(&self, from: Address, to: Address, data: &[u8]) -> Result<u64, ChainError> {
        let tx = call_object(Some(from), to, data);
        let result: String = self.read("eth_estimateGas", json!([tx])).await?;
        parse_quantity_u64(&result)
    }

    pub async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError> {
        let result: String = self
            .read("eth_getTransactionCount", json!([format!("{:?}", address), "pending"]))
            .await?;
        parse_quantity_u64(&result)
    }

    pub async fn gas_price(&self) -> Result<u128, ChainError> {
        let result: String = self.read("eth_gasPrice", json!([])).await?;
        let value = parse_quantity(&result)?;
        u128::try_from(value).map_err(|_| ChainError::Decode(format!("gas price out of range: {}", value)))
    }

    pub async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        let result: String = self
            .read("eth_getBalance", json!([format!("{:?}", address), "latest"]))
            .await?;
        parse_quantity(&result)
    }

    /// Broadcast a signed transaction, returning its hash
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, ChainError> {
        self.request("eth_sendRawTransaction", json!([format!("0x{}", hex::encode(raw))]))
            .await
    }

    /// Receipt for a transaction, `None` while pending
    pub async fn receipt(&self, tx_hash: &str) -> Result<Option<RpcReceipt>, ChainError> {
        self.read("eth_getTransactionReceipt", json!([tx_hash])).await
    }
}

fn call_object(from: Option<Address>, to: Address, data: &[u8]) -> Value {
    let mut tx = json!({
        "to": format!("{:?}", to),
        "data": format!("0x{}", hex::encode(data)),
    });
    if let Some(from) = from {
        tx["from"] = Value::String(format!("{:?}", from));
    }
    tx
}

/// Parse a hex quantity such as "0x1a"
pub fn parse_quantity(value: &str) -> Result<U256, ChainError> {
    let hex_str = value.strip_prefix("0x").unwrap_or(value);
    if hex_str.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(hex_str, 16).map_err(|e| ChainError::Decode(format!("bad quantity {}: {}", value, e)))
}

pub fn parse_quantity_u64(value: &str) -> Result<u64, ChainError> {
    let parsed = parse_quantity(value)?;
    u64::try_from(parsed).map_err(|_| ChainError::Decode(format!("quantity out of range: {}", value)))
}

fn decode_hex(value: &str) -> Result<Vec<u8>, ChainError> {
    let hex_str = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(hex_str).map_err(|e| ChainError::Decode(format!("bad hex data: {}", e)))
}
