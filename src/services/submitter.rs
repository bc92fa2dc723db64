//! Transaction submitter
//!
//! Signs legacy (EIP-155) transactions locally and waits for them to be mined.
//! Pipeline per call: estimate gas (simulates the call, so most reverts are
//! caught before spending gas) -> pending nonce -> bumped gas price -> sign ->
//! broadcast -> poll for the receipt. A reverted receipt is replayed with
//! `eth_call` at its block to recover the reason.

use super::chain_errors::{ChainError, Revert};
use super::rpc::{parse_quantity_u64, RpcClient, RpcReceipt};
use crate::config::TxConfig;
use crate::types::TxReceipt;
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Signs and submits keeper transactions
#[derive(Clone)]
pub struct TxSubmitter {
    rpc: RpcClient,
    signer: PrivateKeySigner,
    chain_id: u64,
    config: TxConfig,
}

impl TxSubmitter {
    pub fn new(rpc: RpcClient, signer: PrivateKeySigner, chain_id: u64, config: TxConfig) -> Self {
        Self {
            rpc,
            signer,
            chain_id,
            config,
        }
    }

    /// Keeper wallet address
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Submit a contract call and block until it is mined.
    ///
    /// Returns `ChainError::Reverted` for reverts seen during simulation or
    /// after mining; callers classify them with `ChainError::disposition`.
    pub async fn submit(&self, to: Address, label: &str, calldata: Vec<u8>) -> Result<TxReceipt, ChainError> {
        let from = self.address();

        let estimate = self.rpc.estimate_gas(from, to, &calldata).await?;
        let gas_limit = with_margin(estimate, self.config.gas_limit_margin_percent);

        let nonce = self.rpc.pending_nonce(from).await?;
        let base_price = self.rpc.gas_price().await?;
        let gas_price = with_margin_u128(base_price, self.config.gas_price_bump_percent);

        debug!(
            "{}: nonce={} gas_limit={} (est {}) gas_price={}",
            label, nonce, gas_limit, estimate, gas_price
        );

        let raw = self.sign(to, &calldata, nonce, gas_limit, gas_price)?;
        let tx_hash = self.rpc.send_raw_transaction(&raw).await?;
        info!("{} sent: tx={}", label, tx_hash);

        let receipt = self.wait_for_receipt(&tx_hash).await?;
        let summary = summarize(&receipt)?;

        if !summary.success {
            let revert = self.replay_revert(from, to, &calldata, &receipt).await;
            warn!("{} reverted in block {}: {}", label, summary.block_number, revert);
            return Err(ChainError::Reverted(revert));
        }

        info!(
            "{} confirmed: tx={} block={} gas_used={}",
            label, summary.tx_hash, summary.block_number, summary.gas_used
        );
        Ok(summary)
    }

    fn sign(
        &self,
        to: Address,
        calldata: &[u8],
        nonce: u64,
        gas_limit: u64,
        gas_price: u128,
    ) -> Result<Vec<u8>, ChainError> {
        let mut tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price,
            gas_limit,
            to: TxKind::Call(to),
            value: U256::ZERO,
            input: Bytes::copy_from_slice(calldata),
        };

        let signature = self
            .signer
            .sign_transaction_sync(&mut tx)
            .map_err(|e| ChainError::Signing(e.to_string()))?;

        let envelope: TxEnvelope = tx.into_signed(signature).into();
        Ok(envelope.encoded_2718())
    }

    /// Poll for the receipt until it appears or the timeout passes
    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<RpcReceipt, ChainError> {
        let started = Instant::now();
        let timeout = Duration::from_secs(self.config.receipt_timeout_secs);
        let mut attempt = 0u32;

        loop {
            match self.rpc.receipt(tx_hash).await {
                Ok(Some(receipt)) if receipt.block_number.is_some() => return Ok(receipt),
                Ok(_) => {}
                // Keep polling through transient node errors; the tx is already out
                Err(e) => debug!("Receipt poll for {} failed: {}", tx_hash, e),
            }

            if started.elapsed() >= timeout {
                return Err(ChainError::ReceiptTimeout {
                    tx_hash: tx_hash.to_string(),
                    waited_secs: self.config.receipt_timeout_secs,
                });
            }

            attempt += 1;
            if attempt % 5 == 0 {
                debug!("Waiting for {} ({}s)", tx_hash, started.elapsed().as_secs());
            }
            sleep(Duration::from_millis(self.config.receipt_poll_ms)).await;
        }
    }

    /// Re-run a reverted call at its block to recover the revert reason
    async fn replay_revert(&self, from: Address, to: Address, calldata: &[u8], receipt: &RpcReceipt) -> Revert {
        let block = receipt.block_number.as_deref().unwrap_or("latest");
        match self.rpc.eth_call(Some(from), to, calldata, block).await {
            Err(ChainError::Reverted(revert)) => revert,
            Err(e) => {
                debug!("Revert replay failed: {}", e);
                Revert::Unexplained
            }
            Ok(_) => Revert::Unexplained,
        }
    }
}

fn summarize(receipt: &RpcReceipt) -> Result<TxReceipt, ChainError> {
    let block_number = match receipt.block_number.as_deref() {
        Some(b) => parse_quantity_u64(b)?,
        None => 0,
    };
    let gas_used = match receipt.gas_used.as_deref() {
        Some(g) => parse_quantity_u64(g)?,
        None => 0,
    };
    // Pre-Byzantium receipts have no status; treat them as success
    let success = match receipt.status.as_deref() {
        Some(status) => parse_quantity_u64(status)? == 1,
        None => true,
    };

    Ok(TxReceipt {
        tx_hash: receipt.transaction_hash.clone(),
        block_number,
        gas_used,
        success,
    })
}

/// `value` plus `percent`%, saturating; never below `value`
fn with_margin(value: u64, percent: u64) -> u64 {
    let extra = (value / 100)
        .saturating_mul(percent)
        .saturating_add((value % 100).saturating_mul(percent) / 100);
    value.saturating_add(extra)
}

fn with_margin_u128(value: u128, percent: u64) -> u128 {
    let percent = u128::from(percent);
    let extra = (value / 100)
        .saturating_mul(percent)
        .saturating_add((value % 100).saturating_mul(percent) / 100);
    value.saturating_add(extra)
}
