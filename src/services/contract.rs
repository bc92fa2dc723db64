//! Predict402 contract client
//!
//! Typed ABI surface of the Predict402 game contract plus the chain-facing
//! implementation of [`RoundChain`]. Reads go through `eth_call`; state
//! changes go through the [`TxSubmitter`].

use super::chain_errors::ChainError;
use super::rpc::RpcClient;
use super::submitter::TxSubmitter;
use crate::keeper::RoundChain;
use crate::types::{DevFeeStatus, Round, RoundCall, TxReceipt};
use alloy::primitives::{Address, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use tracing::debug;

sol! {
    /// Predict402 surface used by the keeper
    interface IPredict402 {
        struct RoundInfo {
            uint256 startTime;
            uint256 endTime;
            uint256 strikePrice;
            uint256 closingPrice;
            uint256 upPool;
            uint256 downPool;
            uint256 totalPool;
            uint256 upShares;
            uint256 downShares;
            uint256 totalBets;
            bool resolved;
            bool upWon;
            string proofHash;
        }

        function currentRoundId() external view returns (uint256);
        function roundEndTime() external view returns (uint256);
        function getStrikePrice() external view returns (uint256);
        function getRoundInfo(uint256 roundId) external view returns (RoundInfo memory);
        function accruedFees() external view returns (uint256);
        function timeUntilNextDevFee() external view returns (uint256);

        function startFirstRound(uint256 strikePrice) external;
        function startNewRound(uint256 strikePrice) external;
        function resolveRound(uint256 closingPrice, string proofHash) external;
        function distributeDevFee() external;

        error AlreadyResolved();
        error RoundNotEnded();
        error RoundActive();
    }
}

impl RoundCall {
    /// ABI-encode the call for the Predict402 contract
    pub fn calldata(&self) -> Vec<u8> {
        match self {
            RoundCall::StartFirstRound { strike_cents } => IPredict402::startFirstRoundCall {
                strikePrice: U256::from(*strike_cents),
            }
            .abi_encode(),
            RoundCall::StartNewRound { strike_cents } => IPredict402::startNewRoundCall {
                strikePrice: U256::from(*strike_cents),
            }
            .abi_encode(),
            RoundCall::ResolveRound {
                closing_cents,
                proof_hash,
            } => IPredict402::resolveRoundCall {
                closingPrice: U256::from(*closing_cents),
                proofHash: proof_hash.clone(),
            }
            .abi_encode(),
            RoundCall::DistributeDevFee => IPredict402::distributeDevFeeCall {}.abi_encode(),
        }
    }
}

/// Chain-backed Predict402 client
#[derive(Clone)]
pub struct Predict402Client {
    rpc: RpcClient,
    submitter: TxSubmitter,
    address: Address,
}

impl Predict402Client {
    pub fn new(rpc: RpcClient, submitter: TxSubmitter, address: Address) -> Self {
        Self {
            rpc,
            submitter,
            address,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    /// Strike price of the current round in cents
    pub async fn strike_price(&self) -> Result<u64, ChainError> {
        let value = self
            .rpc
            .call(self.address, &IPredict402::getStrikePriceCall {})
            .await?;
        to_u64(value, "strikePrice")
    }

    /// End time of the current round (unix seconds)
    pub async fn round_end_time(&self) -> Result<u64, ChainError> {
        let value = self
            .rpc
            .call(self.address, &IPredict402::roundEndTimeCall {})
            .await?;
        to_u64(value, "roundEndTime")
    }
}

impl RoundChain for Predict402Client {
    async fn current_round_id(&self) -> Result<u64, ChainError> {
        let value = self
            .rpc
            .call(self.address, &IPredict402::currentRoundIdCall {})
            .await?;
        to_u64(value, "currentRoundId")
    }

    async fn get_round(&self, id: u64) -> Result<Round, ChainError> {
        let info = self
            .rpc
            .call(
                self.address,
                &IPredict402::getRoundInfoCall {
                    roundId: U256::from(id),
                },
            )
            .await?;
        debug!(
            "Round #{} read: end={} resolved={}",
            id, info.endTime, info.resolved
        );
        round_from_info(id, info)
    }

    async fn dev_fee_status(&self) -> Result<DevFeeStatus, ChainError> {
        let accrued_wei = self
            .rpc
            .call(self.address, &IPredict402::accruedFeesCall {})
            .await?;
        let until = self
            .rpc
            .call(self.address, &IPredict402::timeUntilNextDevFeeCall {})
            .await?;
        Ok(DevFeeStatus {
            accrued_wei,
            seconds_until_next: to_u64(until, "timeUntilNextDevFee")?,
        })
    }

    async fn submit(&self, call: RoundCall) -> Result<TxReceipt, ChainError> {
        self.submitter
            .submit(self.address, call.label(), call.calldata())
            .await
    }
}

fn round_from_info(id: u64, info: IPredict402::RoundInfo) -> Result<Round, ChainError> {
    Ok(Round {
        id,
        start_time: to_u64(info.startTime, "startTime")?,
        end_time: to_u64(info.endTime, "endTime")?,
        strike_price_cents: to_u64(info.strikePrice, "strikePrice")?,
        closing_price_cents: to_u64(info.closingPrice, "closingPrice")?,
        up_pool_wei: info.upPool,
        down_pool_wei: info.downPool,
        total_pool_wei: info.totalPool,
        total_bets: to_u64(info.totalBets, "totalBets")?,
        resolved: info.resolved,
        up_won: info.upWon,
        proof_hash: info.proofHash,
    })
}

fn to_u64(value: U256, field: &str) -> Result<u64, ChainError> {
    u64::try_from(value).map_err(|_| ChainError::Decode(format!("{} out of range: {}", field, value)))
}
