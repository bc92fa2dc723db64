//! Chain, price and bookkeeping services used by the keeper

pub mod chain_errors;
pub mod contract;
pub mod metrics;
pub mod price_feed;
pub mod retry;
pub mod rpc;
pub mod submitter;

pub use chain_errors::{ChainError, Disposition, RetryClass, Revert};
pub use contract::Predict402Client;
pub use metrics::{KeeperMetrics, MetricsSnapshot};
pub use price_feed::{BinancePriceFeed, PriceFeedError};
pub use retry::ReadRetryPolicy;
pub use rpc::RpcClient;
pub use submitter::TxSubmitter;
