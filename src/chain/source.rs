//! Log source abstraction over the chain-access collaborator.
//!
//! The indexer and poller only depend on this trait; the production
//! implementation is [`crate::chain::RpcLogSource`]. Events carry no ordering
//! guarantee here, sorting into canonical (block, log index) order is the
//! indexer's job.

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a log source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("log source unavailable: {0}")]
    Unavailable(String),

    #[error("block {0} not found on the node (pruned history?)")]
    BlockNotFound(u64),

    #[error("requested block range too large: {0}")]
    RangeTooLarge(String),

    #[error("log source rate limited: {0}")]
    RateLimited(String),

    #[error("rpc error: {0}")]
    Rpc(String),
}

impl SourceError {
    /// Returns `true` for conditions that are worth retrying from the unmoved
    /// checkpoint (connectivity loss, rate limiting, provider range caps).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::RateLimited(_) | Self::RangeTooLarge(_)
        )
    }
}

/// A decoded ownership-transfer event, positioned on the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub from_address: String,
    pub to_address: String,
    pub token_id: u64,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: String,
}

impl TransferEvent {
    /// Canonical ordering key: ties within a block break by log index.
    pub fn ordinal(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// Capability set consumed from the chain-access collaborator.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Current chain head height.
    async fn current_height(&self) -> Result<u64, SourceError>;

    /// Timestamp of a block, unix seconds.
    async fn block_timestamp(&self, block_number: u64) -> Result<i64, SourceError>;

    /// Transfer events emitted by the watched contract within
    /// `[from_block, to_block]` inclusive, optionally filtered to one token.
    /// The caller is responsible for keeping the range within the provider's
    /// limit (see `plan_ranges`).
    async fn fetch_transfers(
        &self,
        token_id: Option<u64>,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferEvent>, SourceError>;
}
