//! Repository traits the indexer depends on.
//!
//! The core logic never talks to PostgreSQL directly; it goes through these
//! seams so it can run against in-memory implementations in tests.

use async_trait::async_trait;

use crate::db::models::{OwnershipInterval, TradeRequest};

/// Persistence of derived ownership timelines.
#[async_trait]
pub trait OwnershipStore: Send + Sync {
    /// All intervals for a token, ascending by start timestamp.
    /// Unknown tokens yield an empty vector, not an error.
    async fn intervals_for_token(&self, token_id: u64) -> anyhow::Result<Vec<OwnershipInterval>>;

    /// Atomically replace a token's timeline (full rebuild).
    /// An empty slice deletes whatever was there.
    async fn replace_intervals(
        &self,
        token_id: u64,
        intervals: &[OwnershipInterval],
    ) -> anyhow::Result<()>;

    /// Atomically close the token's open interval (when `close_open_at` is
    /// set) and append new intervals (incremental reconciliation).
    async fn extend_intervals(
        &self,
        token_id: u64,
        close_open_at: Option<i64>,
        appended: &[OwnershipInterval],
    ) -> anyhow::Result<()>;
}

/// Durable, monotone scan watermark keyed by source identity.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// `None` means the source has never been scanned.
    async fn read_watermark(&self, source_key: &str) -> anyhow::Result<Option<u64>>;

    /// Persist `block_number` as the last fully scanned block. A no-op when
    /// the stored value is already equal or higher; safe to call repeatedly.
    async fn advance_watermark(&self, source_key: &str, block_number: u64) -> anyhow::Result<()>;
}

/// Interface onto the catalog layer's trade requests.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// The most recently approved outstanding request for a token, if any.
    async fn find_approved_request(&self, token_id: u64)
        -> anyhow::Result<Option<TradeRequest>>;

    /// Transition a request approved -> completed, recording the transaction.
    /// Returns `false` when the request was no longer approved (already
    /// completed, cancelled meanwhile), which keeps the operation idempotent.
    async fn mark_completed(&self, request_id: &str, tx_hash: &str) -> anyhow::Result<bool>;
}
