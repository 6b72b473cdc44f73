//! Ownership timeline reconstruction.
//!
//! Each `Transfer` event hands the token to a new owner; pairing every event
//! with the next one's block timestamp yields a contiguous sequence of
//! ownership intervals, the last of which stays open until the next transfer
//! arrives.

use std::sync::Arc;

use log::info;
use rustc_hash::FxHashMap;

use crate::chain::source::{LogSource, TransferEvent};
use crate::db::models::OwnershipInterval;
use crate::db::store::OwnershipStore;
use crate::worker::reconciler::TradeReconciler;

/// How `reconcile_token` interprets the event list it is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// `events` is the token's complete transfer history; existing intervals
    /// are discarded and rebuilt from scratch.
    FullRebuild,
    /// `events` contains only newly observed events; anything at or below the
    /// stored watermark is discarded and the timeline is extended in place.
    Incremental,
}

pub struct OwnershipIndexer {
    source: Arc<dyn LogSource>,
    store: Arc<dyn OwnershipStore>,
    reconciler: Arc<TradeReconciler>,
}

impl OwnershipIndexer {
    pub fn new(
        source: Arc<dyn LogSource>,
        store: Arc<dyn OwnershipStore>,
        reconciler: Arc<TradeReconciler>,
    ) -> Self {
        Self {
            source,
            store,
            reconciler,
        }
    }

    /// Rebuild or extend one token's ownership timeline. Returns the number
    /// of intervals written.
    ///
    /// A failed block-timestamp lookup aborts this token only; the error
    /// carries the underlying [`crate::chain::SourceError`] so the caller can
    /// tell pruned history from a transient outage.
    pub async fn reconcile_token(
        &self,
        token_id: u64,
        mut events: Vec<TransferEvent>,
        mode: IndexMode,
    ) -> anyhow::Result<usize> {
        // Canonical event order; arrival order is meaningless
        events.sort_by_key(|e| e.ordinal());

        match mode {
            IndexMode::FullRebuild => self.rebuild(token_id, events).await,
            IndexMode::Incremental => self.extend(token_id, events).await,
        }
    }

    async fn rebuild(&self, token_id: u64, events: Vec<TransferEvent>) -> anyhow::Result<usize> {
        if events.is_empty() {
            // No transfer has ever touched this token: no ownership record
            self.store.replace_intervals(token_id, &[]).await?;
            return Ok(0);
        }

        let timestamps = self.resolve_timestamps(&events).await?;
        let intervals = build_intervals(token_id, &events, &timestamps);
        self.store.replace_intervals(token_id, &intervals).await?;

        info!(
            "Rebuilt ownership history for token {}: {} intervals",
            token_id,
            intervals.len()
        );
        Ok(intervals.len())
    }

    async fn extend(&self, token_id: u64, events: Vec<TransferEvent>) -> anyhow::Result<usize> {
        let existing = self.store.intervals_for_token(token_id).await?;
        let watermark = existing.last().map(|i| i.ordinal());

        // Idempotence guard: re-delivered events must not mutate history
        let events: Vec<TransferEvent> = events
            .into_iter()
            .filter(|e| watermark.is_none_or(|w| e.ordinal() > w))
            .collect();
        if events.is_empty() {
            return Ok(0);
        }

        let timestamps = self.resolve_timestamps(&events).await?;

        let first_start = timestamps[&events[0].block_number];
        let close_open_at = match existing.last() {
            Some(last) if last.is_open() && first_start >= last.start_timestamp => {
                Some(first_start)
            },
            _ => None,
        };

        let appended = build_intervals(token_id, &events, &timestamps);
        self.store
            .extend_intervals(token_id, close_open_at, &appended)
            .await?;

        // Each appended interval is a transfer some approved trade request may
        // have been waiting for
        for event in &events {
            self.reconciler
                .on_ownership_changed(token_id, &event.tx_hash)
                .await?;
        }

        Ok(appended.len())
    }

    /// Resolve the timestamp of every distinct block once per call.
    async fn resolve_timestamps(
        &self,
        events: &[TransferEvent],
    ) -> anyhow::Result<FxHashMap<u64, i64>> {
        let mut timestamps = FxHashMap::default();
        for event in events {
            if !timestamps.contains_key(&event.block_number) {
                let ts = self.source.block_timestamp(event.block_number).await?;
                timestamps.insert(event.block_number, ts);
            }
        }
        Ok(timestamps)
    }
}

/// Pair each event with the next one's timestamp; the last interval stays open.
fn build_intervals(
    token_id: u64,
    events: &[TransferEvent],
    timestamps: &FxHashMap<u64, i64>,
) -> Vec<OwnershipInterval> {
    events
        .iter()
        .enumerate()
        .map(|(i, event)| OwnershipInterval {
            token_id,
            owner_address: event.to_address.clone(),
            start_timestamp: timestamps[&event.block_number],
            end_timestamp: events.get(i + 1).map(|next| timestamps[&next.block_number]),
            block_number: event.block_number,
            log_index: event.log_index,
            tx_hash: Some(event.tx_hash.clone()),
        })
        .collect()
}
