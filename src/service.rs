//! Facade exposed to the API layer.
//!
//! Four operations: read a token's history, rebuild one token, rebuild every
//! token ever observed, and trigger an incremental poll on demand. HTTP or
//! CLI framing around these calls is a collaborator concern.

use std::sync::Arc;

use log::info;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;

use crate::chain::source::{LogSource, TransferEvent};
use crate::db::models::OwnershipInterval;
use crate::db::store::OwnershipStore;
use crate::worker::indexer::{IndexMode, OwnershipIndexer};
use crate::worker::poller::{PollOutcome, PollWorker, ScanSettings};
use crate::worker::ranges::plan_ranges;

pub struct OwnershipService {
    source: Arc<dyn LogSource>,
    store: Arc<dyn OwnershipStore>,
    indexer: Arc<OwnershipIndexer>,
    poller: Arc<PollWorker>,
    scan: ScanSettings,
    cancel: CancellationToken,
}

impl OwnershipService {
    pub fn new(
        source: Arc<dyn LogSource>,
        store: Arc<dyn OwnershipStore>,
        indexer: Arc<OwnershipIndexer>,
        poller: Arc<PollWorker>,
        scan: ScanSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            store,
            indexer,
            poller,
            scan,
            cancel,
        }
    }

    /// A token's ownership timeline, ascending by start timestamp. Unknown
    /// tokens yield an empty vector.
    pub async fn get_ownership_history(
        &self,
        token_id: u64,
    ) -> anyhow::Result<Vec<OwnershipInterval>> {
        self.store.intervals_for_token(token_id).await
    }

    /// Rebuild one token's timeline from its complete on-chain transfer
    /// history. Returns the number of intervals written; failures propagate
    /// to the caller so an explicit rebuild can be retried.
    pub async fn index_token(&self, token_id: u64) -> anyhow::Result<usize> {
        let events = self.collect_transfers(Some(token_id)).await?;
        self.indexer
            .reconcile_token(token_id, events, IndexMode::FullRebuild)
            .await
    }

    /// Rebuild every token ever observed in the event source. One full-range
    /// scan discovers the tokens; each is then rebuilt from its own complete
    /// event group. Returns the number of tokens rebuilt.
    pub async fn index_all(&self) -> anyhow::Result<usize> {
        let events = self.collect_transfers(None).await?;

        let mut grouped: FxHashMap<u64, Vec<TransferEvent>> = FxHashMap::default();
        for event in events {
            grouped.entry(event.token_id).or_default().push(event);
        }
        let mut groups: Vec<(u64, Vec<TransferEvent>)> = grouped.into_iter().collect();
        groups.sort_by_key(|(token_id, _)| *token_id);

        let total = groups.len();
        for (token_id, group) in groups {
            self.indexer
                .reconcile_token(token_id, group, IndexMode::FullRebuild)
                .await?;
        }

        info!("Full rebuild complete: {total} token(s) reindexed");
        Ok(total)
    }

    /// Run one incremental poll cycle now, in addition to the schedule. Goes
    /// through the same single-flight gate, so overlapping triggers are no-ops.
    pub async fn trigger_poll(&self) -> anyhow::Result<PollOutcome> {
        self.poller.poll_once(&self.cancel).await
    }

    /// Fetch transfer events from deploy block up to the confirmed head, in
    /// planned chunks, with the configured pause between chunk requests.
    async fn collect_transfers(
        &self,
        token_id: Option<u64>,
    ) -> anyhow::Result<Vec<TransferEvent>> {
        let head = self.source.current_height().await?;
        let to = head.saturating_sub(self.scan.confirmation_depth);
        if self.scan.deploy_block > to {
            return Ok(Vec::new());
        }

        let ranges = plan_ranges(self.scan.deploy_block, to, self.scan.chunk_size);
        let total = ranges.len();
        let mut events = Vec::new();

        for (i, (from, range_to)) in ranges.into_iter().enumerate() {
            let batch = self.source.fetch_transfers(token_id, from, range_to).await?;
            events.extend(batch);
            if i + 1 < total {
                tokio::time::sleep(self.scan.chunk_delay).await;
            }
        }

        Ok(events)
    }
}
