//! Polling driver: pulls new transfer events from the log source in chunks,
//! feeds them through the indexer, and advances the scan checkpoint.
//!
//! State lives entirely in the checkpoint: a restart (or a missed tick)
//! resumes exactly where the last fully committed chunk ended.

use std::time::Duration;

use std::sync::Arc;

use anyhow::bail;
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::chain::source::{LogSource, SourceError, TransferEvent};
use crate::config::{ChainSettings, PollerSettings};
use crate::db::store::CheckpointStore;
use crate::worker::indexer::{IndexMode, OwnershipIndexer};
use crate::worker::ranges::plan_ranges;

/// How a scan walks the chain; shared by the poller and the rebuild paths.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Lowest block ever worth scanning.
    pub deploy_block: u64,
    /// Blocks held back from the head to stay clear of reorganizations.
    pub confirmation_depth: u64,
    /// Maximum block span per log request.
    pub chunk_size: u64,
    /// Pause between chunk requests.
    pub chunk_delay: Duration,
}

impl From<&ChainSettings> for ScanSettings {
    fn from(settings: &ChainSettings) -> Self {
        Self {
            deploy_block: settings.deploy_block,
            confirmation_depth: settings.confirmation_depth,
            chunk_size: settings.chunk_size,
            chunk_delay: Duration::from_millis(settings.chunk_delay_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub scan: ScanSettings,
    /// Checkpoint identity for this event source.
    pub source_key: String,
    /// Attempts per cycle before giving up until the next trigger.
    pub max_cycle_attempts: u32,
    /// Initial backoff between attempts; doubles each time.
    pub retry_backoff: Duration,
}

impl PollerConfig {
    pub fn from_settings(chain: &ChainSettings, poller: &PollerSettings) -> Self {
        Self {
            scan: ScanSettings::from(chain),
            source_key: poller
                .source_key
                .clone()
                .unwrap_or_else(|| chain.contract_address.to_lowercase()),
            max_cycle_attempts: poller.max_cycle_attempts.max(1),
            retry_backoff: Duration::from_millis(poller.retry_backoff_ms),
        }
    }
}

/// What a poll invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Another cycle was in flight; this trigger was a no-op.
    AlreadyRunning,
    /// Nothing new below the confirmation window.
    UpToDate,
    Completed {
        from_block: u64,
        to_block: u64,
        tokens: usize,
        events: usize,
    },
    /// Cancelled between chunks; everything up to `scanned_to` is committed.
    Cancelled { scanned_to: u64 },
}

pub struct PollWorker {
    source: Arc<dyn LogSource>,
    indexer: Arc<OwnershipIndexer>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: PollerConfig,
    /// At-most-one poll cycle in flight.
    gate: Mutex<()>,
}

impl PollWorker {
    pub fn new(
        source: Arc<dyn LogSource>,
        indexer: Arc<OwnershipIndexer>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: PollerConfig,
    ) -> Self {
        Self {
            source,
            indexer,
            checkpoints,
            config,
            gate: Mutex::new(()),
        }
    }

    /// Run one poll cycle. Transient source failures are retried in a bounded
    /// loop with doubling backoff, each attempt resuming from the unmoved
    /// checkpoint; anything else propagates to the caller with the checkpoint
    /// held at the last fully committed chunk.
    pub async fn poll_once(&self, cancel: &CancellationToken) -> anyhow::Result<PollOutcome> {
        let Ok(_guard) = self.gate.try_lock() else {
            debug!("Poll already in flight, skipping trigger");
            return Ok(PollOutcome::AlreadyRunning);
        };

        let mut attempt = 1;
        let mut backoff = self.config.retry_backoff;
        loop {
            match self.run_cycle(cancel).await {
                Ok(outcome) => return Ok(outcome),
                Err(err)
                    if attempt < self.config.max_cycle_attempts
                        && is_transient(&err)
                        && !cancel.is_cancelled() =>
                {
                    warn!(
                        "Poll cycle attempt {attempt}/{} failed ({err:#}), retrying in {:?}",
                        self.config.max_cycle_attempts, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                },
                Err(err) => return Err(err),
            }
        }
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> anyhow::Result<PollOutcome> {
        let key = &self.config.source_key;
        let scan = &self.config.scan;

        let from = match self.checkpoints.read_watermark(key).await? {
            Some(watermark) => watermark + 1,
            None => scan.deploy_block,
        };
        let head = self.source.current_height().await?;
        let to = head.saturating_sub(scan.confirmation_depth);

        if from > to {
            debug!("No scannable blocks: next is {from}, confirmed head is {to}");
            return Ok(PollOutcome::UpToDate);
        }

        let ranges = plan_ranges(from, to, scan.chunk_size);
        let total = ranges.len();
        let mut tokens_touched = 0;
        let mut events_indexed = 0;

        for (i, (chunk_from, chunk_to)) in ranges.into_iter().enumerate() {
            let events = self
                .source
                .fetch_transfers(None, chunk_from, chunk_to)
                .await?;

            if !events.is_empty() {
                debug!("Chunk {chunk_from}..={chunk_to}: {} transfer(s)", events.len());
                let (ok, written) = self
                    .process_chunk(events, chunk_from, chunk_to)
                    .await?;
                tokens_touched += ok;
                events_indexed += written;
            }

            // The chunk is fully committed, so the watermark may pass it even
            // when it held no events
            self.checkpoints.advance_watermark(key, chunk_to).await?;

            if cancel.is_cancelled() {
                info!("Poll cancelled after chunk ending at block {chunk_to}");
                return Ok(PollOutcome::Cancelled {
                    scanned_to: chunk_to,
                });
            }
            if i + 1 < total {
                tokio::time::sleep(scan.chunk_delay).await;
            }
        }

        info!(
            "Scanned blocks {from}..={to}: {events_indexed} event(s) across {tokens_touched} token(s)"
        );
        Ok(PollOutcome::Completed {
            from_block: from,
            to_block: to,
            tokens: tokens_touched,
            events: events_indexed,
        })
    }

    /// Reconcile one chunk's events, grouped per token. A token blocked on a
    /// pruned block does not stop its neighbors, but it does fail the chunk:
    /// with a single source-wide checkpoint the watermark must not move past
    /// an unresolved block.
    async fn process_chunk(
        &self,
        events: Vec<TransferEvent>,
        chunk_from: u64,
        chunk_to: u64,
    ) -> anyhow::Result<(usize, usize)> {
        let mut grouped: FxHashMap<u64, Vec<TransferEvent>> = FxHashMap::default();
        for event in events {
            grouped.entry(event.token_id).or_default().push(event);
        }
        let mut groups: Vec<(u64, Vec<TransferEvent>)> = grouped.into_iter().collect();
        groups.sort_by_key(|(token_id, _)| *token_id);

        let mut tokens_touched = 0;
        let mut events_indexed = 0;
        let mut blocked: Vec<u64> = Vec::new();

        for (token_id, group) in groups {
            match self
                .indexer
                .reconcile_token(token_id, group, IndexMode::Incremental)
                .await
            {
                Ok(written) => {
                    tokens_touched += 1;
                    events_indexed += written;
                },
                Err(err) => match err.downcast_ref::<SourceError>() {
                    Some(SourceError::BlockNotFound(block)) => {
                        warn!(
                            "Token {token_id} blocked on missing block {block}, \
                             other tokens in chunk continue"
                        );
                        blocked.push(token_id);
                    },
                    _ => return Err(err),
                },
            }
        }

        if !blocked.is_empty() {
            bail!(
                "{} token(s) blocked on unresolved block timestamps in chunk \
                 {chunk_from}..={chunk_to}; checkpoint held",
                blocked.len()
            );
        }

        Ok((tokens_touched, events_indexed))
    }
}

fn is_transient(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SourceError>()
        .is_some_and(SourceError::is_transient)
}
