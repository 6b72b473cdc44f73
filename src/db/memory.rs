//! In-memory repositories for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use anyhow::bail;
use async_trait::async_trait;

use crate::db::models::{OwnershipInterval, TradeRequest, TradeStatus};
use crate::db::store::{CheckpointStore, OwnershipStore, TradeStore};

/// One store backing all three repository traits, so a single `Arc` can be
/// handed to the indexer, poller and reconciler in tests.
#[derive(Default)]
pub struct MemoryStore {
    intervals: Mutex<HashMap<u64, Vec<OwnershipInterval>>>,
    checkpoints: Mutex<HashMap<String, u64>>,
    requests: Mutex<Vec<TradeRequest>>,
    /// When set, every write fails (persistence failure injection).
    fail_writes: AtomicBool,
    approved_lookups: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// How many times the reconciler looked for an approved request.
    pub fn approved_lookups(&self) -> u32 {
        self.approved_lookups.load(Ordering::SeqCst)
    }

    pub fn seed_request(&self, request: TradeRequest) {
        self.requests.lock().unwrap().push(request);
    }

    pub fn request(&self, request_id: &str) -> Option<TradeRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == request_id)
            .cloned()
    }

    fn check_writable(&self) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("store unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl OwnershipStore for MemoryStore {
    async fn intervals_for_token(&self, token_id: u64) -> anyhow::Result<Vec<OwnershipInterval>> {
        let mut intervals = self
            .intervals
            .lock()
            .unwrap()
            .get(&token_id)
            .cloned()
            .unwrap_or_default();
        intervals.sort_by_key(|i| (i.start_timestamp, i.ordinal()));
        Ok(intervals)
    }

    async fn replace_intervals(
        &self,
        token_id: u64,
        intervals: &[OwnershipInterval],
    ) -> anyhow::Result<()> {
        self.check_writable()?;
        self.intervals
            .lock()
            .unwrap()
            .insert(token_id, intervals.to_vec());
        Ok(())
    }

    async fn extend_intervals(
        &self,
        token_id: u64,
        close_open_at: Option<i64>,
        appended: &[OwnershipInterval],
    ) -> anyhow::Result<()> {
        self.check_writable()?;
        let mut map = self.intervals.lock().unwrap();
        let timeline = map.entry(token_id).or_default();
        if let Some(end_timestamp) = close_open_at {
            if let Some(open) = timeline.iter_mut().find(|i| i.is_open()) {
                open.end_timestamp = Some(end_timestamp);
            }
        }
        timeline.extend_from_slice(appended);
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn read_watermark(&self, source_key: &str) -> anyhow::Result<Option<u64>> {
        Ok(self.checkpoints.lock().unwrap().get(source_key).copied())
    }

    async fn advance_watermark(&self, source_key: &str, block_number: u64) -> anyhow::Result<()> {
        self.check_writable()?;
        let mut checkpoints = self.checkpoints.lock().unwrap();
        let entry = checkpoints.entry(source_key.to_string()).or_insert(0);
        *entry = (*entry).max(block_number);
        Ok(())
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn find_approved_request(
        &self,
        token_id: u64,
    ) -> anyhow::Result<Option<TradeRequest>> {
        self.approved_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.token_id == token_id && r.status == TradeStatus::Approved)
            .max_by_key(|r| (r.approved_at, r.created_at))
            .cloned())
    }

    async fn mark_completed(&self, request_id: &str, tx_hash: &str) -> anyhow::Result<bool> {
        self.check_writable()?;
        let mut requests = self.requests.lock().unwrap();
        match requests
            .iter_mut()
            .find(|r| r.id == request_id && r.status == TradeStatus::Approved)
        {
            Some(request) => {
                request.status = TradeStatus::Completed;
                request.tx_hash = Some(tx_hash.to_string());
                request.updated_at = chrono::Utc::now();
                Ok(true)
            },
            None => Ok(false),
        }
    }
}

/// Build an approved request for tests.
pub fn approved_request(id: &str, token_id: u64) -> TradeRequest {
    let now = chrono::Utc::now();
    TradeRequest {
        id: id.to_string(),
        token_id,
        requester: "0x00000000000000000000000000000000000000bb".to_string(),
        status: TradeStatus::Approved,
        approver: Some("admin".to_string()),
        approved_at: Some(now),
        tx_hash: None,
        created_at: now,
        updated_at: now,
    }
}
