//! Scripted log source for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::chain::source::{LogSource, SourceError, TransferEvent};

/// In-memory [`LogSource`] with failure injection.
///
/// Timestamps follow a fixed 12-second block cadence so tests can predict
/// them with [`MockLogSource::timestamp_for`].
#[derive(Default)]
pub struct MockLogSource {
    height: AtomicU64,
    events: Mutex<Vec<TransferEvent>>,
    missing_blocks: Mutex<HashSet<u64>>,
    fetch_failures: Mutex<VecDeque<SourceError>>,
    fetch_failures_from: Mutex<HashMap<u64, VecDeque<SourceError>>>,
    requested_ranges: Mutex<Vec<(u64, u64)>>,
    fetch_calls: AtomicU32,
    fetch_delay_ms: AtomicU64,
}

impl MockLogSource {
    pub fn new(height: u64) -> Self {
        let source = Self::default();
        source.height.store(height, Ordering::SeqCst);
        source
    }

    pub fn timestamp_for(block_number: u64) -> i64 {
        1_700_000_000 + block_number as i64 * 12
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn push_event(&self, event: TransferEvent) {
        self.events.lock().unwrap().push(event);
    }

    /// Make `block_timestamp` fail with `BlockNotFound` for this block.
    pub fn mark_missing(&self, block_number: u64) {
        self.missing_blocks.lock().unwrap().insert(block_number);
    }

    /// Queue an error returned by the next `fetch_transfers` call.
    pub fn fail_next_fetch(&self, err: SourceError) {
        self.fetch_failures.lock().unwrap().push_back(err);
    }

    /// Queue an error for the next `fetch_transfers` call starting at
    /// `from_block`, leaving other ranges untouched.
    pub fn fail_fetch_from(&self, from_block: u64, err: SourceError) {
        self.fetch_failures_from
            .lock()
            .unwrap()
            .entry(from_block)
            .or_default()
            .push_back(err);
    }

    /// Delay each `fetch_transfers` call, for exercising the single-flight gate.
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.fetch_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn requested_ranges(&self) -> Vec<(u64, u64)> {
        self.requested_ranges.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogSource for MockLogSource {
    async fn current_height(&self) -> Result<u64, SourceError> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<i64, SourceError> {
        if self.missing_blocks.lock().unwrap().contains(&block_number) {
            return Err(SourceError::BlockNotFound(block_number));
        }
        Ok(Self::timestamp_for(block_number))
    }

    async fn fetch_transfers(
        &self,
        token_id: Option<u64>,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferEvent>, SourceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.requested_ranges
            .lock()
            .unwrap()
            .push((from_block, to_block));

        let delay = self.fetch_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if let Some(err) = self.fetch_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        if let Some(err) = self
            .fetch_failures_from
            .lock()
            .unwrap()
            .get_mut(&from_block)
            .and_then(|queue| queue.pop_front())
        {
            return Err(err);
        }

        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
            .filter(|e| token_id.is_none_or(|id| e.token_id == id))
            .cloned()
            .collect())
    }
}

/// Shorthand for building test transfer events.
pub fn transfer(token_id: u64, block_number: u64, log_index: u64, to: &str) -> TransferEvent {
    TransferEvent {
        from_address: "0x00000000000000000000000000000000000000aa".to_string(),
        to_address: to.to_string(),
        token_id,
        block_number,
        log_index,
        tx_hash: format!("0xtx{block_number}x{log_index}"),
    }
}
