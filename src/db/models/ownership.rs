use serde::{Deserialize, Serialize};

/// One span of a token's ownership timeline: a single address held the token
/// from `start_timestamp` until `end_timestamp` (unix seconds).
///
/// Invariants, per token, in storage order:
/// - intervals are contiguous: `interval[i].end_timestamp == interval[i+1].start_timestamp`
/// - at most the last interval is open (`end_timestamp` is `None`)
/// - `(block_number, log_index)` strictly increases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipInterval {
    pub token_id: u64,
    pub owner_address: String,
    pub start_timestamp: i64,
    pub end_timestamp: Option<i64>,
    /// Block of the transfer event that opened this interval.
    pub block_number: u64,
    /// Position within that block, for total ordering of same-block events.
    pub log_index: u64,
    pub tx_hash: Option<String>,
}

impl OwnershipInterval {
    pub fn is_open(&self) -> bool {
        self.end_timestamp.is_none()
    }

    /// Watermark key of the event that opened this interval.
    pub fn ordinal(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}
