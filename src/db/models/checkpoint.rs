use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scan progress checkpoint (PostgreSQL).
///
/// Tracks the last block fully scanned for a logical event source.
/// Used to resume polling after restarts without missing or duplicating data.
/// The stored value never decreases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanCheckpoint {
    pub source_key: String,
    pub last_scanned_block: u64,
    pub updated_at: DateTime<Utc>,
}

impl ScanCheckpoint {
    pub fn new(source_key: impl Into<String>, last_scanned_block: u64) -> Self {
        Self {
            source_key: source_key.into(),
            last_scanned_block,
            updated_at: Utc::now(),
        }
    }
}
