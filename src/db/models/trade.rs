use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a trade request.
///
/// The indexer only ever performs the `Approved -> Completed` transition;
/// every other transition belongs to the catalog layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
    Cancelled,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "pending" => Self::Pending,
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            "completed" => Self::Completed,
            "cancelled" => Self::Cancelled,
            other => bail!("unknown trade status: {other}"),
        })
    }
}

/// A request to transfer a token, owned by the catalog layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRequest {
    pub id: String,
    pub token_id: u64,
    pub requester: String,
    pub status: TradeStatus,
    pub approver: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
