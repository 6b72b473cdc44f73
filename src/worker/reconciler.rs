//! Trade request reconciliation.
//!
//! When a transfer lands on the log for a token that has an approved trade
//! request outstanding, that request is what the transfer fulfilled: mark it
//! completed and record the causing transaction.

use std::sync::Arc;

use log::{debug, info};

use crate::db::store::TradeStore;

pub struct TradeReconciler {
    trades: Arc<dyn TradeStore>,
}

impl TradeReconciler {
    pub fn new(trades: Arc<dyn TradeStore>) -> Self {
        Self { trades }
    }

    /// Complete the most recently approved outstanding request for the token,
    /// if one exists. Safe to invoke repeatedly for the same transfer: once a
    /// request is completed it no longer matches the lookup.
    pub async fn on_ownership_changed(&self, token_id: u64, tx_hash: &str) -> anyhow::Result<()> {
        let Some(request) = self.trades.find_approved_request(token_id).await? else {
            debug!("No approved trade request for token {token_id}, nothing to reconcile");
            return Ok(());
        };

        if self.trades.mark_completed(&request.id, tx_hash).await? {
            info!(
                "Trade request {} for token {} completed by tx {}",
                request.id, token_id, tx_hash
            );
        }

        Ok(())
    }
}
