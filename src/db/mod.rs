use std::sync::Arc;

use crate::config::Settings;

pub mod models;
pub mod postgres;
pub mod store;

#[cfg(test)]
pub mod memory;

pub use postgres::PostgresClient;
pub use store::{CheckpointStore, OwnershipStore, TradeStore};

/// Database handle for the indexer.
///
/// PostgreSQL backs all three repositories: ownership intervals, scan
/// checkpoints and trade requests.
#[derive(Clone)]
pub struct Database {
    pub postgres: Arc<PostgresClient>,
}

impl Database {
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        let postgres = PostgresClient::new(&settings.postgres).await?;

        // Run migrations
        postgres.migrate().await?;

        Ok(Self {
            postgres: Arc::new(postgres),
        })
    }
}
