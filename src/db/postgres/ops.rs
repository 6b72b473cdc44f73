use async_trait::async_trait;
use deadpool_postgres::Transaction;
use log::error;
use tokio_postgres::Row;

use crate::db::models::{OwnershipInterval, ScanCheckpoint, TradeRequest, TradeStatus};
use crate::db::postgres::PostgresClient;
use crate::db::store::{CheckpointStore, OwnershipStore, TradeStore};

fn row_to_interval(row: &Row) -> OwnershipInterval {
    OwnershipInterval {
        token_id: row.get::<_, i64>("token_id") as u64,
        owner_address: row.get("owner_address"),
        start_timestamp: row.get("start_timestamp"),
        end_timestamp: row.get("end_timestamp"),
        block_number: row.get::<_, i64>("block_number") as u64,
        log_index: row.get::<_, i64>("log_index") as u64,
        tx_hash: row.get("tx_hash"),
    }
}

fn row_to_trade_request(row: &Row) -> anyhow::Result<TradeRequest> {
    let status: String = row.get("status");
    Ok(TradeRequest {
        id: row.get("id"),
        token_id: row.get::<_, i64>("token_id") as u64,
        requester: row.get("requester"),
        status: TradeStatus::parse(&status)?,
        approver: row.get("approver"),
        approved_at: row.get("approved_at"),
        tx_hash: row.get("tx_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

async fn insert_intervals(
    tx: &Transaction<'_>,
    intervals: &[OwnershipInterval],
) -> anyhow::Result<()> {
    let query = r#"
        INSERT INTO indexer.ownership_intervals (
            token_id, owner_address, start_timestamp, end_timestamp,
            block_number, log_index, tx_hash
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)
    "#;

    for interval in intervals {
        tx.execute(
            query,
            &[
                &(interval.token_id as i64),
                &interval.owner_address,
                &interval.start_timestamp,
                &interval.end_timestamp,
                &(interval.block_number as i64),
                &(interval.log_index as i64),
                &interval.tx_hash,
            ],
        )
        .await?;
    }

    Ok(())
}

#[async_trait]
impl OwnershipStore for PostgresClient {
    async fn intervals_for_token(&self, token_id: u64) -> anyhow::Result<Vec<OwnershipInterval>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT token_id, owner_address, start_timestamp, end_timestamp,
                   block_number, log_index, tx_hash
            FROM indexer.ownership_intervals
            WHERE token_id = $1
            ORDER BY start_timestamp ASC, block_number ASC, log_index ASC
        "#;

        let rows = client.query(query, &[&(token_id as i64)]).await?;
        Ok(rows.iter().map(row_to_interval).collect())
    }

    async fn replace_intervals(
        &self,
        token_id: u64,
        intervals: &[OwnershipInterval],
    ) -> anyhow::Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        tx.execute(
            "DELETE FROM indexer.ownership_intervals WHERE token_id = $1",
            &[&(token_id as i64)],
        )
        .await?;

        insert_intervals(&tx, intervals).await?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit interval rebuild for token {token_id}: {e:?}");
            anyhow::Error::from(e)
        })
    }

    async fn extend_intervals(
        &self,
        token_id: u64,
        close_open_at: Option<i64>,
        appended: &[OwnershipInterval],
    ) -> anyhow::Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        if let Some(end_timestamp) = close_open_at {
            tx.execute(
                r#"
                UPDATE indexer.ownership_intervals
                SET end_timestamp = $2
                WHERE token_id = $1 AND end_timestamp IS NULL
                "#,
                &[&(token_id as i64), &end_timestamp],
            )
            .await?;
        }

        insert_intervals(&tx, appended).await?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit interval extension for token {token_id}: {e:?}");
            anyhow::Error::from(e)
        })
    }
}

#[async_trait]
impl CheckpointStore for PostgresClient {
    async fn read_watermark(&self, source_key: &str) -> anyhow::Result<Option<u64>> {
        let client = self.pool.get().await?;
        let query =
            "SELECT last_scanned_block FROM indexer.scan_checkpoints WHERE source_key = $1";

        let row = client.query_opt(query, &[&source_key]).await?;
        Ok(row.map(|r| r.get::<_, i64>("last_scanned_block") as u64))
    }

    async fn advance_watermark(&self, source_key: &str, block_number: u64) -> anyhow::Result<()> {
        let checkpoint = ScanCheckpoint::new(source_key, block_number);
        let client = self.pool.get().await?;
        // GREATEST keeps the stored watermark monotone even under repeated or
        // out-of-order calls
        let query = r#"
            INSERT INTO indexer.scan_checkpoints (source_key, last_scanned_block, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (source_key) DO UPDATE SET
                last_scanned_block = GREATEST(
                    indexer.scan_checkpoints.last_scanned_block,
                    EXCLUDED.last_scanned_block
                ),
                updated_at = EXCLUDED.updated_at
        "#;

        client
            .execute(
                query,
                &[
                    &checkpoint.source_key,
                    &(checkpoint.last_scanned_block as i64),
                    &checkpoint.updated_at,
                ],
            )
            .await
            .map_err(|e| {
                error!("Failed to advance watermark for {source_key}: {e:?}");
                e
            })?;

        Ok(())
    }
}

#[async_trait]
impl TradeStore for PostgresClient {
    async fn find_approved_request(
        &self,
        token_id: u64,
    ) -> anyhow::Result<Option<TradeRequest>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT id, token_id, requester, status, approver, approved_at,
                   tx_hash, created_at, updated_at
            FROM indexer.trade_requests
            WHERE token_id = $1 AND status = 'approved'
            ORDER BY approved_at DESC NULLS LAST, created_at DESC
            LIMIT 1
        "#;

        let row = client.query_opt(query, &[&(token_id as i64)]).await?;
        row.map(|r| row_to_trade_request(&r)).transpose()
    }

    async fn mark_completed(&self, request_id: &str, tx_hash: &str) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        // The status guard makes re-delivery of the same transfer a no-op
        let query = r#"
            UPDATE indexer.trade_requests
            SET status = 'completed', tx_hash = $2, updated_at = now()
            WHERE id = $1 AND status = 'approved'
        "#;

        let updated = client.execute(query, &[&request_id, &tx_hash]).await?;
        Ok(updated > 0)
    }
}
