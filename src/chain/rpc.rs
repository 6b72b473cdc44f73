//! JSON-RPC log source backed by an alloy HTTP provider.

use std::time::Duration;

use alloy::{
    eips::BlockNumberOrTag,
    primitives::{Address, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::Filter,
    sol_types::SolEvent,
    transports::{RpcError, TransportErrorKind},
};
use anyhow::Context;
use async_trait::async_trait;
use log::warn;
use moka::future::Cache;
use url::Url;

use crate::{
    abis::transfer::Transfer,
    chain::source::{LogSource, SourceError, TransferEvent},
    config::ChainSettings,
    utils::hex_encode,
};

/// Capacity of the block-timestamp cache. Timestamps are immutable once a
/// block is final, so entries never need invalidation, only eviction.
const TIMESTAMP_CACHE_CAPACITY: u64 = 100_000;

/// Timeout for individual RPC calls.
const RPC_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Pull-based log source over a JSON-RPC endpoint.
///
/// Watches a single contract for `Transfer(address,address,uint256)` events.
/// Block timestamps are cached: one poll chunk touches the same handful of
/// blocks once per token group.
pub struct RpcLogSource {
    provider: DynProvider,
    contract: Address,
    timestamps: Cache<u64, i64>,
}

impl RpcLogSource {
    pub fn new(settings: &ChainSettings) -> anyhow::Result<Self> {
        let url = Url::parse(&settings.rpc_url).context("Invalid RPC URL")?;
        let contract = settings
            .contract_address
            .parse()
            .context("Invalid contract address")?;

        let client = ProviderBuilder::new().connect_http(url);
        let provider = DynProvider::new(client);

        let timestamps = Cache::builder()
            .max_capacity(TIMESTAMP_CACHE_CAPACITY)
            .build();

        Ok(Self {
            provider,
            contract,
            timestamps,
        })
    }
}

#[async_trait]
impl LogSource for RpcLogSource {
    async fn current_height(&self) -> Result<u64, SourceError> {
        tokio::time::timeout(RPC_CALL_TIMEOUT, self.provider.get_block_number())
            .await
            .map_err(|_| SourceError::Unavailable("get_block_number timed out".to_string()))?
            .map_err(classify)
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<i64, SourceError> {
        if let Some(ts) = self.timestamps.get(&block_number).await {
            return Ok(ts);
        }

        let block = tokio::time::timeout(
            RPC_CALL_TIMEOUT,
            self.provider
                .get_block_by_number(BlockNumberOrTag::Number(block_number)),
        )
        .await
        .map_err(|_| SourceError::Unavailable("get_block_by_number timed out".to_string()))?
        .map_err(classify)?
        .ok_or(SourceError::BlockNotFound(block_number))?;

        let ts = block.header.timestamp as i64;
        self.timestamps.insert(block_number, ts).await;
        Ok(ts)
    }

    async fn fetch_transfers(
        &self,
        token_id: Option<u64>,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferEvent>, SourceError> {
        let mut filter = Filter::new()
            .address(self.contract)
            .event_signature(Transfer::SIGNATURE_HASH)
            .from_block(from_block)
            .to_block(to_block);

        if let Some(id) = token_id {
            // tokenId is the third indexed parameter of the Transfer event
            filter = filter.topic3(U256::from(id));
        }

        let logs = tokio::time::timeout(RPC_CALL_TIMEOUT, self.provider.get_logs(&filter))
            .await
            .map_err(|_| SourceError::Unavailable("get_logs timed out".to_string()))?
            .map_err(classify)?;

        let mut events = Vec::with_capacity(logs.len());

        for log in logs {
            let decoded = match Transfer::decode_log_data(&log.inner.data) {
                Ok(decoded) => decoded,
                Err(e) => {
                    // Malformed logs are isolated: skip the one event, keep the chunk
                    warn!(
                        "Skipping undecodable transfer log at block {:?} index {:?}: {e}",
                        log.block_number, log.log_index
                    );
                    continue;
                },
            };

            let (Some(block_number), Some(log_index), Some(tx_hash)) =
                (log.block_number, log.log_index, log.transaction_hash)
            else {
                warn!("Skipping transfer log without position metadata (pending block?)");
                continue;
            };

            events.push(TransferEvent {
                from_address: hex_encode(decoded.from.as_slice()),
                to_address: hex_encode(decoded.to.as_slice()),
                token_id: decoded.tokenId.to::<u64>(),
                block_number,
                log_index,
                tx_hash: hex_encode(tx_hash.as_slice()),
            });
        }

        Ok(events)
    }
}

/// Map transport-level errors onto the source taxonomy.
fn classify(err: RpcError<TransportErrorKind>) -> SourceError {
    match &err {
        RpcError::ErrorResp(payload) => {
            let message = payload.to_string();
            let lower = message.to_lowercase();
            if payload.code == 429
                || lower.contains("rate limit")
                || lower.contains("too many requests")
            {
                SourceError::RateLimited(message)
            } else if lower.contains("block range")
                || lower.contains("range too large")
                || lower.contains("query returned more than")
            {
                SourceError::RangeTooLarge(message)
            } else {
                SourceError::Rpc(message)
            }
        },
        RpcError::Transport(_) => SourceError::Unavailable(err.to_string()),
        _ => SourceError::Rpc(err.to_string()),
    }
}
