use std::sync::Arc;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use tenure::chain::LogSource;
use tenure::worker::{PollerConfig, ScanSettings};
use tenure::{
    CronScheduler, CronSettings, Database, OwnershipIndexer, OwnershipService, PollWorker,
    RpcLogSource, Settings, TradeReconciler,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap();

    // Load configuration
    let settings =
        Settings::new().context("Failed to load config.yaml. Please ensure it exists and is valid")?;

    let db = Database::new(&settings)
        .await
        .context("Failed to initialize database connection")?;

    let cancellation_token = CancellationToken::new();

    let source: Arc<dyn LogSource> = Arc::new(
        RpcLogSource::new(&settings.chain).context("Failed to create RPC log source")?,
    );

    let reconciler = Arc::new(TradeReconciler::new(db.postgres.clone()));
    let indexer = Arc::new(OwnershipIndexer::new(
        source.clone(),
        db.postgres.clone(),
        reconciler,
    ));

    let poller = Arc::new(PollWorker::new(
        source.clone(),
        indexer.clone(),
        db.postgres.clone(),
        PollerConfig::from_settings(&settings.chain, &settings.poller),
    ));

    let service = Arc::new(OwnershipService::new(
        source,
        db.postgres.clone(),
        indexer,
        poller,
        ScanSettings::from(&settings.chain),
        cancellation_token.child_token(),
    ));

    info!(
        "Watching contract {} from block {}",
        settings.chain.contract_address, settings.chain.deploy_block
    );

    // Spawn the cron scheduler driving the incremental poll
    let cron_scheduler = CronScheduler::new(
        service.clone(),
        CronSettings {
            poll_interval_secs: settings.poller.poll_interval_secs,
            enabled: settings.poller.enabled,
        },
    );

    let cron_token = cancellation_token.child_token();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron_scheduler.run(cron_token).await {
            error!("Cron scheduler failed: {:#}", e);
        }
    });

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Indexer running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    // Cancel all running tasks; an in-flight poll commits its current chunk
    // before honoring the cancellation
    info!("Finishing all tasks...");
    cancellation_token.cancel();

    info!("Waiting for cron scheduler to stop...");
    let _ = cron_handle.await;

    info!("Shutdown complete");
    Ok(())
}
