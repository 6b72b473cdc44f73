//! Cron scheduler for the periodic poll cycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{debug, error, info};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::service::OwnershipService;
use crate::worker::poller::PollOutcome;

/// Cron scheduler driving the incremental poll on a fixed cadence.
pub struct CronScheduler {
    service: Arc<OwnershipService>,
    settings: CronSettings,
}

#[derive(Debug, Clone)]
pub struct CronSettings {
    /// Interval between incremental poll cycles.
    pub poll_interval_secs: u64,
    /// When false, the schedule is suspended; explicit triggers still work.
    pub enabled: bool,
}

impl Default for CronSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            enabled: true,
        }
    }
}

impl CronScheduler {
    pub fn new(service: Arc<OwnershipService>, settings: CronSettings) -> Self {
        Self { service, settings }
    }

    /// Starts the scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        if !self.settings.enabled {
            info!("Poll schedule disabled by configuration; waiting for shutdown");
            cancellation_token.cancelled().await;
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;

        self.register_poll_job(&scheduler).await?;

        scheduler.start().await?;
        info!(
            "Cron scheduler started (poll every {}s)",
            self.settings.poll_interval_secs
        );

        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_poll_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let service = self.service.clone();
        let interval = self.settings.poll_interval_secs;

        let job = Job::new_repeated_async(
            Duration::from_secs(interval),
            move |_uuid, _lock| {
                let service = service.clone();
                Box::pin(async move {
                    match service.trigger_poll().await {
                        Ok(PollOutcome::AlreadyRunning) => {
                            debug!("Scheduled poll skipped: a cycle is already running");
                        },
                        Ok(_) => {},
                        Err(e) => {
                            error!("Scheduled poll cycle failed: {:#}", e);
                        },
                    }
                })
            },
        )?;

        scheduler.add(job).await?;
        info!("Registered ownership poll job (every {}s)", interval);
        Ok(())
    }
}
