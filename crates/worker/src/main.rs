//! Storefront background worker
//!
//! Polls custom domains that are waiting on tenant DNS changes and
//! provisions their ingress once DNS checks out.

mod domain_poller;

use std::sync::Arc;

use anyhow::Context;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use storefront_api::{telemetry, AppState, Config};

use crate::domain_poller::DomainPoller;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing("storefront_worker=info,storefront_api=info");

    let config = Config::from_env().context("Invalid configuration")?;
    let schedule = config.domain_poll_cron.clone();
    let state = AppState::from_config(config)?;
    let poller = Arc::new(DomainPoller::new(&state));

    let mut scheduler = JobScheduler::new()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create scheduler: {:?}", e))?;

    let job = Job::new_async(schedule.as_str(), move |_id, _scheduler| {
        let poller = poller.clone();
        Box::pin(async move {
            poller.poll_once().await;
        })
    })
    .map_err(|e| anyhow::anyhow!("Invalid DOMAIN_POLL_CRON {}: {:?}", schedule, e))?;

    scheduler
        .add(job)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to schedule domain poll: {:?}", e))?;
    scheduler
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start scheduler: {:?}", e))?;

    info!(schedule = %schedule, "Storefront worker started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down worker");
    scheduler
        .shutdown()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to stop scheduler: {:?}", e))?;
    Ok(())
}
