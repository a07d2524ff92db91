//! Stats worker
//!
//! Serves `stats.calculate.cfr` over the message bus: sums confirmed cases
//! and deaths from the daily time series, replies with the case-fatality
//! ratio and broadcasts it on `stats.events.cfr`.

mod store;
mod worker;

use anyhow::Result;
use shared::{Config, DatabaseService, MessageBus, RedisBus, SUBJECT_CALCULATE_CFR};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::store::PgCaseTotals;
use crate::worker::CfrWorker;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, stopping stats worker");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.app.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let database = DatabaseService::new(&config.database).await?;
    let bus: Arc<dyn MessageBus> = Arc::new(RedisBus::new(&config.messaging.url).await?);

    // Held for the whole process lifetime
    let requests = bus.subscribe(SUBJECT_CALCULATE_CFR).await?;
    info!(subject = SUBJECT_CALCULATE_CFR, "Stats worker subscribed");

    let totals = Arc::new(PgCaseTotals::new(database.pool().clone()));
    let worker = Arc::new(CfrWorker::new(bus, totals));
    worker.run(requests, shutdown_signal()).await;

    database.close().await;
    info!("Stats worker stopped");

    Ok(())
}
