use anyhow::Result;
use covid_data_ws::{create_app_router, monitoring, services::start_cfr_listener, state::AppState};
use shared::Config;
use std::{net::SocketAddr, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

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

    info!("signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.app.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    monitoring::init_monitoring();

    let app_state = AppState::new(&config).await?;
    info!(environment = %config.app.environment, "Application state initialized");

    let listener_task = match start_cfr_listener(app_state.bus.clone()).await {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("CFR event listener unavailable: {}", e);
            None
        }
    };

    let database = app_state.database.clone();
    let app = create_app_router(Arc::new(app_state));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.app.port));
    info!("listening on {}", addr);
    let tcp = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(tcp, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = listener_task {
        handle.abort();
    }
    if let Some(database) = database {
        database.close().await;
    }

    Ok(())
}
