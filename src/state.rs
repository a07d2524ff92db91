use shared::{
    config::CacheBackend, CacheStore, Config, DatabaseService, MemoryCache, MessageBus,
    RedisBus, RedisCache,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::charts::LineChartRenderer;
use crate::services::{DataService, PgRowSource, RowSource, StatsClient};

const MEMORY_CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state.
/// Every handle is built once at startup and injected here.
#[derive(Clone)]
pub struct AppState {
    pub data_service: Arc<DataService>,
    pub stats_client: StatsClient,
    pub bus: Arc<dyn MessageBus>,
    /// Absent when collaborators are wired in-process (tests).
    pub database: Option<DatabaseService>,
    pub cors_allowed_origins: Vec<String>,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let database = DatabaseService::new(&config.database).await?;

        let cache: Arc<dyn CacheStore> = match config.cache.backend {
            CacheBackend::Redis => Arc::new(RedisCache::new(&config.redis).await?),
            CacheBackend::Memory => {
                let cache = MemoryCache::new();
                spawn_memory_cache_purge(cache.clone());
                info!("Using in-process cache backend");
                Arc::new(cache)
            }
        };

        let bus: Arc<dyn MessageBus> = Arc::new(RedisBus::new(&config.messaging.url).await?);
        let rows: Arc<dyn RowSource> = Arc::new(PgRowSource::new(database.pool().clone()));

        let data_service = DataService::new(cache, rows, Arc::new(LineChartRenderer::new()))
            .with_base_ttl(config.cache.default_ttl_seconds);
        info!(
            rows_ttl = data_service.rows_ttl(),
            charts_ttl = data_service.charts_ttl(),
            "Data service initialized"
        );

        let stats_client = StatsClient::new(
            bus.clone(),
            Duration::from_millis(config.messaging.request_timeout_ms),
        );

        Ok(AppState {
            data_service: Arc::new(data_service),
            stats_client,
            bus,
            database: Some(database),
            cors_allowed_origins: config.app.cors_allowed_origins.clone(),
        })
    }

    /// Wires the state from ready-made collaborators, without a database pool.
    pub fn from_parts(
        cache: Arc<dyn CacheStore>,
        rows: Arc<dyn RowSource>,
        bus: Arc<dyn MessageBus>,
        request_timeout: Duration,
    ) -> Self {
        let data_service = DataService::new(cache, rows, Arc::new(LineChartRenderer::new()));
        AppState {
            data_service: Arc::new(data_service),
            stats_client: StatsClient::new(bus.clone(), request_timeout),
            bus,
            database: None,
            cors_allowed_origins: vec!["http://localhost:8080".to_string()],
        }
    }
}

fn spawn_memory_cache_purge(cache: MemoryCache) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MEMORY_CACHE_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let removed = cache.purge_expired();
            debug!(removed, remaining = cache.len(), "Memory cache sweep");
        }
    });
}
