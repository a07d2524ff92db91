//! PostgreSQL pool shared by the HTTP service and the stats worker

use crate::{config::DatabaseConfig, error::AppError, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct DatabaseService {
    pool: PgPool,
}

impl DatabaseService {
    /// Opens the pool and verifies the server answers before returning.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Opening database pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(config.max_lifetime_seconds))
            .test_before_acquire(true)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::configuration(format!("Failed to connect to database: {}", e)))?;

        let version: String = sqlx::query_scalar("SELECT version()")
            .fetch_one(&pool)
            .await
            .map_err(|e| AppError::configuration(format!("Database did not answer: {}", e)))?;
        info!(server = %version, "Database pool ready");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Waits for checked-out connections to be returned, then closes them.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}
