use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::monitoring::uptime_seconds;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DependencyStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub database: DependencyStatus,
    pub cache: DependencyStatus,
}

/// Create monitoring router with metrics and health endpoints
pub fn monitoring_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(crate::observability::metrics_handler))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

/// Basic health check endpoint
async fn health_check() -> impl IntoResponse {
    let health = serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime_seconds(),
    });

    (StatusCode::OK, Json(health))
}

/// Readiness probe. Only the database gates readiness; an unreachable cache
/// is reported as `degraded`.
async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match &state.database {
        Some(db) => probe(db.health_check()).await,
        None => DependencyStatus {
            status: "not_configured",
            response_time_ms: None,
            error: None,
        },
    };
    let mut cache = probe(state.data_service.cache().health_check()).await;
    if cache.status == "unhealthy" {
        cache.status = "degraded";
    }

    let ready = database.status != "unhealthy";
    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    info!(ready, cache = cache.status, "Readiness check completed");

    (
        status_code,
        Json(ReadinessResponse {
            status: if ready { "ready" } else { "not_ready" },
            database,
            cache,
        }),
    )
}

/// Liveness probe
async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, "Alive")
}

async fn probe<F>(check: F) -> DependencyStatus
where
    F: std::future::Future<Output = shared::Result<()>>,
{
    let start_time = Instant::now();
    match check.await {
        Ok(()) => DependencyStatus {
            status: "healthy",
            response_time_ms: Some(start_time.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => {
            error!("Dependency health check failed: {}", e);
            DependencyStatus {
                status: "unhealthy",
                response_time_ms: None,
                error: Some(e.to_string()),
            }
        }
    }
}
