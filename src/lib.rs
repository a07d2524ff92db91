use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod cache_key;
pub mod cache_ttl;
pub mod charts;
pub mod monitoring;
pub mod observability;
pub mod query;
pub mod services;
pub mod state;
pub mod utils;

use api::create_api_router;
use monitoring::endpoints::monitoring_router;
use observability::metrics_middleware;
use state::AppState;

pub fn create_app_router(app_state: Arc<AppState>) -> Router {
    let cors = cors_layer(&app_state.cors_allowed_origins);

    Router::new()
        // Health, readiness and Prometheus /metrics
        .merge(monitoring_router())
        .merge(create_api_router())
        .with_state(app_state)
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(CompressionLayer::new().gzip(true).deflate(true))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}
