// ============================================================================
// HTTP METRICS MIDDLEWARE
// ============================================================================

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::observability::record_http_request;

/// Records count, latency and size of every HTTP request
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();

    // Route template keeps label cardinality bounded: /data/:table/:column
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16();
    let response_size = estimate_response_size(&response);

    record_http_request(&method, &endpoint, status, duration, response_size);

    response
}

/// Response size from Content-Length; streamed bodies count as 0
fn estimate_response_size(response: &Response) -> usize {
    response
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0)
}
