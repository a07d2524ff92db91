// ============================================================================
// PROMETHEUS METRICS
// ============================================================================
// Process-wide registry exposed at GET /metrics
// ============================================================================

use lazy_static::lazy_static;
use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec,
    register_int_gauge_vec, GaugeVec, HistogramVec, IntCounterVec, IntGaugeVec,
};

lazy_static! {
    // ========================================================================
    // HTTP REQUEST METRICS
    // ========================================================================

    /// Total HTTP requests by method, route and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "endpoint", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "endpoint"],
        vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    /// HTTP response size in bytes
    pub static ref HTTP_RESPONSE_SIZE_BYTES: HistogramVec = register_histogram_vec!(
        "http_response_size_bytes",
        "HTTP response size in bytes",
        &["method", "endpoint"],
        vec![100.0, 1000.0, 5000.0, 10000.0, 50000.0, 100000.0, 500000.0, 1000000.0]
    )
    .unwrap();

    // ========================================================================
    // DATABASE METRICS
    // ========================================================================

    pub static ref DB_QUERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "db_queries_total",
        "Total number of database queries",
        &["query_type", "table", "status"]
    )
    .unwrap();

    pub static ref DB_QUERY_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "db_query_duration_seconds",
        "Database query duration in seconds",
        &["query_type", "table"],
        vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]
    )
    .unwrap();

    // ========================================================================
    // CACHE METRICS
    // ========================================================================

    /// Cache hits
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_hits_total",
        "Total number of cache hits",
        &["cache_type", "cache_name"]
    )
    .unwrap();

    /// Cache misses
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_misses_total",
        "Total number of cache misses",
        &["cache_type", "cache_name"]
    )
    .unwrap();

    // ========================================================================
    // STATS WORKER METRICS
    // ========================================================================

    /// CFR round-trips to the stats worker by outcome
    pub static ref STATS_RPC_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "stats_rpc_requests_total",
        "Total CFR requests sent to the stats worker",
        &["outcome"]
    )
    .unwrap();

    /// Latest broadcast case-fatality ratio (percent)
    pub static ref COVID_CFR_RATIO: GaugeVec = register_gauge_vec!(
        "covid_cfr_ratio",
        "Latest case-fatality ratio in percent",
        &["country"]
    )
    .unwrap();

    pub static ref COVID_CASES_TOTAL: IntGaugeVec = register_int_gauge_vec!(
        "covid_cases_total",
        "Confirmed cases behind the latest CFR",
        &["country"]
    )
    .unwrap();

    pub static ref COVID_DEATHS_TOTAL: IntGaugeVec = register_int_gauge_vec!(
        "covid_deaths_total",
        "Deaths behind the latest CFR",
        &["country"]
    )
    .unwrap();
}

/// Records one HTTP request
pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64, response_size: usize) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, endpoint])
        .observe(duration_secs);

    HTTP_RESPONSE_SIZE_BYTES
        .with_label_values(&[method, endpoint])
        .observe(response_size as f64);
}

/// Records one database query
pub fn record_db_query(query_type: &str, table: &str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    DB_QUERIES_TOTAL
        .with_label_values(&[query_type, table, status])
        .inc();

    DB_QUERY_DURATION_SECONDS
        .with_label_values(&[query_type, table])
        .observe(duration_secs);
}

/// Records a cache hit or miss
pub fn record_cache_access(cache_type: &str, cache_name: &str, hit: bool) {
    if hit {
        CACHE_HITS_TOTAL
            .with_label_values(&[cache_type, cache_name])
            .inc();
    } else {
        CACHE_MISSES_TOTAL
            .with_label_values(&[cache_type, cache_name])
            .inc();
    }
}

pub fn record_stats_rpc(outcome: &str) {
    STATS_RPC_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Publishes the figures of a broadcast CFR
pub fn record_cfr(country: &str, cfr: Option<f64>, total_cases: u64, total_deaths: u64) {
    match cfr {
        Some(ratio) => COVID_CFR_RATIO.with_label_values(&[country]).set(ratio),
        None => {
            // No cases means no ratio
            let _ = COVID_CFR_RATIO.remove_label_values(&[country]);
        }
    }
    COVID_CASES_TOTAL
        .with_label_values(&[country])
        .set(i64::try_from(total_cases).unwrap_or(i64::MAX));
    COVID_DEATHS_TOTAL
        .with_label_values(&[country])
        .set(i64::try_from(total_deaths).unwrap_or(i64::MAX));
}
