use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use covid_data_ws::{
    create_app_router,
    query::BuiltQuery,
    services::RowSource,
    state::AppState,
};
use futures::StreamExt;
use shared::{
    AppError, CacheStore, CellValue, CfrReply, MemoryBus, MemoryCache, MessageBus, Result, Row,
    SUBJECT_CALCULATE_CFR,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

struct StubRows {
    rows: Vec<Row>,
    seen: Mutex<Vec<BuiltQuery>>,
}

#[async_trait]
impl RowSource for StubRows {
    async fn fetch_rows(&self, query: &BuiltQuery) -> Result<Vec<Row>> {
        self.seen.lock().unwrap().push(query.clone());
        Ok(self.rows.clone())
    }
}

fn stub_rows(rows: Vec<Row>) -> Arc<StubRows> {
    Arc::new(StubRows {
        rows,
        seen: Mutex::new(Vec::new()),
    })
}

fn case_rows() -> Vec<Row> {
    [(1, 12), (2, 30), (3, 18)]
        .into_iter()
        .map(|(day, cases)| {
            let mut row = Row::new();
            row.insert(
                "date".to_string(),
                CellValue::Date(chrono::NaiveDate::from_ymd_opt(2021, 2, day).unwrap()),
            );
            row.insert("cases".to_string(), CellValue::Int(cases));
            row
        })
        .collect()
}

/// Cache whose backend never answers.
struct DownCache;

#[async_trait]
impl CacheStore for DownCache {
    async fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl_seconds: u64) -> bool {
        false
    }

    async fn health_check(&self) -> Result<()> {
        Err(AppError::service_unavailable("redis cache"))
    }

    fn backend(&self) -> &'static str {
        "down"
    }
}

fn app(rows: Arc<StubRows>, bus: &MemoryBus) -> Router {
    app_with_cache(Arc::new(MemoryCache::new()), rows, bus)
}

fn app_with_cache(cache: Arc<dyn CacheStore>, rows: Arc<StubRows>, bus: &MemoryBus) -> Router {
    let state = AppState::from_parts(
        cache,
        rows,
        Arc::new(bus.clone()),
        Duration::from_millis(200),
    );
    create_app_router(Arc::new(state))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, content_type, body)
}

fn json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_data_endpoint_returns_normalized_rows() {
    let rows = stub_rows(case_rows());
    let app = app(rows.clone(), &MemoryBus::new());

    let (status, content_type, body) = get(app, "/data/coronavirus_daily?country=Italy").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some(mime::APPLICATION_JSON.as_ref()));
    assert_eq!(
        json(&body),
        serde_json::json!([
            {"date": "2021-02-01", "cases": 12},
            {"date": "2021-02-02", "cases": 30},
            {"date": "2021-02-03", "cases": 18}
        ])
    );

    let seen = rows.seen.lock().unwrap();
    assert_eq!(
        seen[0].sql,
        "SELECT * FROM public.coronavirus_daily WHERE country ILIKE $1 LIMIT 100"
    );
    assert_eq!(seen[0].params, vec!["Italy".to_string()]);
}

#[tokio::test]
async fn test_column_endpoint_builds_aggregate_query() {
    let rows = stub_rows(case_rows());
    let app = app(rows.clone(), &MemoryBus::new());

    let (status, _, _) = get(app, "/data/coronavirus_2021/cases").await;
    assert_eq!(status, StatusCode::OK);

    let seen = rows.seen.lock().unwrap();
    assert_eq!(
        seen[0].sql,
        "SELECT date, SUM(cases) AS cases FROM public.coronavirus_2021 GROUP BY date ORDER BY date ASC LIMIT 100"
    );
    assert!(seen[0].params.is_empty());
}

#[tokio::test]
async fn test_repeated_request_hits_cache() {
    let rows = stub_rows(case_rows());
    let app = app(rows.clone(), &MemoryBus::new());

    let (first_status, _, first) = get(app.clone(), "/data/covid19_vaccine?country=Chile").await;
    let (second_status, _, second) = get(app, "/data/covid19_vaccine?country=Chile").await;

    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first, second);
    assert_eq!(rows.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_table_and_foreign_column_are_rejected() {
    let rows = stub_rows(case_rows());
    let bus = MemoryBus::new();

    let (status, _, body) = get(app(rows.clone(), &bus), "/data/pg_shadow").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "VALIDATION_ERROR");

    let (status, _, _) = get(app(rows.clone(), &bus), "/data/covid19_vaccine/cases").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = get(app(rows.clone(), &bus), "/plot/world_population/doses_admin").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(rows.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_result_is_not_found() {
    let app = app(stub_rows(Vec::new()), &MemoryBus::new());

    let (status, _, body) = get(app, "/data/world_population?country=Atlantis").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_plot_endpoint_returns_png() {
    let app = app(stub_rows(case_rows()), &MemoryBus::new());

    let (status, content_type, body) = get(app, "/plot/coronavirus_2022/cases?country=Peru").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some(mime::IMAGE_PNG.as_ref()));
    assert_eq!(&body[..8], &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
}

#[tokio::test]
async fn test_cfr_without_worker_is_service_unavailable() {
    let app = app(stub_rows(Vec::new()), &MemoryBus::new());

    let (status, _, body) = get(app, "/stats/cfr?country=Italy").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(&body)["error"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_cfr_with_silent_worker_is_gateway_timeout() {
    let bus = MemoryBus::new();
    let _silent = bus.subscribe(SUBJECT_CALCULATE_CFR).await.unwrap();
    let app = app(stub_rows(Vec::new()), &bus);

    let (status, _, _) = get(app, "/stats/cfr").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_cfr_round_trip() {
    let bus = MemoryBus::new();
    let mut requests = bus.subscribe(SUBJECT_CALCULATE_CFR).await.unwrap();
    let responder = bus.clone();
    tokio::spawn(async move {
        while let Some(message) = requests.next().await {
            let reply = CfrReply::new(Some("Peru".to_string()), 400, 10);
            responder
                .respond(&message, serde_json::to_vec(&reply).unwrap())
                .await
                .unwrap();
        }
    });
    let app = app(stub_rows(Vec::new()), &bus);

    let (status, _, body) = get(app, "/stats/cfr?country=Peru").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json(&body),
        serde_json::json!({"country": "Peru", "total_cases": 400, "total_deaths": 10, "cfr": 2.5})
    );
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = app(stub_rows(Vec::new()), &MemoryBus::new());

    let (status, _, body) = get(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "healthy");

    let (status, _, body) = get(app.clone(), "/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"Alive".to_vec());

    let (status, _, body) = get(app.clone(), "/ready").await;
    assert_eq!(status, StatusCode::OK);
    let ready = json(&body);
    assert_eq!(ready["status"], "ready");
    assert_eq!(ready["database"]["status"], "not_configured");
    assert_eq!(ready["cache"]["status"], "healthy");

    let (status, _, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("http_requests_total"));
}

#[tokio::test]
async fn test_unreachable_cache_keeps_service_ready() {
    let rows = stub_rows(case_rows());
    let app = app_with_cache(Arc::new(DownCache), rows.clone(), &MemoryBus::new());

    let (status, _, body) = get(app.clone(), "/ready").await;
    assert_eq!(status, StatusCode::OK);
    let ready = json(&body);
    assert_eq!(ready["status"], "ready");
    assert_eq!(ready["cache"]["status"], "degraded");

    let (status, _, _) = get(app.clone(), "/data/coronavirus_daily").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = get(app, "/data/coronavirus_daily").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows.seen.lock().unwrap().len(), 2);
}
