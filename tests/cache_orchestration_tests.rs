use async_trait::async_trait;
use covid_data_ws::charts::LineChartRenderer;
use covid_data_ws::query::{BuiltQuery, QuerySpec};
use covid_data_ws::services::{DataService, RowSource};
use shared::{AppError, CacheStore, CellValue, MemoryCache, Result, Row};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Row source that counts executions and remembers the queries it saw.
struct CountingRows {
    rows: Vec<Row>,
    executed: AtomicUsize,
    seen: Mutex<Vec<BuiltQuery>>,
}

impl CountingRows {
    fn new(rows: Vec<Row>) -> Arc<Self> {
        Arc::new(Self {
            rows,
            executed: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn executions(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RowSource for CountingRows {
    async fn fetch_rows(&self, query: &BuiltQuery) -> Result<Vec<Row>> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(query.clone());
        Ok(self.rows.clone())
    }
}

/// Cache whose backend is unreachable: every read misses, every write fails.
struct UnreachableCache {
    writes: AtomicUsize,
}

#[async_trait]
impl CacheStore for UnreachableCache {
    async fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl_seconds: u64) -> bool {
        self.writes.fetch_add(1, Ordering::SeqCst);
        false
    }

    async fn health_check(&self) -> Result<()> {
        Err(AppError::service_unavailable("cache"))
    }

    fn backend(&self) -> &'static str {
        "unreachable"
    }
}

fn daily_rows() -> Vec<Row> {
    (1..=3)
        .map(|day| {
            let mut row = Row::new();
            row.insert(
                "date".to_string(),
                CellValue::Date(chrono::NaiveDate::from_ymd_opt(2021, 1, day).unwrap()),
            );
            row.insert("cases".to_string(), CellValue::Int(day as i64 * 10));
            row
        })
        .collect()
}

fn data_service(cache: Arc<dyn CacheStore>, rows: Arc<dyn RowSource>) -> DataService {
    DataService::new(cache, rows, Arc::new(LineChartRenderer::new()))
}

#[tokio::test]
async fn test_second_fetch_is_served_from_cache() {
    let cache = MemoryCache::new();
    let source = CountingRows::new(daily_rows());
    let service = data_service(Arc::new(cache.clone()), source.clone());

    let spec = QuerySpec::parse("coronavirus_2021", Some("cases"), Some("Italy")).unwrap();
    let query = spec.build().unwrap();
    let key = spec.rows_key();

    let first = service.fetch(&key, &query).await.unwrap();
    let second = service.fetch(&key, &query).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(source.executions(), 1);
    assert_eq!(first[0]["date"], CellValue::Text("2021-01-01".to_string()));
    assert_eq!(cache.len(), 1);

    let seen = source.seen.lock().unwrap();
    assert_eq!(seen[0].params, vec!["Italy".to_string()]);
    assert!(seen[0].sql.contains("GROUP BY date"));
}

#[tokio::test]
async fn test_empty_result_is_not_found_and_not_cached() {
    let cache = MemoryCache::new();
    let source = CountingRows::new(Vec::new());
    let service = data_service(Arc::new(cache.clone()), source.clone());

    let spec = QuerySpec::parse("world_population", None, Some("Atlantis")).unwrap();
    let query = spec.build().unwrap();
    let key = spec.rows_key();

    let err = service.fetch(&key, &query).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
    assert!(cache.is_empty());

    assert!(service.fetch(&key, &query).await.is_err());
    assert_eq!(source.executions(), 2);
}

#[tokio::test]
async fn test_different_keys_do_not_share_entries() {
    let cache = MemoryCache::new();
    let source = CountingRows::new(daily_rows());
    let service = data_service(Arc::new(cache.clone()), source.clone());

    for country in ["Italy", "Spain", "all"] {
        let spec = QuerySpec::parse("coronavirus_daily", None, Some(country)).unwrap();
        service.fetch(&spec.rows_key(), &spec.build().unwrap()).await.unwrap();
    }
    // "all" and no filter share one entry
    let unfiltered = QuerySpec::parse("coronavirus_daily", None, None).unwrap();
    service
        .fetch(&unfiltered.rows_key(), &unfiltered.build().unwrap())
        .await
        .unwrap();

    assert_eq!(source.executions(), 3);
    assert_eq!(cache.len(), 3);
}

#[tokio::test]
async fn test_unreachable_cache_degrades_to_direct_queries() {
    let cache = Arc::new(UnreachableCache {
        writes: AtomicUsize::new(0),
    });
    let source = CountingRows::new(daily_rows());
    let service = data_service(cache.clone(), source.clone());

    let spec = QuerySpec::parse("coronavirus_2020", None, None).unwrap();
    let query = spec.build().unwrap();

    for _ in 0..3 {
        let rows = service.fetch(&spec.rows_key(), &query).await.unwrap();
        assert_eq!(rows.len(), 3);
    }
    assert_eq!(source.executions(), 3);
    assert_eq!(cache.writes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_per_call_ttl_override() {
    let cache = MemoryCache::new();
    let source = CountingRows::new(daily_rows());
    let service = data_service(Arc::new(cache.clone()), source.clone());

    let spec = QuerySpec::parse("coronavirus_2022", Some("cases"), None).unwrap();
    let query = spec.build().unwrap();
    let key = spec.rows_key();

    // A zero TTL entry is already expired when read back
    service.fetch_with_ttl(&key, &query, 0).await.unwrap();
    service.fetch_with_ttl(&key, &query, 0).await.unwrap();
    assert_eq!(source.executions(), 2);

    service.fetch(&key, &query).await.unwrap();
    service.fetch(&key, &query).await.unwrap();
    assert_eq!(source.executions(), 3);
}

#[tokio::test]
async fn test_chart_and_rows_are_cached_separately() {
    let cache = MemoryCache::new();
    let source = CountingRows::new(daily_rows());
    let service = data_service(Arc::new(cache.clone()), source.clone());

    let spec = QuerySpec::parse("coronavirus_2023", Some("cases"), None).unwrap();
    let query = spec.build().unwrap();
    let chart = covid_data_ws::charts::ChartSpec {
        x_column: "date",
        y_column: "cases",
    };

    let png = service
        .fetch_chart(&spec.plot_key().unwrap(), &query, &chart)
        .await
        .unwrap();
    assert_eq!(&png[1..4], b"PNG");

    service.fetch(&spec.rows_key(), &query).await.unwrap();
    assert_eq!(source.executions(), 2);
    assert_eq!(cache.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fetches_on_one_key() {
    const CALLERS: usize = 16;

    let cache = MemoryCache::new();
    let source = CountingRows::new(daily_rows());
    let service = Arc::new(data_service(Arc::new(cache.clone()), source.clone()));

    let spec = QuerySpec::parse("coronavirus_daily", Some("cases"), Some("Chile")).unwrap();
    let query = spec.build().unwrap();
    let key = spec.rows_key();

    let calls = (0..CALLERS).map(|_| {
        let service = service.clone();
        let query = query.clone();
        let key = key.clone();
        tokio::spawn(async move { service.fetch(&key, &query).await })
    });
    let results = futures::future::join_all(calls).await;

    let rows: Vec<_> = results
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();
    assert!(rows.iter().all(|r| r == &rows[0]));
    assert_eq!(rows[0].len(), 3);

    let executions = source.executions();
    assert!((1..=CALLERS).contains(&executions), "executions = {}", executions);
    assert_eq!(cache.len(), 1);
}
