//! Cache-or-compute access to row-sets and charts
//!
//! Lookup order per request: cache, then the row source. Cache failures are
//! already degraded to misses by the store, so the only errors surfaced here
//! come from the row source or from rendering. Concurrent misses for the same
//! key each compute and each write; the last write wins.

use shared::{AppError, CacheStore, Result, Row};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::cache_key::CacheKey;
use crate::cache_ttl::{self, TTL_DEFAULT};
use crate::charts::{ChartRenderer, ChartSpec};
use crate::observability::record_cache_access;
use crate::query::BuiltQuery;
use crate::services::row_source::RowSource;
use crate::utils::normalize_rows;

const ROWS_CACHE: &str = "rows";
const CHARTS_CACHE: &str = "charts";

pub struct DataService {
    cache: Arc<dyn CacheStore>,
    source: Arc<dyn RowSource>,
    renderer: Arc<dyn ChartRenderer>,
    rows_ttl: u64,
    charts_ttl: u64,
}

impl DataService {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        source: Arc<dyn RowSource>,
        renderer: Arc<dyn ChartRenderer>,
    ) -> Self {
        Self {
            cache,
            source,
            renderer,
            rows_ttl: TTL_DEFAULT,
            charts_ttl: TTL_DEFAULT,
        }
    }

    /// Applies the configured base TTL and any per-kind overrides.
    pub fn with_base_ttl(mut self, base_ttl: u64) -> Self {
        self.rows_ttl = cache_ttl::get_rows_ttl(base_ttl);
        self.charts_ttl = cache_ttl::get_charts_ttl(base_ttl);
        self
    }

    pub fn rows_ttl(&self) -> u64 {
        self.rows_ttl
    }

    pub fn charts_ttl(&self) -> u64 {
        self.charts_ttl
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub async fn fetch(&self, key: &CacheKey, query: &BuiltQuery) -> Result<Vec<Row>> {
        self.fetch_with_ttl(key, query, self.rows_ttl).await
    }

    /// Returns the cached row-set for `key`, or runs `query`, caches the
    /// normalized rows for `ttl_seconds` and returns them.
    pub async fn fetch_with_ttl(
        &self,
        key: &CacheKey,
        query: &BuiltQuery,
        ttl_seconds: u64,
    ) -> Result<Vec<Row>> {
        if let Some(bytes) = self.cache.get(key.as_str()).await {
            match serde_json::from_slice::<Vec<Row>>(&bytes) {
                Ok(rows) => {
                    record_cache_access(self.cache.backend(), ROWS_CACHE, true);
                    debug!(key = %key, rows = rows.len(), "Cache hit");
                    return Ok(rows);
                }
                Err(e) => {
                    warn!(key = %key, "Undecodable cache entry, recomputing: {}", e);
                }
            }
        }
        record_cache_access(self.cache.backend(), ROWS_CACHE, false);

        let rows = self.compute_rows(key, query).await?;

        match serde_json::to_vec(&rows) {
            Ok(bytes) => {
                if self.cache.set(key.as_str(), &bytes, ttl_seconds).await {
                    debug!(key = %key, ttl_seconds, "Cached row-set");
                }
            }
            Err(e) => warn!(key = %key, "Failed to serialize rows for cache: {}", e),
        }

        Ok(rows)
    }

    /// Same contract as [`fetch`](Self::fetch) with a PNG payload. Cached
    /// bytes are returned verbatim.
    pub async fn fetch_chart(
        &self,
        key: &CacheKey,
        query: &BuiltQuery,
        chart: &ChartSpec,
    ) -> Result<Vec<u8>> {
        if let Some(bytes) = self.cache.get(key.as_str()).await {
            record_cache_access(self.cache.backend(), CHARTS_CACHE, true);
            debug!(key = %key, bytes = bytes.len(), "Chart cache hit");
            return Ok(bytes);
        }
        record_cache_access(self.cache.backend(), CHARTS_CACHE, false);

        let rows = self.compute_rows(key, query).await?;
        let png = self
            .renderer
            .render(&rows, chart.x_column, chart.y_column)
            .map_err(|e| {
                error!(key = %key, table = %query.table, "Chart rendering failed: {}", e);
                e
            })?;

        if self.cache.set(key.as_str(), &png, self.charts_ttl).await {
            debug!(key = %key, ttl_seconds = self.charts_ttl, "Cached chart");
        }

        Ok(png)
    }

    async fn compute_rows(&self, key: &CacheKey, query: &BuiltQuery) -> Result<Vec<Row>> {
        let rows = self.source.fetch_rows(query).await.map_err(|e| {
            error!(
                key = %key,
                table = %query.table,
                sql = %query.sql,
                "Row source failed: {}",
                e
            );
            e
        })?;

        if rows.is_empty() {
            return Err(AppError::not_found(format!("No rows in table '{}'", query.table)));
        }

        Ok(normalize_rows(rows))
    }
}
