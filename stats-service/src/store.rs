//! Case and death totals from the daily time series

use async_trait::async_trait;
use shared::Result;
use sqlx::PgPool;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Confirmed,
    Death,
}

impl RecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Confirmed => "confirmed",
            RecordType::Death => "death",
        }
    }
}

#[async_trait]
pub trait CaseTotals: Send + Sync {
    /// Sum of `cases` for one record type, optionally for one country. No rows sum to 0.
    async fn total(&self, record_type: RecordType, country: Option<&str>) -> Result<u64>;
}

#[derive(Debug, Clone)]
pub struct PgCaseTotals {
    pool: PgPool,
}

impl PgCaseTotals {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const TOTAL_SQL: &str =
    "SELECT SUM(cases)::BIGINT AS total FROM public.coronavirus_daily WHERE type ILIKE $1";
const TOTAL_BY_COUNTRY_SQL: &str = "SELECT SUM(cases)::BIGINT AS total FROM public.coronavirus_daily \
     WHERE type ILIKE $1 AND country ILIKE $2";

#[async_trait]
impl CaseTotals for PgCaseTotals {
    async fn total(&self, record_type: RecordType, country: Option<&str>) -> Result<u64> {
        let start = Instant::now();

        let total: Option<i64> = match country {
            Some(country) => {
                sqlx::query_scalar(TOTAL_BY_COUNTRY_SQL)
                    .bind(record_type.as_str())
                    .bind(country)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar(TOTAL_SQL)
                    .bind(record_type.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
        };

        debug!(
            record_type = record_type.as_str(),
            country = ?country,
            total = ?total,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Summed cases"
        );

        Ok(clamp_total(total, record_type))
    }
}

/// NULL sums are 0; a negative sum (correction rows) is reported as 0.
fn clamp_total(total: Option<i64>, record_type: RecordType) -> u64 {
    let total = total.unwrap_or(0);
    u64::try_from(total).unwrap_or_else(|_| {
        warn!(record_type = record_type.as_str(), total, "Negative case sum, reporting 0");
        0
    })
}
