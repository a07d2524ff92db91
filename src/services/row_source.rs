//! Executes built queries against PostgreSQL and decodes rows dynamically
//!
//! The select list is only known at runtime (`SELECT *` on several tables),
//! so cells are decoded by their Postgres type name rather than into a
//! `FromRow` struct.

use async_trait::async_trait;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use shared::{CellValue, Result, Row};
use sqlx::{
    postgres::{PgPool, PgRow},
    Column, Row as SqlxRow, TypeInfo,
};
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::observability::record_db_query;
use crate::query::BuiltQuery;

#[async_trait]
pub trait RowSource: Send + Sync {
    async fn fetch_rows(&self, query: &BuiltQuery) -> Result<Vec<Row>>;
}

#[derive(Debug, Clone)]
pub struct PgRowSource {
    pool: PgPool,
}

impl PgRowSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RowSource for PgRowSource {
    async fn fetch_rows(&self, query: &BuiltQuery) -> Result<Vec<Row>> {
        let start = Instant::now();

        let mut statement = sqlx::query(&query.sql);
        for param in &query.params {
            statement = statement.bind(param.as_str());
        }

        let result = statement.fetch_all(&self.pool).await;
        let elapsed = start.elapsed();
        record_db_query("select", query.table, elapsed.as_secs_f64(), result.is_ok());

        match result {
            Ok(rows) => {
                debug!(
                    table = %query.table,
                    rows = rows.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Query executed"
                );
                Ok(rows.iter().map(decode_row).collect())
            }
            Err(e) => {
                error!(
                    table = %query.table,
                    sql = %query.sql,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Query failed: {}",
                    e
                );
                Err(e.into())
            }
        }
    }
}

fn decode_row(row: &PgRow) -> Row {
    let mut decoded = Row::with_capacity(row.columns().len());
    for column in row.columns() {
        let value = decode_cell(row, column.ordinal(), column.name(), column.type_info().name());
        decoded.insert(column.name().to_string(), value);
    }
    decoded
}

fn cell<T>(
    result: std::result::Result<Option<T>, sqlx::Error>,
    column: &str,
    wrap: impl FnOnce(T) -> CellValue,
) -> CellValue {
    match result {
        Ok(Some(value)) => wrap(value),
        Ok(None) => CellValue::Null,
        Err(e) => {
            warn!(column = %column, "Failed to decode column, using null: {}", e);
            CellValue::Null
        }
    }
}

fn decode_cell(row: &PgRow, index: usize, column: &str, type_name: &str) -> CellValue {
    match type_name {
        "BOOL" => cell(row.try_get::<Option<bool>, _>(index), column, CellValue::Bool),
        "INT2" => cell(row.try_get::<Option<i16>, _>(index), column, |v| {
            CellValue::Int(v.into())
        }),
        "INT4" => cell(row.try_get::<Option<i32>, _>(index), column, |v| {
            CellValue::Int(v.into())
        }),
        "INT8" => cell(row.try_get::<Option<i64>, _>(index), column, CellValue::Int),
        "FLOAT4" => cell(row.try_get::<Option<f32>, _>(index), column, |v| {
            CellValue::Float(v.into())
        }),
        "FLOAT8" => cell(row.try_get::<Option<f64>, _>(index), column, CellValue::Float),
        "NUMERIC" => match row.try_get::<Option<Decimal>, _>(index) {
            Ok(Some(value)) => decimal_cell(value),
            Ok(None) => CellValue::Null,
            // Decimal has no NaN; the normalizer turns this into null
            Err(_) => CellValue::Float(f64::NAN),
        },
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            cell(row.try_get::<Option<String>, _>(index), column, CellValue::Text)
        }
        "DATE" => cell(
            row.try_get::<Option<chrono::NaiveDate>, _>(index),
            column,
            CellValue::Date,
        ),
        "TIMESTAMP" => cell(
            row.try_get::<Option<chrono::NaiveDateTime>, _>(index),
            column,
            CellValue::Timestamp,
        ),
        "TIMESTAMPTZ" => cell(
            row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index),
            column,
            CellValue::TimestampTz,
        ),
        other => match row.try_get_unchecked::<Option<String>, _>(index) {
            Ok(Some(text)) => CellValue::Text(text),
            Ok(None) => CellValue::Null,
            Err(e) => {
                warn!(column = %column, pg_type = %other, "Unsupported column type, using null: {}", e);
                CellValue::Null
            }
        },
    }
}

/// Whole-number sums stay integers; everything else becomes a float.
fn decimal_cell(value: Decimal) -> CellValue {
    if value.fract().is_zero() {
        if let Some(int) = value.to_i64() {
            return CellValue::Int(int);
        }
    }
    value
        .to_f64()
        .map(CellValue::Float)
        .unwrap_or(CellValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_numeric_sums_decode_as_integers() {
        assert_eq!(decimal_cell(Decimal::from(1_234_567_i64)), CellValue::Int(1_234_567));
        assert_eq!(
            decimal_cell(Decimal::from_str("42.00").unwrap()),
            CellValue::Int(42)
        );
        assert_eq!(
            decimal_cell(Decimal::from_str("2.5").unwrap()),
            CellValue::Float(2.5)
        );
    }

    #[test]
    fn test_numeric_beyond_i64_falls_back_to_float() {
        let huge = Decimal::from_str("92233720368547758070").unwrap();
        assert!(matches!(decimal_cell(huge), CellValue::Float(v) if v > 9.0e18));
    }
}
