//! Parameterized query construction
//!
//! Identifiers in the SQL text come only from [`DataTable`] and
//! [`AggregateColumn`]. The country filter is always bound as `$1`.

use shared::{AppError, Result};

use super::tables::{AggregateColumn, DataTable};
use crate::cache_key::{self, CacheKey};

/// Row cap applied to every query.
pub const ROW_LIMIT: u32 = 100;

/// SQL text with positional placeholders plus the values bound to them, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<String>,
    /// Table label for logs and metrics.
    pub table: &'static str,
}

/// Collapses the "no filter" spellings: absent, empty, or `all` in any ASCII case.
pub fn country_filter(country: Option<&str>) -> Option<String> {
    match country {
        None => None,
        Some(c) if c.is_empty() || c.eq_ignore_ascii_case(cache_key::ALL_COUNTRIES) => None,
        Some(c) => Some(c.to_string()),
    }
}

pub struct QueryBuilder;

impl QueryBuilder {
    pub fn build(
        table: DataTable,
        column: Option<AggregateColumn>,
        country: Option<&str>,
    ) -> Result<BuiltQuery> {
        let family = table.family();

        let mut sql = match column {
            None => format!("SELECT * FROM public.{}", table),
            Some(column) => {
                if !family.has_column(column) {
                    return Err(AppError::validation(format!(
                        "Column '{}' is not available on table '{}'",
                        column, table
                    )));
                }
                let time = family.time_column();
                if family.sums_per_time_bucket() {
                    format!(
                        "SELECT {time}, SUM({col}) AS {col} FROM public.{table}",
                        time = time,
                        col = column,
                        table = table
                    )
                } else {
                    format!("SELECT {}, {} FROM public.{}", time, column, table)
                }
            }
        };

        let mut params = Vec::new();
        if let Some(country) = country {
            sql.push_str(&format!(" WHERE {} ILIKE $1", family.country_column()));
            params.push(country.to_string());
        }

        if column.is_some() {
            let time = family.time_column();
            if family.sums_per_time_bucket() {
                sql.push_str(&format!(" GROUP BY {}", time));
            }
            sql.push_str(&format!(" ORDER BY {} ASC", time));
        }

        sql.push_str(&format!(" LIMIT {}", ROW_LIMIT));

        Ok(BuiltQuery {
            sql,
            params,
            table: table.as_str(),
        })
    }
}

/// A validated request for data from one allow-listed table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub table: DataTable,
    pub column: Option<AggregateColumn>,
    pub country: Option<String>,
}

impl QuerySpec {
    /// Validates raw path and query-string values against the allow-lists.
    pub fn parse(table: &str, column: Option<&str>, country: Option<&str>) -> Result<Self> {
        let table: DataTable = table.parse()?;
        let column = column.map(str::parse::<AggregateColumn>).transpose()?;

        if let Some(column) = column {
            if !table.family().has_column(column) {
                return Err(AppError::validation(format!(
                    "Column '{}' is not available on table '{}'",
                    column, table
                )));
            }
        }

        if country.is_some_and(|c| c.chars().any(char::is_control)) {
            return Err(AppError::validation("Country filter contains control characters"));
        }

        Ok(Self {
            table,
            column,
            country: country_filter(country),
        })
    }

    pub fn build(&self) -> Result<BuiltQuery> {
        QueryBuilder::build(self.table, self.column, self.country.as_deref())
    }

    pub fn rows_key(&self) -> CacheKey {
        cache_key::query_rows(
            self.table.as_str(),
            self.column.map(AggregateColumn::as_str),
            self.country.as_deref(),
        )
    }

    /// Chart key; `None` without an aggregate column since there is nothing to plot.
    pub fn plot_key(&self) -> Option<CacheKey> {
        self.column.map(|column| {
            cache_key::query_plot(self.table.as_str(), column.as_str(), self.country.as_deref())
        })
    }
}
