use axum::{
    extract::{Path, Query, State},
    Json,
};
use shared::{AppError, Row};
use std::sync::Arc;
use tracing::info;

use super::CountryParams;
use crate::query::QuerySpec;
use crate::state::AppState;

/// GET /data/:table
pub async fn get_table_rows(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(params): Query<CountryParams>,
) -> Result<Json<Vec<Row>>, AppError> {
    let spec = QuerySpec::parse(&table, None, params.country.as_deref())?;
    serve_rows(&state, &spec).await
}

/// GET /data/:table/:column
pub async fn get_column_rows(
    State(state): State<Arc<AppState>>,
    Path((table, column)): Path<(String, String)>,
    Query(params): Query<CountryParams>,
) -> Result<Json<Vec<Row>>, AppError> {
    let spec = QuerySpec::parse(&table, Some(&column), params.country.as_deref())?;
    serve_rows(&state, &spec).await
}

async fn serve_rows(state: &AppState, spec: &QuerySpec) -> Result<Json<Vec<Row>>, AppError> {
    let query = spec.build()?;
    let key = spec.rows_key();

    let rows = state.data_service.fetch(&key, &query).await?;
    info!(
        table = %spec.table,
        column = ?spec.column.map(|c| c.as_str()),
        country = ?spec.country,
        rows = rows.len(),
        "Served rows"
    );

    Ok(Json(rows))
}
