use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use shared::AppError;
use std::sync::Arc;

use super::CountryParams;
use crate::charts::ChartSpec;
use crate::query::QuerySpec;
use crate::state::AppState;

/// GET /plot/:table/:column - line chart of the column over the table's time axis
pub async fn get_plot(
    State(state): State<Arc<AppState>>,
    Path((table, column)): Path<(String, String)>,
    Query(params): Query<CountryParams>,
) -> Result<Response, AppError> {
    let spec = QuerySpec::parse(&table, Some(&column), params.country.as_deref())?;
    let column = spec
        .column
        .ok_or_else(|| AppError::validation("A column is required to plot"))?;
    let key = spec
        .plot_key()
        .ok_or_else(|| AppError::validation("A column is required to plot"))?;

    let chart = ChartSpec {
        x_column: spec.table.family().time_column(),
        y_column: column.as_str(),
    };
    let query = spec.build()?;

    let png = state.data_service.fetch_chart(&key, &query, &chart).await?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}
