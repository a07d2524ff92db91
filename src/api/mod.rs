pub mod data;  // Tabular rows, cache-backed
pub mod plot;  // PNG charts, cache-backed
pub mod stats; // CFR via the stats worker

use axum::{routing::get, Router};
use serde::Deserialize;
use std::sync::Arc;

use crate::state::AppState;

/// Optional `?country=` filter shared by every data endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct CountryParams {
    pub country: Option<String>,
}

pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/data/:table", get(data::get_table_rows))
        .route("/data/:table/:column", get(data::get_column_rows))
        .route("/plot/:table/:column", get(plot::get_plot))
        .route("/stats/cfr", get(stats::get_cfr))
}
