use axum::{
    extract::{Query, State},
    Json,
};
use shared::{AppError, CfrReply};
use std::sync::Arc;

use super::CountryParams;
use crate::query::country_filter;
use crate::state::AppState;

/// GET /stats/cfr - round-trips to the stats worker; never cached
pub async fn get_cfr(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CountryParams>,
) -> Result<Json<CfrReply>, AppError> {
    let country = country_filter(params.country.as_deref());
    let reply = state.stats_client.request_cfr(country).await?;
    Ok(Json(reply))
}
