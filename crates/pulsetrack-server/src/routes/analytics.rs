use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

use pulsetrack_core::aggregate::{build_realtime, build_summary};

use crate::{error::AppError, routes::DateRangeQuery, state::AppState};

/// `GET /api/analytics/{site_id}`: summary over `[start_date, end_date)`,
/// defaulting to the last seven days.
#[tracing::instrument(skip(state))]
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<String>,
    Query(query): Query<DateRangeQuery>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let window = query.window(now)?;
    let summary = build_summary(state.db.as_ref(), &site_id, window, now).await?;
    Ok(Json(json!({ "data": summary })))
}

/// `GET /api/analytics/{site_id}/realtime`
#[tracing::instrument(skip(state))]
pub async fn get_realtime(
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let realtime = build_realtime(state.db.as_ref(), &site_id, Utc::now()).await?;
    Ok(Json(json!({ "data": realtime })))
}
