use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use pulsetrack_core::analytics::EventLog;
use pulsetrack_core::spatial::{click_heatmap, scroll_map};

use crate::{
    error::AppError,
    routes::{required_param, DateRangeQuery},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ClickHeatmapQuery {
    pub site_id: Option<String>,
    pub page: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScrollmapQuery {
    pub page: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// `GET /api/analytics/{site_id}/heatmap/pages`: pages with recorded clicks.
#[tracing::instrument(skip(state))]
pub async fn click_pages(
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let pages = state.db.distinct_click_pages(&site_id).await?;
    Ok(Json(json!({ "data": pages })))
}

/// `GET /api/heatmap/clicks?site_id&page&start_date&end_date`
#[tracing::instrument(skip(state))]
pub async fn clicks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClickHeatmapQuery>,
) -> Result<impl IntoResponse, AppError> {
    let site_id = required_param(query.site_id, "site_id")?;
    let page = required_param(query.page, "page")?;
    let window = DateRangeQuery {
        start_date: query.start_date,
        end_date: query.end_date,
    }
    .window(Utc::now())?;

    let points = click_heatmap(state.db.as_ref(), &site_id, &page, window).await?;
    Ok(Json(json!({ "data": points })))
}

/// `GET /api/analytics/{site_id}/scrollmap?page&start_date&end_date`
#[tracing::instrument(skip(state))]
pub async fn scrollmap(
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<String>,
    Query(query): Query<ScrollmapQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = required_param(query.page, "page")?;
    let window = DateRangeQuery {
        start_date: query.start_date,
        end_date: query.end_date,
    }
    .window(Utc::now())?;

    let buckets = scroll_map(state.db.as_ref(), &site_id, &page, window).await?;
    Ok(Json(json!({ "data": buckets })))
}
