use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use pulsetrack_core::alerts::CreateAlertRuleRequest;
use pulsetrack_duckdb::alerts::DEFAULT_NOTIFICATION_LIMIT;

use crate::{error::AppError, routes::required_param, state::AppState};

#[derive(Debug, Deserialize)]
pub struct SiteQuery {
    pub site_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    pub site_id: Option<String>,
    pub limit: Option<i64>,
}

/// `POST /api/alerts/rules`
#[tracing::instrument(skip(state, req))]
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAlertRuleRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let rule = state.db.create_alert_rule(&req).await?;
    tracing::info!(rule_id = %rule.id, site_id = %rule.site_id, condition = rule.condition.as_str(), "alert rule created");
    Ok((StatusCode::CREATED, Json(json!({ "data": rule }))))
}

/// `GET /api/alerts/rules?site_id=`: active rules only.
#[tracing::instrument(skip(state))]
pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SiteQuery>,
) -> Result<impl IntoResponse, AppError> {
    let site_id = required_param(query.site_id, "site_id")?;
    let rules = state.db.list_active_alert_rules(&site_id).await?;
    Ok(Json(json!({ "data": rules })))
}

/// `DELETE /api/alerts/rules/{rule_id}`: soft delete.
#[tracing::instrument(skip(state))]
pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !state.db.deactivate_alert_rule(&rule_id).await? {
        return Err(AppError::NotFound(format!("Alert rule not found: {rule_id}")));
    }
    tracing::info!(rule_id = %rule_id, "alert rule deactivated");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/alerts/notifications?site_id=&limit=`: newest first.
#[tracing::instrument(skip(state))]
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NotificationsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let site_id = required_param(query.site_id, "site_id")?;
    let limit = query.limit.unwrap_or(DEFAULT_NOTIFICATION_LIMIT);
    let notifications = state.db.list_notifications(&site_id, limit).await?;
    Ok(Json(json!({ "data": notifications })))
}
