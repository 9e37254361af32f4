use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

use pulsetrack_core::analytics::EventLog;
use pulsetrack_core::event::TrackPayload;

use crate::{error::AppError, geo::extract_client_ip, state::AppState};

/// `POST /api/track`: validate, enrich and store one event, then queue it
/// for alert evaluation.
///
/// The response never waits on alerting; a full alert queue only costs the
/// evaluation of this event.
#[tracing::instrument(skip(state, headers, payload))]
pub async fn track(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<TrackPayload>,
) -> Result<impl IntoResponse, AppError> {
    let mut event = payload.into_event(Utc::now())?;

    if event.user_agent.is_none() {
        event.user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .filter(|ua| !ua.is_empty())
            .map(str::to_string);
    }
    let client_ip = extract_client_ip(&headers);
    event.geo = state.geo.attributes(client_ip.as_deref());

    state.db.insert_event(&event).await?;
    tracing::debug!(
        site_id = %event.site_id,
        event_type = %event.event_type,
        event_id = %event.id,
        "event stored"
    );

    state.enqueue_alert_job(event);

    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "ok" }))))
}
