use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use pulsetrack_core::analytics::EventLog;
use pulsetrack_core::config::Config;
use pulsetrack_core::event::{EventType, MetadataValue};
use pulsetrack_core::window::TimeWindow;
use pulsetrack_duckdb::DuckDbBackend;
use pulsetrack_server::app::build_app;
use pulsetrack_server::state::AppState;

fn test_config() -> Config {
    Config {
        port: 0,
        data_dir: "/tmp/pulsetrack-test".to_string(),
        geoip_path: "/nonexistent/GeoLite2-City.mmdb".to_string(),
        cors_origins: vec![],
        duckdb_memory_limit: "1GB".to_string(),
        alert_dedup: true,
        alert_queue_size: 16,
        smtp: None,
    }
}

fn setup() -> (Arc<AppState>, axum::Router) {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let state = Arc::new(AppState::new(db, test_config()));
    let app = build_app(Arc::clone(&state));
    (state, app)
}

fn track_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/track")
        .header("content-type", "application/json")
        .header("user-agent", "Mozilla/5.0 (Linux; Android 14) Mobile")
        .header("x-forwarded-for", "203.0.113.50, 10.0.0.1")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

async fn json_body(response: axum::http::Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}

fn recent_window() -> TimeWindow {
    let now = Utc::now();
    TimeWindow::new(now - Duration::minutes(5), now + Duration::minutes(5)).expect("window")
}

#[tokio::test]
async fn test_track_stores_enriched_event() {
    let (state, app) = setup();
    let response = app
        .oneshot(track_request(json!({
            "site_id": "site_1",
            "event_type": "click",
            "session_id": "sess-1",
            "user_id": "user-1",
            "url": "/pricing",
            "metadata": {
                "click_x": 120,
                "click_y": "48",
                "element": {"tag": "button"}
            }
        })))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(response).await["status"], "ok");

    let events = state
        .db
        .events_in_window("site_1", &recent_window())
        .await
        .expect("events");
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.event_type, EventType::Click);
    assert_eq!(event.metadata_f64("click_x"), Some(120.0));
    assert_eq!(event.metadata_f64("click_y"), Some(48.0));
    assert_eq!(
        event.metadata.get("element"),
        Some(&MetadataValue::Text("{\"tag\":\"button\"}".to_string()))
    );
    assert_eq!(
        event.user_agent.as_deref(),
        Some("Mozilla/5.0 (Linux; Android 14) Mobile")
    );
    assert_eq!(event.geo.ip_address.as_deref(), Some("203.0.113.50"));
    assert_eq!(event.geo.ip_country, None);
}

#[tokio::test]
async fn test_payload_user_agent_wins_over_header() {
    let (state, app) = setup();
    let response = app
        .oneshot(track_request(json!({
            "site_id": "site_1",
            "event_type": "pageview",
            "user_agent": "Tracker/1.0 (iPad)"
        })))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let events = state
        .db
        .events_in_window("site_1", &recent_window())
        .await
        .expect("events");
    assert_eq!(events[0].user_agent.as_deref(), Some("Tracker/1.0 (iPad)"));
}

#[tokio::test]
async fn test_missing_required_fields_are_rejected_and_not_stored() {
    let (state, app) = setup();
    for body in [
        json!({ "event_type": "pageview" }),
        json!({ "site_id": "site_1" }),
        json!({ "site_id": "  ", "event_type": "pageview" }),
    ] {
        let response = app
            .clone()
            .oneshot(track_request(body))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "validation_error");
    }

    let total = state
        .db
        .count_events_since("site_1", None, Utc::now() - Duration::hours(1))
        .await
        .expect("count");
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_unknown_event_types_are_kept() {
    let (state, app) = setup();
    let response = app
        .oneshot(track_request(json!({
            "site_id": "site_1",
            "event_type": "video_play"
        })))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let events = state
        .db
        .events_in_window("site_1", &recent_window())
        .await
        .expect("events");
    assert_eq!(events[0].event_type.as_str(), "video_play");
}

#[tokio::test]
async fn test_full_alert_queue_does_not_fail_ingestion() {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let mut config = test_config();
    config.alert_queue_size = 1;
    // No worker is running, so the queue fills after one job.
    let state = Arc::new(AppState::new(db, config));
    let app = build_app(Arc::clone(&state));

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(track_request(json!({
                "site_id": "site_1",
                "event_type": "pageview"
            })))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
    let total = state
        .db
        .count_events_since("site_1", None, Utc::now() - Duration::hours(1))
        .await
        .expect("count");
    assert_eq!(total, 3);
}
