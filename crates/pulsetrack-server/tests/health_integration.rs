use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use pulsetrack_core::config::Config;
use pulsetrack_duckdb::DuckDbBackend;
use pulsetrack_server::app::build_app;
use pulsetrack_server::state::AppState;

fn test_config(cors_origins: Vec<String>) -> Config {
    Config {
        port: 0,
        data_dir: "/tmp/pulsetrack-test".to_string(),
        geoip_path: "/nonexistent/GeoLite2-City.mmdb".to_string(),
        cors_origins,
        duckdb_memory_limit: "1GB".to_string(),
        alert_dedup: true,
        alert_queue_size: 16,
        smtp: None,
    }
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

#[tokio::test]
async fn test_health_returns_200_when_db_reachable() {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let app = build_app(Arc::new(AppState::new(db, test_config(vec![]))));

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build request");

    let response = app.oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let app = build_app(Arc::new(AppState::new(db, test_config(vec![]))));

    let request = Request::builder()
        .uri("/api/nope")
        .body(Body::empty())
        .expect("build request");
    let response = app.oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_allows_configured_origin() {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let config = test_config(vec!["https://shop.example.com".to_string()]);
    let app = build_app(Arc::new(AppState::new(db, config)));

    let request = Request::builder()
        .uri("/health")
        .header("origin", "https://shop.example.com")
        .body(Body::empty())
        .expect("build request");
    let response = app.oneshot(request).await.expect("request");
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("https://shop.example.com")
    );
}
