use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{routes, state::AppState};

/// CORS for the tracker, which posts from third-party pages. With no
/// configured origins any origin is allowed.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let origin = if allowed.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(allowed)
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// `TraceLayer` is outermost, so it also logs CORS preflight responses.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/track", post(routes::track::track))
        .route(
            "/api/analytics/{site_id}",
            get(routes::analytics::get_summary),
        )
        .route(
            "/api/analytics/{site_id}/realtime",
            get(routes::analytics::get_realtime),
        )
        .route(
            "/api/analytics/{site_id}/heatmap/pages",
            get(routes::heatmap::click_pages),
        )
        .route(
            "/api/analytics/{site_id}/scrollmap",
            get(routes::heatmap::scrollmap),
        )
        .route(
            "/api/analytics/{site_id}/export/csv",
            get(routes::export::export_csv),
        )
        .route("/api/heatmap/clicks", get(routes::heatmap::clicks))
        .route(
            "/api/alerts/rules",
            post(routes::alerts::create_rule).get(routes::alerts::list_rules),
        )
        .route(
            "/api/alerts/rules/{rule_id}",
            delete(routes::alerts::delete_rule),
        )
        .route(
            "/api/alerts/notifications",
            get(routes::alerts::list_notifications),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
