pub mod alerts;
pub mod analytics;
pub mod export;
pub mod health;
pub mod heatmap;
pub mod track;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use pulsetrack_core::window::TimeWindow;

use crate::error::AppError;

/// `start_date` / `end_date` query parameters shared by report endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct DateRangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl DateRangeQuery {
    pub fn window(&self, now: DateTime<Utc>) -> Result<TimeWindow, AppError> {
        Ok(TimeWindow::resolve(
            self.start_date.as_deref(),
            self.end_date.as_deref(),
            now,
        )?)
    }
}

/// Reject a missing or blank required query parameter.
pub(crate) fn required_param(value: Option<String>, name: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("{name} is required")))
}
