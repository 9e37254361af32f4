use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Response,
};
use chrono::Utc;

use pulsetrack_core::aggregate::build_summary;
use pulsetrack_core::analytics::{AnalyticsSummary, DeviceClass};

use crate::{error::AppError, routes::DateRangeQuery, state::AppState};

/// `GET /api/analytics/{site_id}/export/csv`: the summary as a sectioned CSV
/// report (metrics, top pages, referrers, devices).
#[tracing::instrument(skip(state))]
pub async fn export_csv(
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<String>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Response, AppError> {
    let now = Utc::now();
    let window = query.window(now)?;
    let summary = build_summary(state.db.as_ref(), &site_id, window, now).await?;

    let range = (
        query.start_date.as_deref().unwrap_or("Last 7 days"),
        query.end_date.as_deref().unwrap_or("Now"),
    );
    let csv_bytes = build_csv(&summary, range, now)?;
    let filename = format!(
        "analytics_{}_{}.csv",
        sanitize_filename(&site_id),
        now.format("%Y%m%d")
    );
    build_csv_response(&filename, csv_bytes)
}

/// Prefix cells a spreadsheet would evaluate as formulas.
fn sanitize_csv_field(val: &str) -> std::borrow::Cow<'_, str> {
    if val.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        std::borrow::Cow::Owned(format!("'{val}"))
    } else {
        std::borrow::Cow::Borrowed(val)
    }
}

fn sanitize_filename(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

fn device_label(device: DeviceClass) -> &'static str {
    match device {
        DeviceClass::Mobile => "Mobile",
        DeviceClass::Tablet => "Tablet",
        DeviceClass::Desktop => "Desktop",
    }
}

fn build_csv(
    summary: &AnalyticsSummary,
    (range_start, range_end): (&str, &str),
    now: chrono::DateTime<Utc>,
) -> anyhow::Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::with_capacity(4096));

    let site_line = format!("Site ID: {}", summary.site_id);
    let export_line = format!("Export Date: {}", now.format("%Y-%m-%d %H:%M:%S"));
    let range_line = format!("Date Range: {range_start} to {range_end}");
    wtr.write_record(["Web Analytics Report"])?;
    wtr.write_record([&*sanitize_csv_field(&site_line)])?;
    wtr.write_record([export_line.as_str()])?;
    wtr.write_record([&*sanitize_csv_field(&range_line)])?;
    wtr.write_record([""])?;

    wtr.write_record(["Summary Metrics"])?;
    wtr.write_record(["Metric", "Value"])?;
    let metrics = [
        ("Total Pageviews", summary.total_pageviews),
        ("Unique Visitors", summary.unique_visitors),
        ("Total Sessions", summary.total_sessions),
        ("Button Clicks", summary.button_clicks),
        ("Form Submissions", summary.form_submissions),
        ("JavaScript Errors", summary.error_count),
        ("Average Load Time (ms)", summary.avg_load_time),
    ];
    for (label, value) in metrics {
        wtr.write_record([label, value.to_string().as_str()])?;
    }
    wtr.write_record([""])?;

    wtr.write_record(["Top Pages"])?;
    wtr.write_record(["URL", "Views"])?;
    for page in &summary.top_pages {
        wtr.write_record([&*sanitize_csv_field(&page.url), page.views.to_string().as_str()])?;
    }
    wtr.write_record([""])?;

    wtr.write_record(["Top Referrers"])?;
    wtr.write_record(["Referrer", "Count"])?;
    for referrer in &summary.referrer_stats {
        wtr.write_record([
            &*sanitize_csv_field(&referrer.referrer),
            referrer.count.to_string().as_str(),
        ])?;
    }
    wtr.write_record([""])?;

    wtr.write_record(["Device Breakdown"])?;
    wtr.write_record(["Device", "Count"])?;
    for device in &summary.device_stats {
        wtr.write_record([device_label(device.device), device.count.to_string().as_str()])?;
    }

    wtr.into_inner()
        .map_err(|e| anyhow::anyhow!("csv flush failed: {e}"))
}

fn build_csv_response(filename: &str, csv_bytes: Vec<u8>) -> Result<Response, AppError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(axum::body::Body::from(csv_bytes))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("response build failed: {e}")))
}
