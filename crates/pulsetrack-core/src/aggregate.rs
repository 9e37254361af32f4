//! Summary statistics over a site's events in a window.
//!
//! Every call re-scans the event log; nothing is cached between requests.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::analytics::{
    AnalyticsSummary, ClickSample, DeviceClass, DeviceCount, EventLog, JourneyStep, PageCount,
    RealtimeSummary, ReferrerCount, UserJourney,
};
use crate::error::CoreError;
use crate::event::{Event, EventType};
use crate::grouping::{FirstSeenCounter, OrderedGroups};
use crate::window::TimeWindow;

pub const TOP_LIST_LIMIT: usize = 10;
pub const JOURNEY_USER_LIMIT: usize = 5;
pub const JOURNEY_PAGE_LIMIT: usize = 10;
pub const DIRECT_REFERRER: &str = "Direct";
pub const REAL_TIME_VISITOR_MINUTES: i64 = 5;
pub const REALTIME_REPORT_MINUTES: i64 = 30;

/// Classify a user agent. Mobile is checked before tablet, so an Android
/// tablet UA containing "android" counts as mobile.
pub fn classify_device(user_agent: Option<&str>) -> DeviceClass {
    let ua = user_agent.unwrap_or_default().to_ascii_lowercase();
    if ua.contains("mobile") || ua.contains("android") {
        DeviceClass::Mobile
    } else if ua.contains("tablet") || ua.contains("ipad") {
        DeviceClass::Tablet
    } else {
        DeviceClass::Desktop
    }
}

/// Build the summary from events already retrieved in scan order.
///
/// `real_time_visitors` is computed separately because it ignores `window`.
pub fn summarize(
    site_id: &str,
    window: TimeWindow,
    events: &[Event],
    real_time_visitors: i64,
) -> AnalyticsSummary {
    let mut visitors = HashSet::new();
    let mut sessions = HashSet::new();
    let mut pages = FirstSeenCounter::new();
    let mut referrers = FirstSeenCounter::new();
    let mut devices = FirstSeenCounter::new();
    let mut click_heatmap = Vec::new();
    let mut load_times = Vec::new();
    let (mut pageviews, mut button_clicks, mut form_submissions, mut error_count) = (0, 0, 0, 0);

    for event in events {
        if let Some(user_id) = event.user_id.as_deref() {
            visitors.insert(user_id);
        }
        if let Some(session_id) = event.session_id.as_deref() {
            sessions.insert(session_id);
        }
        devices.add(classify_device(event.user_agent.as_deref()));

        match event.event_type {
            EventType::Pageview => {
                pageviews += 1;
                if let Some(url) = event.url.as_deref() {
                    pages.add(url);
                }
                let referrer = event
                    .referrer
                    .as_deref()
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or(DIRECT_REFERRER);
                referrers.add(referrer);
            }
            EventType::Click => {
                if let (Some(x), Some(y)) =
                    (event.metadata_f64("click_x"), event.metadata_f64("click_y"))
                {
                    click_heatmap.push(ClickSample {
                        x,
                        y,
                        url: event.url.clone(),
                    });
                }
            }
            EventType::ButtonClick => button_clicks += 1,
            EventType::FormSubmit => form_submissions += 1,
            EventType::JavascriptError => error_count += 1,
            EventType::PagePerformance => {
                if let Some(load_time) = event.metadata_f64("load_time") {
                    load_times.push(load_time);
                }
            }
            _ => {}
        }
    }

    AnalyticsSummary {
        site_id: site_id.to_string(),
        window,
        total_pageviews: pageviews,
        unique_visitors: visitors.len() as i64,
        total_sessions: sessions.len() as i64,
        top_pages: pages
            .into_top(TOP_LIST_LIMIT)
            .into_iter()
            .map(|(url, views)| PageCount {
                url: url.to_string(),
                views,
            })
            .collect(),
        referrer_stats: referrers
            .into_top(TOP_LIST_LIMIT)
            .into_iter()
            .map(|(referrer, count)| ReferrerCount {
                referrer: referrer.to_string(),
                count,
            })
            .collect(),
        device_stats: devices
            .into_entries()
            .into_iter()
            .map(|(device, count)| DeviceCount { device, count })
            .collect(),
        real_time_visitors,
        button_clicks,
        form_submissions,
        error_count,
        avg_load_time: average_rounded(&load_times),
        click_heatmap,
        user_journey: journeys(events),
    }
}

fn average_rounded(values: &[f64]) -> i64 {
    if values.is_empty() {
        return 0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    // Half-to-even, matching the reports produced before the rewrite.
    mean.round_ties_even() as i64
}

fn journeys(events: &[Event]) -> Vec<UserJourney> {
    let mut pageviews: Vec<&Event> = events
        .iter()
        .filter(|e| e.event_type == EventType::Pageview && e.user_id.is_some())
        .collect();
    // Stable: equal timestamps keep scan order.
    pageviews.sort_by_key(|e| e.created_at);

    let mut by_user: OrderedGroups<&str, &Event> = OrderedGroups::new();
    for event in pageviews {
        if let Some(user_id) = event.user_id.as_deref() {
            by_user.push(user_id, event);
        }
    }

    by_user
        .into_groups()
        .into_iter()
        .take(JOURNEY_USER_LIMIT)
        .map(|(user_id, views)| UserJourney {
            user_id: user_id.to_string(),
            pages: views
                .into_iter()
                .take(JOURNEY_PAGE_LIMIT)
                .map(|e| JourneyStep {
                    url: e.url.clone(),
                    timestamp: e.created_at,
                    title: e.title.clone(),
                })
                .collect(),
        })
        .collect()
}

/// Aggregator entry point: scan `window` for `site_id` and summarise it.
pub async fn build_summary(
    log: &dyn EventLog,
    site_id: &str,
    window: TimeWindow,
    now: DateTime<Utc>,
) -> Result<AnalyticsSummary, CoreError> {
    let events = log.events_in_window(site_id, &window).await?;
    let recent = TimeWindow::trailing(now, Duration::minutes(REAL_TIME_VISITOR_MINUTES));
    let real_time_visitors = log.count_distinct_users(site_id, &recent).await?;
    Ok(summarize(site_id, window, &events, real_time_visitors))
}

pub async fn build_realtime(
    log: &dyn EventLog,
    site_id: &str,
    now: DateTime<Utc>,
) -> Result<RealtimeSummary, CoreError> {
    let since = now - Duration::minutes(REALTIME_REPORT_MINUTES);
    let recent = TimeWindow::trailing(now, Duration::minutes(REALTIME_REPORT_MINUTES));
    Ok(RealtimeSummary {
        site_id: site_id.to_string(),
        active_users: log.count_distinct_users(site_id, &recent).await?,
        active_sessions: log.count_distinct_sessions(site_id, &recent).await?,
        pageviews: log
            .count_events_since(site_id, Some(&EventType::Pageview), since)
            .await?,
        button_clicks: log
            .count_events_since(site_id, Some(&EventType::ButtonClick), since)
            .await?,
        errors: log
            .count_events_since(site_id, Some(&EventType::JavascriptError), since)
            .await?,
    })
}
