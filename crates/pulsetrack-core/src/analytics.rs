//! Event log abstraction and the report shapes computed over it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::{AlertNotification, AlertRule, CreateAlertRuleRequest};
use crate::event::{Event, EventType};
use crate::window::TimeWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCount {
    pub url: String,
    pub views: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferrerCount {
    pub referrer: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCount {
    pub device: DeviceClass,
    pub count: i64,
}

/// One click with coordinates, as carried in the summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickSample {
    pub x: f64,
    pub y: f64,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyStep {
    pub url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserJourney {
    pub user_id: String,
    pub pages: Vec<JourneyStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub site_id: String,
    pub window: TimeWindow,
    pub total_pageviews: i64,
    pub unique_visitors: i64,
    pub total_sessions: i64,
    pub top_pages: Vec<PageCount>,
    pub referrer_stats: Vec<ReferrerCount>,
    pub device_stats: Vec<DeviceCount>,
    pub real_time_visitors: i64,
    pub button_clicks: i64,
    pub form_submissions: i64,
    pub error_count: i64,
    /// Mean `load_time` in milliseconds, rounded; 0 when nothing reported one.
    pub avg_load_time: i64,
    pub click_heatmap: Vec<ClickSample>,
    pub user_journey: Vec<UserJourney>,
}

/// Counters over the last thirty minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeSummary {
    pub site_id: String,
    pub active_users: i64,
    pub active_sessions: i64,
    pub pageviews: i64,
    pub button_clicks: i64,
    pub errors: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClickPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollBucket {
    /// Lower edge of the bucket, a multiple of 5 in `0..=100`.
    pub bucket_percent: i64,
    /// Sessions whose maximum depth reached this bucket.
    pub session_count: i64,
    pub total_sessions: i64,
}

/// Append-only event store queried by the reporting engines.
///
/// Every window is half-open; results of `events_*` come back in scan order
/// (`created_at`, then `id`).
#[async_trait::async_trait]
pub trait EventLog: Send + Sync + 'static {
    async fn insert_event(&self, event: &Event) -> anyhow::Result<()>;

    async fn events_in_window(
        &self,
        site_id: &str,
        window: &TimeWindow,
    ) -> anyhow::Result<Vec<Event>>;

    /// Events of any of `event_types`, optionally restricted to one page URL.
    async fn events_of_types_in_window(
        &self,
        site_id: &str,
        event_types: &[EventType],
        page: Option<&str>,
        window: &TimeWindow,
    ) -> anyhow::Result<Vec<Event>>;

    /// Count events created at or after `since`; `None` counts every type.
    async fn count_events_since(
        &self,
        site_id: &str,
        event_type: Option<&EventType>,
        since: DateTime<Utc>,
    ) -> anyhow::Result<i64>;

    async fn count_distinct_users(&self, site_id: &str, window: &TimeWindow)
        -> anyhow::Result<i64>;

    async fn count_distinct_sessions(
        &self,
        site_id: &str,
        window: &TimeWindow,
    ) -> anyhow::Result<i64>;

    /// Sorted distinct URLs that have at least one click event.
    async fn distinct_click_pages(&self, site_id: &str) -> anyhow::Result<Vec<String>>;
}

/// Storage for alert rules and fired notifications.
#[async_trait::async_trait]
pub trait AlertStore: Send + Sync + 'static {
    async fn create_alert_rule(&self, req: &CreateAlertRuleRequest) -> anyhow::Result<AlertRule>;

    async fn get_alert_rule(&self, rule_id: &str) -> anyhow::Result<Option<AlertRule>>;

    async fn list_active_alert_rules(&self, site_id: &str) -> anyhow::Result<Vec<AlertRule>>;

    /// Soft delete. Returns `false` when no active rule has `rule_id`.
    async fn deactivate_alert_rule(&self, rule_id: &str) -> anyhow::Result<bool>;

    /// Atomically take the rule's fire slot: succeeds only when the rule has
    /// never fired or last fired at least `window` before `now`.
    async fn claim_alert_fire(
        &self,
        rule_id: &str,
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> anyhow::Result<bool>;

    /// Give back a fire slot taken at `claimed_at` whose notification could
    /// not be stored, restoring `previous` as `last_fired_at`. Returns `false`
    /// when the slot has been claimed again since.
    async fn release_alert_fire(
        &self,
        rule_id: &str,
        claimed_at: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> anyhow::Result<bool>;

    /// Persist a notification for `rule` with a server-assigned id.
    async fn insert_notification(
        &self,
        rule: &AlertRule,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<AlertNotification>;

    /// Newest first.
    async fn list_notifications(
        &self,
        site_id: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<AlertNotification>>;
}
