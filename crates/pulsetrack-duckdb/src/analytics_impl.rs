use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use pulsetrack_core::alerts::{AlertNotification, AlertRule, CreateAlertRuleRequest};
use pulsetrack_core::analytics::{AlertStore, EventLog};
use pulsetrack_core::event::{Event, EventType};
use pulsetrack_core::window::TimeWindow;

use crate::queries::counts::{self, DistinctColumn};
use crate::queries::events;
use crate::DuckDbBackend;

#[async_trait]
impl EventLog for DuckDbBackend {
    async fn insert_event(&self, event: &Event) -> anyhow::Result<()> {
        events::insert_event_inner(self, event).await
    }

    async fn events_in_window(
        &self,
        site_id: &str,
        window: &TimeWindow,
    ) -> anyhow::Result<Vec<Event>> {
        events::events_in_window_inner(self, site_id, window).await
    }

    async fn events_of_types_in_window(
        &self,
        site_id: &str,
        event_types: &[EventType],
        page: Option<&str>,
        window: &TimeWindow,
    ) -> anyhow::Result<Vec<Event>> {
        events::events_of_types_in_window_inner(self, site_id, event_types, page, window).await
    }

    async fn count_events_since(
        &self,
        site_id: &str,
        event_type: Option<&EventType>,
        since: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        counts::count_events_since_inner(self, site_id, event_type, since).await
    }

    async fn count_distinct_users(
        &self,
        site_id: &str,
        window: &TimeWindow,
    ) -> anyhow::Result<i64> {
        counts::count_distinct_inner(self, site_id, DistinctColumn::UserId, window).await
    }

    async fn count_distinct_sessions(
        &self,
        site_id: &str,
        window: &TimeWindow,
    ) -> anyhow::Result<i64> {
        counts::count_distinct_inner(self, site_id, DistinctColumn::SessionId, window).await
    }

    async fn distinct_click_pages(&self, site_id: &str) -> anyhow::Result<Vec<String>> {
        counts::distinct_click_pages_inner(self, site_id).await
    }
}

#[async_trait]
impl AlertStore for DuckDbBackend {
    async fn create_alert_rule(&self, req: &CreateAlertRuleRequest) -> anyhow::Result<AlertRule> {
        DuckDbBackend::create_alert_rule(self, req).await
    }

    async fn get_alert_rule(&self, rule_id: &str) -> anyhow::Result<Option<AlertRule>> {
        DuckDbBackend::get_alert_rule(self, rule_id).await
    }

    async fn list_active_alert_rules(&self, site_id: &str) -> anyhow::Result<Vec<AlertRule>> {
        DuckDbBackend::list_active_alert_rules(self, site_id).await
    }

    async fn deactivate_alert_rule(&self, rule_id: &str) -> anyhow::Result<bool> {
        DuckDbBackend::deactivate_alert_rule(self, rule_id).await
    }

    async fn claim_alert_fire(
        &self,
        rule_id: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> anyhow::Result<bool> {
        DuckDbBackend::claim_alert_fire(self, rule_id, now, window).await
    }

    async fn release_alert_fire(
        &self,
        rule_id: &str,
        claimed_at: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> anyhow::Result<bool> {
        DuckDbBackend::release_alert_fire(self, rule_id, claimed_at, previous).await
    }

    async fn insert_notification(
        &self,
        rule: &AlertRule,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<AlertNotification> {
        DuckDbBackend::insert_notification(self, rule, message, timestamp).await
    }

    async fn list_notifications(
        &self,
        site_id: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<AlertNotification>> {
        DuckDbBackend::list_notifications(self, site_id, limit).await
    }
}
