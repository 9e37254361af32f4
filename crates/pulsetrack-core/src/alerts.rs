//! Alert rules, fired notifications, and the per-condition checks the rule
//! evaluator runs after each ingested event.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::EventLog;
use crate::error::CoreError;
use crate::event::{Event, EventType};

pub const DEFAULT_TIME_WINDOW_SECS: i64 = 300;
/// One year.
pub const MAX_TIME_WINDOW_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCondition {
    PageViewsSpike,
    ErrorRate,
    CustomEvent,
}

impl AlertCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCondition::PageViewsSpike => "page_views_spike",
            AlertCondition::ErrorRate => "error_rate",
            AlertCondition::CustomEvent => "custom_event",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "page_views_spike" => Some(AlertCondition::PageViewsSpike),
            "error_rate" => Some(AlertCondition::ErrorRate),
            "custom_event" => Some(AlertCondition::CustomEvent),
            _ => None,
        }
    }

    /// The event type that can trigger a re-check of this condition.
    pub fn trigger_type(&self) -> EventType {
        match self {
            AlertCondition::PageViewsSpike => EventType::Pageview,
            AlertCondition::ErrorRate => EventType::JavascriptError,
            AlertCondition::CustomEvent => EventType::CustomEvent,
        }
    }

    pub fn needs_threshold(&self) -> bool {
        !matches!(self, AlertCondition::CustomEvent)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub site_id: String,
    pub name: String,
    pub condition: AlertCondition,
    pub threshold: Option<f64>,
    /// Trailing window in seconds.
    pub time_window: i64,
    pub notification_email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    /// Set when the rule last produced a notification.
    pub last_fired_at: Option<DateTime<Utc>>,
}

impl AlertRule {
    /// `None` when the stored window is not a positive, representable span.
    pub fn window(&self) -> Option<Duration> {
        if self.time_window <= 0 {
            return None;
        }
        Duration::try_seconds(self.time_window)
    }

    /// Start of the trailing window ending at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, CoreError> {
        self.window()
            .and_then(|w| now.checked_sub_signed(w))
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "rule {} has an unusable time_window of {} seconds",
                    self.id, self.time_window
                ))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAlertRuleRequest {
    pub site_id: String,
    pub name: String,
    pub condition: AlertCondition,
    pub threshold: Option<f64>,
    pub time_window: Option<i64>,
    pub notification_email: Option<String>,
}

impl CreateAlertRuleRequest {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.site_id.trim().is_empty() {
            return Err(CoreError::Validation("site_id is required".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation("name is required".to_string()));
        }
        if let Some(window) = self.time_window {
            if window <= 0 {
                return Err(CoreError::Validation(
                    "time_window must be a positive number of seconds".to_string(),
                ));
            }
            if window > MAX_TIME_WINDOW_SECS {
                return Err(CoreError::Validation(format!(
                    "time_window must be at most {MAX_TIME_WINDOW_SECS} seconds"
                )));
            }
        }
        match self.threshold {
            Some(t) if !t.is_finite() => Err(CoreError::Validation(
                "threshold must be a finite number".to_string(),
            )),
            None if self.condition.needs_threshold() => Err(CoreError::Validation(format!(
                "threshold is required for {}",
                self.condition.as_str()
            ))),
            _ => Ok(()),
        }
    }

    pub fn effective_time_window(&self) -> i64 {
        self.time_window.unwrap_or(DEFAULT_TIME_WINDOW_SECS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertNotification {
    pub id: String,
    /// `None` once the originating rule row no longer exists.
    pub rule_id: Option<String>,
    pub site_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub notification_email: Option<String>,
    pub alert_name: Option<String>,
}

pub fn page_views_spike_message(count: i64, threshold: f64, time_window: i64) -> Option<String> {
    ((count as f64) > threshold)
        .then(|| format!("Pageview spike detected: {count} views in {time_window} seconds"))
}

pub fn error_rate_message(
    error_count: i64,
    total_count: i64,
    threshold: f64,
    time_window: i64,
) -> Option<String> {
    if total_count <= 0 {
        return None;
    }
    let rate = error_count as f64 / total_count as f64 * 100.0;
    (rate > threshold).then(|| format!("High error rate: {rate:.1}% in {time_window} seconds"))
}

pub fn custom_event_message(event: &Event) -> String {
    let name = event
        .metadata_value("event_name")
        .map(|v| v.to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    format!("Custom event triggered: {name}")
}

/// Decide whether `rule` fires for the freshly ingested `event`.
///
/// Returns the notification message when the condition holds. Rules whose
/// trigger type does not match the event are skipped without touching storage.
pub async fn check_rule(
    log: &dyn EventLog,
    rule: &AlertRule,
    event: &Event,
    now: DateTime<Utc>,
) -> Result<Option<String>, CoreError> {
    if event.event_type != rule.condition.trigger_type() {
        return Ok(None);
    }
    match rule.condition {
        AlertCondition::CustomEvent => Ok(Some(custom_event_message(event))),
        AlertCondition::PageViewsSpike => {
            let Some(threshold) = rule.threshold else {
                return Err(CoreError::Validation(format!(
                    "rule {} has no threshold",
                    rule.id
                )));
            };
            let since = rule.window_start(now)?;
            let count = log
                .count_events_since(&rule.site_id, Some(&EventType::Pageview), since)
                .await?;
            Ok(page_views_spike_message(count, threshold, rule.time_window))
        }
        AlertCondition::ErrorRate => {
            let Some(threshold) = rule.threshold else {
                return Err(CoreError::Validation(format!(
                    "rule {} has no threshold",
                    rule.id
                )));
            };
            let since = rule.window_start(now)?;
            let errors = log
                .count_events_since(&rule.site_id, Some(&EventType::JavascriptError), since)
                .await?;
            let total = log.count_events_since(&rule.site_id, None, since).await?;
            Ok(error_rate_message(errors, total, threshold, rule.time_window))
        }
    }
}
