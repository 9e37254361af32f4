use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use pulsetrack_core::alerts::{check_rule, AlertRule};
use pulsetrack_core::analytics::{AlertStore, EventLog};
use pulsetrack_core::error::CoreError;
use pulsetrack_core::event::Event;

use super::notifier::Notifier;

/// Run every active rule of the event's site against the freshly stored
/// `event` and notify for those that fire.
///
/// Never fails: storage and notifier errors are logged per rule and the
/// remaining rules still run. Returns the number of notifications stored.
pub async fn evaluate_event(
    log: &dyn EventLog,
    store: &dyn AlertStore,
    notifier: &Notifier,
    dedup: bool,
    event: &Event,
    now: DateTime<Utc>,
) -> usize {
    let rules = match store.list_active_alert_rules(&event.site_id).await {
        Ok(rules) => rules,
        Err(e) => {
            error!(site_id = %event.site_id, error = %e, "alert rules unavailable");
            return 0;
        }
    };

    let mut fired = 0;
    for rule in &rules {
        let message = match check_rule(log, rule, event, now).await {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(CoreError::Validation(reason)) => {
                warn!(rule_id = %rule.id, reason = %reason, "skipping malformed alert rule");
                continue;
            }
            Err(e) => {
                error!(rule_id = %rule.id, site_id = %rule.site_id, error = %e, "alert check failed");
                continue;
            }
        };

        let claimed = if dedup {
            let Some(window) = rule.window() else {
                warn!(rule_id = %rule.id, time_window = rule.time_window, "skipping alert rule with unusable window");
                continue;
            };
            match store.claim_alert_fire(&rule.id, now, window).await {
                Ok(true) => true,
                Ok(false) => {
                    debug!(rule_id = %rule.id, "alert already fired in this window");
                    continue;
                }
                Err(e) => {
                    error!(rule_id = %rule.id, error = %e, "alert fire claim failed");
                    continue;
                }
            }
        } else {
            false
        };

        match notifier.notify(store, rule, &message, now).await {
            Ok(_) => fired += 1,
            Err(e) => {
                error!(rule_id = %rule.id, error = %e, "alert notification failed");
                if claimed {
                    release_claim(store, rule, now).await;
                }
            }
        }
    }
    fired
}

/// Hand the window back so the next qualifying event can still fire.
async fn release_claim(store: &dyn AlertStore, rule: &AlertRule, claimed_at: DateTime<Utc>) {
    match store
        .release_alert_fire(&rule.id, claimed_at, rule.last_fired_at)
        .await
    {
        Ok(true) => debug!(rule_id = %rule.id, "alert fire claim released"),
        Ok(false) => debug!(rule_id = %rule.id, "alert fire claim already superseded"),
        Err(e) => error!(rule_id = %rule.id, error = %e, "alert fire claim release failed"),
    }
}
