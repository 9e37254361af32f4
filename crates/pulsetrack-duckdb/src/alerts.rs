use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};

use pulsetrack_core::alerts::{AlertCondition, AlertNotification, AlertRule, CreateAlertRuleRequest};

use crate::backend::{conversion_error, format_ts, random_alnum, ts_column};
use crate::DuckDbBackend;

pub const DEFAULT_NOTIFICATION_LIMIT: i64 = 50;
pub const MAX_NOTIFICATION_LIMIT: i64 = 200;

fn generate_rule_id() -> String {
    format!("alr_{}", random_alnum(21))
}

fn generate_notification_id() -> String {
    format!("ntf_{}", random_alnum(21))
}

const RULE_COLUMNS: &str = "id, site_id, name, condition_type, threshold, time_window, \
     notification_email, is_active, CAST(created_at AS VARCHAR), CAST(last_fired_at AS VARCHAR)";

fn map_alert_rule_row(row: &duckdb::Row<'_>) -> Result<AlertRule, duckdb::Error> {
    let condition_raw: String = row.get(3)?;
    let condition = AlertCondition::parse(&condition_raw)
        .ok_or_else(|| conversion_error(3, anyhow!("invalid alert condition: {condition_raw}")))?;
    let created_at: String = row.get(8)?;
    let last_fired_at: Option<String> = row.get(9)?;
    Ok(AlertRule {
        id: row.get(0)?,
        site_id: row.get(1)?,
        name: row.get(2)?,
        condition,
        threshold: row.get(4)?,
        time_window: row.get(5)?,
        notification_email: row.get(6)?,
        is_active: row.get(7)?,
        created_at: ts_column(8, &created_at)?,
        last_fired_at: last_fired_at
            .as_deref()
            .map(|raw| ts_column(9, raw))
            .transpose()?,
    })
}

fn map_notification_row(row: &duckdb::Row<'_>) -> Result<AlertNotification, duckdb::Error> {
    let fired_at: String = row.get(6)?;
    Ok(AlertNotification {
        id: row.get(0)?,
        rule_id: row.get(1)?,
        site_id: row.get(2)?,
        alert_name: row.get(3)?,
        notification_email: row.get(4)?,
        message: row.get(5)?,
        timestamp: ts_column(6, &fired_at)?,
    })
}

impl DuckDbBackend {
    pub async fn create_alert_rule(&self, req: &CreateAlertRuleRequest) -> Result<AlertRule> {
        let id = generate_rule_id();
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO alert_rules (
                id, site_id, name, condition_type, threshold, time_window,
                notification_email, is_active, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, TRUE, CAST(?8 AS TIMESTAMP)
            )
            "#,
            duckdb::params![
                id,
                req.site_id.trim(),
                req.name.trim(),
                req.condition.as_str(),
                req.threshold,
                req.effective_time_window(),
                req.notification_email,
                format_ts(Utc::now()),
            ],
        )?;
        drop(conn);
        self.get_alert_rule(&id)
            .await?
            .ok_or_else(|| anyhow!("alert rule not found after create"))
    }

    pub async fn get_alert_rule(&self, rule_id: &str) -> Result<Option<AlertRule>> {
        let conn = self.conn.lock().await;
        let sql = format!("SELECT {RULE_COLUMNS} FROM alert_rules WHERE id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(duckdb::params![rule_id], map_alert_rule_row)?;
        let rule = rows.next().transpose()?;
        Ok(rule)
    }

    pub async fn list_active_alert_rules(&self, site_id: &str) -> Result<Vec<AlertRule>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM alert_rules \
             WHERE site_id = ?1 AND is_active = TRUE \
             ORDER BY created_at, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut out = Vec::new();
        for row in stmt.query_map(duckdb::params![site_id], map_alert_rule_row)? {
            out.push(row?);
        }
        Ok(out)
    }

    /// Soft delete: the row stays so existing notifications keep their name.
    pub async fn deactivate_alert_rule(&self, rule_id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE alert_rules SET is_active = FALSE WHERE id = ?1 AND is_active = TRUE",
            duckdb::params![rule_id],
        )?;
        Ok(changed > 0)
    }

    /// Check-and-set of `last_fired_at` in one statement under the
    /// connection lock, so two concurrent evaluations cannot both win.
    pub async fn claim_alert_fire(
        &self,
        rule_id: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<bool> {
        let cutoff = now
            .checked_sub_signed(window)
            .ok_or_else(|| anyhow!("alert window out of range for rule {rule_id}"))?;
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            r#"
            UPDATE alert_rules
            SET last_fired_at = CAST(?1 AS TIMESTAMP)
            WHERE id = ?2
              AND is_active = TRUE
              AND (last_fired_at IS NULL OR last_fired_at <= CAST(?3 AS TIMESTAMP))
            "#,
            duckdb::params![format_ts(now), rule_id, format_ts(cutoff)],
        )?;
        Ok(changed == 1)
    }

    /// Undo a claim taken at `claimed_at`, restoring `previous`. A no-op when
    /// another evaluation has claimed the rule since.
    pub async fn release_alert_fire(
        &self,
        rule_id: &str,
        claimed_at: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            r#"
            UPDATE alert_rules
            SET last_fired_at = CAST(?1 AS TIMESTAMP)
            WHERE id = ?2 AND last_fired_at = CAST(?3 AS TIMESTAMP)
            "#,
            duckdb::params![previous.map(format_ts), rule_id, format_ts(claimed_at)],
        )?;
        Ok(changed == 1)
    }

    pub async fn insert_notification(
        &self,
        rule: &AlertRule,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<AlertNotification> {
        let notification = AlertNotification {
            id: generate_notification_id(),
            rule_id: Some(rule.id.clone()),
            site_id: rule.site_id.clone(),
            message: message.to_string(),
            timestamp,
            notification_email: rule.notification_email.clone(),
            alert_name: Some(rule.name.clone()),
        };
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO alert_notifications (
                id, rule_id, site_id, alert_name, notification_email, message, fired_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, CAST(?7 AS TIMESTAMP)
            )
            "#,
            duckdb::params![
                notification.id,
                notification.rule_id,
                notification.site_id,
                notification.alert_name,
                notification.notification_email,
                notification.message,
                format_ts(timestamp),
            ],
        )?;
        Ok(notification)
    }

    /// Newest first; `limit` is clamped to `1..=200`.
    pub async fn list_notifications(
        &self,
        site_id: &str,
        limit: i64,
    ) -> Result<Vec<AlertNotification>> {
        let limit = limit.clamp(1, MAX_NOTIFICATION_LIMIT);
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                id, rule_id, site_id, alert_name, notification_email, message,
                CAST(fired_at AS VARCHAR)
            FROM alert_notifications
            WHERE site_id = ?1
            ORDER BY fired_at DESC, id DESC
            LIMIT ?2
            "#,
        )?;
        let mut out = Vec::new();
        for row in stmt.query_map(duckdb::params![site_id, limit], map_notification_row)? {
            out.push(row?);
        }
        Ok(out)
    }
}
