use std::time::Duration;

use chrono::{DateTime, Utc};
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info, warn};

use pulsetrack_core::alerts::{AlertNotification, AlertRule};
use pulsetrack_core::analytics::AlertStore;
use pulsetrack_core::config::SmtpConfig;

fn is_valid_email(target: &str) -> bool {
    let trimmed = target.trim();
    let Some((local, domain)) = trimmed.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
}

fn smtp_noop_from_env() -> bool {
    std::env::var("PULSETRACK_SMTP_NOOP")
        .ok()
        .map(|v| {
            let trimmed = v.trim();
            trimmed.eq_ignore_ascii_case("1")
                || trimmed.eq_ignore_ascii_case("true")
                || trimmed.eq_ignore_ascii_case("yes")
        })
        .unwrap_or(false)
}

/// Outcome of the optional e-mail step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailOutcome {
    Sent,
    /// No address on the rule, or no SMTP host configured.
    Skipped,
}

/// Persists fired alerts and optionally mails them.
pub struct Notifier {
    smtp: Option<SmtpConfig>,
    noop: bool,
}

impl Notifier {
    pub fn new(smtp: Option<SmtpConfig>) -> Self {
        Self {
            smtp,
            noop: smtp_noop_from_env(),
        }
    }

    /// Notifier that never touches the network.
    pub fn noop() -> Self {
        Self {
            smtp: None,
            noop: true,
        }
    }

    /// Store the notification, then attempt e-mail delivery. Mail failures
    /// are logged only; the stored row is kept either way.
    pub async fn notify(
        &self,
        store: &dyn AlertStore,
        rule: &AlertRule,
        message: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<AlertNotification> {
        let notification = store.insert_notification(rule, message, now).await?;
        info!(
            rule_id = %rule.id,
            site_id = %rule.site_id,
            alert_name = %rule.name,
            notification_id = %notification.id,
            "ALERT TRIGGERED: {message}"
        );

        if let Some(target) = rule.notification_email.as_deref() {
            match self.deliver_email(target, &rule.name, message).await {
                Ok(EmailOutcome::Sent) => {
                    info!(rule_id = %rule.id, target = %target, "alert e-mail sent")
                }
                Ok(EmailOutcome::Skipped) => {
                    debug!(rule_id = %rule.id, "SMTP not configured; alert e-mail skipped")
                }
                Err(e) => warn!(rule_id = %rule.id, target = %target, error = %e, "alert e-mail failed"),
            }
        }
        Ok(notification)
    }

    async fn deliver_email(
        &self,
        target: &str,
        alert_name: &str,
        message: &str,
    ) -> Result<EmailOutcome, String> {
        if !is_valid_email(target) {
            return Err("invalid email target".to_string());
        }
        if self.noop {
            info!(
                target = %target,
                "SMTP noop transport enabled; marking delivery as sent without network dispatch"
            );
            return Ok(EmailOutcome::Sent);
        }
        let Some(smtp) = self.smtp.as_ref() else {
            return Ok(EmailOutcome::Skipped);
        };

        let from: Mailbox = smtp
            .from
            .parse()
            .map_err(|_| "invalid PULSETRACK_SMTP_FROM".to_string())?;
        let to: Mailbox = target
            .trim()
            .parse()
            .map_err(|_| "invalid email target".to_string())?;
        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(format!("PulseTrack alert: {alert_name}"))
            .body(message.to_string())
            .map_err(|e| format!("smtp message build failed: {e}"))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
            .port(smtp.port)
            .timeout(Some(Duration::from_secs(5)));
        if let (Some(user), Some(pass)) = (smtp.username.clone(), smtp.password.clone()) {
            builder = builder.credentials(Credentials::new(user, pass));
        }
        builder
            .build()
            .send(email)
            .await
            .map_err(|e| format!("smtp send failed: {e}"))?;
        Ok(EmailOutcome::Sent)
    }
}
