/// DuckDB initialization SQL.
///
/// Executed once at open time via `Connection::execute_batch`. Every
/// statement uses `IF NOT EXISTS`, so reopening an existing file is a no-op.
///
/// `memory_limit` comes from `Config.duckdb_memory_limit`
/// (env `PULSETRACK_DUCKDB_MEMORY`, default `"1GB"`). The DuckDB default of
/// 80% of system RAM is not acceptable for a server process.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- EVENTS (append-only)
-- ===========================================
CREATE TABLE IF NOT EXISTS events (
    id              VARCHAR PRIMARY KEY,           -- UUID v4
    site_id         VARCHAR NOT NULL,
    event_type      VARCHAR NOT NULL,
    session_id      VARCHAR,
    user_id         VARCHAR,
    url             VARCHAR,
    title           VARCHAR,
    referrer        VARCHAR,
    user_agent      VARCHAR,
    metadata        VARCHAR NOT NULL DEFAULT '{{}}',  -- JSON object of scalar values
    ip_address      VARCHAR,
    ip_city         VARCHAR,
    ip_region       VARCHAR,
    ip_country      VARCHAR,
    ip_timezone     VARCHAR,
    ip_org          VARCHAR,
    ip_latitude     DOUBLE,
    ip_longitude    DOUBLE,
    created_at      TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_site_time
    ON events(site_id, created_at);
CREATE INDEX IF NOT EXISTS idx_events_site_type_time
    ON events(site_id, event_type, created_at);
CREATE INDEX IF NOT EXISTS idx_events_site_url
    ON events(site_id, url);

-- ===========================================
-- ALERT RULES
-- ===========================================
CREATE TABLE IF NOT EXISTS alert_rules (
    id                  VARCHAR PRIMARY KEY,       -- 'alr_' + 21 alphanumerics
    site_id             VARCHAR NOT NULL,
    name                VARCHAR NOT NULL,
    condition_type      VARCHAR NOT NULL,          -- page_views_spike | error_rate | custom_event
    threshold           DOUBLE,
    time_window         BIGINT NOT NULL DEFAULT 300,
    notification_email  VARCHAR,
    is_active           BOOLEAN NOT NULL DEFAULT TRUE,
    created_at          TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    last_fired_at       TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_alert_rules_site_active
    ON alert_rules(site_id, is_active);

-- ===========================================
-- ALERT NOTIFICATIONS
-- ===========================================
-- No foreign key on rule_id: notifications outlive their rules.
CREATE TABLE IF NOT EXISTS alert_notifications (
    id                  VARCHAR PRIMARY KEY,       -- 'ntf_' + 21 alphanumerics
    rule_id             VARCHAR,
    site_id             VARCHAR NOT NULL,
    alert_name          VARCHAR,
    notification_email  VARCHAR,
    message             VARCHAR NOT NULL,
    fired_at            TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alert_notifications_site_time
    ON alert_notifications(site_id, fired_at);
"#
    )
}

/// Tracks applied schema versions.
pub const MIGRATIONS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS _migrations (
    id          VARCHAR PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

pub const INITIAL_MIGRATION_ID: &str = "0001_initial";
