use anyhow::Result;
use chrono::{DateTime, Utc};

use pulsetrack_core::event::EventType;
use pulsetrack_core::window::TimeWindow;

use crate::backend::format_ts;
use crate::DuckDbBackend;

/// Events created at or after `since`; no upper bound, so events stamped
/// slightly in the future by a skewed clock still count.
pub async fn count_events_since_inner(
    db: &DuckDbBackend,
    site_id: &str,
    event_type: Option<&EventType>,
    since: DateTime<Utc>,
) -> Result<i64> {
    let conn = db.conn.lock().await;
    let count = match event_type {
        Some(event_type) => conn
            .prepare(
                "SELECT COUNT(*) FROM events \
                 WHERE site_id = ?1 AND event_type = ?2 \
                   AND created_at >= CAST(?3 AS TIMESTAMP)",
            )?
            .query_row(
                duckdb::params![site_id, event_type.as_str(), format_ts(since)],
                |row| row.get(0),
            )?,
        None => conn
            .prepare(
                "SELECT COUNT(*) FROM events \
                 WHERE site_id = ?1 AND created_at >= CAST(?2 AS TIMESTAMP)",
            )?
            .query_row(duckdb::params![site_id, format_ts(since)], |row| row.get(0))?,
    };
    Ok(count)
}

#[derive(Debug, Clone, Copy)]
pub enum DistinctColumn {
    UserId,
    SessionId,
}

impl DistinctColumn {
    fn column(self) -> &'static str {
        match self {
            DistinctColumn::UserId => "user_id",
            DistinctColumn::SessionId => "session_id",
        }
    }
}

/// `COUNT(DISTINCT col)` ignores NULLs, which is the visitor/session rule.
pub async fn count_distinct_inner(
    db: &DuckDbBackend,
    site_id: &str,
    column: DistinctColumn,
    window: &TimeWindow,
) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(DISTINCT {col}) FROM events \
         WHERE site_id = ?1 \
           AND created_at >= CAST(?2 AS TIMESTAMP) \
           AND created_at < CAST(?3 AS TIMESTAMP)",
        col = column.column()
    );
    let conn = db.conn.lock().await;
    let count = conn.prepare(&sql)?.query_row(
        duckdb::params![site_id, format_ts(window.start), format_ts(window.end)],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub async fn distinct_click_pages_inner(db: &DuckDbBackend, site_id: &str) -> Result<Vec<String>> {
    let conn = db.conn.lock().await;
    let mut stmt = conn.prepare(
        "SELECT DISTINCT url FROM events \
         WHERE site_id = ?1 AND event_type = ?2 AND url IS NOT NULL \
         ORDER BY url",
    )?;
    let rows = stmt.query_map(
        duckdb::params![site_id, EventType::Click.as_str()],
        |row| row.get::<_, String>(0),
    )?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
