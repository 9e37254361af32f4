use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::Connection;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::info;

use crate::schema::{init_sql, INITIAL_MIGRATION_ID, MIGRATIONS_TABLE_SQL};

/// Format used for every timestamp bound into SQL.
pub(crate) const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// Parse a `CAST(ts AS VARCHAR)` value. DuckDB drops the fraction when it is zero.
pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map(|naive| naive.and_utc())
        .map_err(|_| anyhow!("invalid timestamp: {raw}"))
}

/// Row-mapping wrapper around [`parse_ts`].
pub(crate) fn ts_column(idx: usize, raw: &str) -> Result<DateTime<Utc>, duckdb::Error> {
    parse_ts(raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn conversion_error(idx: usize, e: anyhow::Error) -> duckdb::Error {
    duckdb::Error::FromSqlConversionFailure(
        idx,
        duckdb::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            e.to_string(),
        )),
    )
}

/// Lowercase alphanumeric id body.
pub(crate) fn random_alnum(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..36);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect()
}

/// DuckDB-backed event log and alert store.
///
/// DuckDB is single-writer, so the connection sits behind an async mutex.
/// Every query takes the lock for its whole duration; reads therefore see
/// only fully committed inserts.
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl DuckDbBackend {
    /// Open (or create) a database file at `path`.
    ///
    /// `memory_limit` is a DuckDB size string such as `"1GB"` or `"512MB"`.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(&conn, memory_limit)?;
        info!(
            "DuckDB opened at {} with memory_limit={}, threads=2",
            path, memory_limit
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database. Data is discarded on drop.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn, "1GB")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init(conn: &Connection, memory_limit: &str) -> Result<()> {
        conn.execute_batch(MIGRATIONS_TABLE_SQL)?;
        conn.execute_batch(&init_sql(memory_limit))?;
        conn.execute(
            "INSERT OR IGNORE INTO _migrations (id) VALUES (?1)",
            duckdb::params![INITIAL_MIGRATION_ID],
        )?;
        Ok(())
    }

    /// `SELECT 1` liveness check for `/health`.
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    /// Acquire the connection lock for direct queries in integration tests.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_survive_varchar_round_trip() {
        let ts = Utc
            .with_ymd_and_hms(2026, 4, 2, 8, 30, 0)
            .single()
            .expect("valid");
        assert_eq!(parse_ts(&format_ts(ts)).expect("parse"), ts);
        assert_eq!(parse_ts("2026-04-02 08:30:00").expect("parse"), ts);
        assert!(parse_ts("not a time").is_err());
    }

    #[test]
    fn ids_are_lowercase_alphanumeric() {
        let id = random_alnum(21);
        assert_eq!(id.len(), 21);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }
}
