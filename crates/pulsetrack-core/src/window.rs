use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Range used when a report request names no start date.
pub const DEFAULT_RANGE_DAYS: i64 = 7;

/// A half-open interval `[start, end)` over event timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, CoreError> {
        if end <= start {
            return Err(CoreError::Validation(
                "end_date must be after start_date".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    /// `[now - duration, now)`.
    pub fn trailing(now: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            start: now - duration,
            end: now,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Resolve optional request parameters into a window. Missing bounds
    /// default to the last seven days ending at `now`.
    pub fn resolve(
        start: Option<&str>,
        end: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        let end = match end.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => parse_timestamp(raw)?,
            None => now,
        };
        let start = match start.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => parse_timestamp(raw)?,
            None => end - Duration::days(DEFAULT_RANGE_DAYS),
        };
        Self::new(start, end)
    }
}

/// Parse an RFC 3339 timestamp, a naive ISO timestamp (taken as UTC) or a
/// bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CoreError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| CoreError::Validation(format!("invalid date: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, 0).single().expect("valid")
    }

    #[test]
    fn window_is_half_open() {
        let w = TimeWindow::new(at(10, 0), at(11, 0)).expect("window");
        assert!(w.contains(at(10, 0)));
        assert!(w.contains(at(10, 59)));
        assert!(!w.contains(at(11, 0)));
    }

    #[test]
    fn resolve_defaults_to_last_seven_days() {
        let now = at(12, 0);
        let w = TimeWindow::resolve(None, None, now).expect("window");
        assert_eq!(w.end, now);
        assert_eq!(w.start, now - Duration::days(7));
    }

    #[test]
    fn resolve_accepts_zulu_offsets_and_dates() {
        let w = TimeWindow::resolve(
            Some("2026-03-01"),
            Some("2026-03-01T12:00:00Z"),
            Utc::now(),
        )
        .expect("window");
        assert_eq!(w.start, at(0, 0));
        assert_eq!(w.end, at(12, 0));

        let offset = parse_timestamp("2026-03-01T14:00:00+02:00").expect("offset");
        assert_eq!(offset, at(12, 0));
    }

    #[test]
    fn reversed_or_garbage_ranges_are_validation_errors() {
        assert!(matches!(
            TimeWindow::resolve(Some("2026-03-02"), Some("2026-03-01"), Utc::now()),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(CoreError::Validation(_))
        ));
    }
}
