//! Click coordinates and scroll-depth histograms for a single page.

use std::collections::{BTreeMap, HashMap};

use crate::analytics::{ClickPoint, EventLog, ScrollBucket};
use crate::error::CoreError;
use crate::event::{Event, EventType};
use crate::window::TimeWindow;

pub const SCROLL_BUCKET_STEP: i64 = 5;

/// Metadata keys that may carry a scroll percentage, in lookup order.
const SCROLL_DEPTH_KEYS: [&str; 3] = ["scroll_percentage", "scroll_depth", "max_scroll"];

pub fn click_points(events: &[Event], page: &str) -> Vec<ClickPoint> {
    events
        .iter()
        .filter(|e| e.event_type == EventType::Click && e.url.as_deref() == Some(page))
        .filter_map(|e| {
            let x = e.metadata_f64("click_x")?;
            let y = e.metadata_f64("click_y")?;
            Some(ClickPoint { x, y })
        })
        .collect()
}

fn scroll_depth(event: &Event) -> Option<i64> {
    SCROLL_DEPTH_KEYS
        .iter()
        .find_map(|key| event.metadata_f64(key))
        .map(|depth| (depth.round() as i64).clamp(0, 100))
}

/// Bin per-session maximum scroll depth into 5-point buckets.
///
/// A session with max depth `d` counts once in every bucket `0..=d` that is a
/// multiple of five. Buckets with no sessions are omitted, so the result is
/// empty when no session qualifies.
pub fn scroll_histogram(events: &[Event]) -> Vec<ScrollBucket> {
    let mut max_by_session: HashMap<&str, i64> = HashMap::new();
    for event in events {
        if !matches!(event.event_type, EventType::ScrollDepth | EventType::Scroll) {
            continue;
        }
        let (Some(session_id), Some(depth)) = (event.session_id.as_deref(), scroll_depth(event))
        else {
            continue;
        };
        let max = max_by_session.entry(session_id).or_insert(depth);
        *max = (*max).max(depth);
    }

    let total_sessions = max_by_session.len() as i64;
    let mut buckets: BTreeMap<i64, i64> = BTreeMap::new();
    for depth in max_by_session.values() {
        let mut bucket = 0;
        while bucket <= *depth {
            *buckets.entry(bucket).or_default() += 1;
            bucket += SCROLL_BUCKET_STEP;
        }
    }

    buckets
        .into_iter()
        .map(|(bucket_percent, session_count)| ScrollBucket {
            bucket_percent,
            session_count,
            total_sessions,
        })
        .collect()
}

pub async fn click_heatmap(
    log: &dyn EventLog,
    site_id: &str,
    page: &str,
    window: TimeWindow,
) -> Result<Vec<ClickPoint>, CoreError> {
    let events = log
        .events_of_types_in_window(site_id, &[EventType::Click], Some(page), &window)
        .await?;
    Ok(click_points(&events, page))
}

pub async fn scroll_map(
    log: &dyn EventLog,
    site_id: &str,
    page: &str,
    window: TimeWindow,
) -> Result<Vec<ScrollBucket>, CoreError> {
    let events = log
        .events_of_types_in_window(
            site_id,
            &[EventType::ScrollDepth, EventType::Scroll],
            Some(page),
            &window,
        )
        .await?;
    Ok(scroll_histogram(&events))
}
