use anyhow::Result;

use pulsetrack_core::event::{Event, EventType, GeoAttributes, Metadata};
use pulsetrack_core::window::TimeWindow;

use crate::backend::{conversion_error, format_ts, ts_column};
use crate::DuckDbBackend;

const EVENT_COLUMNS: &str = "id, site_id, event_type, session_id, user_id, url, title, referrer, \
     user_agent, metadata, ip_address, ip_city, ip_region, ip_country, ip_timezone, ip_org, \
     ip_latitude, ip_longitude, CAST(created_at AS VARCHAR)";

fn map_event_row(row: &duckdb::Row<'_>) -> Result<Event, duckdb::Error> {
    let event_type: String = row.get(2)?;
    let metadata_raw: String = row.get(9)?;
    let metadata: Metadata =
        serde_json::from_str(&metadata_raw).map_err(|e| conversion_error(9, e.into()))?;
    let created_at: String = row.get(18)?;
    Ok(Event {
        id: row.get(0)?,
        site_id: row.get(1)?,
        event_type: EventType::parse(&event_type),
        session_id: row.get(3)?,
        user_id: row.get(4)?,
        url: row.get(5)?,
        title: row.get(6)?,
        referrer: row.get(7)?,
        user_agent: row.get(8)?,
        metadata,
        created_at: ts_column(18, &created_at)?,
        geo: GeoAttributes {
            ip_address: row.get(10)?,
            ip_city: row.get(11)?,
            ip_region: row.get(12)?,
            ip_country: row.get(13)?,
            ip_timezone: row.get(14)?,
            ip_org: row.get(15)?,
            ip_latitude: row.get(16)?,
            ip_longitude: row.get(17)?,
        },
    })
}

pub async fn insert_event_inner(db: &DuckDbBackend, event: &Event) -> Result<()> {
    let metadata = serde_json::to_string(&event.metadata)?;
    let conn = db.conn.lock().await;
    conn.execute(
        r#"INSERT INTO events (
            id, site_id, event_type, session_id, user_id,
            url, title, referrer, user_agent, metadata,
            ip_address, ip_city, ip_region, ip_country, ip_timezone, ip_org,
            ip_latitude, ip_longitude,
            created_at
        ) VALUES (
            ?1,  ?2,  ?3,  ?4,  ?5,
            ?6,  ?7,  ?8,  ?9,  ?10,
            ?11, ?12, ?13, ?14, ?15, ?16,
            ?17, ?18,
            CAST(?19 AS TIMESTAMP)
        )"#,
        duckdb::params![
            event.id,
            event.site_id,
            event.event_type.as_str(),
            event.session_id,
            event.user_id,
            event.url,
            event.title,
            event.referrer,
            event.user_agent,
            metadata,
            event.geo.ip_address,
            event.geo.ip_city,
            event.geo.ip_region,
            event.geo.ip_country,
            event.geo.ip_timezone,
            event.geo.ip_org,
            event.geo.ip_latitude,
            event.geo.ip_longitude,
            format_ts(event.created_at),
        ],
    )?;
    Ok(())
}

pub async fn events_in_window_inner(
    db: &DuckDbBackend,
    site_id: &str,
    window: &TimeWindow,
) -> Result<Vec<Event>> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM events \
         WHERE site_id = ?1 \
           AND created_at >= CAST(?2 AS TIMESTAMP) \
           AND created_at < CAST(?3 AS TIMESTAMP) \
         ORDER BY created_at, id"
    );
    let conn = db.conn.lock().await;
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        duckdb::params![site_id, format_ts(window.start), format_ts(window.end)],
        map_event_row,
    )?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Events of any of `event_types`, optionally restricted to one `url`.
pub async fn events_of_types_in_window_inner(
    db: &DuckDbBackend,
    site_id: &str,
    event_types: &[EventType],
    page: Option<&str>,
    window: &TimeWindow,
) -> Result<Vec<Event>> {
    if event_types.is_empty() {
        return Ok(Vec::new());
    }

    // Boxed params are not Send; hold the lock before building them.
    let conn = db.conn.lock().await;
    let mut params: Vec<Box<dyn duckdb::types::ToSql>> = vec![
        Box::new(site_id.to_string()),
        Box::new(format_ts(window.start)),
        Box::new(format_ts(window.end)),
    ];
    let mut type_placeholders = Vec::with_capacity(event_types.len());
    for event_type in event_types {
        params.push(Box::new(event_type.as_str().to_string()));
        type_placeholders.push(format!("?{}", params.len()));
    }
    let mut page_clause = String::new();
    if let Some(page) = page {
        params.push(Box::new(page.to_string()));
        page_clause = format!(" AND url = ?{}", params.len());
    }

    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM events \
         WHERE site_id = ?1 \
           AND created_at >= CAST(?2 AS TIMESTAMP) \
           AND created_at < CAST(?3 AS TIMESTAMP) \
           AND event_type IN ({types}){page_clause} \
         ORDER BY created_at, id",
        types = type_placeholders.join(", ")
    );

    let param_refs: Vec<&dyn duckdb::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(param_refs.as_slice(), map_event_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
