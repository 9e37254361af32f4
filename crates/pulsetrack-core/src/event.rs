use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::CoreError;

/// Event type emitted by the tracker. Unknown wire values are preserved in
/// [`EventType::Other`] so ingestion never rejects a new tracker build.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Pageview,
    Click,
    ButtonClick,
    LinkClick,
    FormSubmit,
    Scroll,
    ScrollDepth,
    TimeOnPage,
    PageHidden,
    PageVisible,
    JavascriptError,
    PagePerformance,
    CustomEvent,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Pageview => "pageview",
            EventType::Click => "click",
            EventType::ButtonClick => "button_click",
            EventType::LinkClick => "link_click",
            EventType::FormSubmit => "form_submit",
            EventType::Scroll => "scroll",
            EventType::ScrollDepth => "scroll_depth",
            EventType::TimeOnPage => "time_on_page",
            EventType::PageHidden => "page_hidden",
            EventType::PageVisible => "page_visible",
            EventType::JavascriptError => "javascript_error",
            EventType::PagePerformance => "page_performance",
            EventType::CustomEvent => "custom_event",
            EventType::Other(raw) => raw.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "pageview" => EventType::Pageview,
            "click" => EventType::Click,
            "button_click" => EventType::ButtonClick,
            "link_click" => EventType::LinkClick,
            "form_submit" => EventType::FormSubmit,
            "scroll" => EventType::Scroll,
            "scroll_depth" => EventType::ScrollDepth,
            "time_on_page" => EventType::TimeOnPage,
            "page_hidden" => EventType::PageHidden,
            "page_visible" => EventType::PageVisible,
            "javascript_error" => EventType::JavascriptError,
            "page_performance" => EventType::PagePerformance,
            "custom_event" => EventType::CustomEvent,
            other => EventType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(EventType::parse(&raw))
    }
}

/// A single metadata value. Only scalars are stored; nested JSON received at
/// ingestion is flattened to its JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl MetadataValue {
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => MetadataValue::Null,
            Value::Bool(b) => MetadataValue::Bool(b),
            Value::Number(n) => n
                .as_f64()
                .map(MetadataValue::Number)
                .unwrap_or_else(|| MetadataValue::Text(n.to_string())),
            Value::String(s) => MetadataValue::Text(s),
            nested @ (Value::Array(_) | Value::Object(_)) => MetadataValue::Text(nested.to_string()),
        }
    }

    /// Numeric view of the value. Numeric strings are accepted because older
    /// tracker builds stringify coordinates.
    pub fn as_f64(&self) -> Option<f64> {
        let n = match self {
            MetadataValue::Number(n) => *n,
            MetadataValue::Text(s) => s.trim().parse::<f64>().ok()?,
            MetadataValue::Null | MetadataValue::Bool(_) => return None,
        };
        n.is_finite().then_some(n)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Null => f.write_str("null"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Number(n) => write!(f, "{n}"),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

pub fn metadata_from_json(map: serde_json::Map<String, Value>) -> Metadata {
    map.into_iter()
        .map(|(k, v)| (k, MetadataValue::from_json(v)))
        .collect()
}

/// Geolocation attributes attached by the HTTP layer. The engine only reads them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoAttributes {
    pub ip_address: Option<String>,
    pub ip_city: Option<String>,
    pub ip_region: Option<String>,
    pub ip_country: Option<String>,
    pub ip_timezone: Option<String>,
    pub ip_org: Option<String>,
    pub ip_latitude: Option<f64>,
    pub ip_longitude: Option<f64>,
}

/// A stored event. Mirrors the `events` table columns; never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub site_id: String,
    pub event_type: EventType,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub geo: GeoAttributes,
}

impl Event {
    /// A bare event with a fresh UUID and every optional attribute empty.
    pub fn new(site_id: &str, event_type: EventType, created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            site_id: site_id.to_string(),
            event_type,
            session_id: None,
            user_id: None,
            url: None,
            title: None,
            referrer: None,
            user_agent: None,
            metadata: Metadata::new(),
            created_at,
            geo: GeoAttributes::default(),
        }
    }

    pub fn metadata_f64(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(MetadataValue::as_f64)
    }

    pub fn metadata_value(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.get(key).filter(|v| !matches!(v, MetadataValue::Null))
    }
}

/// Body of `POST /api/track`.
///
/// The tracker also spreads metadata keys onto the top level of the payload,
/// so unknown fields are ignored rather than rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackPayload {
    pub site_id: Option<String>,
    pub event_type: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, Value>>,
}

impl TrackPayload {
    /// Validate required fields and build the event to persist.
    pub fn into_event(self, created_at: DateTime<Utc>) -> Result<Event, CoreError> {
        let site_id = required(self.site_id, "site_id")?;
        let event_type = required(self.event_type, "event_type")?;

        let mut event = Event::new(&site_id, EventType::parse(&event_type), created_at);
        event.session_id = self.session_id;
        event.user_id = self.user_id;
        event.url = self.url;
        event.title = self.title;
        event.referrer = self.referrer;
        event.user_agent = self.user_agent;
        event.metadata = self.metadata.map(metadata_from_json).unwrap_or_default();
        Ok(event)
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, CoreError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(CoreError::Validation(format!("{field} is required"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_type_round_trips_known_and_unknown() {
        assert_eq!(EventType::parse("javascript_error"), EventType::JavascriptError);
        assert_eq!(EventType::JavascriptError.as_str(), "javascript_error");
        let other = EventType::parse("video_play");
        assert_eq!(other, EventType::Other("video_play".to_string()));
        assert_eq!(other.as_str(), "video_play");
    }

    #[test]
    fn nested_metadata_is_flattened_to_text() {
        let meta = metadata_from_json(
            json!({
                "click_x": 10,
                "label": "buy",
                "flag": true,
                "gone": null,
                "nested": {"a": 1}
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
        );
        assert_eq!(meta["click_x"], MetadataValue::Number(10.0));
        assert_eq!(meta["label"], MetadataValue::Text("buy".to_string()));
        assert_eq!(meta["flag"], MetadataValue::Bool(true));
        assert_eq!(meta["gone"], MetadataValue::Null);
        assert_eq!(meta["nested"], MetadataValue::Text(r#"{"a":1}"#.to_string()));
    }

    #[test]
    fn numeric_strings_read_as_numbers() {
        assert_eq!(MetadataValue::Text(" 12.5 ".into()).as_f64(), Some(12.5));
        assert_eq!(MetadataValue::Text("abc".into()).as_f64(), None);
        assert_eq!(MetadataValue::Bool(true).as_f64(), None);
    }

    #[test]
    fn stored_metadata_deserializes_into_scalars() {
        let meta: Metadata =
            serde_json::from_str(r#"{"a":null,"b":false,"c":3,"d":"x"}"#).expect("parse");
        assert_eq!(meta["a"], MetadataValue::Null);
        assert_eq!(meta["b"], MetadataValue::Bool(false));
        assert_eq!(meta["c"], MetadataValue::Number(3.0));
        assert_eq!(meta["d"], MetadataValue::Text("x".into()));
    }

    #[test]
    fn payload_without_event_type_is_rejected() {
        let payload = TrackPayload {
            site_id: Some("site_1".into()),
            ..TrackPayload::default()
        };
        let err = payload.into_event(Utc::now()).expect_err("must fail");
        assert!(matches!(err, CoreError::Validation(msg) if msg.contains("event_type")));
    }

    #[test]
    fn payload_builds_event_with_metadata() {
        let payload: TrackPayload = serde_json::from_value(json!({
            "site_id": "site_1",
            "event_type": "click",
            "url": "https://example.com/",
            "metadata": {"click_x": 5, "click_y": 7},
            "click_x": 5
        }))
        .expect("payload");
        let event = payload.into_event(Utc::now()).expect("event");
        assert_eq!(event.event_type, EventType::Click);
        assert_eq!(event.metadata_f64("click_y"), Some(7.0));
        assert!(!event.id.is_empty());
    }
}
