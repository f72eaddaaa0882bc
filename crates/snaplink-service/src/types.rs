//! Domain shapes shared by the paths, the worker, and the collaborators.

use serde::{Deserialize, Serialize};
use snaplink::LinkId;
use std::time::{SystemTime, UNIX_EPOCH};

/// Bus field carrying the clicked link's raw id, as a decimal string.
pub const FIELD_URL_ID: &str = "url_id";
/// Bus field carrying an optional caller-supplied correlation token.
pub const FIELD_CORRELATION_ID: &str = "correlation_id";

/// A durable short-code mapping. Written once by the write path, never
/// mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlMapping {
    pub id: LinkId,
    pub original_url: String,
    pub short_code: String,
    pub created_at_ms: u64,
}

/// Additive per-link click counters, maintained solely by the aggregation
/// worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlAnalytics {
    pub url_id: LinkId,
    pub click_count: u64,
    pub last_updated_ms: u64,
}

/// One observed click, carried over the event bus as string field pairs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub url_id: LinkId,
    pub correlation_id: Option<String>,
}

impl ClickEvent {
    /// Renders the event as bus fields.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![(FIELD_URL_ID.to_owned(), self.url_id.to_raw().to_string())];
        if let Some(correlation_id) = &self.correlation_id {
            fields.push((FIELD_CORRELATION_ID.to_owned(), correlation_id.clone()));
        }
        fields
    }

    /// Parses an event back out of bus fields.
    ///
    /// Returns `None` when the `url_id` field is missing or not a decimal
    /// integer; consumers treat such entries as malformed and skip them.
    pub fn from_fields(fields: &[(String, String)]) -> Option<Self> {
        let raw = fields
            .iter()
            .find(|(name, _)| name == FIELD_URL_ID)
            .and_then(|(_, value)| value.parse::<u64>().ok())?;
        let correlation_id = fields
            .iter()
            .find(|(name, _)| name == FIELD_CORRELATION_ID)
            .map(|(_, value)| value.clone());
        Some(Self {
            url_id: LinkId::from_raw(raw),
            correlation_id,
        })
    }
}

/// Result of a successful create: the bare token plus the caller-facing URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedLink {
    pub short_code: String,
    pub short_url: String,
}

/// Milliseconds since the unix epoch, for service-level timestamps.
///
/// These annotate rows for operators; id ordering never depends on them.
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_event_fields_round_trip() {
        let event = ClickEvent {
            url_id: LinkId::from_raw(123_456),
            correlation_id: Some("req-9".to_owned()),
        };
        assert_eq!(ClickEvent::from_fields(&event.to_fields()), Some(event));
    }

    #[test]
    fn correlation_id_is_optional() {
        let event = ClickEvent {
            url_id: LinkId::from_raw(7),
            correlation_id: None,
        };
        let fields = event.to_fields();
        assert_eq!(fields.len(), 1);
        assert_eq!(ClickEvent::from_fields(&fields), Some(event));
    }

    #[test]
    fn malformed_url_id_is_rejected() {
        let fields = vec![(FIELD_URL_ID.to_owned(), "not-a-number".to_owned())];
        assert_eq!(ClickEvent::from_fields(&fields), None);

        let fields = vec![("something_else".to_owned(), "17".to_owned())];
        assert_eq!(ClickEvent::from_fields(&fields), None);
    }
}
