//! Witness Common - Wire types for the HTTP trace stream
//!
//! An instrumented HTTP client reports every round trip as a series of JSON
//! trace records pushed over server-sent events. This crate holds the record
//! definitions and decoding helpers shared by the viewer and the demo feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Trace errors
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Failed to decode trace record: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid trace record: {0}")]
    InvalidRecord(String),

    #[error("Stream connection lost: {0}")]
    Connectivity(String),
}

/// Header map as emitted by the instrumented client (name -> values)
pub type HeaderMap = BTreeMap<String, Vec<String>>;

/// One delivery describing a request's current or final observed state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    /// Stable identity shared by every delivery of the same request
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub request_log: Option<RequestLog>,

    /// Present once a response has been received
    #[serde(default)]
    pub response_log: Option<ResponseLog>,

    #[serde(default)]
    pub error: Option<RequestError>,

    #[serde(default)]
    pub timeline: Option<Timeline>,

    /// Rounded human-readable duration, empty until the request is done
    #[serde(default)]
    pub duration: String,

    #[serde(default)]
    pub duration_nano: Option<i64>,

    /// Marks the final delivery for this id
    #[serde(default)]
    pub done: bool,
}

/// Request metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestLog {
    #[serde(default)]
    pub method: String,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub query: Option<HeaderMap>,

    #[serde(default)]
    pub header: Option<HeaderMap>,

    #[serde(default)]
    pub body: String,
}

/// Response metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseLog {
    /// Status line text, e.g. "200 OK"
    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub status_code: u16,

    #[serde(default)]
    pub header: Option<HeaderMap>,

    /// -1 when the length is not known
    #[serde(default)]
    pub content_length: i64,

    #[serde(default)]
    pub body: String,
}

/// Upstream error attached to a round trip
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestError {
    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub details: serde_json::Value,
}

/// Ordered sub-events of a single round trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub started_at: DateTime<Utc>,

    #[serde(default)]
    pub events: Vec<TimelineEvent>,
}

/// A single timeline event (connection reuse, header write, body read, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub name: String,

    /// Nanoseconds since the timeline started
    #[serde(default)]
    pub delay: i64,

    #[serde(default)]
    pub payload: serde_json::Value,
}

impl TimelineEvent {
    /// Delay in fractional milliseconds
    pub fn delay_millis(&self) -> f64 {
        self.delay as f64 / 1_000_000.0
    }
}

impl TraceRecord {
    /// Decode a record from a raw stream message
    pub fn from_json(s: &str) -> Result<Self, TraceError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Encode the record as it travels on the wire
    pub fn to_json(&self) -> Result<String, TraceError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check the structural requirements and return the record identity
    pub fn validate(&self) -> Result<&str, TraceError> {
        let id = match self.id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => return Err(TraceError::InvalidRecord("missing id".to_string())),
        };

        if self.timeline.is_none() {
            return Err(TraceError::InvalidRecord(format!(
                "record {} has no timeline",
                id
            )));
        }

        Ok(id)
    }

    /// When the round trip started
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.timeline.as_ref().map(|t| t.started_at)
    }

    /// Total duration in milliseconds, if already reported
    pub fn duration_millis(&self) -> Option<f64> {
        self.duration_nano.map(|n| n as f64 / 1_000_000.0)
    }

    pub fn method(&self) -> &str {
        self.request_log.as_ref().map(|r| r.method.as_str()).unwrap_or("")
    }

    pub fn url(&self) -> &str {
        self.request_log.as_ref().map(|r| r.url.as_str()).unwrap_or("")
    }
}

/// Constants for the trace stream
pub mod constants {
    /// Port the instrumented server streams events on
    pub const DEFAULT_PORT: u16 = 8989;

    /// Path of the event stream
    pub const EVENTS_PATH: &str = "/events";

    /// Default stream endpoint (loopback only)
    pub const DEFAULT_ENDPOINT: &str = "http://localhost:8989/events";

    /// Delay before reconnecting after the stream drops
    pub const RECONNECT_DELAY_SECONDS: u64 = 10;

    /// Timeline event names with a payload summary
    pub const EVENT_GOT_CONN: &str = "GotConn";
    pub const EVENT_WROTE_HEADER_FIELD: &str = "WroteHeaderField";
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "id": "4f1c2a9e-0b4d-4a57-9c3e-2f6b8d1e7a10",
        "requestLog": {
            "method": "GET",
            "url": "https://example.com/api/items?page=2",
            "query": {"page": ["2"]},
            "header": {"Accept": ["application/json"]},
            "body": ""
        },
        "responseLog": {
            "status": "200 OK",
            "statusCode": 200,
            "header": {"Content-Type": ["application/json"]},
            "contentLength": 1532,
            "body": "{\"items\":[]}"
        },
        "error": null,
        "timeline": {
            "startedAt": "2024-03-01T10:15:30.123456789Z",
            "events": [
                {"name": "GetConn", "payload": "example.com:443", "delay": 120000},
                {"name": "GotConn", "payload": {"Reused": true, "WasIdle": true, "IdleTime": 5000000000}, "delay": 2500000}
            ]
        },
        "duration": "12.3ms",
        "durationNano": 12345678,
        "done": true
    }"#;

    #[test]
    fn test_decode_full_record() {
        let record = TraceRecord::from_json(SAMPLE).unwrap();

        assert_eq!(record.validate().unwrap(), "4f1c2a9e-0b4d-4a57-9c3e-2f6b8d1e7a10");
        assert_eq!(record.method(), "GET");
        assert_eq!(record.url(), "https://example.com/api/items?page=2");
        assert!(record.done);
        assert!(record.error.is_none());

        let res = record.response_log.as_ref().unwrap();
        assert_eq!(res.status_code, 200);
        assert_eq!(res.content_length, 1532);

        let timeline = record.timeline.as_ref().unwrap();
        assert_eq!(timeline.events.len(), 2);
        assert_eq!(timeline.events[1].name, "GotConn");
        assert!((timeline.events[1].delay_millis() - 2.5).abs() < 1e-9);
        assert!((record.duration_millis().unwrap() - 12.345678).abs() < 1e-9);
    }

    #[test]
    fn test_decode_in_flight_record() {
        let json = r#"{
            "id": "a",
            "requestLog": {"method": "POST", "url": "http://localhost/x"},
            "responseLog": null,
            "timeline": {"startedAt": "2024-03-01T10:15:30Z", "events": []},
            "duration": "",
            "done": false
        }"#;

        let record = TraceRecord::from_json(json).unwrap();
        assert!(!record.done);
        assert!(record.response_log.is_none());
        assert!(record.duration_millis().is_none());
    }

    #[test]
    fn test_missing_id_is_invalid() {
        let json = r#"{"timeline": {"startedAt": "2024-03-01T10:15:30Z", "events": []}}"#;
        let record = TraceRecord::from_json(json).unwrap();
        assert!(matches!(record.validate(), Err(TraceError::InvalidRecord(_))));

        let record = TraceRecord {
            id: Some(String::new()),
            ..record
        };
        assert!(matches!(record.validate(), Err(TraceError::InvalidRecord(_))));
    }

    #[test]
    fn test_missing_timeline_is_invalid() {
        let record = TraceRecord {
            id: Some("a".to_string()),
            ..Default::default()
        };
        assert!(matches!(record.validate(), Err(TraceError::InvalidRecord(_))));
    }

    #[test]
    fn test_malformed_json_is_decode_error() {
        let err = TraceRecord::from_json("{not json").unwrap_err();
        assert!(matches!(err, TraceError::Decode(_)));
    }
}
