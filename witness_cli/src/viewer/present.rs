//! Presentation inputs derived from trace records
//!
//! The core never paints anything itself. It hands summary lines, detail views
//! and waterfall geometry to a [`Presenter`].

use super::store::{LogEntry, RowHandle};
use super::waterfall::Waterfall;
use serde::Serialize;
use serde_json::Value;
use witness_common::{constants, TimelineEvent, TraceRecord};

/// Sink for everything the viewer wants drawn
pub trait Presenter {
    /// Stream connected or dropped
    fn connectivity_changed(&mut self, connected: bool);

    /// Paint (or repaint) the row named by `entry.handle`
    fn render_entry(&mut self, entry: RenderedEntry, is_new: bool);

    /// Reposition every timing bar
    fn update_waterfall(&mut self, waterfall: &Waterfall);

    /// A row fell off the visible list
    fn row_evicted(&mut self, _handle: RowHandle) {}

    /// All visible rows were dropped
    fn rows_cleared(&mut self) {}
}

/// Everything a presenter needs to draw one row
#[derive(Debug, Clone)]
pub struct RenderedEntry {
    pub handle: RowHandle,
    pub id: String,
    pub had_error: bool,
    pub done: bool,
    pub summary: SummaryLine,
    /// Kept so the detail view can be built on demand
    pub record: TraceRecord,
}

impl RenderedEntry {
    pub fn from_entry(entry: &LogEntry) -> Self {
        Self {
            handle: entry.handle,
            id: entry.id.clone(),
            had_error: entry.had_error,
            done: entry.latest_record.done,
            summary: SummaryLine::from_record(&entry.latest_record),
            record: entry.latest_record.clone(),
        }
    }

    pub fn detail(&self) -> DetailView {
        DetailView::from_record(&self.record)
    }
}

/// Response status grouped by its leading digit (2 for 2xx, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusClass(pub u16);

impl StatusClass {
    pub fn from_code(code: u16) -> Self {
        Self(code / 100)
    }
}

/// Inputs for a single summary line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryLine {
    pub method: String,
    pub url: String,
    pub status: Option<String>,
    pub status_class: Option<StatusClass>,
    pub size: Option<String>,
    pub duration: String,
    pub error: Option<String>,
}

impl SummaryLine {
    pub fn from_record(record: &TraceRecord) -> Self {
        let res = record.response_log.as_ref();

        Self {
            method: record.method().to_string(),
            url: record.url().to_string(),
            status: res.map(|r| r.status.clone()),
            status_class: res.map(|r| StatusClass::from_code(r.status_code)),
            size: res.map(|r| format_byte_len(r.content_length)),
            duration: record.duration.clone(),
            error: record.error.as_ref().map(|e| e.message.clone()),
        }
    }

    /// Single-line rendering, empty parts skipped
    pub fn to_line(&self) -> String {
        let parts = [
            self.method.as_str(),
            self.url.as_str(),
            self.status.as_deref().unwrap_or(""),
            self.size.as_deref().unwrap_or(""),
            self.duration.as_str(),
            self.error.as_deref().unwrap_or(""),
        ];

        parts
            .iter()
            .filter(|p| !p.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One line of the expanded timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineLine {
    pub name: String,
    pub delay_ms: String,
    pub summary: String,
}

impl TimelineLine {
    fn from_event(event: &TimelineEvent) -> Self {
        Self {
            name: event.name.clone(),
            delay_ms: to_fixed(event.delay_millis(), 1),
            summary: payload_summary(event),
        }
    }

    pub fn to_line(&self) -> String {
        if self.summary.is_empty() {
            format!("{} - {}ms", self.name, self.delay_ms)
        } else {
            format!("{} - {}ms {}", self.name, self.delay_ms, self.summary)
        }
    }
}

/// Expanded view of a single request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailView {
    pub response_body: Option<String>,
    pub error_details: Option<String>,
    pub timeline: Vec<TimelineLine>,
    pub end: String,
}

impl DetailView {
    pub fn from_record(record: &TraceRecord) -> Self {
        let response_body = record
            .response_log
            .as_ref()
            .filter(|r| !r.body.is_empty())
            .map(|r| pretty_body(&r.body));

        let error_details = record.error.as_ref().map(|e| pretty_json(&e.details));

        let timeline = record
            .timeline
            .as_ref()
            .map(|t| t.events.iter().map(TimelineLine::from_event).collect())
            .unwrap_or_default();

        Self {
            response_body,
            error_details,
            timeline,
            end: record.duration.clone(),
        }
    }

    /// Flatten the view into display lines
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(body) = &self.response_body {
            lines.push("response body:".to_string());
            lines.extend(body.lines().map(|l| format!("  {}", l)));
        }

        if let Some(details) = &self.error_details {
            lines.push("error details:".to_string());
            lines.extend(details.lines().map(|l| format!("  {}", l)));
        }

        lines.push("timeline:".to_string());
        lines.extend(self.timeline.iter().map(|t| format!("  {}", t.to_line())));
        lines.push(format!("end: {}", self.end));

        lines
    }
}

/// Short description of a timeline event payload
pub fn payload_summary(event: &TimelineEvent) -> String {
    let payload = &event.payload;

    match event.name.as_str() {
        constants::EVENT_GOT_CONN => {
            let reused = payload["Reused"].as_bool().unwrap_or(false);
            let was_idle = payload["WasIdle"].as_bool().unwrap_or(false);

            match (reused, was_idle) {
                (true, true) => format!("reused, idle for {}", plain_value(&payload["IdleTime"])),
                (true, false) => "reused, not idle".to_string(),
                (false, _) => "new".to_string(),
            }
        }
        constants::EVENT_WROTE_HEADER_FIELD => {
            let values = payload["value"]
                .as_array()
                .map(|values| values.iter().map(plain_value).collect::<Vec<_>>())
                .unwrap_or_default();

            format!("{}: {}", plain_value(&payload["key"]), values.join(", "))
        }
        _ => String::new(),
    }
}

/// Human-readable byte length (decimal units)
pub fn format_byte_len(n: i64) -> String {
    if n < 1_000 {
        format!("{}B", n)
    } else if n < 1_000_000 {
        format!("{}kB", to_fixed(n as f64 / 1_000.0, 2))
    } else if n < 1_000_000_000 {
        format!("{}MB", to_fixed(n as f64 / 1_000_000.0, 2))
    } else {
        format!("{}GB", to_fixed(n as f64 / 1_000_000_000.0, 2))
    }
}

/// Fixed-point formatting with ties rounded away from zero
fn to_fixed(value: f64, digits: usize) -> String {
    let scale = 10f64.powi(digits as i32);
    format!("{:.*}", digits, (value * scale).round() / scale)
}

/// Strings print bare, everything else as JSON
fn plain_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Pretty-print a JSON body, falling back to the raw text
fn pretty_body(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => pretty_json(&value),
        Err(_) => body.to_string(),
    }
}

fn pretty_json(value: &Value) -> String {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);

    match value.serialize(&mut ser) {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use witness_common::{RequestError, RequestLog, ResponseLog};

    fn event(name: &str, payload: Value, delay: i64) -> TimelineEvent {
        TimelineEvent {
            name: name.to_string(),
            delay,
            payload,
        }
    }

    #[test]
    fn test_format_byte_len() {
        assert_eq!(format_byte_len(0), "0B");
        assert_eq!(format_byte_len(999), "999B");
        assert_eq!(format_byte_len(1000), "1.00kB");
        assert_eq!(format_byte_len(1532), "1.53kB");
        assert_eq!(format_byte_len(999_999), "1000.00kB");
        assert_eq!(format_byte_len(1_000_000), "1.00MB");
        assert_eq!(format_byte_len(1125), "1.13kB");
        assert_eq!(format_byte_len(2_625_000), "2.63MB");
        assert_eq!(format_byte_len(1_000_000_000), "1.00GB");
        assert_eq!(format_byte_len(-1), "-1B");
    }

    #[test]
    fn test_timeline_delay_rounds_ties_up() {
        let line = TimelineLine::from_event(&event("GetConn", json!("example.com:443"), 1_250_000));
        assert_eq!(line.to_line(), "GetConn - 1.3ms");

        let line = TimelineLine::from_event(&event("GetConn", Value::Null, 50_000));
        assert_eq!(line.to_line(), "GetConn - 0.1ms");
    }

    #[test]
    fn test_got_conn_summary() {
        let idle = event(
            "GotConn",
            json!({"Reused": true, "WasIdle": true, "IdleTime": "5s"}),
            0,
        );
        assert_eq!(payload_summary(&idle), "reused, idle for 5s");

        let busy = event("GotConn", json!({"Reused": true, "WasIdle": false}), 0);
        assert_eq!(payload_summary(&busy), "reused, not idle");

        let fresh = event("GotConn", json!({"Reused": false, "WasIdle": true}), 0);
        assert_eq!(payload_summary(&fresh), "new");
    }

    #[test]
    fn test_wrote_header_field_summary() {
        let header = event(
            "WroteHeaderField",
            json!({"key": "Accept", "value": ["a", "b"]}),
            0,
        );
        assert_eq!(payload_summary(&header), "Accept: a, b");
    }

    #[test]
    fn test_other_events_have_no_summary() {
        let dns = event("DNSStart", json!({"Host": "example.com"}), 0);
        assert_eq!(payload_summary(&dns), "");
    }

    #[test]
    fn test_status_class() {
        assert_eq!(StatusClass::from_code(204), StatusClass(2));
        assert_eq!(StatusClass::from_code(404), StatusClass(4));
        assert_eq!(StatusClass::from_code(599), StatusClass(5));
    }

    #[test]
    fn test_summary_line() {
        let record = TraceRecord {
            id: Some("a".to_string()),
            request_log: Some(RequestLog {
                method: "GET".to_string(),
                url: "http://localhost/items".to_string(),
                ..Default::default()
            }),
            response_log: Some(ResponseLog {
                status: "404 Not Found".to_string(),
                status_code: 404,
                content_length: 2048,
                ..Default::default()
            }),
            duration: "3.2ms".to_string(),
            ..Default::default()
        };

        let summary = SummaryLine::from_record(&record);
        assert_eq!(summary.status_class, Some(StatusClass(4)));
        assert_eq!(summary.size.as_deref(), Some("2.05kB"));
        assert_eq!(
            summary.to_line(),
            "GET http://localhost/items 404 Not Found 2.05kB 3.2ms"
        );
    }

    #[test]
    fn test_summary_line_without_response() {
        let record = TraceRecord {
            request_log: Some(RequestLog {
                method: "POST".to_string(),
                url: "http://localhost/upload".to_string(),
                ..Default::default()
            }),
            error: Some(RequestError {
                message: "dial tcp: connection refused".to_string(),
                details: Value::Null,
            }),
            ..Default::default()
        };

        let summary = SummaryLine::from_record(&record);
        assert!(summary.status.is_none());
        assert!(summary.size.is_none());
        assert_eq!(
            summary.to_line(),
            "POST http://localhost/upload dial tcp: connection refused"
        );
    }

    #[test]
    fn test_detail_view() {
        let record = TraceRecord {
            response_log: Some(ResponseLog {
                body: r#"{"ok":true}"#.to_string(),
                ..Default::default()
            }),
            error: Some(RequestError {
                message: "boom".to_string(),
                details: json!({"Op": "read"}),
            }),
            timeline: Some(witness_common::Timeline {
                started_at: chrono::Utc::now(),
                events: vec![
                    event("GetConn", json!("example.com:443"), 140_000),
                    event("GotConn", json!({"Reused": false}), 2_340_000),
                    event(
                        "WroteHeaderField",
                        json!({"key": "Host", "value": ["example.com"]}),
                        2_500_000,
                    ),
                ],
            }),
            duration: "12.3ms".to_string(),
            ..Default::default()
        };

        let detail = DetailView::from_record(&record);
        assert_eq!(detail.response_body.as_deref(), Some("{\n    \"ok\": true\n}"));
        assert_eq!(detail.error_details.as_deref(), Some("{\n    \"Op\": \"read\"\n}"));

        let timeline: Vec<_> = detail.timeline.iter().map(|t| t.to_line()).collect();
        assert_eq!(
            timeline,
            vec![
                "GetConn - 0.1ms",
                "GotConn - 2.3ms new",
                "WroteHeaderField - 2.5ms Host: example.com",
            ]
        );
        assert_eq!(detail.lines().last().unwrap(), "end: 12.3ms");
    }

    #[test]
    fn test_detail_view_keeps_non_json_body() {
        let record = TraceRecord {
            response_log: Some(ResponseLog {
                body: "plain text".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let detail = DetailView::from_record(&record);
        assert_eq!(detail.response_body.as_deref(), Some("plain text"));
        assert!(detail.error_details.is_none());
        assert!(detail.timeline.is_empty());
    }
}
