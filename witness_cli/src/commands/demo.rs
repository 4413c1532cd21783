//! Demo command: serve synthetic trace records over SSE
//!
//! Every tick starts a new fake round trip and moves the ones already in
//! flight one step further, so the viewer sees the same delivery pattern an
//! instrumented client produces: an in-flight record, a response record and
//! a final `done` record, all sharing one id.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use console::style;
use futures_util::Stream;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;
use witness_common::{
    constants, HeaderMap, RequestError, RequestLog, ResponseLog, Timeline, TimelineEvent,
    TraceRecord,
};

const BASE_URL: &str = "https://api.example.com";

const ROUTES: &[(&str, &str)] = &[
    ("GET", "/v1/users"),
    ("GET", "/v1/users/42"),
    ("POST", "/v1/orders"),
    ("PUT", "/v1/users/42/settings"),
    ("DELETE", "/v1/sessions/current"),
    ("GET", "/health"),
];

const STATUSES: &[(u16, &str)] = &[
    (200, "200 OK"),
    (200, "200 OK"),
    (200, "200 OK"),
    (201, "201 Created"),
    (204, "204 No Content"),
    (304, "304 Not Modified"),
    (404, "404 Not Found"),
    (500, "500 Internal Server Error"),
];

/// Chance a fake round trip ends in a transport error
const ERROR_RATE: f64 = 0.1;

/// Handle demo command
pub async fn run(port: u16, interval_ms: u64) -> Result<()> {
    let app = router(Duration::from_millis(interval_ms.max(1)));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind demo feed on {}", addr))?;

    let endpoint = format!("http://{}{}", addr, constants::EVENTS_PATH);
    println!(
        "{} Serving demo traces at {}",
        style("✓").green().bold(),
        style(&endpoint).cyan()
    );
    println!(
        "  Run {} in another terminal",
        style(format!("witness watch --endpoint {}", endpoint)).bold()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Demo feed failed")?;

    Ok(())
}

/// Router serving the synthetic stream at the events path
pub fn router(interval: Duration) -> Router {
    Router::new()
        .route(constants::EVENTS_PATH, get(events_handler))
        .with_state(interval)
}

async fn events_handler(
    State(interval): State<Duration>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!("Viewer subscribed to demo feed");
    Sse::new(trace_events(interval)).keep_alive(KeepAlive::default())
}

fn trace_events(interval: Duration) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let mut rng = StdRng::from_entropy();
        let mut ticker = tokio::time::interval(interval);
        let mut in_flight: Vec<DemoRequest> = Vec::new();

        loop {
            ticker.tick().await;

            let now = Utc::now();
            let mut records = Vec::with_capacity(in_flight.len() + 1);

            for request in in_flight.iter_mut() {
                records.push(request.advance(now));
            }
            in_flight.retain(|r| !r.is_done());

            // Occasionally skip a beat so rows do not line up perfectly
            if rng.gen_bool(0.8) {
                let mut request = DemoRequest::new(&mut rng, now);
                records.push(request.advance(now));
                in_flight.push(request);
            }

            for record in records {
                match record.to_json() {
                    Ok(data) => yield Ok(Event::default().data(data)),
                    Err(e) => tracing::warn!("Failed to encode demo record: {}", e),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Sent,
    Responded,
    Done,
}

/// A fake round trip that reports itself one delivery at a time
#[derive(Debug, Clone)]
struct DemoRequest {
    id: String,
    method: &'static str,
    url: String,
    started_at: DateTime<Utc>,
    events: Vec<TimelineEvent>,
    status: (u16, &'static str),
    body: String,
    fails: bool,
    stage: Option<Stage>,
}

impl DemoRequest {
    fn new<R: Rng>(rng: &mut R, started_at: DateTime<Utc>) -> Self {
        let (method, path) = ROUTES[rng.gen_range(0..ROUTES.len())];
        let status = STATUSES[rng.gen_range(0..STATUSES.len())];

        let reused = rng.gen_bool(0.6);
        let idle_nanos: i64 = rng.gen_range(1_000_000..5_000_000_000);
        let got_conn = rng.gen_range(50_000..30_000_000);

        let events = vec![
            TimelineEvent {
                name: "GetConn".to_string(),
                delay: 0,
                payload: json!("api.example.com:443"),
            },
            TimelineEvent {
                name: constants::EVENT_GOT_CONN.to_string(),
                delay: got_conn,
                payload: json!({
                    "Reused": reused,
                    "WasIdle": reused,
                    "IdleTime": if reused { idle_nanos } else { 0 },
                }),
            },
            TimelineEvent {
                name: constants::EVENT_WROTE_HEADER_FIELD.to_string(),
                delay: got_conn + 20_000,
                payload: json!({"key": "User-Agent", "value": ["witness-demo/0.1"]}),
            },
            TimelineEvent {
                name: constants::EVENT_WROTE_HEADER_FIELD.to_string(),
                delay: got_conn + 35_000,
                payload: json!({"key": "Accept", "value": ["application/json"]}),
            },
        ];

        let body = if status.0 == 204 || status.0 == 304 {
            String::new()
        } else {
            json!({"ok": status.0 < 400, "items": rng.gen_range(0..50)}).to_string()
        };

        Self {
            id: Uuid::new_v4().to_string(),
            method,
            url: format!("{}{}", BASE_URL, path),
            started_at,
            events,
            status,
            body,
            fails: rng.gen_bool(ERROR_RATE),
            stage: None,
        }
    }

    fn is_done(&self) -> bool {
        self.stage == Some(Stage::Done)
    }

    /// Move to the next stage and describe it as a delivery
    fn advance(&mut self, now: DateTime<Utc>) -> TraceRecord {
        self.stage = Some(match self.stage {
            None => Stage::Sent,
            Some(Stage::Sent) if self.fails => Stage::Done,
            Some(Stage::Sent) => Stage::Responded,
            Some(Stage::Responded) | Some(Stage::Done) => Stage::Done,
        });

        let mut record = TraceRecord {
            id: Some(self.id.clone()),
            request_log: Some(self.request_log()),
            timeline: Some(Timeline {
                started_at: self.started_at,
                events: self.events.clone(),
            }),
            ..Default::default()
        };

        if self.fails {
            if self.is_done() {
                record.error = Some(RequestError {
                    message: format!("{} {}: context deadline exceeded", self.method, self.url),
                    details: json!({"Op": self.method, "URL": self.url, "Err": {}}),
                });
            }
        } else if self.stage != Some(Stage::Sent) {
            record.response_log = Some(self.response_log());
        }

        if self.is_done() {
            let nanos = (now - self.started_at)
                .num_nanoseconds()
                .unwrap_or(0)
                .max(1);
            record.done = true;
            record.duration_nano = Some(nanos);
            record.duration = format_duration(nanos);
        }

        record
    }

    fn request_log(&self) -> RequestLog {
        let mut header = HeaderMap::new();
        header.insert("Accept".to_string(), vec!["application/json".to_string()]);

        RequestLog {
            method: self.method.to_string(),
            url: self.url.clone(),
            query: None,
            header: Some(header),
            body: String::new(),
        }
    }

    fn response_log(&self) -> ResponseLog {
        let mut header = HeaderMap::new();
        header.insert(
            "Content-Type".to_string(),
            vec!["application/json".to_string()],
        );

        ResponseLog {
            status: self.status.1.to_string(),
            status_code: self.status.0,
            header: Some(header),
            content_length: self.body.len() as i64,
            // The body is only known once it has been read
            body: if self.is_done() {
                self.body.clone()
            } else {
                String::new()
            },
        }
    }
}

/// Round a duration to one decimal in its largest unit ("12.3ms", "1.5s")
fn format_duration(nanos: i64) -> String {
    let (value, unit) = if nanos > 1_000_000_000 {
        (nanos as f64 / 1_000_000_000.0, "s")
    } else if nanos > 1_000_000 {
        (nanos as f64 / 1_000_000.0, "ms")
    } else if nanos > 1_000 {
        (nanos as f64 / 1_000.0, "µs")
    } else {
        return format!("{}ns", nanos);
    };

    let rounded = format!("{:.1}", value);
    let rounded = rounded.strip_suffix(".0").unwrap_or(&rounded);
    format!("{}{}", rounded, unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::{SseTransport, StreamEvent, StreamEventKind, Transport};
    use tokio::sync::mpsc;

    fn request(fails: bool) -> (DemoRequest, DateTime<Utc>) {
        let mut rng = StdRng::seed_from_u64(7);
        let started_at = Utc::now();
        let mut request = DemoRequest::new(&mut rng, started_at);
        request.fails = fails;
        (request, started_at)
    }

    #[test]
    fn test_successful_request_deliveries() {
        let (mut request, started_at) = request(false);
        let later = started_at + chrono::Duration::milliseconds(120);

        let sent = request.advance(started_at);
        let responded = request.advance(later);
        let done = request.advance(later);

        for record in [&sent, &responded, &done] {
            assert_eq!(record.validate().unwrap(), request.id);
            assert!(record.error.is_none());
        }

        assert!(sent.response_log.is_none());
        assert!(!sent.done);

        assert!(responded.response_log.is_some());
        assert!(!responded.done);

        assert!(done.done);
        assert_eq!(done.duration_nano, Some(120_000_000));
        assert_eq!(done.duration, "120ms");
        assert!(request.is_done());
    }

    #[test]
    fn test_failed_request_deliveries() {
        let (mut request, started_at) = request(true);

        let sent = request.advance(started_at);
        let done = request.advance(started_at + chrono::Duration::seconds(2));

        assert!(sent.error.is_none());
        assert!(done.done);
        assert!(done.error.is_some());
        assert!(done.response_log.is_none());
        assert_eq!(done.duration, "2s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(800), "800ns");
        assert_eq!(format_duration(12_340), "12.3µs");
        assert_eq!(format_duration(12_340_000), "12.3ms");
        assert_eq!(format_duration(1_500_000_000), "1.5s");
    }

    #[tokio::test]
    async fn test_feed_streams_records() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(Duration::from_millis(5))).await.ok();
        });

        let transport = SseTransport::new().unwrap();
        let (tx, mut rx) = mpsc::channel::<StreamEvent>(16);
        let endpoint = format!("http://{}{}", addr, constants::EVENTS_PATH);
        let _subscription = transport.open(&endpoint, 1, tx);

        let opened = rx.recv().await.unwrap();
        assert_eq!(opened.kind, StreamEventKind::Opened);

        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let StreamEventKind::Message(raw) = message.kind else {
            panic!("expected a message, got {:?}", message.kind);
        };
        let record = TraceRecord::from_json(&raw).unwrap();
        assert!(record.validate().is_ok());
    }
}
