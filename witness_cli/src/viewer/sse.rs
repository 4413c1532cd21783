//! Server-sent events transport for the trace stream

use super::connection::{StreamEvent, StreamEventKind, Subscription, Transport};
use bytes::{Buf, BytesMut};
use futures_util::StreamExt;
use reqwest::{header, Client};
use std::time::Duration;
use tokio::sync::mpsc;

/// Longest line buffered while waiting for its newline
const MAX_LINE_LEN: usize = 1 << 20;

/// Incremental decoder turning body chunks into SSE `data` payloads
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: BytesMut,
    /// Leading bytes of `buf` already searched for a newline
    scanned: usize,
    /// Skipping the remainder of an oversized line
    discarding: bool,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a body chunk and collect every message completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut messages = Vec::new();

        loop {
            let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') else {
                self.scanned = self.buf.len();
                if self.scanned > MAX_LINE_LEN {
                    if !self.discarding {
                        tracing::warn!("Dropping stream line longer than {} bytes", MAX_LINE_LEN);
                    }
                    self.buf.clear();
                    self.scanned = 0;
                    self.discarding = true;
                }
                break;
            };

            let line = self.buf.split_to(self.scanned + offset);
            self.buf.advance(1);
            self.scanned = 0;

            if self.discarding {
                self.discarding = false;
                continue;
            }

            if let Some(message) = self.process_line(&line) {
                messages.push(message);
            }
        }

        messages
    }

    fn process_line(&mut self, line: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(line);
        let line = line.strip_suffix('\r').unwrap_or(line.as_ref());

        if line.is_empty() {
            // Blank line dispatches the pending event
            if self.data.is_empty() {
                return None;
            }
            let message = self.data.join("\n");
            self.data.clear();
            return Some(message);
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }
}

/// Default transport: a streaming GET against the event endpoint
#[derive(Clone)]
pub struct SseTransport {
    client: Client,
}

impl SseTransport {
    pub fn new() -> reqwest::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .no_proxy()
            .build()?;

        Ok(Self { client })
    }
}

impl Transport for SseTransport {
    fn open(
        &self,
        endpoint: &str,
        generation: u64,
        events: mpsc::Sender<StreamEvent>,
    ) -> Subscription {
        let client = self.client.clone();
        let endpoint = endpoint.to_string();

        let task = tokio::spawn(async move {
            let send = move |kind: StreamEventKind| {
                let events = events.clone();
                async move {
                    let _ = events.send(StreamEvent { generation, kind }).await;
                }
            };

            let response = match client
                .get(&endpoint)
                .header(header::ACCEPT, "text/event-stream")
                .header(header::CACHE_CONTROL, "no-cache")
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    send(StreamEventKind::Failed(e.to_string())).await;
                    return;
                }
            };

            if !response.status().is_success() {
                send(StreamEventKind::Failed(format!(
                    "event stream returned {}",
                    response.status()
                )))
                .await;
                return;
            }

            send(StreamEventKind::Opened).await;

            let mut decoder = SseDecoder::new();
            let mut body = response.bytes_stream();

            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(chunk) => {
                        for message in decoder.push(&chunk) {
                            send(StreamEventKind::Message(message)).await;
                        }
                    }
                    Err(e) => {
                        send(StreamEventKind::Failed(e.to_string())).await;
                        return;
                    }
                }
            }

            send(StreamEventKind::Closed).await;
        });

        Subscription::from_task(task)
    }
}
