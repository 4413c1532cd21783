//! Resilient subscription to the trace event stream
//!
//! A [`StreamConnection`] owns at most one live transport subscription. It is
//! driven entirely by the viewer event loop: transport tasks only forward
//! [`StreamEvent`]s into a channel, and the loop hands them back here one at a
//! time.

use super::sink::MessageSink;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use witness_common::{TraceError, TraceRecord};

/// Raw event reported by a transport subscription
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    /// Subscription the event belongs to
    pub generation: u64,
    pub kind: StreamEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEventKind {
    Opened,
    Message(String),
    Failed(String),
    Closed,
}

/// Handle to a running transport subscription. Dropping it tears it down.
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// A subscription with nothing to tear down
    #[cfg(test)]
    pub fn detached() -> Self {
        Self { task: None }
    }

    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens push-stream subscriptions
pub trait Transport {
    fn open(
        &self,
        endpoint: &str,
        generation: u64,
        events: mpsc::Sender<StreamEvent>,
    ) -> Subscription;
}

/// Lifecycle of the logical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
    ShutDown,
}

/// What the rest of the viewer needs to hear about
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionUpdate {
    RecordReceived(TraceRecord),
    ConnectivityChanged(bool),
}

pub struct StreamConnection<T: Transport> {
    endpoint: String,
    transport: T,
    events: mpsc::Sender<StreamEvent>,
    reconnect_delay: Duration,
    state: ConnectionState,
    generation: u64,
    subscription: Option<Subscription>,
    /// The single pending reconnect, if any
    reconnect_at: Option<Instant>,
    /// Last connectivity value reported
    connected: Option<bool>,
    sink: Option<Box<dyn MessageSink>>,
}

impl<T: Transport> StreamConnection<T> {
    pub fn new(
        endpoint: impl Into<String>,
        transport: T,
        events: mpsc::Sender<StreamEvent>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
            events,
            reconnect_delay,
            state: ConnectionState::Idle,
            generation: 0,
            subscription: None,
            reconnect_at: None,
            connected: None,
            sink: None,
        }
    }

    /// Keep a copy of every raw message for post-mortem inspection
    pub fn set_sink(&mut self, sink: Box<dyn MessageSink>) {
        self.sink = Some(sink);
    }

    #[cfg(test)]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Establish the subscription unless one is already open or opening.
    ///
    /// Always cancels a pending reconnect. Returns true if a new subscription
    /// was opened.
    pub fn connect(&mut self) -> bool {
        self.reconnect_at = None;

        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => return false,
            ConnectionState::ShutDown => {
                tracing::debug!("Ignoring connect after shutdown");
                return false;
            }
            ConnectionState::Idle | ConnectionState::Closed => {}
        }

        self.generation += 1;
        tracing::debug!(
            "Opening event stream {} (attempt {})",
            self.endpoint,
            self.generation
        );

        self.subscription = Some(self.transport.open(
            &self.endpoint,
            self.generation,
            self.events.clone(),
        ));
        self.state = ConnectionState::Connecting;

        true
    }

    /// The reconnect deadline passed
    pub fn fire_reconnect(&mut self) -> bool {
        if self.reconnect_at.take().is_none() {
            return false;
        }
        self.connect()
    }

    /// Handle an event from a transport subscription
    pub fn handle(&mut self, event: StreamEvent) -> Option<ConnectionUpdate> {
        if event.generation != self.generation || self.subscription.is_none() {
            tracing::trace!("Ignoring event from stale subscription {}", event.generation);
            return None;
        }

        match event.kind {
            StreamEventKind::Opened => {
                self.state = ConnectionState::Open;
                tracing::info!("Connected to {}", self.endpoint);
                self.report_connectivity(true)
            }
            StreamEventKind::Message(raw) => self.decode(raw),
            StreamEventKind::Failed(reason) => {
                let err = TraceError::Connectivity(reason);
                tracing::warn!("{}", err);
                self.drop_subscription()
            }
            StreamEventKind::Closed => {
                tracing::warn!("Event stream closed by server");
                self.drop_subscription()
            }
        }
    }

    /// Close deliberately; nothing is rescheduled afterwards
    pub fn shutdown(&mut self) {
        self.reconnect_at = None;
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
        }
        self.state = ConnectionState::ShutDown;
    }

    fn decode(&mut self, raw: String) -> Option<ConnectionUpdate> {
        if let Some(sink) = self.sink.as_mut() {
            sink.store(&raw);
        }

        match TraceRecord::from_json(&raw) {
            Ok(record) => Some(ConnectionUpdate::RecordReceived(record)),
            Err(e) => {
                tracing::warn!("Dropping message: {}", e);
                None
            }
        }
    }

    fn drop_subscription(&mut self) -> Option<ConnectionUpdate> {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
        }
        self.state = ConnectionState::Closed;

        let deadline = Instant::now() + self.reconnect_delay;
        self.reconnect_at = Some(deadline);
        tracing::info!(
            "Reconnecting in {}s",
            self.reconnect_delay.as_secs_f64()
        );

        self.report_connectivity(false)
    }

    fn report_connectivity(&mut self, connected: bool) -> Option<ConnectionUpdate> {
        if self.connected == Some(connected) {
            return None;
        }
        self.connected = Some(connected);
        Some(ConnectionUpdate::ConnectivityChanged(connected))
    }
}
