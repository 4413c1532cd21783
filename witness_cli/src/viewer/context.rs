//! Viewer state and event dispatch

use super::connection::{ConnectionUpdate, StreamConnection, StreamEvent, Transport};
use super::present::{Presenter, RenderedEntry};
use super::store::TraceRecordStore;
use super::waterfall::{self, VisibleRows, Waterfall};
use tokio::time::Instant;
use witness_common::{TraceError, TraceRecord};

/// Everything the viewer reacts to, processed strictly in order
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    /// Raw event from a transport subscription
    Transport(StreamEvent),
    /// A decoded trace record
    RecordReceived(TraceRecord),
    ConnectivityChanged(bool),
    /// The view became visible or focused again
    VisibilityTick,
    /// The pending reconnect deadline passed
    ReconnectDue,
    /// Drop all visible rows
    Clear,
    Shutdown,
}

impl From<ConnectionUpdate> for ViewerEvent {
    fn from(update: ConnectionUpdate) -> Self {
        match update {
            ConnectionUpdate::RecordReceived(record) => ViewerEvent::RecordReceived(record),
            ConnectionUpdate::ConnectivityChanged(c) => ViewerEvent::ConnectivityChanged(c),
        }
    }
}

/// The single viewer state, constructed once at startup
pub struct ViewerContext<T: Transport, P: Presenter> {
    connection: StreamConnection<T>,
    store: TraceRecordStore,
    rows: VisibleRows,
    presenter: P,
}

impl<T: Transport, P: Presenter> ViewerContext<T, P> {
    pub fn new(connection: StreamConnection<T>, presenter: P, max_rows: usize) -> Self {
        Self {
            connection,
            store: TraceRecordStore::new(),
            rows: VisibleRows::new(max_rows),
            presenter,
        }
    }

    /// Report the initial disconnected state and open the stream
    pub fn start(&mut self) {
        self.presenter.connectivity_changed(false);
        self.connection.connect();
    }

    pub fn dispatch(&mut self, event: ViewerEvent) {
        match event {
            ViewerEvent::Transport(event) => {
                if let Some(update) = self.connection.handle(event) {
                    self.dispatch(update.into());
                }
            }
            ViewerEvent::RecordReceived(record) => {
                if let Err(e) = self.ingest(record) {
                    tracing::warn!("Rejected trace record: {}", e);
                }
            }
            ViewerEvent::ConnectivityChanged(connected) => {
                self.presenter.connectivity_changed(connected);
            }
            ViewerEvent::VisibilityTick => {
                self.connection.connect();
            }
            ViewerEvent::ReconnectDue => {
                self.connection.fire_reconnect();
            }
            ViewerEvent::Clear => {
                self.rows.clear();
                self.presenter.rows_cleared();
                self.presenter.update_waterfall(&Waterfall::default());
            }
            ViewerEvent::Shutdown => {
                self.connection.shutdown();
            }
        }
    }

    /// Reconcile a record, repaint its row and the waterfall, then retire
    /// the entry if this was its final delivery
    fn ingest(&mut self, record: TraceRecord) -> Result<(), TraceError> {
        let done = record.done;
        let ingested = self.store.ingest(record)?;
        let is_new = ingested.is_new;
        let rendered = RenderedEntry::from_entry(ingested.entry);
        let id = rendered.id.clone();

        if let Some(evicted) = self.rows.upsert(rendered.handle, &rendered.record) {
            self.presenter.row_evicted(evicted);
        }

        self.presenter.render_entry(rendered, is_new);

        let waterfall = waterfall::compute(self.rows.as_slice());
        self.presenter.update_waterfall(&waterfall);

        if done {
            self.store.release(&id);
        }

        Ok(())
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.connection.reconnect_deadline()
    }

    #[cfg(test)]
    pub fn connection(&self) -> &StreamConnection<T> {
        &self.connection
    }

    pub fn store(&self) -> &TraceRecordStore {
        &self.store
    }

    #[cfg(test)]
    pub fn rows(&self) -> &VisibleRows {
        &self.rows
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }
}
