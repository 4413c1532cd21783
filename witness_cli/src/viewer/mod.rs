//! Trace ingestion and state reconciliation for the live viewer

mod connection;
mod context;
mod present;
mod sink;
mod sse;
mod store;
mod waterfall;

pub use connection::{StreamConnection, StreamEvent};
pub use context::{ViewerContext, ViewerEvent};
pub use present::{Presenter, RenderedEntry, StatusClass};
pub use sink::LastMessageFile;
pub use sse::SseTransport;
pub use store::RowHandle;
pub use waterfall::{BarGeometry, Waterfall, DEFAULT_MAX_ROWS};

#[cfg(test)]
pub use connection::{StreamEventKind, Transport};
#[cfg(test)]
pub use present::SummaryLine;
#[cfg(test)]
pub use waterfall::{compute as compute_waterfall, VisibleRows};
