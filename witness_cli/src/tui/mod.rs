//! Terminal User Interface for the trace viewer

mod app;
mod ui;

pub use app::{TuiAction, TuiApp};
pub use ui::draw;
