//! TUI application state and event handling

use crate::viewer::{BarGeometry, Presenter, RenderedEntry, RowHandle, Waterfall};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// A painted row: the latest entry state plus its timing bar
#[derive(Debug, Clone)]
pub struct Row {
    pub entry: RenderedEntry,
    pub bar: Option<BarGeometry>,
}

/// Requests the event loop has to act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuiAction {
    Quit,
    Reconnect,
    Clear,
}

/// TUI application state
pub struct TuiApp {
    pub endpoint: String,
    pub connected: bool,
    pub rows: Vec<Row>,
    pub selected_index: usize,
    /// Keep the selection on the newest row
    pub follow: bool,
    pub show_detail: bool,
    pub detail_scroll: u16,
    /// Requests still waiting for their final delivery
    pub open_requests: usize,
}

impl TuiApp {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            connected: false,
            rows: Vec::new(),
            selected_index: 0,
            follow: true,
            show_detail: true,
            detail_scroll: 0,
            open_requests: 0,
        }
    }

    pub fn selected(&self) -> Option<&Row> {
        self.rows.get(self.selected_index)
    }

    fn last_index(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }

    fn select(&mut self, index: usize) {
        let index = index.min(self.last_index());
        if index != self.selected_index {
            self.detail_scroll = 0;
        }
        self.selected_index = index;
        self.follow = index == self.last_index();
    }

    /// Handle key events
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<TuiAction> {
        match (key.code, key.modifiers) {
            // Quit
            (KeyCode::Char('c'), KeyModifiers::CONTROL) | (KeyCode::Char('q'), _) => {
                return Some(TuiAction::Quit);
            }
            (KeyCode::Char('r'), _) => return Some(TuiAction::Reconnect),
            (KeyCode::Char('c'), _) => return Some(TuiAction::Clear),
            (KeyCode::Enter, _) => {
                self.show_detail = !self.show_detail;
            }
            // Navigation
            (KeyCode::Up | KeyCode::Char('k'), _) => {
                self.select(self.selected_index.saturating_sub(1));
            }
            (KeyCode::Down | KeyCode::Char('j'), _) => {
                self.select(self.selected_index + 1);
            }
            (KeyCode::PageUp, _) => {
                self.select(self.selected_index.saturating_sub(10));
            }
            (KeyCode::PageDown, _) => {
                self.select(self.selected_index + 10);
            }
            (KeyCode::Home, _) => self.select(0),
            (KeyCode::End, _) => self.select(self.last_index()),
            // Detail panel scrolling
            (KeyCode::Char('J'), _) => {
                self.detail_scroll = self.detail_scroll.saturating_add(1);
            }
            (KeyCode::Char('K'), _) => {
                self.detail_scroll = self.detail_scroll.saturating_sub(1);
            }
            _ => {}
        }
        None
    }
}

impl Presenter for TuiApp {
    fn connectivity_changed(&mut self, connected: bool) {
        self.connected = connected;
    }

    fn render_entry(&mut self, entry: RenderedEntry, _is_new: bool) {
        if let Some(row) = self.rows.iter_mut().rev().find(|r| r.entry.handle == entry.handle) {
            row.entry = entry;
            return;
        }

        self.rows.push(Row { entry, bar: None });
        if self.follow {
            self.selected_index = self.last_index();
        }
    }

    fn update_waterfall(&mut self, waterfall: &Waterfall) {
        for row in &mut self.rows {
            row.bar = waterfall.get(row.entry.handle);
        }
    }

    fn row_evicted(&mut self, handle: RowHandle) {
        if let Some(pos) = self.rows.iter().position(|r| r.entry.handle == handle) {
            self.rows.remove(pos);
            if pos <= self.selected_index {
                self.selected_index = self.selected_index.saturating_sub(1);
            }
        }
        if self.follow {
            self.selected_index = self.last_index();
        }
    }

    fn rows_cleared(&mut self) {
        self.rows.clear();
        self.selected_index = 0;
        self.detail_scroll = 0;
        self.follow = true;
    }
}
