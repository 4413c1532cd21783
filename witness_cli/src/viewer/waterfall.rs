//! Waterfall geometry for the visible request rows
//!
//! Every visible row gets a horizontal offset and width, both expressed as a
//! percentage of the visible time span. The span runs from the start of the
//! first visible row to the end of the last-inserted row.

use super::store::RowHandle;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use witness_common::TraceRecord;

/// Default cap on rows kept on screen
pub const DEFAULT_MAX_ROWS: usize = 500;

/// Position of one timing bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarGeometry {
    pub offset_percent: f64,
    pub width_percent: f64,
}

/// Bar geometry for every drawable row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Waterfall {
    bars: HashMap<RowHandle, BarGeometry>,
}

impl Waterfall {
    pub fn get(&self, handle: RowHandle) -> Option<BarGeometry> {
        self.bars.get(&handle).copied()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.bars.len()
    }
}

/// Timing inputs of a row currently on screen
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleRow {
    pub handle: RowHandle,
    pub started_at: DateTime<Utc>,
    pub duration_nano: Option<i64>,
}

impl VisibleRow {
    /// Nanoseconds from `origin` to the start of this row
    fn offset_from(&self, origin: DateTime<Utc>) -> Option<i64> {
        (self.started_at - origin).num_nanoseconds()
    }

    fn duration_nanos(&self) -> i64 {
        self.duration_nano.unwrap_or(0)
    }
}

/// Rows in the order their first record arrived.
///
/// Rows outlive the store entries they were created for; a completed request
/// stays visible until it is evicted or the view is cleared.
pub struct VisibleRows {
    rows: VecDeque<VisibleRow>,
    max_rows: usize,
}

impl VisibleRows {
    pub fn new(max_rows: usize) -> Self {
        Self {
            rows: VecDeque::new(),
            max_rows: max_rows.max(1),
        }
    }

    /// Refresh the timing of an existing row, or append a new one.
    /// Returns the handle of an evicted row, if the append overflowed.
    pub fn upsert(&mut self, handle: RowHandle, record: &TraceRecord) -> Option<RowHandle> {
        let started_at = record.started_at()?;

        if let Some(row) = self.rows.iter_mut().rev().find(|row| row.handle == handle) {
            row.started_at = started_at;
            row.duration_nano = record.duration_nano;
            return None;
        }

        self.rows.push_back(VisibleRow {
            handle,
            started_at,
            duration_nano: record.duration_nano,
        });

        if self.rows.len() > self.max_rows {
            self.rows.pop_front().map(|row| row.handle)
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &VisibleRow> {
        self.rows.iter()
    }

    pub fn as_slice(&mut self) -> &[VisibleRow] {
        self.rows.make_contiguous()
    }
}

/// Compute bar geometry for rows given in insertion order.
///
/// Degenerate spans (fewer than two rows, or a span that is not positive)
/// produce an empty waterfall. Timing stays in integer nanoseconds until the
/// final division.
pub fn compute(rows: &[VisibleRow]) -> Waterfall {
    let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
        return Waterfall::default();
    };
    if rows.len() < 2 {
        return Waterfall::default();
    }

    let span_start = first.started_at;
    let Some(total_span) = last
        .offset_from(span_start)
        .and_then(|offset| offset.checked_add(last.duration_nanos()))
    else {
        return Waterfall::default();
    };

    if total_span <= 0 {
        return Waterfall::default();
    }

    let total_span = total_span as f64;
    let bars = rows
        .iter()
        .filter_map(|row| {
            let offset = row.offset_from(span_start)?;
            let geometry = BarGeometry {
                offset_percent: offset as f64 / total_span * 100.0,
                width_percent: row.duration_nanos() as f64 / total_span * 100.0,
            };
            Some((row.handle, geometry))
        })
        .collect();

    Waterfall { bars }
}
