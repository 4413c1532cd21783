//! Identity-keyed storage for in-flight trace records

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use witness_common::{TraceError, TraceRecord};

/// Opaque token naming the presenter-owned row of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowHandle(u64);

impl RowHandle {
    #[cfg(test)]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Latest known state of an open request
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub id: String,
    pub latest_record: TraceRecord,
    /// Once set, stays set for the lifetime of the entry
    pub had_error: bool,
    pub handle: RowHandle,
}

/// Result of merging a record into the store
#[derive(Debug)]
pub struct Ingested<'a> {
    pub entry: &'a LogEntry,
    pub is_new: bool,
}

/// Store of open requests keyed by trace id
pub struct TraceRecordStore {
    entries: HashMap<String, LogEntry>,
    /// Ids in the order they were first seen
    order: Vec<String>,
    next_handle: u64,
}

impl TraceRecordStore {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            next_handle: 0,
        }
    }

    /// Merge a record into the entry for its id, creating the entry on first sight
    pub fn ingest(&mut self, record: TraceRecord) -> Result<Ingested<'_>, TraceError> {
        let id = record.validate()?.to_string();

        match self.entries.entry(id) {
            Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                if !entry.had_error && record.error.is_some() {
                    entry.had_error = true;
                }
                entry.latest_record = record;

                Ok(Ingested {
                    entry,
                    is_new: false,
                })
            }
            Entry::Vacant(vacant) => {
                let handle = RowHandle(self.next_handle);
                self.next_handle += 1;
                let id = vacant.key().clone();
                self.order.push(id.clone());

                let entry = vacant.insert(LogEntry {
                    id,
                    had_error: record.error.is_some(),
                    latest_record: record,
                    handle,
                });

                Ok(Ingested {
                    entry,
                    is_new: true,
                })
            }
        }
    }

    /// Remove a finished entry. Returns it only the first time.
    pub fn release(&mut self, id: &str) -> Option<LogEntry> {
        let entry = self.entries.remove(id)?;
        self.order.retain(|open| open != id);
        Some(entry)
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&LogEntry> {
        self.entries.get(id)
    }

    /// Open ids in insertion order
    #[cfg(test)]
    pub fn open_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TraceRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use witness_common::{RequestError, Timeline};

    fn record(id: &str, done: bool, error: bool) -> TraceRecord {
        TraceRecord {
            id: Some(id.to_string()),
            timeline: Some(Timeline {
                started_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
                events: Vec::new(),
            }),
            error: error.then(|| RequestError {
                message: "connection reset".to_string(),
                details: serde_json::Value::Null,
            }),
            done,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_record_creates_entry() {
        let mut store = TraceRecordStore::new();

        let ingested = store.ingest(record("a", false, false)).unwrap();
        assert!(ingested.is_new);
        assert_eq!(ingested.entry.id, "a");
        assert!(!ingested.entry.had_error);

        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_repeated_records_merge_into_one_entry() {
        let mut store = TraceRecordStore::new();

        let first = store.ingest(record("a", false, false)).unwrap().entry.handle;
        for _ in 0..5 {
            let ingested = store.ingest(record("a", false, false)).unwrap();
            assert!(!ingested.is_new);
            assert_eq!(ingested.entry.handle, first);
        }
        assert_eq!(store.len(), 1);

        let ingested = store.ingest(record("a", true, false)).unwrap();
        assert!(ingested.entry.latest_record.done);
        assert_eq!(store.len(), 1);

        assert!(store.release("a").is_some());
        assert!(store.get("a").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_release_happens_once() {
        let mut store = TraceRecordStore::new();
        store.ingest(record("a", true, false)).unwrap();

        assert!(store.release("a").is_some());
        assert!(store.release("a").is_none());
    }

    #[test]
    fn test_error_flag_is_sticky() {
        let mut store = TraceRecordStore::new();

        store.ingest(record("a", false, false)).unwrap();
        let ingested = store.ingest(record("a", false, true)).unwrap();
        assert!(ingested.entry.had_error);

        let ingested = store.ingest(record("a", false, false)).unwrap();
        assert!(ingested.entry.had_error);
        assert!(ingested.entry.latest_record.error.is_none());

        let ingested = store.ingest(record("a", true, false)).unwrap();
        assert!(ingested.entry.had_error);
    }

    #[test]
    fn test_error_on_first_record() {
        let mut store = TraceRecordStore::new();
        let ingested = store.ingest(record("a", false, true)).unwrap();
        assert!(ingested.entry.had_error);
    }

    #[test]
    fn test_missing_id_leaves_store_unchanged() {
        let mut store = TraceRecordStore::new();
        store.ingest(record("a", false, true)).unwrap();

        let mut invalid = record("ignored", false, false);
        invalid.id = None;
        let result = store.ingest(invalid);
        assert!(matches!(result, Err(TraceError::InvalidRecord(_))));

        assert_eq!(store.len(), 1);
        let entry = store.get("a").unwrap();
        assert!(entry.had_error);
        assert_eq!(store.open_ids().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_handles_are_unique_and_ids_keep_insertion_order() {
        let mut store = TraceRecordStore::new();
        let a = store.ingest(record("a", false, false)).unwrap().entry.handle;
        let b = store.ingest(record("b", false, false)).unwrap().entry.handle;
        store.ingest(record("a", false, false)).unwrap();
        let c = store.ingest(record("c", false, false)).unwrap().entry.handle;

        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(store.open_ids().collect::<Vec<_>>(), vec!["a", "b", "c"]);

        store.release("b");
        assert_eq!(store.open_ids().collect::<Vec<_>>(), vec!["a", "c"]);
    }
}
