//! Call records and the append-only trace they accumulate in
//!
//! A [`Trace`] is a shared handle: the session and every wrapper it created
//! hold clones pointing at the same record list. Appending is crate-private,
//! so callers only ever see a read-only view.

use crate::unit::{CallArgs, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Immutable record of one intercepted invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    sequence: u64,
    timestamp: Instant,
    unit_name: String,
    callable_name: String,
    positional_args: Vec<Value>,
    keyword_args: BTreeMap<String, Value>,
}

impl CallRecord {
    /// Position of this record within its trace (0-based)
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Monotonic instant the record was created
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Qualified name of the unit the callable was reached through
    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    /// Exposed name the callable was invoked under
    pub fn callable_name(&self) -> &str {
        &self.callable_name
    }

    pub fn positional_args(&self) -> &[Value] {
        &self.positional_args
    }

    pub fn keyword_args(&self) -> &BTreeMap<String, Value> {
        &self.keyword_args
    }

    /// `"{unit_name}.{callable_name}"`, the identifier handed to callbacks
    pub fn identifier(&self) -> String {
        format!("{}.{}", self.unit_name, self.callable_name)
    }

    /// Time elapsed between `earlier` and this record (zero if `earlier` is later)
    pub fn offset_from(&self, earlier: Instant) -> Duration {
        self.timestamp.saturating_duration_since(earlier)
    }
}

impl fmt::Display for CallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.identifier())?;
        let mut first = true;
        for arg in &self.positional_args {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
            first = false;
        }
        for (key, value) in &self.keyword_args {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", key, value)?;
            first = false;
        }
        write!(f, ")")
    }
}

/// Ordered, append-only sequence of call records
#[derive(Debug, Clone, Default)]
pub struct Trace {
    records: Arc<Mutex<Vec<CallRecord>>>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record for a completed call, returning its sequence number
    ///
    /// The timestamp is taken while the list is locked, so sequence order and
    /// timestamp order always agree.
    pub(crate) fn record(&self, unit_name: &str, callable_name: &str, args: &CallArgs) -> u64 {
        let mut records = self.lock();
        let sequence = records.len() as u64;
        records.push(CallRecord {
            sequence,
            timestamp: Instant::now(),
            unit_name: unit_name.to_string(),
            callable_name: callable_name.to_string(),
            positional_args: args.positional.clone(),
            keyword_args: args.keyword.clone(),
        });
        sequence
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of all records in creation order
    pub fn records(&self) -> Vec<CallRecord> {
        self.lock().clone()
    }

    pub fn get(&self, index: usize) -> Option<CallRecord> {
        self.lock().get(index).cloned()
    }

    pub fn last(&self) -> Option<CallRecord> {
        self.lock().last().cloned()
    }

    /// Records attributed to one unit
    pub fn for_unit(&self, unit_name: &str) -> Vec<CallRecord> {
        self.lock()
            .iter()
            .filter(|r| r.unit_name == unit_name)
            .cloned()
            .collect()
    }

    /// `unit.callable` identifiers in creation order
    pub fn identifiers(&self) -> Vec<String> {
        self.lock().iter().map(CallRecord::identifier).collect()
    }

    /// Timestamp of the first record, if any
    pub fn started_at(&self) -> Option<Instant> {
        self.lock().first().map(|r| r.timestamp)
    }

    /// True when both handles refer to the same underlying trace
    pub fn same_trace(&self, other: &Trace) -> bool {
        Arc::ptr_eq(&self.records, &other.records)
    }

    // A panicking callback never leaves a half-pushed record behind.
    fn lock(&self) -> MutexGuard<'_, Vec<CallRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_assigns_sequence() {
        let trace = Trace::new();
        assert!(trace.is_empty());
        assert_eq!(trace.record("m", "f", &CallArgs::positional([1, 2])), 0);
        assert_eq!(trace.record("m", "g", &CallArgs::new()), 1);
        assert_eq!(trace.len(), 2);
        assert_eq!(trace.identifiers(), vec!["m.f", "m.g"]);
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let trace = Trace::new();
        for _ in 0..50 {
            trace.record("m", "f", &CallArgs::new());
        }
        let records = trace.records();
        for pair in records.windows(2) {
            assert!(pair[0].timestamp() <= pair[1].timestamp());
            assert!(pair[0].sequence() < pair[1].sequence());
        }
    }

    #[test]
    fn test_clones_share_records() {
        let trace = Trace::new();
        let handle = trace.clone();
        handle.record("m", "f", &CallArgs::new());
        assert_eq!(trace.len(), 1);
        assert!(trace.same_trace(&handle));
        assert!(!trace.same_trace(&Trace::new()));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let trace = Trace::new();
        trace.record("m", "f", &CallArgs::new());
        let snapshot = trace.records();
        trace.record("m", "g", &CallArgs::new());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(trace.len(), 2);
    }

    #[test]
    fn test_for_unit_filters() {
        let trace = Trace::new();
        trace.record("m", "f", &CallArgs::new());
        trace.record("m.sub", "g", &CallArgs::new());
        trace.record("m", "h", &CallArgs::new());
        let root: Vec<String> = trace
            .for_unit("m")
            .iter()
            .map(|r| r.callable_name().to_string())
            .collect();
        assert_eq!(root, vec!["f", "h"]);
        assert_eq!(trace.for_unit("m.sub").len(), 1);
    }

    #[test]
    fn test_display_format() {
        let trace = Trace::new();
        trace.record("m", "f", &CallArgs::positional([1, 2]).with_kwarg("x", "y"));
        let record = trace.last().unwrap();
        assert_eq!(record.to_string(), r#"m.f(1, 2, x="y")"#);
        assert_eq!(record.keyword_args().get("x"), Some(&json!("y")));
    }

    #[test]
    fn test_offset_from_saturates() {
        let trace = Trace::new();
        trace.record("m", "f", &CallArgs::new());
        let record = trace.last().unwrap();
        let later = Instant::now() + Duration::from_secs(1);
        assert_eq!(record.offset_from(later), Duration::ZERO);
    }
}
