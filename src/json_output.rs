//! JSON output format for call traces

use crate::trace::CallRecord;
use crate::unit::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// A single intercepted call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonCall {
    /// Position within the trace
    pub sequence: u64,
    /// Microseconds since the first recorded call
    pub offset_us: u64,
    /// Unit the call was attributed to (e.g., "numlib.linalg")
    pub unit: String,
    /// Exposed name the callable was invoked under
    pub callable: String,
    /// Positional arguments
    pub args: Vec<Value>,
    /// Keyword arguments
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub kwargs: BTreeMap<String, Value>,
}

/// Trace summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSummary {
    /// Total number of recorded calls
    pub total_calls: u64,
}

/// Root JSON output structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonOutput {
    /// Format version identifier
    pub version: String,
    /// Format name
    pub format: String,
    /// Unit the session traced
    pub unit: String,
    /// Recorded calls in trace order
    pub calls: Vec<JsonCall>,
    /// Trace summary
    pub summary: JsonSummary,
}

impl JsonOutput {
    /// Create an empty JSON output for a session over `unit`
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "modtrace-json-v1".to_string(),
            unit: unit.into(),
            calls: Vec::new(),
            summary: JsonSummary { total_calls: 0 },
        }
    }

    /// Build from trace records; offsets are relative to the first record
    pub fn from_records(unit: impl Into<String>, records: &[CallRecord]) -> Self {
        let mut output = Self::new(unit);
        let start = records.first().map(CallRecord::timestamp);
        for record in records {
            output.add_call(JsonCall::from_record(record, start));
        }
        output
    }

    /// Add a call to the output
    pub fn add_call(&mut self, call: JsonCall) {
        self.summary.total_calls += 1;
        self.calls.push(call);
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl JsonCall {
    pub fn from_record(record: &CallRecord, start: Option<Instant>) -> Self {
        let offset_us = start
            .map(|s| record.offset_from(s).as_micros() as u64)
            .unwrap_or(0);
        Self {
            sequence: record.sequence(),
            offset_us,
            unit: record.unit_name().to_string(),
            callable: record.callable_name().to_string(),
            args: record.positional_args().to_vec(),
            kwargs: record.keyword_args().clone(),
        }
    }
}
