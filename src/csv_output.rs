//! CSV output format for call traces

use crate::trace::CallRecord;
use std::time::Instant;

/// CSV record for a single intercepted call
#[derive(Debug, Clone)]
pub struct CsvCall {
    pub sequence: u64,
    pub unit: String,
    pub callable: String,
    pub args: String,
    pub kwargs: String,
    pub offset_us: Option<u64>,
}

impl CsvCall {
    pub fn from_record(record: &CallRecord, start: Option<Instant>) -> Self {
        let args = record
            .positional_args()
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let kwargs = record
            .keyword_args()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            sequence: record.sequence(),
            unit: record.unit_name().to_string(),
            callable: record.callable_name().to_string(),
            args,
            kwargs,
            offset_us: start.map(|s| record.offset_from(s).as_micros() as u64),
        }
    }
}

/// CSV output formatter
#[derive(Debug)]
pub struct CsvOutput {
    calls: Vec<CsvCall>,
    include_timing: bool,
}

impl CsvOutput {
    /// Create a new CSV output formatter
    pub fn new(include_timing: bool) -> Self {
        Self {
            calls: Vec::new(),
            include_timing,
        }
    }

    /// Build from trace records; offsets are relative to the first record
    pub fn from_records(records: &[CallRecord], include_timing: bool) -> Self {
        let mut output = Self::new(include_timing);
        let start = records.first().map(CallRecord::timestamp);
        for record in records {
            output.add_call(CsvCall::from_record(record, start));
        }
        output
    }

    /// Add a call to the output
    pub fn add_call(&mut self, call: CsvCall) {
        self.calls.push(call);
    }

    /// Generate CSV header row based on enabled flags
    fn header(&self) -> String {
        let mut headers = vec!["sequence", "unit", "callable", "args", "kwargs"];

        if self.include_timing {
            headers.push("offset");
        }

        headers.join(",")
    }

    /// Escape CSV field (handle commas, quotes, newlines)
    fn escape_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    /// Format a call as CSV row
    fn format_call(&self, call: &CsvCall) -> String {
        let mut fields = vec![
            call.sequence.to_string(),
            Self::escape_field(&call.unit),
            Self::escape_field(&call.callable),
            Self::escape_field(&call.args),
            Self::escape_field(&call.kwargs),
        ];

        if self.include_timing {
            match call.offset_us {
                Some(offset) => fields.push(format!("{}us", offset)),
                None => fields.push(String::new()),
            }
        }

        fields.join(",")
    }

    /// Generate CSV output as string
    pub fn to_csv(&self) -> String {
        let mut output = String::new();

        output.push_str(&self.header());
        output.push('\n');

        for call in &self.calls {
            output.push_str(&self.format_call(call));
            output.push('\n');
        }

        output
    }
}
