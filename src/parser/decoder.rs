//! Line decoding for the active ingestion mode.

use super::record_line::parse_record_line;
use super::schema::{EdgeRecord, Event};
use super::trace_line::parse_trace_line;
use crate::utils::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which line grammar a deployment speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// `[ts] Enter|Exit name` events, reconciled on a call stack
    #[default]
    Trace,

    /// Pre-aggregated edge records, merged directly
    Records,
}

impl FromStr for IngestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(IngestMode::Trace),
            "records" => Ok(IngestMode::Records),
            other => Err(format!(
                "unknown ingest mode '{}' (expected 'trace' or 'records')",
                other
            )),
        }
    }
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestMode::Trace => f.write_str("trace"),
            IngestMode::Records => f.write_str("records"),
        }
    }
}

/// A successfully decoded line
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Event(Event),
    Record(EdgeRecord),
}

/// Decode one line with the grammar of `mode`
///
/// **Public** - main entry point for decoding
///
/// Trailing line terminators are ignored. A line in the other mode's
/// grammar is a decode failure like any other malformed line.
pub fn decode_line(mode: IngestMode, line: &str) -> Result<Decoded, DecodeError> {
    let line = line.trim_end_matches(['\r', '\n']);
    match mode {
        IngestMode::Trace => parse_trace_line(line.trim()).map(Decoded::Event),
        IngestMode::Records => parse_record_line(line).map(Decoded::Record),
    }
}
