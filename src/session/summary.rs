//! Diagnostics written next to each report.

use crate::parser::IngestMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Line-level accounting for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCounters {
    /// Lines received, including blank and skipped ones
    pub lines: u64,

    /// Bytes received, excluding line terminators
    pub bytes: u64,

    /// Lines whose event or record was applied
    pub applied: u64,

    pub blank: u64,

    /// Lines that did not match the active grammar
    pub decode_errors: u64,

    /// Well-formed events whose effect was skipped
    pub processing_errors: u64,

    /// Lines received after a desync ended processing
    pub ignored: u64,
}

/// Summary of a finished session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Schema version for compatibility checking
    pub version: String,

    pub session_id: String,

    pub mode: IngestMode,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,

    pub counters: LineCounters,

    /// Whether a desync ended processing early
    pub desync: bool,

    /// Frames still open at end of stream, dropped from the report
    pub open_frames_dropped: usize,

    /// Distinct functions seen by the call stack
    pub functions: usize,

    /// Entries in the report, the `main()` entry included
    pub report_entries: usize,

    /// Total root-level time in milliseconds
    pub root_time_ms: f64,

    pub report_bytes: usize,
}

impl SessionSummary {
    /// Whether the session ended with a complete, consistent stack
    pub fn is_clean(&self) -> bool {
        !self.desync && self.open_frames_dropped == 0
    }

    /// Single-line description for logs
    pub fn summary(&self) -> String {
        format!(
            "{} lines ({} applied, {} malformed, {} failed, {} ignored) | {} entries | root {:.1} ms | {} open frames dropped{}",
            self.counters.lines,
            self.counters.applied,
            self.counters.decode_errors,
            self.counters.processing_errors,
            self.counters.ignored,
            self.report_entries,
            self.root_time_ms,
            self.open_frames_dropped,
            if self.desync { " | DESYNC" } else { "" }
        )
    }
}
