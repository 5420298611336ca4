//! One aggregation session per input stream.
//!
//! A `Session` owns the decoder mode, the call stack and the accumulators
//! of a single peer connection or replayed file. Lines go in through
//! `push_line`; `finish` closes the session and produces the report,
//! whatever state the stack was left in.

pub mod summary;

pub use summary::{LineCounters, SessionSummary};

use crate::aggregator::{
    CallStack, CollapsedStack, EdgeMap, Frame, FunctionTable, Invocation, InvocationSink,
    StackFolder, StackState,
};
use crate::output::phpser::serialize_edges;
use crate::parser::{decode_line, Decoded, EdgeRecord, Event, EventKind, IngestMode};
use crate::utils::config::SCHEMA_VERSION;
use crate::utils::error::StackError;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

/// Longest excerpt of a rejected line quoted in logs
const LOG_EXCERPT_CHARS: usize = 80;

/// What `push_line` did with a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Applied,
    Blank,
    /// Line did not match the active grammar and was skipped
    Malformed,
    /// Event was valid but its effect was skipped
    Skipped,
    /// Line ended the session with a desync
    Desync,
    /// Session already ended, line dropped
    Ignored,
}

/// Everything a finished session produced
#[derive(Debug)]
pub struct SessionReport {
    pub summary: SessionSummary,
    pub edges: EdgeMap,
    pub functions: FunctionTable,

    /// Folded stacks, empty unless flamegraphs were enabled
    pub stacks: Vec<CollapsedStack>,

    /// Serialized report bytes
    pub report: Vec<u8>,
}

/// Fans one finalized invocation out to every accumulator
struct Accumulators<'a> {
    edges: &'a mut EdgeMap,
    functions: &'a mut FunctionTable,
    folder: Option<&'a mut StackFolder>,
}

impl InvocationSink for Accumulators<'_> {
    fn on_complete(&mut self, invocation: &Invocation, ancestors: &[Frame]) {
        self.edges.on_complete(invocation, ancestors);
        self.functions.on_complete(invocation, ancestors);
        if let Some(folder) = self.folder.as_deref_mut() {
            folder.on_complete(invocation, ancestors);
        }
    }
}

/// Aggregation state of a single input stream
#[derive(Debug)]
pub struct Session {
    id: String,
    mode: IngestMode,
    stack: CallStack,
    edges: EdgeMap,
    functions: FunctionTable,
    folder: Option<StackFolder>,
    counters: LineCounters,
    desync: bool,
    started_at: DateTime<Utc>,
}

impl Session {
    /// Start a session
    ///
    /// **Public** - one per connection or replayed file
    ///
    /// # Arguments
    /// * `id` - Session identifier, used to name the artifacts
    /// * `mode` - Grammar every line of this session is decoded with
    pub fn new(id: impl Into<String>, mode: IngestMode) -> Self {
        let id = id.into();
        info!("[{}] session started ({} mode)", id, mode);
        Self {
            id,
            mode,
            stack: CallStack::new(),
            edges: EdgeMap::new(),
            functions: FunctionTable::new(),
            folder: None,
            counters: LineCounters::default(),
            desync: false,
            started_at: Utc::now(),
        }
    }

    /// Also fold finished invocations into collapsed stacks
    pub fn with_flamegraph(mut self, enabled: bool) -> Self {
        self.folder = enabled.then(StackFolder::new);
        self
    }

    /// Override the maximum tracked stack depth
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.stack = CallStack::with_max_depth(max_depth);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> IngestMode {
        self.mode
    }

    pub fn counters(&self) -> &LineCounters {
        &self.counters
    }

    pub fn edges(&self) -> &EdgeMap {
        &self.edges
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    pub fn stack_state(&self) -> StackState {
        self.stack.state()
    }

    /// Whether a desync ended processing
    pub fn is_fatal(&self) -> bool {
        self.desync
    }

    /// Feed one input line
    ///
    /// **Public** - main entry point for input
    ///
    /// Never fails: malformed lines and skipped events are logged and
    /// counted, and a desync stops processing of later lines.
    pub fn push_line(&mut self, line: &str) -> LineOutcome {
        self.counters.lines += 1;
        self.counters.bytes += line.trim_end_matches(['\r', '\n']).len() as u64;

        if self.desync {
            self.counters.ignored += 1;
            return LineOutcome::Ignored;
        }

        if line.trim().is_empty() {
            self.counters.blank += 1;
            return LineOutcome::Blank;
        }

        let decoded = match decode_line(self.mode, line) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(
                    "[{}] line {}: skipping malformed line ({}): {:?}",
                    self.id,
                    self.counters.lines,
                    e,
                    excerpt(line)
                );
                self.counters.decode_errors += 1;
                return LineOutcome::Malformed;
            }
        };

        let result = match decoded {
            Decoded::Event(event) => self.apply_event(event),
            Decoded::Record(record) => {
                self.apply_record(&record);
                Ok(())
            }
        };

        match result {
            Ok(()) => {
                self.counters.applied += 1;
                LineOutcome::Applied
            }
            Err(e) if e.is_fatal() => {
                error!(
                    "[{}] line {}: {}; ignoring the rest of the stream",
                    self.id, self.counters.lines, e
                );
                self.desync = true;
                LineOutcome::Desync
            }
            Err(e) => {
                warn!("[{}] line {}: skipping event: {}", self.id, self.counters.lines, e);
                self.counters.processing_errors += 1;
                LineOutcome::Skipped
            }
        }
    }

    /// Account for a line that was too long to buffer
    ///
    /// Counted as a decode error; `length` excludes the terminator.
    pub fn push_oversized_line(&mut self, length: u64) -> LineOutcome {
        self.counters.lines += 1;
        self.counters.bytes += length;

        if self.desync {
            self.counters.ignored += 1;
            return LineOutcome::Ignored;
        }

        warn!(
            "[{}] line {}: skipping line of {} bytes, over the line length limit",
            self.id, self.counters.lines, length
        );
        self.counters.decode_errors += 1;
        LineOutcome::Malformed
    }

    /// Run one decoded event through the call stack
    ///
    /// # Errors
    /// Whatever the call stack rejects the event with; see `StackError`.
    pub fn apply_event(&mut self, event: Event) -> Result<(), StackError> {
        match event.kind {
            EventKind::Enter => self.stack.enter_function(event.timestamp, event.function),
            EventKind::Exit => {
                let mut sink = Accumulators {
                    edges: &mut self.edges,
                    functions: &mut self.functions,
                    folder: self.folder.as_mut(),
                };
                let outcome =
                    self.stack
                        .exit_function(event.timestamp, &event.function, &mut sink)?;
                if outcome.unwound > 0 {
                    debug!(
                        "[{}] exit of {} unwound {} frames",
                        self.id, event.function, outcome.unwound
                    );
                }
                Ok(())
            }
        }
    }

    /// Merge one pre-aggregated record, bypassing the call stack
    pub fn apply_record(&mut self, record: &EdgeRecord) {
        self.edges.merge_record(record);
    }

    /// Close the session and serialize what was accumulated
    ///
    /// **Public** - called once the input stream ends, for any reason
    ///
    /// Frames still open are dropped from the report and counted in the
    /// summary.
    pub fn finish(self) -> SessionReport {
        let open_frames_dropped = self.stack.depth();
        if open_frames_dropped > 0 {
            warn!(
                "[{}] dropping {} frames still open at end of stream",
                self.id, open_frames_dropped
            );
        }

        let report = serialize_edges(&self.edges);
        let stacks = self
            .folder
            .as_ref()
            .map(StackFolder::build)
            .unwrap_or_default();

        let summary = SessionSummary {
            version: SCHEMA_VERSION.to_string(),
            session_id: self.id,
            mode: self.mode,
            started_at: self.started_at,
            finished_at: Utc::now(),
            counters: self.counters,
            desync: self.desync,
            open_frames_dropped,
            functions: self.functions.len(),
            report_entries: self.edges.len(),
            root_time_ms: self.edges.root().map_or(0.0, |root| root.inclusive_time_ms()),
            report_bytes: report.len(),
        };

        info!("[{}] session finished: {}", summary.session_id, summary.summary());

        SessionReport {
            summary,
            edges: self.edges,
            functions: self.functions,
            stacks,
            report,
        }
    }
}

/// Shorten a line for log output
fn excerpt(line: &str) -> String {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.chars().count() > LOG_EXCERPT_CHARS {
        let cut: String = line.chars().take(LOG_EXCERPT_CHARS).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(lines: &[&str]) -> SessionReport {
        let mut session = Session::new("test", IngestMode::Trace);
        for line in lines {
            session.push_line(line);
        }
        session.finish()
    }

    fn ct_wt(report: &SessionReport, key: &str) -> (u64, f64) {
        let stats = report
            .edges
            .get(key)
            .unwrap_or_else(|| panic!("missing edge {}", key));
        (stats.call_count, stats.inclusive_time_ms())
    }

    #[test]
    fn test_single_call() {
        let report = run(&["[0] Enter A", "[10] Exit A"]);
        assert_eq!(ct_wt(&report, "main()==>A"), (1, 10.0));
        assert_eq!(ct_wt(&report, "main()"), (1, 10.0));
        assert_eq!(report.edges.len(), 2);
        assert!(report.summary.is_clean());
    }

    #[test]
    fn test_nested_call() {
        let report = run(&["[0] Enter A", "[5] Enter B", "[8] Exit B", "[12] Exit A"]);
        assert_eq!(ct_wt(&report, "main()==>A"), (1, 12.0));
        assert_eq!(ct_wt(&report, "A==>B"), (1, 3.0));
        assert_eq!(report.functions.get("A").unwrap().total_exclusive_time, 9);
    }

    #[test]
    fn test_self_recursion_has_own_edge() {
        let report = run(&["[0] Enter A", "[2] Enter A", "[4] Exit A", "[6] Exit A"]);
        assert_eq!(ct_wt(&report, "main()==>A"), (1, 6.0));
        assert_eq!(ct_wt(&report, "A==>A@1"), (1, 2.0));
    }

    #[test]
    fn test_unwind_finalizes_skipped_frame() {
        let report = run(&["[0] Enter A", "[1] Enter B", "[5] Exit A"]);
        assert_eq!(ct_wt(&report, "A==>B"), (1, 4.0));
        assert_eq!(ct_wt(&report, "main()==>A"), (1, 5.0));
    }

    #[test]
    fn test_desync_on_empty_stack() {
        let mut session = Session::new("desync", IngestMode::Trace);
        assert_eq!(session.push_line("[0] Exit X"), LineOutcome::Desync);
        assert!(session.is_fatal());
        assert_eq!(session.stack_state(), StackState::Fatal);
        assert_eq!(session.push_line("[1] Enter A"), LineOutcome::Ignored);

        let report = session.finish();
        assert!(report.edges.is_empty());
        assert_eq!(report.report, b"a:0:{}".to_vec());
        assert!(report.summary.desync);
        assert_eq!(report.summary.counters.ignored, 1);
    }

    #[test]
    fn test_desync_keeps_earlier_edges() {
        let report = run(&["[0] Enter A", "[3] Exit A", "[4] Exit B", "[5] Enter C", "[6] Exit C"]);
        assert_eq!(ct_wt(&report, "main()==>A"), (1, 3.0));
        assert!(report.edges.get("main()==>C").is_none());
        assert!(report.summary.desync);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let mut session = Session::new("noisy", IngestMode::Trace);
        assert_eq!(session.push_line("[0] Enter A"), LineOutcome::Applied);
        assert_eq!(session.push_line("garbage"), LineOutcome::Malformed);
        assert_eq!(session.push_line("[x] Enter B"), LineOutcome::Malformed);
        assert_eq!(session.push_line("   "), LineOutcome::Blank);
        assert_eq!(session.push_line("[4] Exit A\r\n"), LineOutcome::Applied);

        let report = session.finish();
        assert_eq!(ct_wt(&report, "main()==>A"), (1, 4.0));
        assert_eq!(report.summary.counters.decode_errors, 2);
        assert_eq!(report.summary.counters.blank, 1);
        assert_eq!(report.summary.counters.applied, 2);
        assert_eq!(report.summary.counters.lines, 5);
    }

    #[test]
    fn test_depth_limit_is_recoverable() {
        let mut session = Session::new("deep", IngestMode::Trace).with_max_depth(1);
        session.push_line("[0] Enter A");
        assert_eq!(session.push_line("[1] Enter B"), LineOutcome::Skipped);
        session.push_line("[2] Exit B");
        session.push_line("[3] Exit A");

        let report = session.finish();
        assert_eq!(report.summary.counters.processing_errors, 1);
        assert!(!report.summary.desync);
        assert_eq!(ct_wt(&report, "main()==>A"), (1, 3.0));
        assert!(report.edges.get("A==>B").is_none());
    }

    #[test]
    fn test_unwind_past_depth_limit_keeps_session_going() {
        let mut session = Session::new("unwind", IngestMode::Trace).with_max_depth(2);
        session.push_line("[0] Enter A");
        session.push_line("[1] Enter B");
        assert_eq!(session.push_line("[2] Enter C"), LineOutcome::Skipped);
        assert_eq!(session.push_line("[5] Exit A"), LineOutcome::Applied);
        assert_eq!(session.push_line("[6] Enter D"), LineOutcome::Applied);
        assert_eq!(session.push_line("[9] Exit D"), LineOutcome::Applied);

        let report = session.finish();
        assert_eq!(ct_wt(&report, "A==>B"), (1, 4.0));
        assert_eq!(ct_wt(&report, "main()==>A"), (1, 5.0));
        assert_eq!(ct_wt(&report, "main()==>D"), (1, 3.0));
        assert_eq!(ct_wt(&report, "main()"), (1, 8.0));
        assert_eq!(report.summary.open_frames_dropped, 0);
        assert_eq!(report.summary.counters.processing_errors, 1);
        assert!(report.summary.is_clean());
    }

    #[test]
    fn test_open_frames_dropped_at_finish() {
        let report = run(&["[0] Enter A", "[1] Enter B", "[2] Exit B"]);
        assert_eq!(report.summary.open_frames_dropped, 1);
        assert_eq!(ct_wt(&report, "A==>B"), (1, 1.0));
        assert!(report.edges.get("main()==>A").is_none());
        assert!(!report.summary.is_clean());
    }

    #[test]
    fn test_record_mode_merges_directly() {
        let mut session = Session::new("records", IngestMode::Records);
        session.push_line("main()==>A\u{2}10.5\u{2}1\u{2}256");
        session.push_line("A==>B\u{2}2\u{2}3\u{2}-16");
        session.push_line("A==>B\u{2}1\u{2}1\u{2}16");
        assert_eq!(session.push_line("[0] Enter A"), LineOutcome::Malformed);

        let report = session.finish();
        let ab = report.edges.get("A==>B").unwrap();
        assert_eq!(ab.call_count, 4);
        assert_eq!(ab.inclusive_time_ms(), 3.0);
        assert_eq!(ab.memory_delta, Some(0));
        assert_eq!(ct_wt(&report, "main()"), (1, 10.5));
        assert_eq!(report.summary.mode, IngestMode::Records);
    }

    #[test]
    fn test_flamegraph_stacks_when_enabled() {
        let mut session = Session::new("fg", IngestMode::Trace).with_flamegraph(true);
        for line in ["[0] Enter A", "[1] Enter B", "[5] Exit B", "[6] Exit A"] {
            session.push_line(line);
        }
        let report = session.finish();
        let lines: Vec<String> = report.stacks.iter().map(CollapsedStack::to_line).collect();
        assert_eq!(lines, vec!["main();A;B 4", "main();A 2"]);

        let plain = run(&["[0] Enter A", "[1] Exit A"]);
        assert!(plain.stacks.is_empty());
    }

    #[test]
    fn test_oversized_line_counts_as_malformed() {
        let mut session = Session::new("long", IngestMode::Trace);
        assert_eq!(session.push_oversized_line(100_000), LineOutcome::Malformed);
        assert_eq!(session.counters().decode_errors, 1);
        assert_eq!(session.counters().bytes, 100_000);

        session.push_line("[0] Exit X");
        assert_eq!(session.push_oversized_line(10), LineOutcome::Ignored);
        assert_eq!(session.counters().ignored, 1);
    }

    #[test]
    fn test_excerpt_truncates() {
        let long = "x".repeat(200);
        assert_eq!(excerpt(&long).len(), LOG_EXCERPT_CHARS + 3);
        assert_eq!(excerpt("short\n"), "short");
    }
}
