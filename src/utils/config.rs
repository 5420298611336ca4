//! Configuration and constants for the collector.

use std::time::Duration;

/// Default port the trace collection listener binds to
pub const DEFAULT_TRACE_PORT: u16 = 42426;

/// Default port the cross-domain policy responder binds to
pub const DEFAULT_POLICY_PORT: u16 = 8430;

/// Default timeout for artifact uploads
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Current session summary schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Caller name used for invocations entered on an empty stack
pub const ROOT_FUNCTION: &str = "main()";

/// Separator between caller and callee in an edge key
pub const EDGE_SEPARATOR: &str = "==>";

/// Marker between a function name and its recursion ordinal
pub const RECURSION_MARKER: char = '@';

/// Field delimiter of the pre-aggregated record grammar
pub const RECORD_DELIMITER: char = '\u{2}';

/// Number of fields in a pre-aggregated record
pub const RECORD_FIELD_COUNT: usize = 4;

// Input timestamps are integer milliseconds and the report's `wt` field is
// milliseconds too, so elapsed time is carried over unscaled.
pub const TIMESTAMP_TO_MS: f64 = 1.0;

/// Extension of the serialized call-graph report
pub const REPORT_EXTENSION: &str = "xhprof";

/// Policy served when no policy file is configured
pub const DEFAULT_POLICY: &str = concat!(
    "<?xml version=\"1.0\"?>\n",
    "<!DOCTYPE cross-domain-policy SYSTEM \"/xml/dtds/cross-domain-policy.dtd\">\n",
    "<cross-domain-policy>\n",
    "  <site-control permitted-cross-domain-policies=\"master-only\"/>\n",
    "  <allow-access-from domain=\"*\" to-ports=\"*\"/>\n",
    "</cross-domain-policy>\n",
    "\0"
);

/// Longest input line a session will buffer, terminator excluded
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Deepest call stack a session will track
pub const MAX_STACK_DEPTH: usize = 65_536;
