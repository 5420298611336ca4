use crate::utils::config::{
    DEFAULT_POLICY_PORT, DEFAULT_TRACE_PORT, EDGE_SEPARATOR, ROOT_FUNCTION, SCHEMA_VERSION,
};

/// Display report and summary format information
pub fn display_schema(show_details: bool) {
    println!("Flash Trace Collector Report Format");
    println!("Summary Schema Version: {}", SCHEMA_VERSION);
    println!();

    if show_details {
        println!("Report (<id>.xhprof, PHP serialize() encoding):");
        println!(
            "  \"caller{}callee\": array   - One call-graph edge",
            EDGE_SEPARATOR
        );
        println!("    ct: int                - Number of calls");
        println!("    wt: float              - Inclusive wall time (ms, rounded to 1 ns)");
        println!("    mu: int?               - Memory delta (pre-aggregated input only)");
        println!(
            "  \"{}\": array             - Total root-level time, ct = 1",
            ROOT_FUNCTION
        );
        println!();
        println!("Summary (<id>.summary.json):");
        println!("  version: string          - Schema version (e.g., '1.0.0')");
        println!("  session_id: string       - <peer-ip>-<peer-port> or replay name");
        println!("  mode: string             - 'trace' or 'records'");
        println!("  started_at: string       - ISO 8601 timestamp");
        println!("  finished_at: string      - ISO 8601 timestamp");
        println!("  counters: object         - Line accounting");
        println!("  desync: bool             - Whether processing stopped early");
        println!("  open_frames_dropped: number - Frames left open at end of stream");
        println!("  functions: number        - Distinct functions seen");
        println!("  report_entries: number   - Entries in the report");
        println!("  root_time_ms: number     - Total root-level time");
        println!("  report_bytes: number     - Size of the report");
    } else {
        println!("Use --show for detailed format information");
    }
}

/// Display version information
pub fn display_version() {
    println!("Flash Trace Collector v{}", env!("CARGO_PKG_VERSION"));
    println!("Summary Schema: v{}", SCHEMA_VERSION);
    println!();
    println!("Collects Flash enter/exit traces into XHProf call-graph reports.");
    println!(
        "Default ports: {} (traces), {} (policy)",
        DEFAULT_TRACE_PORT, DEFAULT_POLICY_PORT
    );
}
