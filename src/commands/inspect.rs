//! Inspect command implementation.
//!
//! Reads a report back with the wire-format decoder and prints what it
//! holds.

use super::models::InspectArgs;
use crate::aggregator::FunctionTable;
use crate::flamegraph::generate_text_summary;
use crate::output::{deserialize_edges, read_report_bytes, reserializes_identically};
use anyhow::{Context, Result};

/// Execute the inspect command
///
/// **Public** - main entry point called from main.rs
///
/// # Errors
/// * The file cannot be read or is not a valid report
/// * With `check`, the report does not re-serialize to identical bytes
pub fn execute_inspect(args: &InspectArgs) -> Result<()> {
    if args.top == 0 {
        anyhow::bail!("top must be greater than 0");
    }

    println!("Inspecting report: {}", args.file.display());

    let bytes = read_report_bytes(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let edges = deserialize_edges(&bytes).context("Not a valid report")?;

    println!("✓ Valid report");
    println!("  Size: {} bytes", bytes.len());
    println!("  Entries: {}", edges.len());
    println!("  Edges: {}", edges.edges().count());
    println!("  Root-level edge time: {:.1} ms", edges.root_edge_total_ms());
    println!("  Memory deltas: {}", if edges.has_memory() { "yes" } else { "no" });
    println!();
    println!("{}", generate_text_summary(&edges, &FunctionTable::new(), args.top));

    if args.check {
        if reserializes_identically(&bytes)? {
            println!("\n✓ Re-serializes to identical bytes");
        } else {
            anyhow::bail!("Report does not re-serialize to identical bytes");
        }
    }

    Ok(())
}
