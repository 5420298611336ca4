//! Replay command implementation.
//!
//! Runs one session over a captured trace file and writes the same
//! artifacts a live connection would.

use super::models::ReplayArgs;
use super::serve::validate_session_options;
use crate::flamegraph::generate_text_summary;
use crate::output::ArtifactPaths;
use crate::server::{read_session, write_artifacts};
use anyhow::{Context, Result};
use log::{info, warn};
use std::fs::File;
use std::io::BufReader;
use std::time::Instant;

/// Execute the replay command
///
/// **Public** - main entry point called from main.rs
///
/// # Returns
/// Paths of the written artifacts
///
/// # Errors
/// * Invalid arguments
/// * Input file cannot be opened
/// * Report or summary cannot be written
pub fn execute_replay(args: ReplayArgs) -> Result<ArtifactPaths> {
    let start_time = Instant::now();
    validate_replay_args(&args)?;

    let session_id = replay_session_id(&args)?;
    let config = args.session.to_collector_config()?;

    info!("Replaying {} as session {}", args.input.display(), session_id);

    let file = File::open(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;

    let mut session = config.new_session(&session_id);
    if let Err(e) = read_session(&mut session, BufReader::new(file)) {
        warn!("Read error in {}, finalizing what was read: {}", args.input.display(), e);
    }
    let report = session.finish();

    let paths = write_artifacts(&report, &config).context("Failed to write session artifacts")?;
    info!("✓ Report written to: {}", paths.report.display());

    if args.print_summary {
        println!("\n{}", "=".repeat(80));
        println!("SESSION SUMMARY");
        println!("{}", "=".repeat(80));
        println!("Session:   {}", report.summary.session_id);
        println!("Mode:      {}", report.summary.mode);
        println!("{}", report.summary.summary());
        println!("\n{}", generate_text_summary(&report.edges, &report.functions, args.top));
        println!("{}", "=".repeat(80));
    }

    info!("Replay completed in {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(paths)
}

/// Session id from the arguments, else the input's file stem
fn replay_session_id(args: &ReplayArgs) -> Result<String> {
    if let Some(id) = &args.session_id {
        return Ok(id.clone());
    }
    args.input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .context("Input path has no file name to derive a session id from")
}

/// Validate replay arguments
///
/// **Public** - can be called before execute_replay for early validation
pub fn validate_replay_args(args: &ReplayArgs) -> Result<()> {
    if !args.input.is_file() {
        anyhow::bail!("Input file {} does not exist", args.input.display());
    }

    if let Some(id) = &args.session_id {
        if id.is_empty() || id.contains(['/', '\\']) {
            anyhow::bail!("Session id must be a non-empty file name");
        }
    }

    if args.print_summary && args.top == 0 {
        anyhow::bail!("top must be greater than 0");
    }

    validate_session_options(&args.session)
}
