//! Session summary output.
//!
//! Writes `SessionSummary` structs next to each report as pretty JSON.

use super::prepare_output_path;
use crate::session::SessionSummary;
use crate::utils::error::OutputError;
use log::{debug, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write a session summary to a JSON file
///
/// **Public** - main entry point for summary output
///
/// # Arguments
/// * `summary` - Summary of a finished session
/// * `output_path` - Path to output JSON file
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
pub fn write_summary(
    summary: &SessionSummary,
    output_path: impl AsRef<Path>,
) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    debug!("Writing session summary to: {}", output_path.display());
    prepare_output_path(output_path)?;

    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writer.flush()?;

    info!(
        "Summary written to {} ({} bytes)",
        output_path.display(),
        calculate_file_size(output_path)
    );
    Ok(())
}

/// Read a session summary from a JSON file
///
/// # Errors
/// * `OutputError::WriteFailed` - File read error (reusing WriteFailed for I/O)
/// * `OutputError::SerializationFailed` - JSON parse error
pub fn read_summary(input_path: impl AsRef<Path>) -> Result<SessionSummary, OutputError> {
    let input_path = input_path.as_ref();

    debug!("Reading summary from: {}", input_path.display());

    let file = File::open(input_path)?;
    let summary: SessionSummary = serde_json::from_reader(file)?;

    debug!(
        "Summary loaded: version {}, session {}",
        summary.version, summary.session_id
    );
    Ok(summary)
}

fn calculate_file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::IngestMode;
    use crate::session::LineCounters;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    fn create_test_summary() -> SessionSummary {
        SessionSummary {
            version: "1.0.0".to_string(),
            session_id: "127.0.0.1-50000".to_string(),
            mode: IngestMode::Trace,
            started_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            finished_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 5).unwrap(),
            counters: LineCounters {
                lines: 12,
                bytes: 240,
                applied: 10,
                blank: 1,
                decode_errors: 1,
                processing_errors: 0,
                ignored: 0,
            },
            desync: false,
            open_frames_dropped: 0,
            functions: 3,
            report_entries: 4,
            root_time_ms: 42.5,
            report_bytes: 180,
        }
    }

    #[test]
    fn test_write_and_read_summary() {
        let summary = create_test_summary();
        let temp_file = NamedTempFile::new().unwrap();

        write_summary(&summary, temp_file.path()).unwrap();
        let loaded = read_summary(temp_file.path()).unwrap();

        assert_eq!(loaded, summary);
    }

    #[test]
    fn test_mode_written_lowercase() {
        let summary = create_test_summary();
        let temp_file = NamedTempFile::new().unwrap();

        write_summary(&summary, temp_file.path()).unwrap();
        let text = std::fs::read_to_string(temp_file.path()).unwrap();

        assert!(text.contains("\"mode\": \"trace\""));
        assert!(text.contains("\"session_id\": \"127.0.0.1-50000\""));
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested_path = temp_dir.path().join("nested/dirs/summary.json");

        write_summary(&create_test_summary(), &nested_path).unwrap();

        assert!(nested_path.exists());
    }

    #[test]
    fn test_read_invalid_json() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "{ not json").unwrap();

        let err = read_summary(temp_file.path()).unwrap_err();
        assert!(matches!(err, OutputError::SerializationFailed(_)));
    }
}
