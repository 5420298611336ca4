//! Report file I/O.
//!
//! Reports are written exactly as the serializer produced them, with no
//! framing or trailing newline, so the viewer can `unserialize()` the
//! whole file.

use super::phpser::{deserialize_edges, serialize_edges};
use super::prepare_output_path;
use crate::aggregator::EdgeMap;
use crate::utils::error::OutputError;
use log::{debug, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write serialized report bytes to a file
///
/// **Public** - main entry point for report output
///
/// # Arguments
/// * `report` - Bytes from `serialize_edges`
/// * `output_path` - Path to the `.xhprof` file
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::InvalidPath` - Path is invalid or its directory cannot be created
pub fn write_report(report: &[u8], output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    info!("Writing report to: {}", output_path.display());
    prepare_output_path(output_path)?;

    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(report)?;
    writer.flush()?;

    info!("Report written successfully ({} bytes)", report.len());
    Ok(())
}

/// Read a report file's raw bytes
pub fn read_report_bytes(input_path: impl AsRef<Path>) -> Result<Vec<u8>, OutputError> {
    let input_path = input_path.as_ref();
    debug!("Reading report from: {}", input_path.display());
    Ok(std::fs::read(input_path)?)
}

/// Read and decode a report file
///
/// **Public** - used by inspect and tests
///
/// # Errors
/// * `OutputError::WriteFailed` - File read error (reusing WriteFailed for I/O)
/// * `OutputError::MalformedReport` - File is not a valid report
pub fn read_report(input_path: impl AsRef<Path>) -> Result<EdgeMap, OutputError> {
    let bytes = read_report_bytes(input_path)?;
    let edges = deserialize_edges(&bytes)?;
    debug!("Report loaded: {} entries", edges.len());
    Ok(edges)
}

/// Whether decoding and re-encoding `report` gives back the same bytes
///
/// # Errors
/// * `OutputError::MalformedReport` - `report` does not decode
pub fn reserializes_identically(report: &[u8]) -> Result<bool, OutputError> {
    let edges = deserialize_edges(report)?;
    Ok(serialize_edges(&edges) == report)
}
