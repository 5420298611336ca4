//! Output writers for session artifacts.
//!
//! Every session produces up to three files in the output directory:
//! - `<id>.xhprof`: the serialized call graph
//! - `<id>.summary.json`: session diagnostics
//! - `<id>.svg`: flamegraph, when enabled

pub mod json;
pub mod phpser;
pub mod svg;
pub mod xhprof;

use crate::utils::config::REPORT_EXTENSION;
use crate::utils::error::OutputError;
use log::debug;
use std::path::{Path, PathBuf};

// Re-export main functions
pub use json::{read_summary, write_summary};
pub use phpser::{deserialize_edges, serialize_edges, PhpValue};
pub use svg::write_svg;
pub use xhprof::{read_report, read_report_bytes, reserializes_identically, write_report};

/// Paths of the artifacts of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub report: PathBuf,
    pub summary: PathBuf,
    pub svg: PathBuf,
}

impl ArtifactPaths {
    /// Artifact paths for session `id` under `dir`
    pub fn new(dir: impl AsRef<Path>, id: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            report: dir.join(format!("{}.{}", id, REPORT_EXTENSION)),
            summary: dir.join(format!("{}.summary.json", id)),
            svg: dir.join(format!("{}.svg", id)),
        }
    }
}

/// Check that `path` can be written and create its parent directories
///
/// **Private** - shared by the writers
fn prepare_output_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }

    if path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!(
                    "Cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    Ok(())
}
