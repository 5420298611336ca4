//! Network collaborators around the aggregation engine.
//!
//! - `listener`: accepts trace connections, one session per connection
//! - `policy`: answers Flash cross-domain policy requests
//!
//! Both are plain blocking `std::net` servers with a thread per
//! connection. Sessions share nothing but the read-only `CollectorConfig`.

pub mod listener;
pub mod policy;

pub use listener::{read_session, session_id, CollectionServer};
pub use policy::{load_policy, PolicyServer};

use crate::flamegraph::{generate_flamegraph, FlamegraphConfig};
use crate::output::{write_report, write_summary, write_svg, ArtifactPaths};
use crate::parser::IngestMode;
use crate::session::{Session, SessionReport};
use crate::upload::UploadClient;
use crate::utils::config::MAX_STACK_DEPTH;
use crate::utils::error::OutputError;
use log::{info, warn};
use std::path::PathBuf;

/// How sessions are run and where their artifacts go
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Grammar of every incoming line
    pub mode: IngestMode,

    /// Directory receiving `<id>.xhprof` and friends
    pub output_dir: PathBuf,

    /// Render `<id>.svg` when set
    pub flamegraph: Option<FlamegraphConfig>,

    /// Post each report here after writing it
    pub uploader: Option<UploadClient>,

    pub max_depth: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            mode: IngestMode::Trace,
            output_dir: PathBuf::from("."),
            flamegraph: None,
            uploader: None,
            max_depth: MAX_STACK_DEPTH,
        }
    }
}

impl CollectorConfig {
    /// A fresh session configured for this collector
    pub fn new_session(&self, id: &str) -> Session {
        Session::new(id, self.mode)
            .with_max_depth(self.max_depth)
            .with_flamegraph(self.flamegraph.is_some())
    }
}

/// Write every artifact of a finished session
///
/// **Public** - shared by the listener and offline replay
///
/// The report and summary are required; a flamegraph or upload failure
/// is logged and does not fail the session.
///
/// # Errors
/// * `OutputError` - the report or summary could not be written
pub fn write_artifacts(
    report: &SessionReport,
    config: &CollectorConfig,
) -> Result<ArtifactPaths, OutputError> {
    let id = report.summary.session_id.as_str();
    let paths = ArtifactPaths::new(&config.output_dir, id);

    write_report(&report.report, &paths.report)?;
    write_summary(&report.summary, &paths.summary)?;

    if let Some(flamegraph) = &config.flamegraph {
        let flamegraph = flamegraph.clone().with_title(format!("Flash trace {}", id));
        match generate_flamegraph(&report.stacks, Some(&flamegraph)) {
            Ok(svg) => write_svg(&svg, &paths.svg)?,
            Err(e) => warn!("[{}] no flamegraph written: {}", id, e),
        }
    }

    if let Some(uploader) = &config.uploader {
        if let Err(e) = uploader.upload(id, &report.report) {
            warn!("[{}] upload to {} failed: {}", id, uploader.url(), e);
        }
    }

    info!("[{}] artifacts written to {}", id, config.output_dir.display());
    Ok(paths)
}
