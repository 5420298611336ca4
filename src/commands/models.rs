use crate::flamegraph::FlamegraphConfig;
use crate::parser::IngestMode;
use crate::server::CollectorConfig;
use crate::upload::UploadClient;
use crate::utils::config::{DEFAULT_POLICY_PORT, DEFAULT_TRACE_PORT, MAX_STACK_DEPTH};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Options shared by every command that runs sessions
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Line grammar of the input
    pub mode: IngestMode,

    /// Directory receiving the artifacts
    pub output_dir: PathBuf,

    /// Also render an SVG flamegraph per session
    pub flamegraph: bool,

    /// Flamegraph width in pixels
    pub flamegraph_width: usize,

    /// Endpoint each report is posted to (optional)
    pub upload_url: Option<String>,

    /// Deepest call stack tracked per session
    pub max_depth: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            mode: IngestMode::Trace,
            output_dir: PathBuf::from("."),
            flamegraph: false,
            flamegraph_width: 1200,
            upload_url: None,
            max_depth: MAX_STACK_DEPTH,
        }
    }
}

impl SessionOptions {
    /// Build the collector configuration, including the upload client
    pub fn to_collector_config(&self) -> Result<CollectorConfig> {
        let uploader = self
            .upload_url
            .as_deref()
            .map(UploadClient::new)
            .transpose()
            .context("Failed to create upload client")?;

        Ok(CollectorConfig {
            mode: self.mode,
            output_dir: self.output_dir.clone(),
            flamegraph: self
                .flamegraph
                .then(|| FlamegraphConfig::new().with_width(self.flamegraph_width)),
            uploader,
            max_depth: self.max_depth,
        })
    }
}

/// Arguments for the serve command
#[derive(Debug, Clone)]
pub struct ServeArgs {
    /// Address both listeners bind to
    pub host: String,

    /// Trace collection port
    pub port: u16,

    /// Policy responder port, `None` disables the responder
    pub policy_port: Option<u16>,

    /// Policy document to serve instead of the built-in one
    pub policy_file: Option<PathBuf>,

    pub session: SessionOptions,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_TRACE_PORT,
            policy_port: Some(DEFAULT_POLICY_PORT),
            policy_file: None,
            session: SessionOptions::default(),
        }
    }
}

/// Arguments for the replay command
#[derive(Debug, Clone, Default)]
pub struct ReplayArgs {
    /// Captured trace file
    pub input: PathBuf,

    /// Session id naming the artifacts, defaults to the input file stem
    pub session_id: Option<String>,

    pub session: SessionOptions,

    /// Print text summary to stdout
    pub print_summary: bool,

    /// Rows in the text summary
    pub top: usize,
}

/// Arguments for the inspect command
#[derive(Debug, Clone, Default)]
pub struct InspectArgs {
    /// Report file to read
    pub file: PathBuf,

    /// Verify the report re-serializes to identical bytes
    pub check: bool,

    /// Heaviest edges to list
    pub top: usize,
}
