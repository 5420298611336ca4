//! Flash Trace Collector CLI
//!
//! Receives Flash function traces over TCP and writes one XHProf report
//! per connection.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use flash_trace_collector::commands::{
    display_schema, display_version, execute_inspect, execute_replay, execute_serve, InspectArgs,
    ReplayArgs, ServeArgs, SessionOptions,
};
use flash_trace_collector::parser::IngestMode;
use flash_trace_collector::utils::config::{
    DEFAULT_POLICY_PORT, DEFAULT_TRACE_PORT, MAX_STACK_DEPTH,
};

/// Flash Trace Collector - XHProf call graphs from Flash traces
#[derive(Parser, Debug)]
#[command(name = "flash-trace")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Options shared by commands that run sessions
#[derive(Args, Debug)]
struct SessionArgs {
    /// Line grammar: "trace" events or pre-aggregated "records"
    #[arg(short, long, env = "FLASH_TRACE_MODE", default_value = "trace")]
    mode: IngestMode,

    /// Directory receiving the reports
    #[arg(short, long, env = "FLASH_TRACE_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Also write an SVG flamegraph per session
    #[arg(long, env = "FLASH_TRACE_FLAMEGRAPH")]
    flamegraph: bool,

    /// Flamegraph width in pixels
    #[arg(long, default_value = "1200")]
    width: usize,

    /// POST each report to this URL after writing it
    #[arg(long, env = "FLASH_TRACE_UPLOAD_URL")]
    upload_url: Option<String>,

    /// Deepest call stack tracked per session
    #[arg(long, env = "FLASH_TRACE_MAX_DEPTH", default_value_t = MAX_STACK_DEPTH)]
    max_depth: usize,
}

impl From<SessionArgs> for SessionOptions {
    fn from(args: SessionArgs) -> Self {
        Self {
            mode: args.mode,
            output_dir: args.output_dir,
            flamegraph: args.flamegraph,
            flamegraph_width: args.width,
            upload_url: args.upload_url,
            max_depth: args.max_depth,
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Collect traces from connecting Flash clients
    Serve {
        /// Address to bind
        #[arg(long, env = "FLASH_TRACE_HOST", default_value = "0.0.0.0")]
        host: String,

        /// Trace collection port
        #[arg(short, long, env = "FLASH_TRACE_PORT", default_value_t = DEFAULT_TRACE_PORT)]
        port: u16,

        /// Cross-domain policy port
        #[arg(long, env = "FLASH_TRACE_POLICY_PORT", default_value_t = DEFAULT_POLICY_PORT)]
        policy_port: u16,

        /// Do not run the policy responder
        #[arg(long)]
        no_policy: bool,

        /// Policy document to serve instead of the built-in one
        #[arg(long, env = "FLASH_TRACE_POLICY_FILE")]
        policy_file: Option<PathBuf>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Aggregate a captured trace file
    Replay {
        /// Trace file, one event or record per line
        input: PathBuf,

        /// Session id naming the reports (default: input file stem)
        #[arg(long)]
        session_id: Option<String>,

        /// Print text summary to stdout
        #[arg(long)]
        summary: bool,

        /// Rows in the text summary
        #[arg(long, default_value = "20")]
        top: usize,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Read back a report and print its contents
    Inspect {
        /// Path to the .xhprof report
        file: PathBuf,

        /// Fail unless the report re-serializes to identical bytes
        #[arg(long)]
        check: bool,

        /// Heaviest edges to list
        #[arg(long, default_value = "20")]
        top: usize,
    },

    /// Display report format information
    Schema {
        /// Show full format details
        #[arg(long)]
        show: bool,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Execute command
    match cli.command {
        Commands::Serve {
            host,
            port,
            policy_port,
            no_policy,
            policy_file,
            session,
        } => {
            execute_serve(ServeArgs {
                host,
                port,
                policy_port: (!no_policy).then_some(policy_port),
                policy_file,
                session: session.into(),
            })?;
        }

        Commands::Replay {
            input,
            session_id,
            summary,
            top,
            session,
        } => {
            execute_replay(ReplayArgs {
                input,
                session_id,
                session: session.into(),
                print_summary: summary,
                top,
            })?;
        }

        Commands::Inspect { file, check, top } => {
            execute_inspect(&InspectArgs { file, check, top })?;
        }

        Commands::Schema { show } => {
            display_schema(show);
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
