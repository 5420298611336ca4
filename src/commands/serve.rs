//! Serve command implementation.
//!
//! The serve command:
//! 1. Binds the policy responder (unless disabled) on its own thread
//! 2. Binds the trace collection listener
//! 3. Runs one session per accepted connection until killed

use super::models::{ServeArgs, SessionOptions};
use crate::server::{load_policy, CollectionServer, PolicyServer};
use anyhow::{Context, Result};
use log::info;
use std::thread;

/// Execute the serve command
///
/// **Public** - main entry point called from main.rs
///
/// Blocks for the lifetime of the process.
///
/// # Errors
/// * Invalid arguments
/// * Policy file unreadable
/// * Either listener failing to bind
pub fn execute_serve(args: ServeArgs) -> Result<()> {
    validate_serve_args(&args)?;
    let config = args.session.to_collector_config()?;

    if let Some(policy_port) = args.policy_port {
        let policy = load_policy(args.policy_file.as_deref()).with_context(|| {
            format!(
                "Failed to read policy file {}",
                args.policy_file
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            )
        })?;
        let policy_server = PolicyServer::bind((args.host.as_str(), policy_port), policy)
            .with_context(|| format!("Failed to bind policy port {}", policy_port))?;

        thread::Builder::new()
            .name("policy-listener".to_string())
            .spawn(move || policy_server.run())
            .context("Failed to start policy listener")?;
    } else {
        info!("Policy responder disabled");
    }

    let server = CollectionServer::bind((args.host.as_str(), args.port), config)
        .with_context(|| format!("Failed to bind trace port {}", args.port))?;
    server.run();

    Ok(())
}

/// Validate options shared with replay
pub fn validate_session_options(options: &SessionOptions) -> Result<()> {
    if options.output_dir.is_file() {
        anyhow::bail!(
            "Output directory {} is a file",
            options.output_dir.display()
        );
    }

    if let Some(url) = &options.upload_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            anyhow::bail!("Upload URL must start with http:// or https://");
        }
    }

    if options.max_depth == 0 {
        anyhow::bail!("max_depth must be greater than 0");
    }

    if options.flamegraph && options.flamegraph_width == 0 {
        anyhow::bail!("Flamegraph width must be greater than 0");
    }

    Ok(())
}

/// Validate serve arguments
///
/// **Public** - can be called before execute_serve for early validation
pub fn validate_serve_args(args: &ServeArgs) -> Result<()> {
    if args.host.is_empty() {
        anyhow::bail!("Host cannot be empty");
    }

    if args.policy_port == Some(args.port) && args.port != 0 {
        anyhow::bail!("Trace and policy ports must differ ({})", args.port);
    }

    if args.policy_port.is_none() && args.policy_file.is_some() {
        anyhow::bail!("A policy file was given but the policy responder is disabled");
    }

    if let Some(path) = &args.policy_file {
        if !path.is_file() {
            anyhow::bail!("Policy file {} does not exist", path.display());
        }
    }

    validate_session_options(&args.session)
}
