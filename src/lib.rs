//! Flash Trace Collector
//!
//! Collects function enter/exit traces streamed by instrumented Flash
//! applications and aggregates them into XHProf-compatible call-graph
//! reports.
//!
//! This crate provides the core implementation for the `flash-trace`
//! CLI tool. The aggregation engine (`parser` → `aggregator` →
//! `output::phpser`) is synchronous and performs no I/O; `session` ties
//! it together for one input stream, and `server` runs sessions over TCP.
//!
//! ## Getting Started
//!
//! ```bash
//! flash-trace serve --output-dir reports/
//! flash-trace replay capture.log --summary
//! flash-trace inspect reports/127.0.0.1-50412.xhprof --check
//! ```

pub mod aggregator;
pub mod commands;
pub mod flamegraph;
pub mod output;
pub mod parser;
pub mod server;
pub mod session;
pub mod upload;
pub mod utils;
