//! Flamegraph generation using the inferno library.
//!
//! This module converts collapsed stacks into interactive SVG flamegraphs
//! showing where a session's time went.

pub mod generator;

// Re-export main types
pub use generator::{generate_flamegraph, generate_text_summary, FlamegraphConfig};
