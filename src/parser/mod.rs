//! Input line decoding.
//!
//! This module handles:
//! - The textual `[ts] Enter|Exit name` event grammar
//! - The `\x02`-delimited pre-aggregated record grammar
//! - Selecting the grammar for a deployment

pub mod decoder;
pub mod record_line;
pub mod schema;
pub mod trace_line;

// Re-export main types
pub use decoder::{decode_line, Decoded, IngestMode};
pub use record_line::parse_record_line;
pub use schema::{EdgeRecord, Event, EventKind, FunctionId};
pub use trace_line::{parse_function_name, parse_trace_line};
