//! Decoder for the textual event grammar.
//!
//! Format: `[<timestamp>] <Enter|Exit> <name>`
//!
//! The Flash instrumentation emits names as `function@file;Class`, e.g.
//! `add@InitializationManager.as:62;InitializationManager`. The file part
//! is dropped; names without that shape are taken verbatim.

use super::schema::{Event, EventKind, FunctionId};
use crate::utils::error::DecodeError;

/// Decode one textual trace line
///
/// **Public** - used by the session decoder
///
/// # Errors
/// * `DecodeError::MissingTimestamp` - no `[...]` prefix
/// * `DecodeError::InvalidTimestamp` - prefix is not a non-negative integer
/// * `DecodeError::UnknownEventKind` - neither `Enter` nor `Exit`
/// * `DecodeError::MissingFunction` - nothing after the event kind
pub fn parse_trace_line(line: &str) -> Result<Event, DecodeError> {
    let rest = line
        .strip_prefix('[')
        .ok_or(DecodeError::MissingTimestamp)?;
    let (raw_ts, rest) = rest.split_once(']').ok_or(DecodeError::MissingTimestamp)?;

    let timestamp = parse_timestamp(raw_ts)?;

    let rest = rest.trim_start();
    let (raw_kind, raw_name) = rest.split_once(' ').unwrap_or((rest, ""));

    let kind = raw_kind
        .parse::<EventKind>()
        .map_err(DecodeError::UnknownEventKind)?;

    let raw_name = raw_name.trim();
    if raw_name.is_empty() {
        return Err(DecodeError::MissingFunction);
    }

    Ok(Event {
        timestamp,
        kind,
        function: parse_function_name(raw_name),
    })
}

/// Parse the digits between the brackets
fn parse_timestamp(raw: &str) -> Result<u64, DecodeError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::InvalidTimestamp(raw.to_string()));
    }
    raw.parse::<u64>()
        .map_err(|_| DecodeError::InvalidTimestamp(raw.to_string()))
}

/// Split `function@file;Class` into a function id
///
/// **Public** - also used by tests and the record decoder's callers
///
/// The function part may itself contain `@`; the split happens at the
/// last `@` that is followed by a `;`.
pub fn parse_function_name(raw: &str) -> FunctionId {
    for (at, _) in raw.rmatch_indices('@') {
        let after = &raw[at + 1..];
        if let Some((_file, class)) = after.split_once(';') {
            return FunctionId::new(class, &raw[..at]);
        }
    }
    FunctionId::bare(raw)
}
