//! Decoder for pre-aggregated edge records.
//!
//! Four fields separated by `\x02`: `caller==>callee`, weight (float),
//! count (integer), memory delta (integer).

use super::schema::EdgeRecord;
use crate::utils::config::{EDGE_SEPARATOR, RECORD_DELIMITER, RECORD_FIELD_COUNT};
use crate::utils::error::DecodeError;

/// Decode one pre-aggregated record line
///
/// **Public** - used by the session decoder
///
/// # Errors
/// * `DecodeError::FieldCount` - not exactly four fields
/// * `DecodeError::InvalidEdgeKey` - key does not hold exactly one `==>`
/// * `DecodeError::InvalidNumber` - weight, count or memory delta unparsable
pub fn parse_record_line(line: &str) -> Result<EdgeRecord, DecodeError> {
    let fields: Vec<&str> = line.split(RECORD_DELIMITER).collect();
    if fields.len() != RECORD_FIELD_COUNT {
        return Err(DecodeError::FieldCount {
            expected: RECORD_FIELD_COUNT,
            found: fields.len(),
        });
    }

    let (caller, callee) = fields[0]
        .split_once(EDGE_SEPARATOR)
        .filter(|(caller, callee)| {
            !caller.is_empty() && !callee.is_empty() && !callee.contains(EDGE_SEPARATOR)
        })
        .ok_or_else(|| DecodeError::InvalidEdgeKey(fields[0].to_string()))?;

    let weight = fields[1]
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|w| w.is_finite())
        .ok_or_else(|| invalid("weight", fields[1]))?;

    let count = fields[2]
        .trim()
        .parse::<u64>()
        .map_err(|_| invalid("count", fields[2]))?;

    let memory_delta = fields[3]
        .trim()
        .parse::<i64>()
        .map_err(|_| invalid("memory delta", fields[3]))?;

    Ok(EdgeRecord {
        caller: caller.to_string(),
        callee: callee.to_string(),
        weight,
        count,
        memory_delta,
    })
}

fn invalid(field: &'static str, value: &str) -> DecodeError {
    DecodeError::InvalidNumber {
        field,
        value: value.to_string(),
    }
}
