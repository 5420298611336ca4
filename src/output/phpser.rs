//! PHP `serialize()` wire format.
//!
//! The XHProf viewer loads reports with PHP's `unserialize()`, so the
//! report is written in that grammar:
//!
//! ```text
//! N;                      null
//! b:1;                    bool
//! i:42;                   int
//! d:0.5;                  float
//! s:5:"hello";            string, length in bytes
//! a:2:{<key><value>...}   array, keys are int or string
//! ```
//!
//! A report is `a:N:{s:..:"caller==>callee";a:2:{s:2:"ct";i:..;s:2:"wt";d:..;}...}`
//! with an extra `mu` field on edges fed by pre-aggregated records.

use crate::aggregator::edges::{EdgeMap, EdgeStats};
use crate::utils::error::SerializeError;
use log::debug;

/// Deepest array nesting accepted when decoding
const MAX_NESTING: usize = 32;

/// A decoded PHP value
#[derive(Debug, Clone, PartialEq)]
pub enum PhpValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Vec<u8>),
    Array(Vec<(PhpValue, PhpValue)>),
}

impl PhpValue {
    pub fn str(s: &str) -> Self {
        PhpValue::Str(s.as_bytes().to_vec())
    }

    /// Look up a string key in an array value
    pub fn get(&self, key: &str) -> Option<&PhpValue> {
        match self {
            PhpValue::Array(entries) => entries
                .iter()
                .find(|(k, _)| matches!(k, PhpValue::Str(bytes) if bytes == key.as_bytes()))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            PhpValue::Float(v) => Some(*v),
            PhpValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            PhpValue::Int(v) => Some(*v),
            PhpValue::Float(v) if v.is_finite() => Some(v.round() as i64),
            _ => None,
        }
    }
}

/// Append the encoding of `value` to `out`
pub fn encode(value: &PhpValue, out: &mut Vec<u8>) {
    match value {
        PhpValue::Null => out.extend_from_slice(b"N;"),
        PhpValue::Bool(b) => out.extend_from_slice(if *b { b"b:1;" } else { b"b:0;" }),
        PhpValue::Int(i) => out.extend_from_slice(format!("i:{};", i).as_bytes()),
        PhpValue::Float(f) => out.extend_from_slice(format!("d:{};", format_float(*f)).as_bytes()),
        PhpValue::Str(bytes) => {
            out.extend_from_slice(format!("s:{}:\"", bytes.len()).as_bytes());
            out.extend_from_slice(bytes);
            out.extend_from_slice(b"\";");
        }
        PhpValue::Array(entries) => {
            out.extend_from_slice(format!("a:{}:{{", entries.len()).as_bytes());
            for (key, value) in entries {
                encode(key, out);
                encode(value, out);
            }
            out.push(b'}');
        }
    }
}

/// Render a float the way PHP's `serialize()` does
///
/// Shortest round-trip digits, no trailing `.0` on integral values, an
/// `E±` exponent outside [1e-4, 1e15), and `INF`/`-INF`/`NAN`.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "NAN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "INF" } else { "-INF" }.to_string();
    }

    let abs = value.abs();
    if abs == 0.0 || (1e-4..1e15).contains(&abs) {
        return format!("{}", value);
    }

    let scientific = format!("{:e}", value);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let mantissa = if mantissa.contains('.') {
        mantissa.to_string()
    } else {
        format!("{}.0", mantissa)
    };
    match exponent.strip_prefix('-') {
        Some(digits) => format!("{}E-{}", mantissa, digits),
        None => format!("{}E+{}", mantissa, exponent),
    }
}

/// Decode exactly one value spanning all of `bytes`
pub fn decode(bytes: &[u8]) -> Result<PhpValue, SerializeError> {
    let mut reader = Reader { bytes, pos: 0 };
    let value = reader.value(0)?;
    let trailing = bytes.len() - reader.pos;
    if trailing > 0 {
        return Err(SerializeError::TrailingBytes(trailing));
    }
    Ok(value)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn next(&mut self) -> Result<u8, SerializeError> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or(SerializeError::UnexpectedEof(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    fn expect(&mut self, wanted: u8, expected: &'static str) -> Result<(), SerializeError> {
        let offset = self.pos;
        let found = self.next()?;
        if found != wanted {
            return Err(SerializeError::UnexpectedByte {
                offset,
                found: found as char,
                expected,
            });
        }
        Ok(())
    }

    /// Bytes up to (not including) `terminator`, which is consumed
    fn token(&mut self, terminator: u8) -> Result<&'a str, SerializeError> {
        let start = self.pos;
        let len = self.bytes[start..]
            .iter()
            .position(|&b| b == terminator)
            .ok_or(SerializeError::UnexpectedEof(self.bytes.len()))?;
        self.pos = start + len + 1;
        std::str::from_utf8(&self.bytes[start..start + len])
            .map_err(|_| SerializeError::InvalidNumber(start))
    }

    fn integer<T: std::str::FromStr>(&mut self, terminator: u8) -> Result<T, SerializeError> {
        let start = self.pos;
        self.token(terminator)?
            .parse::<T>()
            .map_err(|_| SerializeError::InvalidNumber(start))
    }

    fn float(&mut self) -> Result<f64, SerializeError> {
        let start = self.pos;
        match self.token(b';')? {
            "INF" => Ok(f64::INFINITY),
            "-INF" => Ok(f64::NEG_INFINITY),
            "NAN" => Ok(f64::NAN),
            text => text
                .parse::<f64>()
                .map_err(|_| SerializeError::InvalidNumber(start)),
        }
    }

    fn value(&mut self, depth: usize) -> Result<PhpValue, SerializeError> {
        let offset = self.pos;
        match self.next()? {
            b'N' => {
                self.expect(b';', "';'")?;
                Ok(PhpValue::Null)
            }
            b'b' => {
                self.expect(b':', "':'")?;
                Ok(PhpValue::Bool(self.integer::<u8>(b';')? != 0))
            }
            b'i' => {
                self.expect(b':', "':'")?;
                Ok(PhpValue::Int(self.integer(b';')?))
            }
            b'd' => {
                self.expect(b':', "':'")?;
                Ok(PhpValue::Float(self.float()?))
            }
            b's' => {
                self.expect(b':', "':'")?;
                let len: usize = self.integer(b':')?;
                self.expect(b'"', "'\"'")?;
                let start = self.pos;
                let end = start
                    .checked_add(len)
                    .filter(|&end| end <= self.bytes.len())
                    .ok_or(SerializeError::UnexpectedEof(self.bytes.len()))?;
                self.pos = end;
                self.expect(b'"', "'\"'")?;
                self.expect(b';', "';'")?;
                Ok(PhpValue::Str(self.bytes[start..end].to_vec()))
            }
            b'a' => {
                if depth >= MAX_NESTING {
                    return Err(SerializeError::UnexpectedByte {
                        offset,
                        found: 'a',
                        expected: "shallower nesting",
                    });
                }
                self.expect(b':', "':'")?;
                let count: usize = self.integer(b':')?;
                self.expect(b'{', "'{'")?;
                // every entry takes at least 8 bytes, don't trust the count
                let mut entries = Vec::with_capacity(count.min(self.bytes.len() / 8));
                for _ in 0..count {
                    let key_offset = self.pos;
                    let key = self.value(depth + 1)?;
                    if !matches!(key, PhpValue::Int(_) | PhpValue::Str(_)) {
                        return Err(SerializeError::UnexpectedByte {
                            offset: key_offset,
                            found: self.bytes[key_offset] as char,
                            expected: "int or string key",
                        });
                    }
                    let value = self.value(depth + 1)?;
                    entries.push((key, value));
                }
                self.expect(b'}', "'}'")?;
                Ok(PhpValue::Array(entries))
            }
            other => Err(SerializeError::UnexpectedByte {
                offset,
                found: other as char,
                expected: "type tag",
            }),
        }
    }
}

/// Encode an edge map as a report
///
/// **Public** - main entry point for serialization
pub fn serialize_edges(edges: &EdgeMap) -> Vec<u8> {
    let entries = edges
        .iter()
        .map(|(key, stats)| (PhpValue::str(key), stats_to_value(stats)))
        .collect();

    let mut out = Vec::new();
    encode(&PhpValue::Array(entries), &mut out);
    debug!("Serialized {} report entries ({} bytes)", edges.len(), out.len());
    out
}

fn stats_to_value(stats: &EdgeStats) -> PhpValue {
    let call_count = i64::try_from(stats.call_count).unwrap_or(i64::MAX);
    let mut fields = vec![
        (PhpValue::str("ct"), PhpValue::Int(call_count)),
        (PhpValue::str("wt"), PhpValue::Float(stats.inclusive_time_ms())),
    ];
    if let Some(mu) = stats.memory_delta {
        fields.push((PhpValue::str("mu"), PhpValue::Int(mu)));
    }
    PhpValue::Array(fields)
}

/// Decode a report back into an edge map
///
/// Accepts `ct` and `wt` as either int or float, since older producers
/// wrote counts as floats.
pub fn deserialize_edges(bytes: &[u8]) -> Result<EdgeMap, SerializeError> {
    let entries = match decode(bytes)? {
        PhpValue::Array(entries) => entries,
        _ => {
            return Err(SerializeError::UnexpectedByte {
                offset: 0,
                found: bytes.first().map(|&b| b as char).unwrap_or(' '),
                expected: "top-level array",
            })
        }
    };

    let mut edges = EdgeMap::new();
    for (key, value) in entries {
        let key = match key {
            PhpValue::Str(bytes) => String::from_utf8(bytes).map_err(|e| {
                SerializeError::InvalidUtf8Key(String::from_utf8_lossy(e.as_bytes()).into_owned())
            })?,
            PhpValue::Int(i) => i.to_string(),
            _ => {
                return Err(SerializeError::UnexpectedByte {
                    offset: 0,
                    found: '?',
                    expected: "int or string key",
                })
            }
        };

        let call_count = value
            .get("ct")
            .and_then(PhpValue::as_i64)
            .ok_or_else(|| SerializeError::MissingField {
                key: key.clone(),
                field: "ct",
            })?;
        let wall_time = value
            .get("wt")
            .and_then(PhpValue::as_f64)
            .ok_or_else(|| SerializeError::MissingField {
                key: key.clone(),
                field: "wt",
            })?;
        let memory_delta = value.get("mu").and_then(PhpValue::as_i64);

        edges.insert(
            key,
            EdgeStats::new(call_count.max(0) as u64, wall_time, memory_delta),
        );
    }

    Ok(edges)
}
