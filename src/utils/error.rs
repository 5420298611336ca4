//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use thiserror::Error;

/// Errors that can occur while decoding a single input line
///
/// Always recoverable: the session logs the error and skips the line.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("line does not start with a bracketed timestamp")]
    MissingTimestamp,

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("unknown event kind '{0}'")]
    UnknownEventKind(String),

    #[error("missing function name")]
    MissingFunction,

    #[error("expected {expected} record fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("edge key '{0}' is not a single caller==>callee pair")]
    InvalidEdgeKey(String),

    #[error("invalid {field} value '{value}'")]
    InvalidNumber { field: &'static str, value: String },
}

/// Errors raised by the call stack automaton
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StackError {
    /// Exit with no matching frame anywhere on the stack. Session-fatal.
    #[error("exit of '{name}' has no matching open frame")]
    Desync { name: String },

    /// Event arrived after a desync ended the stack
    #[error("call stack halted by an earlier desync")]
    Halted,

    /// Enter would nest deeper than the configured limit. Recoverable,
    /// the event is skipped.
    #[error("enter of '{name}' exceeds the maximum stack depth of {limit}")]
    DepthExceeded { name: String, limit: usize },
}

impl StackError {
    /// Whether this error ends the session
    pub fn is_fatal(&self) -> bool {
        matches!(self, StackError::Desync { .. } | StackError::Halted)
    }
}

/// Errors that can occur when reading a serialized report back
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SerializeError {
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEof(usize),

    #[error("unexpected byte '{found}' at {offset}, expected {expected}")]
    UnexpectedByte {
        offset: usize,
        found: char,
        expected: &'static str,
    },

    #[error("invalid number at byte {0}")]
    InvalidNumber(usize),

    #[error("report key '{0}' is not valid UTF-8")]
    InvalidUtf8Key(String),

    #[error("edge '{key}' is missing field '{field}'")]
    MissingField { key: String, field: &'static str },

    #[error("{0} trailing bytes after report")]
    TrailingBytes(usize),
}

/// Errors that can occur during flamegraph generation
#[derive(Error, Debug)]
pub enum FlamegraphError {
    #[error("Empty stack data")]
    EmptyStacks,

    #[error("Failed to generate flamegraph: {0}")]
    GenerationFailed(String),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Malformed report: {0}")]
    MalformedReport(#[from] SerializeError),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}

/// Errors that can occur while uploading an artifact
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Upload rejected: {0}")]
    Rejected(String),

    #[error("Invalid upload URL: {0}")]
    InvalidUrl(String),
}
