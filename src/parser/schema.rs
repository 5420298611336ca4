//! Typed input records produced by the line decoders.

use crate::utils::config::RECURSION_MARKER;
use std::fmt;
use std::str::FromStr;

/// Whether an event opens or closes an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Enter,
    Exit,
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Enter" => Ok(EventKind::Enter),
            "Exit" => Ok(EventKind::Exit),
            other => Err(other.to_string()),
        }
    }
}

/// Identity of a traced function
///
/// Two events refer to the same function when both the class and the
/// function name are equal; nothing else takes part in stack matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionId {
    /// Owning class, `None` for free functions
    pub class: Option<String>,

    /// Function name
    pub function: String,
}

impl FunctionId {
    /// Create an id from a class and a function name
    ///
    /// An empty class is treated as no class.
    pub fn new(class: impl Into<String>, function: impl Into<String>) -> Self {
        let class = class.into();
        Self {
            class: if class.is_empty() { None } else { Some(class) },
            function: function.into(),
        }
    }

    /// Create an id for a function without a class
    pub fn bare(function: impl Into<String>) -> Self {
        Self {
            class: None,
            function: function.into(),
        }
    }

    /// `Class::function`, or just `function` when there is no class
    pub fn qualified_name(&self) -> String {
        match &self.class {
            Some(class) => format!("{}::{}", class, self.function),
            None => self.function.clone(),
        }
    }

    /// Name used in report keys
    ///
    /// Angle brackets in the function part collide with the viewer's
    /// markup, so they are rendered as `$`.
    pub fn report_name(&self) -> String {
        let function = self.function.replace(['<', '>'], "$");
        match &self.class {
            Some(class) => format!("{}::{}", class, function),
            None => function,
        }
    }

    /// Report name with the recursion ordinal appended when non-zero
    pub fn report_name_at(&self, recursion_ordinal: usize) -> String {
        if recursion_ordinal == 0 {
            self.report_name()
        } else {
            format!("{}{}{}", self.report_name(), RECURSION_MARKER, recursion_ordinal)
        }
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

/// A single call-entry or call-exit event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Milliseconds, non-decreasing within a session
    pub timestamp: u64,

    pub kind: EventKind,

    pub function: FunctionId,
}

/// A pre-aggregated caller→callee record
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRecord {
    pub caller: String,
    pub callee: String,

    /// Elapsed time in milliseconds
    pub weight: f64,

    /// Number of calls folded into this record
    pub count: u64,

    /// Memory usage delta in bytes
    pub memory_delta: i64,
}
