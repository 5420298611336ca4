//! Aggregation of call events into a weighted call graph.
//!
//! This module transforms decoded events into:
//! - Finished invocations with inclusive/exclusive time (call stack)
//! - The caller→callee edge map exported as the report
//! - Per-function statistics and collapsed stacks for summaries

pub mod call_stack;
pub mod edges;
pub mod metrics;
pub mod stack_builder;

// Re-export main types and functions
pub use call_stack::{CallStack, ExitOutcome, Frame, Invocation, InvocationSink, StackState};
pub use edges::{EdgeKey, EdgeMap, EdgeStats};
pub use metrics::{FunctionStats, FunctionTable};
pub use stack_builder::{CollapsedStack, StackFolder};
