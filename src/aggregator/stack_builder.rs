//! Build collapsed stack format from finished invocations.
//!
//! Collapsed stacks are the input format for flamegraph generation.
//! Format: "parent;child;grandchild weight"
//!
//! Example: "main();Main::init;Loader::load 12"
//! This means: Loader::load, called through Main::init, spent 12 ms in
//! its own body (children excluded).

use super::call_stack::{Frame, Invocation, InvocationSink};
use crate::utils::config::ROOT_FUNCTION;
use log::debug;
use std::collections::HashMap;

/// A single collapsed stack entry
///
/// **Public** - used by flamegraph generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapsedStack {
    /// Stack trace as semicolon-separated string
    pub stack: String,

    /// Weight (exclusive milliseconds spent at the top of this stack)
    pub weight: u64,
}

impl CollapsedStack {
    /// Create a new collapsed stack
    ///
    /// **Public** - constructor
    pub fn new(stack: String, weight: u64) -> Self {
        Self { stack, weight }
    }

    /// Render as a `stack weight` line
    pub fn to_line(&self) -> String {
        format!("{} {}", self.stack, self.weight)
    }
}

/// Accumulates exclusive time per unique stack
///
/// Frames are named without recursion ordinals; recursion already shows
/// as repeated frames along the stack.
#[derive(Debug, Clone, Default)]
pub struct StackFolder {
    stack_map: HashMap<String, u64>,
}

impl StackFolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `weight` to the stack `ancestors` + `leaf`
    pub fn add(&mut self, ancestors: &[Frame], leaf: &str, weight: u64) {
        let mut stack = String::from(ROOT_FUNCTION);
        for frame in ancestors {
            stack.push(';');
            stack.push_str(&frame.function.report_name());
        }
        stack.push(';');
        stack.push_str(leaf);

        *self.stack_map.entry(stack).or_insert(0) += weight;
    }

    pub fn is_empty(&self) -> bool {
        self.stack_map.is_empty()
    }

    /// Collapsed stacks sorted by weight (descending)
    ///
    /// **Public** - main entry point for stack building
    pub fn build(&self) -> Vec<CollapsedStack> {
        let mut stacks: Vec<CollapsedStack> = self
            .stack_map
            .iter()
            .map(|(stack, weight)| CollapsedStack::new(stack.clone(), *weight))
            .collect();

        stacks.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.stack.cmp(&b.stack)));
        debug!("Built {} unique collapsed stacks", stacks.len());

        stacks
    }
}

impl InvocationSink for StackFolder {
    fn on_complete(&mut self, invocation: &Invocation, ancestors: &[Frame]) {
        self.add(
            ancestors,
            &invocation.function.report_name(),
            invocation.exclusive_time,
        );
    }
}
