//! Per-function timing statistics.
//!
//! Tracks inclusive and exclusive time per distinct function along with
//! the callers and callees seen for it. These feed the text summary and
//! the session diagnostics; they are not part of the exported report.

use super::call_stack::{Frame, Invocation, InvocationSink};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// Running statistics of one function
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionStats {
    /// Number of finalized invocations
    pub calls: u64,

    pub total_inclusive_time: u64,
    pub total_exclusive_time: u64,
    pub max_inclusive_time: u64,
    pub max_exclusive_time: u64,

    /// Qualified names of callers seen
    pub parents: BTreeSet<String>,

    /// Qualified names of callees seen
    pub children: BTreeSet<String>,
}

impl FunctionStats {
    /// Mean exclusive time per call in milliseconds
    pub fn mean_exclusive_time(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_exclusive_time as f64 / self.calls as f64
        }
    }
}

/// Statistics of every function seen in a session
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: BTreeMap<String, FunctionStats>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stats for `name`, created zeroed on first access
    pub fn get_or_insert(&mut self, name: &str) -> &mut FunctionStats {
        self.functions.entry(name.to_string()).or_insert_with(|| {
            debug!("tracking new function {}", name);
            FunctionStats::default()
        })
    }

    /// Account one finalized invocation
    pub fn record(&mut self, invocation: &Invocation) {
        let name = invocation.function.qualified_name();
        let parent = invocation
            .parent_function
            .as_ref()
            .map(|parent| parent.qualified_name());

        let stats = self.get_or_insert(&name);
        stats.calls += 1;
        stats.total_inclusive_time = stats
            .total_inclusive_time
            .saturating_add(invocation.inclusive_time);
        stats.total_exclusive_time = stats
            .total_exclusive_time
            .saturating_add(invocation.exclusive_time);
        stats.max_inclusive_time = stats.max_inclusive_time.max(invocation.inclusive_time);
        stats.max_exclusive_time = stats.max_exclusive_time.max(invocation.exclusive_time);

        if let Some(parent) = parent {
            stats.parents.insert(parent.clone());
            self.get_or_insert(&parent).children.insert(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&FunctionStats> {
        self.functions.get(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FunctionStats)> {
        self.functions.iter().map(|(name, stats)| (name.as_str(), stats))
    }

    /// Functions sorted by total exclusive time, heaviest first
    pub fn hottest(&self, top_n: usize) -> Vec<(&str, &FunctionStats)> {
        let mut sorted: Vec<(&str, &FunctionStats)> = self.iter().collect();
        sorted.sort_by(|a, b| {
            b.1.total_exclusive_time
                .cmp(&a.1.total_exclusive_time)
                .then_with(|| a.0.cmp(b.0))
        });
        sorted.truncate(top_n);
        sorted
    }

    /// Sum of exclusive time over all functions
    pub fn total_exclusive_time(&self) -> u64 {
        self.functions
            .values()
            .map(|stats| stats.total_exclusive_time)
            .sum()
    }
}

impl InvocationSink for FunctionTable {
    fn on_complete(&mut self, invocation: &Invocation, _ancestors: &[Frame]) {
        self.record(invocation);
    }
}
