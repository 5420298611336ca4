//! Caller→callee edge accumulation.
//!
//! Every finished invocation (stack mode) or pre-aggregated record
//! (direct mode) is merged into an `EdgeMap` keyed by `caller==>callee`.
//! Elapsed time is summed in whole nanoseconds so that merging is exactly
//! commutative and associative; the report shows it as float milliseconds.

use super::call_stack::{Frame, Invocation, InvocationSink};
use crate::parser::schema::EdgeRecord;
use crate::utils::config::{EDGE_SEPARATOR, RECURSION_MARKER, ROOT_FUNCTION, TIMESTAMP_TO_MS};
use log::debug;
use std::collections::btree_map::{self, BTreeMap};
use std::fmt;

const NANOS_PER_MS: f64 = 1_000_000.0;

/// Convert float milliseconds to the accumulator's integer nanoseconds
pub fn ms_to_nanos(ms: f64) -> i128 {
    if ms.is_finite() {
        (ms * NANOS_PER_MS).round() as i128
    } else {
        0
    }
}

/// Whether `ms` carries precision below one nanosecond
pub fn loses_precision(ms: f64) -> bool {
    ms.is_finite() && (ms * NANOS_PER_MS).fract() != 0.0
}

/// Convert a timestamp delta to integer nanoseconds
pub fn elapsed_to_nanos(elapsed: u64) -> i128 {
    ms_to_nanos(elapsed as f64 * TIMESTAMP_TO_MS)
}

/// Caller→callee pair identifying an edge
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeKey {
    pub caller: String,
    pub callee: String,
}

impl EdgeKey {
    /// Build a key, substituting the root for a missing caller
    ///
    /// A direct self-call (`caller == callee`) gets a recursion suffix on
    /// the callee so it never collides with the edge into the function.
    pub fn resolve(caller: Option<&str>, callee: &str) -> Self {
        let caller = caller.unwrap_or(ROOT_FUNCTION);
        let callee = if caller == callee {
            format!("{}{}1", callee, RECURSION_MARKER)
        } else {
            callee.to_string()
        };
        Self {
            caller: caller.to_string(),
            callee,
        }
    }

    /// Split a rendered `caller==>callee` key
    pub fn parse(rendered: &str) -> Option<Self> {
        rendered
            .split_once(EDGE_SEPARATOR)
            .map(|(caller, callee)| Self {
                caller: caller.to_string(),
                callee: callee.to_string(),
            })
    }

    pub fn is_root(&self) -> bool {
        self.caller == ROOT_FUNCTION
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.caller, EDGE_SEPARATOR, self.callee)
    }
}

/// Aggregated statistics of one report entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeStats {
    /// Number of finalized transitions
    pub call_count: u64,

    /// Summed elapsed time in nanoseconds
    inclusive_time_ns: i128,

    /// Summed memory delta, only carried by direct-mode records
    pub memory_delta: Option<i64>,
}

impl EdgeStats {
    pub fn new(call_count: u64, inclusive_time_ms: f64, memory_delta: Option<i64>) -> Self {
        Self {
            call_count,
            inclusive_time_ns: ms_to_nanos(inclusive_time_ms),
            memory_delta,
        }
    }

    /// Summed elapsed time in milliseconds
    pub fn inclusive_time_ms(&self) -> f64 {
        self.inclusive_time_ns as f64 / NANOS_PER_MS
    }

    pub fn inclusive_time_ns(&self) -> i128 {
        self.inclusive_time_ns
    }

    /// Fold `other` into `self`
    pub fn merge(&mut self, other: &EdgeStats) {
        self.call_count = self.call_count.saturating_add(other.call_count);
        self.inclusive_time_ns += other.inclusive_time_ns;
        self.add_memory(other.memory_delta);
    }

    fn add_time_ns(&mut self, nanos: i128) {
        self.inclusive_time_ns += nanos;
    }

    fn add_memory(&mut self, delta: Option<i64>) {
        if let Some(delta) = delta {
            let total = self.memory_delta.unwrap_or(0);
            self.memory_delta = Some(total.wrapping_add(delta));
        }
    }
}

/// The call graph of one session
///
/// Holds `caller==>callee` edges plus the standalone `main()` entry that
/// carries the run's total root-level time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeMap {
    entries: BTreeMap<String, EdgeStats>,
}

impl EdgeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `key`, created zeroed on first access
    pub fn get_or_insert(&mut self, key: &str) -> &mut EdgeStats {
        match self.entries.entry(key.to_string()) {
            btree_map::Entry::Occupied(entry) => entry.into_mut(),
            btree_map::Entry::Vacant(entry) => {
                debug!("new report entry {}", key);
                entry.insert(EdgeStats::default())
            }
        }
    }

    /// Insert or replace an entry as-is
    pub fn insert(&mut self, key: impl Into<String>, stats: EdgeStats) {
        self.entries.insert(key.into(), stats);
    }

    /// Record one finalized invocation (stack mode)
    ///
    /// `caller` is `None` for root-level invocations, whose time also
    /// goes to the `main()` entry.
    pub fn record_call(&mut self, caller: Option<&str>, callee: &str, elapsed_ns: i128) {
        if caller.is_none() {
            self.add_root_time(elapsed_ns, None);
        }

        let key = EdgeKey::resolve(caller, callee).to_string();
        let stats = self.get_or_insert(&key);
        stats.call_count = stats.call_count.saturating_add(1);
        stats.add_time_ns(elapsed_ns);
    }

    /// Merge one pre-aggregated record (direct mode)
    pub fn merge_record(&mut self, record: &EdgeRecord) {
        let elapsed_ns = ms_to_nanos(record.weight);
        if loses_precision(record.weight) {
            debug!(
                "{}==>{} weight {} ms rounded to {} ns",
                record.caller, record.callee, record.weight, elapsed_ns
            );
        }

        if record.caller == ROOT_FUNCTION {
            self.add_root_time(elapsed_ns, Some(record.memory_delta));
        }

        let key = EdgeKey::resolve(Some(&record.caller), &record.callee).to_string();
        let stats = self.get_or_insert(&key);
        stats.call_count = stats.call_count.saturating_add(record.count);
        stats.add_time_ns(elapsed_ns);
        stats.add_memory(Some(record.memory_delta));
    }

    /// Fold every entry of `other` into `self`
    pub fn merge(&mut self, other: &EdgeMap) {
        for (key, stats) in &other.entries {
            let entry = self.get_or_insert(key);
            entry.merge(stats);
            if key == ROOT_FUNCTION {
                entry.call_count = 1;
            }
        }
    }

    // The root entry counts one run however many root-level calls fed it.
    fn add_root_time(&mut self, elapsed_ns: i128, memory_delta: Option<i64>) {
        let root = self.get_or_insert(ROOT_FUNCTION);
        root.call_count = 1;
        root.add_time_ns(elapsed_ns);
        root.add_memory(memory_delta);
    }

    pub fn get(&self, key: &str) -> Option<&EdgeStats> {
        self.entries.get(key)
    }

    /// The standalone `main()` entry, if any root time was recorded
    pub fn root(&self) -> Option<&EdgeStats> {
        self.entries.get(ROOT_FUNCTION)
    }

    /// Entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EdgeStats)> {
        self.entries.iter().map(|(key, stats)| (key.as_str(), stats))
    }

    /// `caller==>callee` edges only, without the `main()` entry
    pub fn edges(&self) -> impl Iterator<Item = (EdgeKey, &EdgeStats)> {
        self.entries
            .iter()
            .filter_map(|(key, stats)| EdgeKey::parse(key).map(|key| (key, stats)))
    }

    /// Sum of elapsed time over root-level edges, in milliseconds
    pub fn root_edge_total_ms(&self) -> f64 {
        let nanos: i128 = self
            .edges()
            .filter(|(key, _)| key.is_root())
            .map(|(_, stats)| stats.inclusive_time_ns)
            .sum();
        nanos as f64 / NANOS_PER_MS
    }

    /// Whether any entry carries a memory delta
    pub fn has_memory(&self) -> bool {
        self.entries.values().any(|stats| stats.memory_delta.is_some())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by elapsed time, heaviest first
    pub fn heaviest(&self, top_n: usize) -> Vec<(&str, &EdgeStats)> {
        let mut sorted: Vec<(&str, &EdgeStats)> = self.iter().collect();
        sorted.sort_by(|a, b| b.1.inclusive_time_ns.cmp(&a.1.inclusive_time_ns));
        sorted.truncate(top_n);
        sorted
    }
}

impl InvocationSink for EdgeMap {
    fn on_complete(&mut self, invocation: &Invocation, _ancestors: &[Frame]) {
        self.record_call(
            invocation.parent.as_deref(),
            &invocation.name,
            elapsed_to_nanos(invocation.inclusive_time),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(caller: &str, callee: &str, weight: f64, count: u64, mu: i64) -> EdgeRecord {
        EdgeRecord {
            caller: caller.to_string(),
            callee: callee.to_string(),
            weight,
            count,
            memory_delta: mu,
        }
    }

    #[test]
    fn test_resolve_root_and_self_recursion() {
        assert_eq!(EdgeKey::resolve(None, "A").to_string(), "main()==>A");
        assert_eq!(EdgeKey::resolve(Some("A"), "B").to_string(), "A==>B");
        assert_eq!(EdgeKey::resolve(Some("A"), "A").to_string(), "A==>A@1");
    }

    #[test]
    fn test_parse_key() {
        let key = EdgeKey::parse("Foo::a==>Bar::b").unwrap();
        assert_eq!(key.caller, "Foo::a");
        assert_eq!(key.callee, "Bar::b");
        assert!(EdgeKey::parse("main()").is_none());
    }

    #[test]
    fn test_record_call_accumulates() {
        let mut edges = EdgeMap::new();
        edges.record_call(None, "A", elapsed_to_nanos(10));
        edges.record_call(None, "A", elapsed_to_nanos(5));
        edges.record_call(Some("A"), "B", elapsed_to_nanos(3));

        let a = edges.get("main()==>A").unwrap();
        assert_eq!(a.call_count, 2);
        assert_eq!(a.inclusive_time_ms(), 15.0);
        assert_eq!(a.memory_delta, None);

        let root = edges.root().unwrap();
        assert_eq!(root.call_count, 1);
        assert_eq!(root.inclusive_time_ms(), 15.0);
        assert_eq!(edges.root_edge_total_ms(), 15.0);
        assert_eq!(edges.len(), 3);
    }

    #[test]
    fn test_merge_record_direct_mode() {
        let mut edges = EdgeMap::new();
        edges.merge_record(&record("main()", "A", 2.5, 1, 100));
        edges.merge_record(&record("A", "A", 1.0, 4, -8));

        let root = edges.root().unwrap();
        assert_eq!(root.inclusive_time_ms(), 2.5);
        assert_eq!(root.memory_delta, Some(100));

        let self_edge = edges.get("A==>A@1").unwrap();
        assert_eq!(self_edge.call_count, 4);
        assert_eq!(self_edge.memory_delta, Some(-8));
        assert!(edges.has_memory());
    }

    #[test]
    fn test_sub_nanosecond_weights_round() {
        assert!(loses_precision(0.0000004));
        assert!(loses_precision(1.23456789));
        assert!(!loses_precision(1.5));
        assert!(!loses_precision(f64::NAN));
        assert_eq!(ms_to_nanos(0.0000004), 0);
        assert_eq!(ms_to_nanos(1.23456789), 1_234_568);
    }

    #[test]
    fn test_merge_maps() {
        let mut left = EdgeMap::new();
        left.merge_record(&record("A", "B", 1.5, 1, 0));
        left.merge_record(&record("main()", "A", 3.0, 1, 0));
        let mut right = EdgeMap::new();
        right.merge_record(&record("main()", "A", 1.0, 1, 0));
        right.merge_record(&record("A", "B", 0.25, 2, 4));
        right.merge_record(&record("B", "C", 1.0, 1, 0));

        left.merge(&right);
        let ab = left.get("A==>B").unwrap();
        assert_eq!(ab.call_count, 3);
        assert_eq!(ab.inclusive_time_ms(), 1.75);
        assert_eq!(ab.memory_delta, Some(4));
        assert_eq!(left.root().unwrap().call_count, 1);
        assert_eq!(left.root().unwrap().inclusive_time_ms(), 4.0);
        assert_eq!(left.get("main()==>A").unwrap().call_count, 2);
        assert_eq!(left.len(), 4);
    }

    #[test]
    fn test_heaviest() {
        let mut edges = EdgeMap::new();
        edges.record_call(Some("A"), "B", elapsed_to_nanos(1));
        edges.record_call(Some("A"), "C", elapsed_to_nanos(9));
        edges.record_call(Some("A"), "D", elapsed_to_nanos(4));

        let top = edges.heaviest(2);
        assert_eq!(top[0].0, "A==>C");
        assert_eq!(top[1].0, "A==>D");
    }
}
