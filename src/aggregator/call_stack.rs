//! Per-session call stack automaton.
//!
//! Matches Enter/Exit events, unwinds frames whose Exit was never seen,
//! and computes inclusive and exclusive time for every finished
//! invocation.
//!
//! States: `Closed` (empty) and `Open` (at least one live frame). An Exit
//! that unwinds the whole stack without finding its frame moves the
//! automaton to `Fatal`, after which it accepts no further events.

use crate::parser::schema::FunctionId;
use crate::utils::config::MAX_STACK_DEPTH;
use crate::utils::error::StackError;
use log::{debug, error};

/// One open invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub function: FunctionId,

    /// Timestamp of the Enter event (ms)
    pub entry_timestamp: u64,

    /// Number of frames with the same function below this one at entry
    pub recursion_ordinal: usize,

    /// Inclusive time of direct children finished so far (ms)
    pub child_time: u64,
}

impl Frame {
    /// Name of this frame in report keys, e.g. `Foo::bar@2`
    pub fn report_name(&self) -> String {
        self.function.report_name_at(self.recursion_ordinal)
    }
}

/// A finalized invocation handed to the accumulators
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub function: FunctionId,

    /// Report name including the recursion ordinal
    pub name: String,

    /// Caller's function, `None` at the root
    pub parent_function: Option<FunctionId>,

    /// Caller's report name, `None` at the root
    pub parent: Option<String>,

    pub recursion_ordinal: usize,

    /// Stack depth the frame occupied (0 = root)
    pub depth: usize,

    /// Elapsed time from entry to exit (ms)
    pub inclusive_time: u64,

    /// Inclusive time minus the inclusive time of direct children (ms)
    pub exclusive_time: u64,

    /// True when the frame was closed by an Exit naming it, false when
    /// it was unwound on behalf of an ancestor
    pub explicit_exit: bool,
}

/// Consumer of finalized invocations
///
/// `ancestors` is the stack left after the invocation's frame was
/// popped, root first.
pub trait InvocationSink {
    fn on_complete(&mut self, invocation: &Invocation, ancestors: &[Frame]);
}

/// Automaton state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackState {
    Closed,
    Open,
    Fatal,
}

/// What an Exit event did to the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Frames finalized, including the matched one
    pub finalized: usize,

    /// Frames finalized without their own Exit
    pub unwound: usize,
}

/// The call stack of one session
#[derive(Debug)]
pub struct CallStack {
    frames: Vec<Frame>,
    fatal: bool,
    max_depth: usize,

    /// Enters rejected by the depth limit and not yet exited, as runs of
    /// the same function, outermost first
    overflow: Vec<(FunctionId, usize)>,
}

impl Default for CallStack {
    fn default() -> Self {
        Self::with_max_depth(MAX_STACK_DEPTH)
    }
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            frames: Vec::new(),
            fatal: false,
            max_depth,
            overflow: Vec::new(),
        }
    }

    pub fn state(&self) -> StackState {
        if self.fatal {
            StackState::Fatal
        } else if self.frames.is_empty() {
            StackState::Closed
        } else {
            StackState::Open
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Live frames, root first
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Count open frames of `function`
    pub fn recursion_ordinal(&self, function: &FunctionId) -> usize {
        let mut ordinal = 0;
        for frame in &self.frames {
            if frame.function == *function {
                ordinal += 1;
            }
        }
        ordinal
    }

    /// Push a frame for an Enter event
    ///
    /// # Errors
    /// * `StackError::Halted` - a desync already ended this stack
    /// * `StackError::DepthExceeded` - the frame would exceed the depth
    ///   limit; it is not pushed, and an Exit naming it is absorbed later
    pub fn enter_function(&mut self, timestamp: u64, function: FunctionId) -> Result<(), StackError> {
        if self.fatal {
            return Err(StackError::Halted);
        }

        if !self.overflow.is_empty() || self.frames.len() >= self.max_depth {
            let err = StackError::DepthExceeded {
                name: function.qualified_name(),
                limit: self.max_depth,
            };
            if let Some((_, count)) = self.overflow.last_mut().filter(|(top, _)| *top == function) {
                *count += 1;
            } else {
                self.overflow.push((function, 1));
            }
            return Err(err);
        }

        let recursion_ordinal = self.recursion_ordinal(&function);
        debug!(
            "enter {} at {} (depth {}, recursion {})",
            function,
            timestamp,
            self.frames.len(),
            recursion_ordinal
        );

        self.frames.push(Frame {
            function,
            entry_timestamp: timestamp,
            recursion_ordinal,
            child_time: 0,
        });
        Ok(())
    }

    /// Pop and finalize frames until one matching `function` is closed
    ///
    /// Frames above the match are finalized as complete invocations
    /// ending at `timestamp`, as happens when an exception unwinds
    /// through them.
    ///
    /// # Errors
    /// * `StackError::Desync` - the stack ran empty without a match; the
    ///   automaton is `Fatal` afterwards. Frames popped on the way were
    ///   still delivered to `sink`.
    /// * `StackError::Halted` - a desync already ended this stack
    pub fn exit_function(
        &mut self,
        timestamp: u64,
        function: &FunctionId,
        sink: &mut dyn InvocationSink,
    ) -> Result<ExitOutcome, StackError> {
        if self.fatal {
            return Err(StackError::Halted);
        }

        let mut outcome = ExitOutcome {
            finalized: 0,
            unwound: 0,
        };

        if self.absorb_overflow_exit(function) {
            return Ok(outcome);
        }

        loop {
            let frame = match self.frames.pop() {
                Some(frame) => frame,
                None => {
                    self.fatal = true;
                    error!(
                        "desync: exit of {} at {} has no open frame ({} frames unwound)",
                        function, timestamp, outcome.unwound
                    );
                    return Err(StackError::Desync {
                        name: function.qualified_name(),
                    });
                }
            };

            let matched = frame.function == *function;
            if !matched {
                debug!("unwinding {} without explicit exit", frame.function);
                outcome.unwound += 1;
            }
            self.finalize(frame, timestamp, matched, sink);
            outcome.finalized += 1;

            if matched {
                return Ok(outcome);
            }
        }
    }

    /// Consume an Exit that closes a frame rejected by the depth limit
    ///
    /// Rejected frames above the named one are discarded with it. An Exit
    /// naming none of them belongs to a live frame, so every rejected
    /// frame is discarded and the caller unwinds normally.
    fn absorb_overflow_exit(&mut self, function: &FunctionId) -> bool {
        if self.overflow.is_empty() {
            return false;
        }

        match self.overflow.iter().rposition(|(rejected, _)| rejected == function) {
            Some(index) => {
                debug!("exit of {} closes a frame beyond the depth limit", function);
                self.overflow.truncate(index + 1);
                if let Some((_, count)) = self.overflow.last_mut() {
                    *count -= 1;
                    if *count == 0 {
                        self.overflow.pop();
                    }
                }
                true
            }
            None => {
                debug!(
                    "exit of {} unwinds past {} rejected runs beyond the depth limit",
                    function,
                    self.overflow.len()
                );
                self.overflow.clear();
                false
            }
        }
    }

    /// Close `frame` at `timestamp` and charge its time to the caller
    fn finalize(&mut self, frame: Frame, timestamp: u64, explicit_exit: bool, sink: &mut dyn InvocationSink) {
        if timestamp < frame.entry_timestamp {
            debug!(
                "{} exits at {} before its entry at {}, clamping to 0",
                frame.function, timestamp, frame.entry_timestamp
            );
        }
        let inclusive_time = timestamp.saturating_sub(frame.entry_timestamp);
        let exclusive_time = inclusive_time.saturating_sub(frame.child_time);

        let (parent_function, parent) = match self.frames.last_mut() {
            Some(parent) => {
                parent.child_time = parent.child_time.saturating_add(inclusive_time);
                (Some(parent.function.clone()), Some(parent.report_name()))
            }
            None => (None, None),
        };

        let invocation = Invocation {
            name: frame.report_name(),
            function: frame.function,
            parent_function,
            parent,
            recursion_ordinal: frame.recursion_ordinal,
            depth: self.frames.len(),
            inclusive_time,
            exclusive_time,
            explicit_exit,
        };

        sink.on_complete(&invocation, &self.frames);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect(Vec<Invocation>);

    impl InvocationSink for Collect {
        fn on_complete(&mut self, invocation: &Invocation, _ancestors: &[Frame]) {
            self.0.push(invocation.clone());
        }
    }

    fn f(name: &str) -> FunctionId {
        FunctionId::bare(name)
    }

    #[test]
    fn test_state_transitions() {
        let mut stack = CallStack::new();
        let mut sink = Collect::default();
        assert_eq!(stack.state(), StackState::Closed);

        stack.enter_function(0, f("A")).unwrap();
        assert_eq!(stack.state(), StackState::Open);
        stack.enter_function(1, f("B")).unwrap();
        assert_eq!(stack.state(), StackState::Open);

        stack.exit_function(2, &f("B"), &mut sink).unwrap();
        assert_eq!(stack.state(), StackState::Open);
        stack.exit_function(3, &f("A"), &mut sink).unwrap();
        assert_eq!(stack.state(), StackState::Closed);

        let err = stack.exit_function(4, &f("A"), &mut sink).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(stack.state(), StackState::Fatal);
        assert_eq!(stack.enter_function(5, f("A")), Err(StackError::Halted));
    }

    #[test]
    fn test_exclusive_time_subtracts_children() {
        let mut stack = CallStack::new();
        let mut sink = Collect::default();

        stack.enter_function(0, f("A")).unwrap();
        stack.enter_function(2, f("B")).unwrap();
        stack.exit_function(5, &f("B"), &mut sink).unwrap();
        stack.enter_function(6, f("C")).unwrap();
        stack.exit_function(10, &f("C"), &mut sink).unwrap();
        stack.exit_function(12, &f("A"), &mut sink).unwrap();

        let a = sink.0.last().unwrap();
        assert_eq!(a.name, "A");
        assert_eq!(a.inclusive_time, 12);
        assert_eq!(a.exclusive_time, 5);
        assert_eq!(a.parent, None);
        assert_eq!(sink.0[0].parent.as_deref(), Some("A"));
    }

    #[test]
    fn test_unwinds_frames_without_exit() {
        let mut stack = CallStack::new();
        let mut sink = Collect::default();

        stack.enter_function(0, f("A")).unwrap();
        stack.enter_function(1, f("B")).unwrap();
        stack.enter_function(2, f("C")).unwrap();
        let outcome = stack.exit_function(5, &f("A"), &mut sink).unwrap();

        assert_eq!(outcome, ExitOutcome { finalized: 3, unwound: 2 });
        let names: Vec<&str> = sink.0.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["C", "B", "A"]);
        assert_eq!(sink.0[0].inclusive_time, 3);
        assert!(!sink.0[0].explicit_exit);
        assert_eq!(sink.0[1].inclusive_time, 4);
        assert_eq!(sink.0[1].exclusive_time, 1);
        assert_eq!(sink.0[2].exclusive_time, 1);
        assert!(sink.0[2].explicit_exit);
        assert_eq!(stack.state(), StackState::Closed);
    }

    #[test]
    fn test_recursion_ordinals() {
        let mut stack = CallStack::new();
        let mut sink = Collect::default();

        stack.enter_function(0, f("A")).unwrap();
        stack.enter_function(1, f("B")).unwrap();
        stack.enter_function(2, f("A")).unwrap();
        assert_eq!(stack.frames()[2].recursion_ordinal, 1);
        assert_eq!(stack.recursion_ordinal(&f("A")), 2);

        stack.exit_function(3, &f("A"), &mut sink).unwrap();
        assert_eq!(sink.0[0].name, "A@1");
        assert_eq!(sink.0[0].parent.as_deref(), Some("B"));
        // the inner A closed, so the outer A is still open
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn test_desync_delivers_unwound_frames() {
        let mut stack = CallStack::new();
        let mut sink = Collect::default();

        stack.enter_function(0, f("A")).unwrap();
        let err = stack.exit_function(4, &f("X"), &mut sink).unwrap_err();

        assert_eq!(err, StackError::Desync { name: "X".to_string() });
        assert_eq!(sink.0.len(), 1);
        assert_eq!(sink.0[0].inclusive_time, 4);
    }

    #[test]
    fn test_class_distinguishes_frames() {
        let mut stack = CallStack::new();
        let mut sink = Collect::default();

        stack.enter_function(0, FunctionId::new("Foo", "run")).unwrap();
        stack.enter_function(1, FunctionId::new("Bar", "run")).unwrap();
        assert_eq!(stack.frames()[1].recursion_ordinal, 0);

        stack
            .exit_function(3, &FunctionId::new("Foo", "run"), &mut sink)
            .unwrap();
        assert_eq!(sink.0[0].name, "Bar::run");
        assert_eq!(sink.0[1].name, "Foo::run");
    }

    #[test]
    fn test_depth_limit_skips_nested_frames() {
        let mut stack = CallStack::with_max_depth(2);
        let mut sink = Collect::default();

        stack.enter_function(0, f("A")).unwrap();
        stack.enter_function(1, f("B")).unwrap();
        let err = stack.enter_function(2, f("C")).unwrap_err();
        assert!(matches!(err, StackError::DepthExceeded { limit: 2, .. }));
        assert!(!err.is_fatal());

        // C's exit is absorbed, B and A close normally
        stack.exit_function(3, &f("C"), &mut sink).unwrap();
        stack.exit_function(4, &f("B"), &mut sink).unwrap();
        stack.exit_function(5, &f("A"), &mut sink).unwrap();

        let names: Vec<&str> = sink.0.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["B", "A"]);
        assert_eq!(stack.state(), StackState::Closed);
    }

    #[test]
    fn test_depth_limit_tracks_rejected_recursion() {
        let mut stack = CallStack::with_max_depth(1);
        let mut sink = Collect::default();

        stack.enter_function(0, f("A")).unwrap();
        for ts in 1..=3 {
            assert!(stack.enter_function(ts, f("R")).is_err());
        }
        assert_eq!(stack.overflow, vec![(f("R"), 3)]);

        for ts in 4..=6 {
            stack.exit_function(ts, &f("R"), &mut sink).unwrap();
        }
        assert!(stack.overflow.is_empty());
        stack.exit_function(7, &f("A"), &mut sink).unwrap();
        assert_eq!(sink.0.len(), 1);
        assert_eq!(sink.0[0].inclusive_time, 7);
    }

    #[test]
    fn test_ancestor_exit_past_depth_limit_unwinds() {
        let mut stack = CallStack::with_max_depth(2);
        let mut sink = Collect::default();

        stack.enter_function(0, f("A")).unwrap();
        stack.enter_function(1, f("B")).unwrap();
        assert!(stack.enter_function(2, f("C")).is_err());
        assert!(stack.enter_function(3, f("D")).is_err());

        // an exception thrown in D lands in A
        let outcome = stack.exit_function(4, &f("A"), &mut sink).unwrap();
        assert_eq!(outcome, ExitOutcome { finalized: 2, unwound: 1 });
        assert_eq!(stack.state(), StackState::Closed);

        stack.enter_function(5, f("E")).unwrap();
        stack.exit_function(6, &f("E"), &mut sink).unwrap();
        let names: Vec<&str> = sink.0.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["B", "A", "E"]);
    }

    #[test]
    fn test_rejected_exit_discards_nested_rejects() {
        let mut stack = CallStack::with_max_depth(1);
        let mut sink = Collect::default();

        stack.enter_function(0, f("A")).unwrap();
        assert!(stack.enter_function(1, f("C")).is_err());
        assert!(stack.enter_function(2, f("D")).is_err());

        // D never exits, C's exit still closes both rejected frames
        stack.exit_function(3, &f("C"), &mut sink).unwrap();
        assert!(stack.overflow.is_empty());
        assert_eq!(stack.depth(), 1);
        assert!(sink.0.is_empty());
    }

    #[test]
    fn test_non_monotonic_timestamp_clamps() {
        let mut stack = CallStack::new();
        let mut sink = Collect::default();

        stack.enter_function(10, f("A")).unwrap();
        stack.exit_function(4, &f("A"), &mut sink).unwrap();
        assert_eq!(sink.0[0].inclusive_time, 0);
    }
}
