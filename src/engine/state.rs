//! Per-slice execution states.
//!
//! Every slice of a dispatch owns one [`ExecutionState`]: a queue of deferred
//! callbacks, its slice bookkeeping and its output value. Because each slice
//! gets a distinct `&mut ExecutionState`, enqueueing needs no
//! synchronisation; the queues are only drained after every slice has joined.
//!
//! The [`StateMachine`] keeps the states of one system instance and is reset
//! at the start of every tick. Allocations are reused across ticks; contents
//! are not.

use std::fmt;
use std::ops::Range;

use crate::engine::error::ECSResult;
use crate::engine::types::SplitIndex;


/// Callback run against the storage after all slices have joined.
pub type DeferredFn<S> = Box<dyn FnOnce(&mut S) -> ECSResult<()> + Send>;

/// FIFO of deferred callbacks.
pub struct DeferredQueue<S> {
    fns: Vec<DeferredFn<S>>,
}

impl<S> Default for DeferredQueue<S> {
    fn default() -> Self {
        Self { fns: Vec::new() }
    }
}

impl<S> DeferredQueue<S> {
    /// Appends a callback.
    pub fn push(&mut self, f: DeferredFn<S>) {
        self.fns.push(f);
    }

    /// Number of queued callbacks.
    pub fn len(&self) -> usize {
        self.fns.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }

    /// Drops every queued callback without running it.
    pub fn clear(&mut self) {
        self.fns.clear();
    }

    /// Runs every callback once, in enqueue order, and empties the queue.
    ///
    /// All callbacks run even if one fails; the first error is returned.
    pub fn execute_all(&mut self, target: &mut S) -> ECSResult<()> {
        let mut first_error = None;
        for f in self.fns.drain(..) {
            if let Err(error) = f(target) {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<S> fmt::Debug for DeferredQueue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredQueue").field("len", &self.fns.len()).finish()
    }
}

/// Mutable record owned by one slice for one tick.
pub struct ExecutionState<S, O> {
    split_index: SplitIndex,
    range: Range<usize>,
    deferred: DeferredQueue<S>,
    output: O,
}

impl<S, O: Default> ExecutionState<S, O> {
    fn new(split_index: SplitIndex) -> Self {
        Self {
            split_index,
            range: 0..0,
            deferred: DeferredQueue::default(),
            output: O::default(),
        }
    }

    fn reset(&mut self) {
        self.range = 0..0;
        self.deferred.clear();
        self.output = O::default();
    }
}

impl<S, O> ExecutionState<S, O> {
    /// Index of the slice this state belongs to.
    pub fn split_index(&self) -> SplitIndex {
        self.split_index
    }

    /// Positions in the subscribed set covered by the slice.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub(crate) fn assign(&mut self, range: Range<usize>) {
        self.range = range;
    }

    /// Queues a callback to run after the tick's slices have joined.
    pub fn defer(&mut self, f: impl FnOnce(&mut S) -> ECSResult<()> + Send + 'static) {
        self.deferred.push(Box::new(f));
    }

    /// Deferred callbacks queued on this state.
    pub fn deferred(&self) -> &DeferredQueue<S> {
        &self.deferred
    }

    pub(crate) fn deferred_mut(&mut self) -> &mut DeferredQueue<S> {
        &mut self.deferred
    }

    /// Slice output.
    pub fn output(&self) -> &O {
        &self.output
    }

    /// Mutable slice output.
    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }
}

/// Ordered states of one system instance.
pub struct StateMachine<S, O> {
    states: Vec<ExecutionState<S, O>>,
    active: usize,
}

impl<S, O> Default for StateMachine<S, O> {
    fn default() -> Self {
        Self { states: Vec::new(), active: 0 }
    }
}

impl<S, O: Default> StateMachine<S, O> {
    /// Clears every state. Called once at the start of each tick.
    pub fn begin_tick(&mut self) {
        for state in &mut self.states {
            state.reset();
        }
        self.active = 0;
    }

    /// Makes at least `slices` states available and returns the first `slices`.
    ///
    /// Queues filled by an earlier dispatch of the same tick are kept.
    pub fn prepare(&mut self, slices: usize) -> &mut [ExecutionState<S, O>] {
        while self.states.len() < slices {
            let split_index = self.states.len();
            self.states.push(ExecutionState::new(split_index));
        }
        self.active = self.active.max(slices);
        &mut self.states[..slices]
    }

    /// Clears and prepares exactly `slices` states, dropping any queued work.
    pub fn clear_and_prepare(&mut self, slices: usize) -> &mut [ExecutionState<S, O>] {
        self.begin_tick();
        self.prepare(slices)
    }
}

impl<S, O> StateMachine<S, O> {
    /// Number of states used so far this tick.
    pub fn active(&self) -> usize {
        self.active
    }

    /// State of slice `split_index`, if prepared this tick.
    pub fn get(&self, split_index: SplitIndex) -> Option<&ExecutionState<S, O>> {
        self.states[..self.active].get(split_index)
    }

    /// Visits the states used this tick, in split order.
    pub fn for_states(&mut self, mut f: impl FnMut(&mut ExecutionState<S, O>)) {
        for state in &mut self.states[..self.active] {
            f(state);
        }
    }

    /// Total deferred callbacks queued across the states used this tick.
    pub fn pending_deferred(&self) -> usize {
        self.states[..self.active].iter().map(|state| state.deferred.len()).sum()
    }
}
