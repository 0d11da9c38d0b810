//! Parallel slice execution.
//!
//! ## Strategy
//! 1. Pick the split factor `N` from the system's [`ParallelismStrategy`],
//!    the thread budget and the number of subscribed entities.
//! 2. Partition the subscribed set into `N` balanced contiguous ranges.
//! 3. Prepare `N` execution states and pair each with its range.
//! 4. Post `N - k` slices to the worker pool, run `k` inline (see
//!    [`InlinePolicy`]), then block on a [`CounterBlocker`] seeded with `N - k`.
//!
//! ## Failure handling
//! Every slice runs under `catch_unwind` and its blocker decrement is a drop
//! guard, so neither an error nor a panic can leave the count above zero.
//! Results are recorded per slice; after the join the error of the lowest
//! split index wins. Effects of slices that completed are kept.

use std::any::Any;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;

use crate::engine::blocker::CounterBlocker;
use crate::engine::context::Context;
use crate::engine::error::{ECSError, ECSResult, ExecutionError};
use crate::engine::instance::SystemInstance;
use crate::engine::partition::{partition, split_count};
use crate::engine::proxy::DataProxy;
use crate::engine::settings::{InlinePolicy, ParallelismStrategy};
use crate::engine::state::ExecutionState;
use crate::engine::storage::ComponentStorage;
use crate::engine::types::{EntityId, SplitIndex};


/// Slicing configuration of one system instance. Fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParallelExecutor {
    strategy: ParallelismStrategy,
    max_threads: usize,
    inline_policy: InlinePolicy,
}

impl ParallelExecutor {
    /// Creates an executor.
    pub fn new(strategy: ParallelismStrategy, max_threads: usize, inline_policy: InlinePolicy) -> Self {
        Self { strategy, max_threads: max_threads.max(1), inline_policy }
    }

    /// Split factor for `total` subscribed entities.
    pub fn split_count(&self, total: usize) -> usize {
        split_count(self.strategy, self.max_threads, total)
    }

    /// Same configuration with the thread budget capped at `threads`.
    ///
    /// Used to fit a dispatch to the pool it actually runs on, which may be
    /// smaller than the configured budget.
    pub fn clamped_to(&self, threads: usize) -> Self {
        Self { max_threads: self.max_threads.min(threads.max(1)), ..*self }
    }

    /// Thread budget.
    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Slice ranges for `total` subscribed entities.
    pub fn ranges(&self, total: usize) -> Vec<Range<usize>> {
        partition(total, self.split_count(total))
    }

    /// Runs `slice_fn` over every slice of `instance`'s subscribed set and
    /// blocks until all of them are done.
    ///
    /// The split factor never exceeds the thread count of `ctx`'s pool.
    pub fn execute<S, O, F>(&self, instance: &mut SystemInstance<S, O>, ctx: &Context<'_, S>, slice_fn: &F) -> ECSResult<()>
    where
        S: ComponentStorage,
        O: Default + Send,
        F: Fn(&mut DataProxy<'_, S, O>) -> ECSResult<()> + Sync,
    {
        let fitted = self.clamped_to(ctx.pool().threads());
        let total = instance.subscribed_count();
        let ranges = fitted.ranges(total);
        let slices = ranges.len();
        let inline = fitted.inline_policy.inline_slices(slices);
        let storage = ctx.storage();

        let (entities, states) = instance.prepare_slices(slices);
        let results: Vec<Mutex<Option<ExecutionError>>> = (0..slices).map(|_| Mutex::new(None)).collect();
        let blocker = CounterBlocker::new(slices - inline);

        let mut jobs: Vec<(&mut ExecutionState<S, O>, Range<usize>)> = states.iter_mut().zip(ranges).collect();
        let threaded = jobs.split_off(inline);

        ctx.pool().scope(|scope| {
            for (state, range) in threaded {
                let blocker = &blocker;
                let results = &results;
                scope.post(move || {
                    let _done = blocker.decrement_on_drop();
                    let split_index = state.split_index();
                    if let Err(error) = run_slice(entities, range, storage, state, slice_fn) {
                        *results[split_index].lock() = Some(error);
                    }
                });
            }

            for (state, range) in jobs {
                let split_index = state.split_index();
                if let Err(error) = run_slice(entities, range, storage, state, slice_fn) {
                    *results[split_index].lock() = Some(error);
                }
            }

            blocker.wait_until_zero();
        });

        match results.into_iter().find_map(|slot| slot.into_inner()) {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

/// Runs one slice, converting errors and panics into [`ExecutionError`].
pub(crate) fn run_slice<S, O, F>(
    entities: &[EntityId],
    range: Range<usize>,
    storage: &S,
    state: &mut ExecutionState<S, O>,
    slice_fn: &F,
) -> Result<(), ExecutionError>
where
    S: ComponentStorage,
    F: Fn(&mut DataProxy<'_, S, O>) -> ECSResult<()> + Sync,
{
    let split_index = state.split_index();
    state.assign(range.clone());
    let mut proxy = DataProxy::new(&entities[range], storage, state);

    match panic::catch_unwind(AssertUnwindSafe(|| slice_fn(&mut proxy))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(slice_error(split_index, error)),
        Err(payload) => Err(ExecutionError::SlicePanicked {
            split_index,
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn slice_error(split_index: SplitIndex, error: ECSError) -> ExecutionError {
    ExecutionError::Slice { split_index, source: Box::new(error) }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
