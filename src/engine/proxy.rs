//! Views handed to user system logic.
//!
//! * [`DataProxy`]: one slice of one tick: the slice's entities, typed
//!   component access through the storage, and the slice's own execution
//!   state (deferred callbacks and output).
//! * [`ExecutorProxy`]: one `execute` call: `dispatch` runs a slice function
//!   over the subscribed entities, serially or in parallel depending on how
//!   the system instance was configured.
//!
//! Both are borrows. Their lifetimes end with the slice or the `execute`
//! call, so user code cannot retain them.

use std::ops::Range;

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard};

use crate::engine::component::Component;
use crate::engine::context::Context;
use crate::engine::error::{ECSResult, StorageError};
use crate::engine::instance::SystemInstance;
use crate::engine::state::ExecutionState;
use crate::engine::storage::ComponentStorage;
use crate::engine::types::{EntityId, SplitIndex};


/// Read/write view over one slice of a system's subscribed entities.
pub struct DataProxy<'a, S, O> {
    entities: &'a [EntityId],
    storage: &'a S,
    state: &'a mut ExecutionState<S, O>,
}

impl<'a, S: ComponentStorage, O> DataProxy<'a, S, O> {
    pub(crate) fn new(entities: &'a [EntityId], storage: &'a S, state: &'a mut ExecutionState<S, O>) -> Self {
        Self { entities, storage, state }
    }

    /// Entities of this slice, in subscription order.
    #[inline]
    pub fn entities(&self) -> &'a [EntityId] {
        self.entities
    }

    /// Number of entities in this slice.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the slice is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Index of this slice within the dispatch.
    pub fn split_index(&self) -> SplitIndex {
        self.state.split_index()
    }

    /// Positions `[begin, end)` of this slice in the subscribed set.
    pub fn range(&self) -> Range<usize> {
        self.state.range()
    }

    /// Calls `f` for every entity of the slice, stopping at the first error.
    pub fn for_entities(&mut self, mut f: impl FnMut(&mut Self, EntityId) -> ECSResult<()>) -> ECSResult<()> {
        let entities = self.entities;
        for &entity in entities {
            f(self, entity)?;
        }
        Ok(())
    }

    /// Shared borrow of component `T` on `entity`.
    pub fn read<T: Component>(&self, entity: EntityId) -> Result<MappedRwLockReadGuard<'a, T>, StorageError> {
        let storage: &'a S = self.storage;
        storage.read::<T>(entity)
    }

    /// Exclusive borrow of component `T` on `entity`.
    ///
    /// Only entities of this slice should be written; other slices may be
    /// reading or writing theirs concurrently.
    pub fn write<T: Component>(&self, entity: EntityId) -> Result<MappedRwLockWriteGuard<'a, T>, StorageError> {
        let storage: &'a S = self.storage;
        storage.write::<T>(entity)
    }

    /// Returns `true` if `entity` currently carries `T`.
    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        self.storage.read::<T>(entity).is_ok()
    }

    /// Underlying storage.
    pub fn storage(&self) -> &'a S {
        self.storage
    }

    /// Queues a callback on this slice's state, run after all slices rejoin.
    pub fn defer(&mut self, f: impl FnOnce(&mut S) -> ECSResult<()> + Send + 'static) {
        self.state.defer(f);
    }

    /// This slice's output value.
    pub fn output(&mut self) -> &mut O {
        self.state.output_mut()
    }
}

/// Facade passed to the user function of [`SystemInstance::execute`].
pub struct ExecutorProxy<'a, 'w, S, O> {
    instance: &'a mut SystemInstance<S, O>,
    context: &'a Context<'w, S>,
}

impl<'a, 'w, S, O> ExecutorProxy<'a, 'w, S, O>
where
    S: ComponentStorage,
    O: Default + Send,
{
    pub(crate) fn new(instance: &'a mut SystemInstance<S, O>, context: &'a Context<'w, S>) -> Self {
        Self { instance, context }
    }

    /// Runs `f` once per slice over the subscribed entities.
    ///
    /// Serial instances call `f` once on this thread with every entity;
    /// parallel instances split the entities and block until every slice is
    /// done. Either way the first slice error (lowest split index) is
    /// returned after all slices have finished.
    pub fn dispatch<F>(&mut self, f: F) -> ECSResult<()>
    where
        F: Fn(&mut DataProxy<'_, S, O>) -> ECSResult<()> + Sync,
    {
        self.instance.execution_dispatch(self.context, &f)
    }

    /// Queues a callback on the instance-level queue, run after the slice
    /// queues when deferred callbacks are flushed.
    pub fn defer(&mut self, f: impl FnOnce(&mut S) -> ECSResult<()> + Send + 'static) {
        self.instance.defer(f);
    }

    /// The system instance being executed.
    pub fn instance(&self) -> &SystemInstance<S, O> {
        self.instance
    }

    /// The bound execution context.
    pub fn context(&self) -> &Context<'w, S> {
        self.context
    }
}
