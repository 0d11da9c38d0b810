//! System instances.
//!
//! A [`SystemInstance`] is the runtime unit behind one system: it owns the
//! system's required-component [`Bitset`], the [`SubscribedSet`] of entities
//! currently matching it, the per-slice [`StateMachine`] and the
//! [`ParallelExecutor`] configuration. Each tick the scheduler (or the
//! embedding application) drives it through three steps:
//!
//! 1. keep the subscription current with [`refresh_subscription`] /
//!    [`unsubscribe`] as entities change;
//! 2. [`execute`] the user function, which calls
//!    [`ExecutorProxy::dispatch`] to run slice logic serially or in parallel;
//! 3. [`execute_deferred_fns`] once every slice has joined.
//!
//! ## Execution mode
//! Whether `dispatch` takes the serial or the parallel path is decided once,
//! at construction, from [`Settings::inner_parallelism_allowed`]. Both paths
//! give slice functions the same view: a [`DataProxy`] over a contiguous run
//! of subscribed entities with its own execution state.
//!
//! [`refresh_subscription`]: SystemInstance::refresh_subscription
//! [`unsubscribe`]: SystemInstance::unsubscribe
//! [`execute`]: SystemInstance::execute
//! [`execute_deferred_fns`]: SystemInstance::execute_deferred_fns

use std::sync::Arc;

use tracing::Level;

use crate::engine::context::Context;
use crate::engine::error::{ConfigError, ECSResult, ExecutionError};
use crate::engine::logging::{log_event, LogCategory, Logger};
use crate::engine::parallel::{run_slice, ParallelExecutor};
use crate::engine::proxy::{DataProxy, ExecutorProxy};
use crate::engine::settings::{Settings, SystemSignature};
use crate::engine::state::{DeferredQueue, ExecutionState, StateMachine};
use crate::engine::storage::ComponentStorage;
use crate::engine::subscription::{SubscribedSet, SubscriptionChange};
use crate::engine::types::{matches, AccessSets, Bitset, EntityId, SystemId};


/// Runtime state of one system.
///
/// `S` is the component storage the system runs against; `O` is the
/// per-slice output type (`()` when the system produces none).

pub struct SystemInstance<S, O = ()> {
    id: SystemId,
    name: &'static str,
    bitset: Bitset,
    access: AccessSets,
    inner_parallelism: bool,
    subscribed: SubscribedSet,
    sm: StateMachine<S, O>,
    outer_deferred: DeferredQueue<S>,
    parallel_executor: ParallelExecutor,
    logger: Arc<dyn Logger>,
}

impl<S, O> SystemInstance<S, O> {
    /// System id.
    pub fn id(&self) -> SystemId { self.id }

    /// System name.
    pub fn name(&self) -> &'static str { self.name }

    /// Required-component bitset.
    pub fn bitset(&self) -> &Bitset { &self.bitset }

    /// Declared read/write access.
    pub fn access(&self) -> &AccessSets { &self.access }

    /// Returns `true` if `dispatch` takes the parallel path.
    pub fn inner_parallelism(&self) -> bool { self.inner_parallelism }

    /// Slicing configuration.
    pub fn parallel_executor(&self) -> &ParallelExecutor { &self.parallel_executor }

    /// Returns `true` if an entity with `entity_bitset` belongs to this system.
    #[inline]
    pub fn matches_bitset(&self, entity_bitset: &Bitset) -> bool {
        matches(&self.bitset, entity_bitset)
    }

    /// Returns `true` if `entity` is subscribed.
    #[inline]
    pub fn is_subscribed(&self, entity: EntityId) -> bool {
        self.subscribed.contains(entity)
    }

    /// Number of subscribed entities.
    #[inline]
    pub fn subscribed_count(&self) -> usize {
        self.subscribed.len()
    }

    /// Subscribed entities in iteration order.
    pub fn subscribed(&self) -> &[EntityId] {
        self.subscribed.as_slice()
    }
}

impl<S, O> SystemInstance<S, O>
where
    S: ComponentStorage,
    O: Default + Send,
{
    /// Builds an instance from its signature.
    ///
    /// ## Errors
    /// Configuration violations in the signature (unknown component,
    /// component id outside the bitset width).

    pub fn new(settings: &Settings, signature: &SystemSignature, logger: Arc<dyn Logger>) -> Result<Self, ConfigError> {
        let bitset = settings.build_system_bitset(signature)?;
        let access = settings.build_access_sets(signature)?;
        let inner_parallelism = settings.inner_parallelism_allowed(signature);
        let parallel_executor = ParallelExecutor::new(
            signature.strategy(),
            settings.max_threads(),
            settings.inline_policy(),
        );

        log_event!(
            logger,
            LogCategory::SystemBitset,
            Level::DEBUG,
            "({}) {} bitset: {} parallel: {}",
            signature.id(),
            signature.name(),
            bitset,
            inner_parallelism
        );

        Ok(Self {
            id: signature.id(),
            name: signature.name(),
            bitset,
            access,
            inner_parallelism,
            subscribed: SubscribedSet::new(),
            sm: StateMachine::default(),
            outer_deferred: DeferredQueue::default(),
            parallel_executor,
            logger,
        })
    }

    /// Re-evaluates membership of `entity` against its current bitset.
    ///
    /// Idempotent. O(1) amortized.
    ///
    /// ## Errors
    /// [`ConfigError::BitsetWidthMismatch`] if `entity_bitset` was built for
    /// a different configuration.

    pub fn refresh_subscription(&mut self, entity: EntityId, entity_bitset: &Bitset) -> Result<SubscriptionChange, ConfigError> {
        if entity_bitset.width() != self.bitset.width() {
            return Err(ConfigError::BitsetWidthMismatch {
                expected: self.bitset.width(),
                actual: entity_bitset.width(),
            });
        }

        let change = match (self.matches_bitset(entity_bitset), self.is_subscribed(entity)) {
            (true, false) => {
                self.subscribed.insert(entity);
                SubscriptionChange::Subscribed
            }
            (false, true) => {
                self.subscribed.remove(entity);
                SubscriptionChange::Unsubscribed
            }
            _ => SubscriptionChange::Unchanged,
        };

        if change != SubscriptionChange::Unchanged {
            log_event!(
                self.logger,
                LogCategory::Subscription,
                Level::TRACE,
                "({}) {} entity {}: {:?}",
                self.id,
                self.name,
                entity,
                change
            );
        }
        Ok(change)
    }

    /// Drops `entity` from the subscription, e.g. after it was destroyed.
    pub fn unsubscribe(&mut self, entity: EntityId) -> bool {
        let removed = self.subscribed.remove(entity);
        if removed {
            log_event!(
                self.logger,
                LogCategory::Subscription,
                Level::TRACE,
                "({}) {} entity {}: Unsubscribed",
                self.id,
                self.name,
                entity
            );
        }
        removed
    }

    /// Per-tick entry point.
    ///
    /// Resets the execution states, binds an [`ExecutorProxy`] to `ctx` and
    /// hands it to `user_fn`, which decides whether and when to dispatch.

    pub fn execute<R>(
        &mut self,
        ctx: &Context<'_, S>,
        user_fn: impl FnOnce(&mut ExecutorProxy<'_, '_, S, O>) -> ECSResult<R>,
    ) -> ECSResult<R> {
        self.sm.begin_tick();
        self.outer_deferred.clear();
        let mut proxy = ExecutorProxy::new(self, ctx);
        user_fn(&mut proxy)
    }

    /// Runs every deferred callback queued this tick against `storage`.
    ///
    /// Slice queues run first, in split order, then the instance-level queue.
    /// Each callback runs exactly once; the first failure is reported after
    /// all of them have run.

    pub fn execute_deferred_fns(&mut self, storage: &mut S) -> ECSResult<()> {
        let mut first_error = None;
        self.sm.for_states(|state| {
            if let Err(error) = state.deferred_mut().execute_all(storage) {
                first_error.get_or_insert(error);
            }
        });
        if let Err(error) = self.outer_deferred.execute_all(storage) {
            first_error.get_or_insert(error);
        }

        match first_error {
            Some(error) => Err(ExecutionError::Deferred { system: self.id, source: Box::new(error) }.into()),
            None => Ok(()),
        }
    }

    /// Visits each slice output of this tick, in split order.
    pub fn for_outputs(&mut self, mut f: impl FnMut(&O)) {
        self.sm.for_states(|state| f(state.output()));
    }

    /// Folds this tick's slice outputs in split order.
    pub fn fold_outputs<A>(&mut self, init: A, mut f: impl FnMut(A, &O) -> A) -> A {
        let mut acc = Some(init);
        self.sm.for_states(|state| {
            if let Some(current) = acc.take() {
                acc = Some(f(current, state.output()));
            }
        });
        match acc {
            Some(result) => result,
            None => unreachable!("accumulator is restored after every state"),
        }
    }

    /// Number of execution states used this tick.
    pub fn active_states(&self) -> usize {
        self.sm.active()
    }

    /// Deferred callbacks waiting to be flushed.
    pub fn pending_deferred(&self) -> usize {
        self.sm.pending_deferred() + self.outer_deferred.len()
    }

    pub(crate) fn defer(&mut self, f: impl FnOnce(&mut S) -> ECSResult<()> + Send + 'static) {
        self.outer_deferred.push(Box::new(f));
    }

    /// Routes a slice function to the serial or parallel path.
    pub(crate) fn execution_dispatch<F>(&mut self, ctx: &Context<'_, S>, f: &F) -> ECSResult<()>
    where
        F: Fn(&mut DataProxy<'_, S, O>) -> ECSResult<()> + Sync,
    {
        if self.inner_parallelism {
            self.execute_in_parallel(ctx, f)
        } else {
            self.execute_single(ctx, f)
        }
    }

    /// One slice over the whole subscribed set, on the calling thread.
    fn execute_single<F>(&mut self, ctx: &Context<'_, S>, f: &F) -> ECSResult<()>
    where
        F: Fn(&mut DataProxy<'_, S, O>) -> ECSResult<()> + Sync,
    {
        log_event!(
            self.logger,
            LogCategory::Execution,
            Level::TRACE,
            "({}) {} single slice over {} entities",
            self.id,
            self.name,
            self.subscribed_count()
        );
        let total = self.subscribed_count();
        let (entities, states) = self.prepare_slices(1);
        run_slice(entities, 0..total, ctx.storage(), &mut states[0], f)?;
        Ok(())
    }

    fn execute_in_parallel<F>(&mut self, ctx: &Context<'_, S>, f: &F) -> ECSResult<()>
    where
        F: Fn(&mut DataProxy<'_, S, O>) -> ECSResult<()> + Sync,
    {
        let executor = self.parallel_executor.clamped_to(ctx.pool().threads());
        log_event!(
            self.logger,
            LogCategory::Execution,
            Level::TRACE,
            "({}) {} {} slices over {} entities",
            self.id,
            self.name,
            executor.split_count(self.subscribed_count()),
            self.subscribed_count()
        );
        executor.execute(self, ctx, f)
    }

    /// Prepares `slices` states and returns them with the subscribed entities.
    pub(crate) fn prepare_slices(&mut self, slices: usize) -> (&[EntityId], &mut [ExecutionState<S, O>]) {
        let states = self.sm.prepare(slices);
        (self.subscribed.as_slice(), states)
    }
}

impl<S, O> std::fmt::Debug for SystemInstance<S, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemInstance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("bitset", &self.bitset)
            .field("inner_parallelism", &self.inner_parallelism)
            .field("subscribed", &self.subscribed.len())
            .finish()
    }
}
