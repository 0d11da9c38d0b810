//! # ECS Executor
//!
//! Per-system execution engine for an Entity-Component-System runtime.
//!
//! Each system keeps the set of entities whose component bitset covers its
//! own, and runs its logic over that set either on the calling thread or
//! split into balanced slices on a worker pool. Slices collect deferred
//! callbacks that are applied to the storage once every slice has joined.
//!
//! ## Design Goals
//! - Subscription by bitset subset, O(1) membership updates
//! - Deterministic slicing and deterministic error reporting
//! - Parallel CPU execution with an explicit join point
//! - Safe, explicit data access through borrowed proxies
//!
//! ## Example
//! ```rust
//! use ecs_executor::prelude::*;
//!
//! struct Position(f32);
//!
//! let mut builder = SettingsBuilder::new();
//! builder.component::<Position>().unwrap();
//! let settings = builder.max_threads(2).build().unwrap();
//!
//! let mut world = World::new(&settings).unwrap();
//! let entity = world.spawn();
//! world.insert(entity, Position(1.0)).unwrap();
//!
//! let pool = WorkerPool::from_settings(&settings).unwrap();
//! let mut scheduler: Scheduler<World> = Scheduler::with_logger(std::sync::Arc::new(NullLogger));
//! scheduler
//!     .add_system(&settings, &SystemSignature::new(0, "drift").write::<Position>(), |exec| {
//!         exec.dispatch(|data| {
//!             data.for_entities(|data, e| {
//!                 data.write::<Position>(e)?.0 += 1.0;
//!                 Ok(())
//!             })
//!         })
//!     })
//!     .unwrap();
//!
//! scheduler.tick(&mut world, &pool).unwrap();
//! assert_eq!(world.read::<Position>(entity).unwrap().0, 2.0);
//! ```

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::types::{
    Bitset,
    AccessMode,
    AccessSets,
    EntityId,
    ComponentId,
    SystemId,
    SplitIndex,
    BITSET_CAP,
    build_bitset,
    matches,
};

pub use engine::error::{
    BoxError,
    ECSResult,
    ECSError,
    ConfigError,
    StorageError,
    ExecutionError,
};

pub use engine::logging::{
    LogCategory,
    Logger,
    TracingLogger,
    NullLogger,
    default_logger,
};

pub use engine::component::{
    Component,
    ComponentDesc,
    ComponentRegistry,
};

pub use engine::settings::{
    Settings,
    SettingsBuilder,
    SystemSignature,
    ParallelismStrategy,
    InlinePolicy,
    THREADS_ENV,
};

pub use engine::storage::{
    ComponentStorage,
    EntityPopulation,
    EntityChange,
    World,
};

pub use engine::subscription::{SubscribedSet, SubscriptionChange};
pub use engine::blocker::{CounterBlocker, DecrementGuard, execute_and_wait_until_zero};
pub use engine::state::{DeferredFn, DeferredQueue, ExecutionState, StateMachine};
pub use engine::partition::{partition, split_count};
pub use engine::pool::{WorkerPool, PoolScope};
pub use engine::context::Context;
pub use engine::parallel::ParallelExecutor;
pub use engine::proxy::{DataProxy, ExecutorProxy};
pub use engine::instance::SystemInstance;
pub use engine::scheduler::{Scheduler, Stage, ScheduledSystem, SystemFn};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used types.
///
/// Import with:
/// ```rust
/// use ecs_executor::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ComponentStorage,
        Context,
        DataProxy,
        ECSError,
        ECSResult,
        EntityId,
        EntityPopulation,
        ExecutorProxy,
        InlinePolicy,
        NullLogger,
        ParallelismStrategy,
        Scheduler,
        Settings,
        SettingsBuilder,
        SystemInstance,
        SystemSignature,
        World,
        WorkerPool,
    };
}
