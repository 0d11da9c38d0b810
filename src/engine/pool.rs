//! Worker pool used for slice jobs.
//!
//! A thin wrapper around a dedicated `rayon::ThreadPool`. Slices borrow the
//! system instance and the storage, so jobs are posted inside a scope that
//! cannot outlive those borrows; the dispatching thread stays outside the
//! pool and blocks on a [`CounterBlocker`](crate::engine::blocker::CounterBlocker)
//! until its slices are done.
//!
//! The pool is kept separate from rayon's global pool: the stage scheduler
//! runs whole systems on the global pool, and those threads block while
//! their slices run here.

use rayon::{Scope, ThreadPool, ThreadPoolBuilder};

use crate::engine::error::ConfigError;
use crate::engine::settings::Settings;


/// Dedicated thread pool for slice execution.
pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    /// Spawns `threads` named worker threads.
    ///
    /// ## Errors
    /// [`ConfigError::InvalidThreadCount`] for zero threads,
    /// [`ConfigError::Pool`] if the threads cannot be spawned.
    pub fn new(threads: usize) -> Result<Self, ConfigError> {
        if threads == 0 {
            return Err(ConfigError::InvalidThreadCount("0".to_owned()));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("ecs-slice-{index}"))
            .build()
            .map_err(|error| ConfigError::Pool(error.to_string()))?;
        Ok(Self { pool })
    }

    /// Pool sized to [`Settings::max_threads`].
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Self::new(settings.max_threads())
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `op` on the calling thread with a handle for posting jobs.
    ///
    /// Returns once `op` has returned and every posted job has finished.
    pub fn scope<'scope, R>(&self, op: impl FnOnce(&PoolScope<'_, 'scope>) -> R) -> R {
        self.pool.in_place_scope(|scope| op(&PoolScope { scope }))
    }
}

/// Job-posting handle valid for one [`WorkerPool::scope`] call.
pub struct PoolScope<'a, 'scope> {
    scope: &'a Scope<'scope>,
}

impl<'scope> PoolScope<'_, 'scope> {
    /// Queues `job` on the pool. Runs at most once, eventually; no result, no cancellation.
    pub fn post(&self, job: impl FnOnce() + Send + 'scope) {
        self.scope.spawn(move |_| job());
    }
}
