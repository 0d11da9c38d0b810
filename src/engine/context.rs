//! Execution context handed to [`SystemInstance::execute`](crate::engine::instance::SystemInstance::execute).

use crate::engine::pool::WorkerPool;
use crate::engine::storage::ComponentStorage;


/// Storage and worker pool shared by every slice of a tick.
pub struct Context<'w, S> {
    storage: &'w S,
    pool: &'w WorkerPool,
}

impl<'w, S: ComponentStorage> Context<'w, S> {
    /// Binds a storage and a pool for one tick.
    pub fn new(storage: &'w S, pool: &'w WorkerPool) -> Self {
        Self { storage, pool }
    }

    /// Component storage.
    pub fn storage(&self) -> &'w S {
        self.storage
    }

    /// Worker pool for slice jobs.
    pub fn pool(&self) -> &'w WorkerPool {
        self.pool
    }
}

impl<S> Clone for Context<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Context<'_, S> {}
