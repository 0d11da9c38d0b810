//! Error types for configuration, storage access and slice execution.
//!
//! Failures fall into three families:
//!
//! * [`ConfigError`]: wiring bugs detected while building settings, system
//!   instances or the worker pool (bitset width mismatch, unknown component,
//!   frozen registry, …). These are reported immediately and never recovered.
//! * [`StorageError`]: component lookups that cannot be satisfied (dead
//!   entity, missing component). Raised inside user logic and usually
//!   propagated out of a slice with `?`.
//! * [`ExecutionError`]: a slice returned an error or panicked. The engine
//!   joins every slice first and then reports the failure of the lowest split
//!   index, so the result does not depend on thread timing.
//!
//! [`ECSError`] aggregates all of them and is what public entry points return
//! through [`ECSResult`].
//!
//! ## Display vs. Debug
//! * `Display` messages are short and suitable for logs.
//! * `Debug` (derived) keeps the full structure for diagnostics.

use std::error::Error;

use crate::engine::types::{ComponentId, EntityId, SplitIndex, SystemId};


/// Boxed error raised by user code.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Result alias used by all public entry points.
pub type ECSResult<T> = Result<T, ECSError>;

/// Configuration violations. Always fatal: they indicate a wiring bug.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A bitset was requested wider than the supported capacity.
    #[error("bitset width {width} exceeds capacity {cap}")]
    BitsetTooWide {
        /// Requested width.
        width: usize,
        /// Maximum supported width.
        cap: usize,
    },

    /// Two bitsets of different widths were combined.
    #[error("bitset width mismatch: expected {expected}, got {actual}")]
    BitsetWidthMismatch {
        /// Width of the configuration.
        expected: usize,
        /// Width of the offending bitset.
        actual: usize,
    },

    /// A component id does not fit the configured bitset width.
    #[error("component id {component_id} out of range (width {width})")]
    ComponentOutOfRange {
        /// Offending id.
        component_id: ComponentId,
        /// Configured width.
        width: usize,
    },

    /// A component type was used without being registered.
    #[error("component `{name}` is not registered")]
    UnknownComponent {
        /// Type name of the component.
        name: &'static str,
    },

    /// A component type was registered twice.
    #[error("component `{name}` is already registered")]
    DuplicateComponent {
        /// Type name of the component.
        name: &'static str,
    },

    /// Registration was attempted after the registry was frozen.
    #[error("component registry is frozen")]
    RegistryFrozen,

    /// Two systems were scheduled with the same id.
    #[error("system id {0} is already scheduled")]
    DuplicateSystem(SystemId),

    /// A thread count of zero or an unparsable override was supplied.
    #[error("invalid thread count `{0}`")]
    InvalidThreadCount(String),

    /// The worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    Pool(String),
}

/// Component lookup failures.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The entity id is not alive.
    #[error("stale or dead entity {0}")]
    DeadEntity(EntityId),

    /// The entity is alive but does not carry the component.
    #[error("entity {entity} has no `{name}` component")]
    MissingComponent {
        /// Entity that was queried.
        entity: EntityId,
        /// Type name of the component.
        name: &'static str,
    },

    /// The component type is unknown to the storage.
    #[error("component `{0}` is not registered with the storage")]
    NotRegistered(&'static str),
}

/// Failures raised while running slices.

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// A slice function returned an error.
    #[error("slice {split_index} failed: {source}")]
    Slice {
        /// Index of the failing slice.
        split_index: SplitIndex,
        /// Error returned by the slice function.
        source: Box<ECSError>,
    },

    /// A slice function panicked.
    #[error("slice {split_index} panicked: {message}")]
    SlicePanicked {
        /// Index of the failing slice.
        split_index: SplitIndex,
        /// Panic payload, if it was a string.
        message: String,
    },

    /// A deferred callback failed while being flushed.
    #[error("deferred callback of system {system} failed: {source}")]
    Deferred {
        /// Owning system.
        system: SystemId,
        /// Error returned by the callback.
        source: Box<ECSError>,
    },
}

impl ExecutionError {
    /// Split index of the failing slice, if the error came from a slice.
    pub fn split_index(&self) -> Option<SplitIndex> {
        match self {
            ExecutionError::Slice { split_index, .. }
            | ExecutionError::SlicePanicked { split_index, .. } => Some(*split_index),
            ExecutionError::Deferred { .. } => None,
        }
    }
}

/// Top-level error of the engine.

#[derive(Debug, thiserror::Error)]
pub enum ECSError {
    /// Configuration violation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Component storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Slice or deferred-callback failure.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Error raised by user logic.
    #[error("{0}")]
    User(BoxError),
}

impl ECSError {
    /// Wraps an arbitrary user error.
    pub fn user<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        ECSError::User(error.into())
    }
}
