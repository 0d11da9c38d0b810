//! Runtime configuration: component registry, thread budget and system
//! signatures.
//!
//! A [`Settings`] value is built once at start-up through [`SettingsBuilder`]
//! and is immutable afterwards. It answers the three questions the execution
//! core asks of its configuration:
//!
//! * how wide is a bitset ([`Settings::component_count`]),
//! * what bitset does a system require ([`Settings::build_system_bitset`]),
//! * may a system split its work across threads
//!   ([`Settings::inner_parallelism_allowed`]).
//!
//! [`SystemSignature`] is the declarative description of one system: its id,
//! name, component requirements with access modes, and parallelism strategy.

use std::any::{type_name, TypeId};
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::engine::component::{Component, ComponentRegistry};
use crate::engine::error::ConfigError;
use crate::engine::types::{AccessMode, AccessSets, Bitset, ComponentId, SystemId};


/// Environment variable overriding the worker thread count.
pub const THREADS_ENV: &str = "ECS_EXECUTOR_THREADS";

/// How a system's subscribed entities are divided into slices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParallelismStrategy {
    /// Always run as a single slice on the calling thread.
    None,
    /// One slice per available worker thread.
    #[default]
    SplitEvenly,
    /// One slice per `n` entities (rounded up), capped by the thread budget.
    SplitEveryN(usize),
}

/// How many slices of a parallel dispatch run on the calling thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InlinePolicy {
    /// Run slice 0 on the calling thread, post the rest.
    #[default]
    OneInline,
    /// Post every slice; the calling thread only waits.
    AllThreaded,
}

impl InlinePolicy {
    /// Number of inline slices for a dispatch of `slices` slices.
    #[inline]
    pub fn inline_slices(self, slices: usize) -> usize {
        match self {
            InlinePolicy::OneInline => slices.min(1),
            InlinePolicy::AllThreaded => 0,
        }
    }
}

/// Immutable engine configuration.
#[derive(Clone)]
pub struct Settings {
    registry: Arc<ComponentRegistry>,
    max_threads: usize,
    inner_parallelism: bool,
    inline_policy: InlinePolicy,
}

impl Settings {
    /// Starts a new builder.
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    /// Bitset width: the number of registered component types.
    #[inline]
    pub fn component_count(&self) -> usize {
        self.registry.len()
    }

    /// Shared component registry.
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Upper bound on slices per dispatch and worker threads.
    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Global switch for inner parallelism.
    pub fn inner_parallelism(&self) -> bool {
        self.inner_parallelism
    }

    /// Inline/threaded split policy for parallel dispatches.
    pub fn inline_policy(&self) -> InlinePolicy {
        self.inline_policy
    }

    /// Returns `true` if `signature` runs on the parallel path.
    pub fn inner_parallelism_allowed(&self, signature: &SystemSignature) -> bool {
        self.inner_parallelism && signature.parallelism != ParallelismStrategy::None
    }

    /// Returns the id of component `T`.
    pub fn component_id<T: Component>(&self) -> Result<ComponentId, ConfigError> {
        self.registry.id_of::<T>()
    }

    /// Resolves a signature into the bitset of components it requires.
    ///
    /// ## Errors
    /// Unknown component types and out-of-range raw ids.
    pub fn build_system_bitset(&self, signature: &SystemSignature) -> Result<Bitset, ConfigError> {
        Ok(self.resolve(signature)?.0)
    }

    /// Resolves a signature into its access sets.
    pub fn build_access_sets(&self, signature: &SystemSignature) -> Result<AccessSets, ConfigError> {
        Ok(self.resolve(signature)?.1)
    }

    fn resolve(&self, signature: &SystemSignature) -> Result<(Bitset, AccessSets), ConfigError> {
        let width = self.component_count();
        let mut required = Bitset::empty(width)?;
        let mut access = AccessSets::empty(width)?;

        for requirement in &signature.requirements {
            let component_id = match requirement.key {
                ComponentKey::Type { type_id, name } => self
                    .registry
                    .id_of_type_id(type_id)
                    .ok_or(ConfigError::UnknownComponent { name })?,
                ComponentKey::Id(component_id) => component_id,
            };
            required.set(component_id)?;
            match requirement.mode {
                AccessMode::Require => {}
                AccessMode::Read => access.read.set(component_id)?,
                AccessMode::Write => access.write.set(component_id)?,
            }
        }
        Ok((required, access))
    }
}

/// Builder for [`Settings`].
pub struct SettingsBuilder {
    registry: ComponentRegistry,
    max_threads: Option<usize>,
    inner_parallelism: bool,
    inline_policy: InlinePolicy,
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsBuilder {
    /// Empty registry, hardware thread count, inner parallelism enabled.
    pub fn new() -> Self {
        Self {
            registry: ComponentRegistry::new(),
            max_threads: None,
            inner_parallelism: true,
            inline_policy: InlinePolicy::default(),
        }
    }

    /// Like [`new`](Self::new), but honours [`THREADS_ENV`].
    ///
    /// ## Errors
    /// [`ConfigError::InvalidThreadCount`] if the variable is set but not a
    /// positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = Self::new();
        if let Ok(value) = std::env::var(THREADS_ENV) {
            builder.max_threads = Some(parse_thread_count(&value)?);
        }
        Ok(builder)
    }

    /// Registers a component type. Declaration order fixes the ids.
    pub fn component<T: Component>(&mut self) -> Result<ComponentId, ConfigError> {
        self.registry.register::<T>()
    }

    /// Caps slices per dispatch and the worker pool size.
    pub fn max_threads(mut self, threads: usize) -> Self {
        self.max_threads = Some(threads);
        self
    }

    /// Enables or disables inner parallelism for every system.
    pub fn inner_parallelism(mut self, allowed: bool) -> Self {
        self.inner_parallelism = allowed;
        self
    }

    /// Chooses how many slices run on the dispatching thread.
    pub fn inline_policy(mut self, policy: InlinePolicy) -> Self {
        self.inline_policy = policy;
        self
    }

    /// Freezes the registry and validates the thread budget.
    pub fn build(mut self) -> Result<Settings, ConfigError> {
        let max_threads = match self.max_threads {
            Some(0) => return Err(ConfigError::InvalidThreadCount("0".to_owned())),
            Some(threads) => threads,
            None => std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
        };
        self.registry.freeze();

        Ok(Settings {
            registry: Arc::new(self.registry),
            max_threads,
            inner_parallelism: self.inner_parallelism,
            inline_policy: self.inline_policy,
        })
    }
}

/// Parses a positive thread count.
pub fn parse_thread_count(value: &str) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(threads) if threads > 0 => Ok(threads),
        _ => Err(ConfigError::InvalidThreadCount(value.to_owned())),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ComponentKey {
    Type { type_id: TypeId, name: &'static str },
    Id(ComponentId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Requirement {
    key: ComponentKey,
    mode: AccessMode,
}

/// Declarative description of one system.
///
/// ## Example
/// ```ignore
/// let movement = SystemSignature::new(1, "movement")
///     .read::<Velocity>()
///     .write::<Position>()
///     .parallelism(ParallelismStrategy::SplitEvenly);
/// ```

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemSignature {
    id: SystemId,
    name: &'static str,
    requirements: Vec<Requirement>,
    parallelism: ParallelismStrategy,
}

impl SystemSignature {
    /// New signature with no requirements and [`ParallelismStrategy::SplitEvenly`].
    pub fn new(id: SystemId, name: &'static str) -> Self {
        Self {
            id,
            name,
            requirements: Vec::new(),
            parallelism: ParallelismStrategy::default(),
        }
    }

    /// Requires `T` to be present without accessing it.
    pub fn require<T: Component>(self) -> Self {
        self.with(Self::key_of::<T>(), AccessMode::Require)
    }

    /// Requires and reads `T`.
    pub fn read<T: Component>(self) -> Self {
        self.with(Self::key_of::<T>(), AccessMode::Read)
    }

    /// Requires and writes `T`.
    pub fn write<T: Component>(self) -> Self {
        self.with(Self::key_of::<T>(), AccessMode::Write)
    }

    /// Requires a component by raw id. Validated against the width when the
    /// system instance is built.
    pub fn require_id(self, component_id: ComponentId) -> Self {
        self.with(ComponentKey::Id(component_id), AccessMode::Require)
    }

    /// Sets the slicing strategy.
    pub fn parallelism(mut self, strategy: ParallelismStrategy) -> Self {
        self.parallelism = strategy;
        self
    }

    /// System id.
    pub fn id(&self) -> SystemId { self.id }

    /// Human-readable name.
    pub fn name(&self) -> &'static str { self.name }

    /// Slicing strategy.
    pub fn strategy(&self) -> ParallelismStrategy { self.parallelism }

    fn key_of<T: Component>() -> ComponentKey {
        ComponentKey::Type { type_id: TypeId::of::<T>(), name: type_name::<T>() }
    }

    fn with(mut self, key: ComponentKey, mode: AccessMode) -> Self {
        self.requirements.push(Requirement { key, mode });
        self
    }
}
