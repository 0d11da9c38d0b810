//! # Component Registry
//!
//! Assigns compact [`ComponentId`] values to Rust component types and keeps
//! the per-component column factories used by [`World`](crate::engine::storage::World)
//! to allocate storage.
//!
//! ## Design
//! - Components are registered once, in declaration order, and receive ids in
//!   `[0, BITSET_CAP)`. The number of registered components is the bitset
//!   width of the whole configuration.
//! - A registry is owned by one [`Settings`](crate::engine::settings::Settings)
//!   value and frozen when the settings are built; there is no process-wide
//!   registry.
//!
//! ## Invariants
//! - Every entry in `by_type` has a matching `by_id[id]` and `factories[id]`.
//! - When frozen, registration is rejected with [`ConfigError::RegistryFrozen`].

use std::{
    any::{type_name, TypeId},
    collections::HashMap,
    mem::{align_of, size_of},
};

use crate::engine::error::ConfigError;
use crate::engine::storage::{Column, ErasedColumn};
use crate::engine::types::{ComponentId, BITSET_CAP};


/// Marker for types that can be stored as components.
pub trait Component: 'static + Send + Sync {}

impl<T: 'static + Send + Sync> Component for T {}

/// Factory for an empty type-erased column.
type FactoryFn = fn() -> Box<dyn ErasedColumn>;

fn new_column<T: Component>() -> Box<dyn ErasedColumn> {
    Box::new(Column::<T>::default())
}

/// Metadata recorded for each registered component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentDesc {
    /// Assigned id.
    pub component_id: ComponentId,
    /// Rust type name, for diagnostics.
    pub name: &'static str,
    /// Rust type id.
    pub type_id: TypeId,
    /// `size_of::<T>()`.
    pub size: usize,
    /// `align_of::<T>()`.
    pub align: usize,
}

/// Ordered list of component descriptors.
#[derive(Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentId>,
    by_id: Vec<ComponentDesc>,
    factories: Vec<FactoryFn>,
    frozen: bool,
}

impl ComponentRegistry {
    /// Creates an empty, unfrozen registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` and returns its id.
    ///
    /// ## Errors
    /// * [`ConfigError::RegistryFrozen`] after [`freeze`](Self::freeze).
    /// * [`ConfigError::DuplicateComponent`] if `T` is already registered.
    /// * [`ConfigError::ComponentOutOfRange`] once `BITSET_CAP` ids are in use.

    pub fn register<T: Component>(&mut self) -> Result<ComponentId, ConfigError> {
        if self.frozen {
            return Err(ConfigError::RegistryFrozen);
        }
        let type_id = TypeId::of::<T>();
        if self.by_type.contains_key(&type_id) {
            return Err(ConfigError::DuplicateComponent { name: type_name::<T>() });
        }
        let next = self.by_id.len();
        if next >= BITSET_CAP {
            return Err(ConfigError::ComponentOutOfRange {
                component_id: next as ComponentId,
                width: BITSET_CAP,
            });
        }

        let component_id = next as ComponentId;
        self.by_type.insert(type_id, component_id);
        self.by_id.push(ComponentDesc {
            component_id,
            name: type_name::<T>(),
            type_id,
            size: size_of::<T>(),
            align: align_of::<T>(),
        });
        self.factories.push(new_column::<T>);
        Ok(component_id)
    }

    /// Freezes the registry, locking the bitset width.
    pub fn freeze(&mut self) { self.frozen = true; }

    /// Returns `true` if the registry has been frozen.
    pub fn is_frozen(&self) -> bool { self.frozen }

    /// Number of registered components, i.e. the bitset width.
    pub fn len(&self) -> usize { self.by_id.len() }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool { self.by_id.is_empty() }

    /// Returns the id of `T`.
    ///
    /// ## Errors
    /// [`ConfigError::UnknownComponent`] if `T` was never registered.
    pub fn id_of<T: Component>(&self) -> Result<ComponentId, ConfigError> {
        self.id_of_type_id(TypeId::of::<T>())
            .ok_or(ConfigError::UnknownComponent { name: type_name::<T>() })
    }

    /// Returns the id registered for a `TypeId`, if any.
    pub fn id_of_type_id(&self, type_id: TypeId) -> Option<ComponentId> {
        self.by_type.get(&type_id).copied()
    }

    /// Returns the descriptor of a component id.
    pub fn describe(&self, component_id: ComponentId) -> Option<&ComponentDesc> {
        self.by_id.get(component_id as usize)
    }

    /// Iterates descriptors in id order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ComponentDesc> {
        self.by_id.iter()
    }

    /// Allocates one empty column per registered component, in id order.
    pub(crate) fn make_columns(&self) -> Vec<Box<dyn ErasedColumn>> {
        self.factories.iter().map(|factory| factory()).collect()
    }
}
