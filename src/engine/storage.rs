//! Component storage and entity population.
//!
//! The execution core only sees storage through two traits:
//!
//! * [`ComponentStorage`]: per-entity bitset lookup and typed component
//!   access, shared (`&self`) across every slice of a tick;
//! * [`EntityPopulation`]: enumeration of live entities and the stream of
//!   structural changes used to refresh subscriptions.
//!
//! [`World`] is the in-crate implementation: one column per registered
//! component, indexed by entity id, each cell behind its own `RwLock`.
//!
//! ## Concurrency model
//! Slices of one system work on disjoint entity ranges, so cell locks taken
//! from different slices never contend. Holding a read guard and a write
//! guard for the *same* cell on one thread deadlocks; slice code must drop a
//! guard before re-borrowing the same component of the same entity.
//!
//! Structural changes (spawn, despawn, insert, remove) require `&mut World`
//! and therefore can only happen outside a dispatch, typically from deferred
//! callbacks.

use std::any::{type_name, Any};
use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::engine::component::{Component, ComponentRegistry};
use crate::engine::error::{ConfigError, ECSResult, StorageError};
use crate::engine::settings::Settings;
use crate::engine::types::{Bitset, ComponentId, EntityId};


/// Typed component access shared by all slices of a tick.
pub trait ComponentStorage: Sync {
    /// Current component bitset of a live entity.
    fn bitset_of(&self, entity: EntityId) -> Option<Bitset>;

    /// Shared borrow of component `T` on `entity`.
    fn read<T: Component>(&self, entity: EntityId) -> Result<MappedRwLockReadGuard<'_, T>, StorageError>;

    /// Exclusive borrow of component `T` on `entity`.
    fn write<T: Component>(&self, entity: EntityId) -> Result<MappedRwLockWriteGuard<'_, T>, StorageError>;
}

/// Structural change recorded by the population since the last drain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityChange {
    /// Entity spawned or its component set changed.
    Changed(EntityId),
    /// Entity destroyed.
    Destroyed(EntityId),
}

/// Enumerates live entities and reports structural changes.
pub trait EntityPopulation {
    /// All live entity ids, ascending.
    fn live_entities(&self) -> Vec<EntityId>;

    /// Changes since the previous call, in the order they happened.
    fn drain_changes(&mut self) -> Vec<EntityChange>;
}

/// Type-erased column, so `World` can hold heterogeneous components.
pub trait ErasedColumn: Send + Sync {
    /// Upcast for downcasting to `Column<T>`.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Grows the column to at least `len` empty cells.
    fn ensure_len(&mut self, len: usize);

    /// Drops the value stored for `entity`, if any.
    fn clear(&mut self, entity: EntityId);
}

/// Dense per-entity storage for one component type.
pub struct Column<T> {
    cells: Vec<RwLock<Option<T>>>,
}

impl<T> Default for Column<T> {
    fn default() -> Self {
        Self { cells: Vec::new() }
    }
}

impl<T: Component> Column<T> {
    fn cell(&self, entity: EntityId) -> Option<&RwLock<Option<T>>> {
        self.cells.get(entity as usize)
    }

    fn replace(&mut self, entity: EntityId, value: Option<T>) -> Option<T> {
        self.ensure_len(entity as usize + 1);
        std::mem::replace(self.cells[entity as usize].get_mut(), value)
    }
}

impl<T: Component> ErasedColumn for Column<T> {
    fn as_any(&self) -> &dyn Any { self }

    fn as_any_mut(&mut self) -> &mut dyn Any { self }

    fn ensure_len(&mut self, len: usize) {
        if self.cells.len() < len {
            self.cells.resize_with(len, || RwLock::new(None));
        }
    }

    fn clear(&mut self, entity: EntityId) {
        if let Some(cell) = self.cells.get_mut(entity as usize) {
            *cell.get_mut() = None;
        }
    }
}

/// In-process entity/component store.
///
/// ## Invariants
/// * `bitsets[e]` has bit `c` set iff column `c` holds a value for `e`.
/// * dead entities have an empty bitset and no column values.

pub struct World {
    registry: Arc<ComponentRegistry>,
    columns: Vec<Box<dyn ErasedColumn>>,
    empty: Bitset,
    bitsets: Vec<Bitset>,
    alive: Vec<bool>,
    free: Vec<EntityId>,
    live_count: usize,
    changes: Vec<EntityChange>,
}

impl World {
    /// Allocates one empty column per registered component.
    pub fn new(settings: &Settings) -> Result<Self, ConfigError> {
        let registry = Arc::clone(settings.registry());
        let columns = registry.make_columns();
        let empty = Bitset::empty(columns.len())?;
        Ok(Self {
            registry,
            columns,
            empty,
            bitsets: Vec::new(),
            alive: Vec::new(),
            free: Vec::new(),
            live_count: 0,
            changes: Vec::new(),
        })
    }

    /// Bitset width of this world.
    pub fn component_count(&self) -> usize {
        self.columns.len()
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.live_count
    }

    /// Returns `true` if no entity is alive.
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Creates an entity with no components. Freed ids are reused.
    pub fn spawn(&mut self) -> EntityId {
        let empty = self.empty;
        let entity = match self.free.pop() {
            Some(entity) => entity,
            None => {
                let entity = self.alive.len() as EntityId;
                self.alive.push(false);
                self.bitsets.push(empty);
                entity
            }
        };
        self.alive[entity as usize] = true;
        self.bitsets[entity as usize] = empty;
        self.live_count += 1;
        self.changes.push(EntityChange::Changed(entity));
        entity
    }

    /// Destroys an entity and drops its components. Returns `false` if it was not alive.
    pub fn despawn(&mut self, entity: EntityId) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let bitset = self.bitsets[entity as usize];
        for component_id in bitset.iter() {
            self.columns[component_id as usize].clear(entity);
        }
        self.bitsets[entity as usize] = self.empty;
        self.alive[entity as usize] = false;
        self.free.push(entity);
        self.live_count -= 1;
        self.changes.push(EntityChange::Destroyed(entity));
        true
    }

    /// Returns `true` if `entity` is alive.
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.alive.get(entity as usize).copied().unwrap_or(false)
    }

    /// Adds or replaces component `T` on `entity`, returning the old value.
    pub fn insert<T: Component>(&mut self, entity: EntityId, value: T) -> ECSResult<Option<T>> {
        let component_id = self.live_component::<T>(entity)?;
        let previous = self.column_mut::<T>(component_id)?.replace(entity, Some(value));
        let bitset = &mut self.bitsets[entity as usize];
        if !bitset.has(component_id) {
            bitset.set(component_id)?;
            self.changes.push(EntityChange::Changed(entity));
        }
        Ok(previous)
    }

    /// Removes component `T` from `entity`, returning it.
    pub fn remove<T: Component>(&mut self, entity: EntityId) -> ECSResult<Option<T>> {
        let component_id = self.live_component::<T>(entity)?;
        let previous = self.column_mut::<T>(component_id)?.replace(entity, None);
        let bitset = &mut self.bitsets[entity as usize];
        if bitset.has(component_id) {
            bitset.clear(component_id);
            self.changes.push(EntityChange::Changed(entity));
        }
        Ok(previous)
    }

    /// Returns `true` if `entity` is alive and carries `T`.
    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        match (self.registry.id_of::<T>(), self.bitset_of(entity)) {
            (Ok(component_id), Some(bitset)) => bitset.has(component_id),
            _ => false,
        }
    }

    /// Clones component `T` out of `entity`.
    pub fn get_cloned<T: Component + Clone>(&self, entity: EntityId) -> Result<T, StorageError> {
        self.read::<T>(entity).map(|value| value.clone())
    }

    fn live_component<T: Component>(&self, entity: EntityId) -> Result<ComponentId, StorageError> {
        if !self.is_alive(entity) {
            return Err(StorageError::DeadEntity(entity));
        }
        self.registry
            .id_of::<T>()
            .map_err(|_| StorageError::NotRegistered(type_name::<T>()))
    }

    fn column<T: Component>(&self) -> Result<&Column<T>, StorageError> {
        let component_id = self
            .registry
            .id_of::<T>()
            .map_err(|_| StorageError::NotRegistered(type_name::<T>()))?;
        self.columns
            .get(component_id as usize)
            .and_then(|column| column.as_any().downcast_ref::<Column<T>>())
            .ok_or(StorageError::NotRegistered(type_name::<T>()))
    }

    fn column_mut<T: Component>(&mut self, component_id: ComponentId) -> Result<&mut Column<T>, StorageError> {
        self.columns
            .get_mut(component_id as usize)
            .and_then(|column| column.as_any_mut().downcast_mut::<Column<T>>())
            .ok_or(StorageError::NotRegistered(type_name::<T>()))
    }

    fn live_cell<T: Component>(&self, entity: EntityId) -> Result<&RwLock<Option<T>>, StorageError> {
        if !self.is_alive(entity) {
            return Err(StorageError::DeadEntity(entity));
        }
        self.column::<T>()?
            .cell(entity)
            .ok_or(StorageError::MissingComponent { entity, name: type_name::<T>() })
    }
}

impl ComponentStorage for World {
    fn bitset_of(&self, entity: EntityId) -> Option<Bitset> {
        if self.is_alive(entity) { self.bitsets.get(entity as usize).copied() } else { None }
    }

    fn read<T: Component>(&self, entity: EntityId) -> Result<MappedRwLockReadGuard<'_, T>, StorageError> {
        let cell = self.live_cell::<T>(entity)?;
        RwLockReadGuard::try_map(cell.read(), Option::as_ref)
            .map_err(|_| StorageError::MissingComponent { entity, name: type_name::<T>() })
    }

    fn write<T: Component>(&self, entity: EntityId) -> Result<MappedRwLockWriteGuard<'_, T>, StorageError> {
        let cell = self.live_cell::<T>(entity)?;
        RwLockWriteGuard::try_map(cell.write(), Option::as_mut)
            .map_err(|_| StorageError::MissingComponent { entity, name: type_name::<T>() })
    }
}

impl EntityPopulation for World {
    fn live_entities(&self) -> Vec<EntityId> {
        self.alive
            .iter()
            .enumerate()
            .filter_map(|(entity, &alive)| alive.then_some(entity as EntityId))
            .collect()
    }

    fn drain_changes(&mut self) -> Vec<EntityChange> {
        std::mem::take(&mut self.changes)
    }
}
