//! Subscribed-entity set.
//!
//! A paged sparse set: `dense` holds the member ids contiguously so a
//! dispatch can hand out disjoint sub-slices to its slices, and the sparse
//! index maps an id to its position in `dense` (or [`ABSENT`]). The index is
//! split into fixed-size pages allocated on first use, so memory follows the
//! ids actually subscribed rather than the largest id ever seen.
//!
//! Insert, remove and membership are O(1); removal swaps the last member
//! into the hole, so iteration order is insertion order until the first
//! removal and deterministic afterwards.

use crate::engine::types::EntityId;


const ABSENT: u32 = u32::MAX;
const PAGE_BITS: u32 = 12;
const PAGE_SIZE: usize = 1 << PAGE_BITS;

type Page = Box<[u32; PAGE_SIZE]>;

/// Outcome of a subscription refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionChange {
    /// The entity was added.
    Subscribed,
    /// The entity was removed.
    Unsubscribed,
    /// Membership did not change.
    Unchanged,
}

/// Unique set of entity ids owned by one system instance.
#[derive(Clone, Debug, Default)]
pub struct SubscribedSet {
    dense: Vec<EntityId>,
    pages: Vec<Option<Page>>,
}

#[inline]
fn split(entity: EntityId) -> (usize, usize) {
    ((entity >> PAGE_BITS) as usize, entity as usize & (PAGE_SIZE - 1))
}

impl SubscribedSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members.
    #[inline]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Returns `true` if there are no members.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Number of sparse pages currently allocated.
    pub fn allocated_pages(&self) -> usize {
        self.pages.iter().filter(|page| page.is_some()).count()
    }

    /// Returns `true` if `entity` is a member.
    #[inline]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.position(entity).is_some()
    }

    fn position(&self, entity: EntityId) -> Option<usize> {
        let (page, offset) = split(entity);
        match self.pages.get(page) {
            Some(Some(slots)) if slots[offset] != ABSENT => Some(slots[offset] as usize),
            _ => None,
        }
    }

    fn slot_mut(&mut self, entity: EntityId) -> &mut u32 {
        let (page, offset) = split(entity);
        if self.pages.len() <= page {
            self.pages.resize_with(page + 1, || None);
        }
        let slots = self.pages[page].get_or_insert_with(|| Box::new([ABSENT; PAGE_SIZE]));
        &mut slots[offset]
    }

    /// Adds `entity`. Returns `false` if it was already a member.
    pub fn insert(&mut self, entity: EntityId) -> bool {
        if self.contains(entity) {
            return false;
        }
        let position = self.dense.len() as u32;
        *self.slot_mut(entity) = position;
        self.dense.push(entity);
        true
    }

    /// Removes `entity`. Returns `false` if it was not a member.
    pub fn remove(&mut self, entity: EntityId) -> bool {
        let Some(position) = self.position(entity) else {
            return false;
        };
        self.dense.swap_remove(position);
        if let Some(&moved) = self.dense.get(position) {
            *self.slot_mut(moved) = position as u32;
        }
        *self.slot_mut(entity) = ABSENT;
        true
    }

    /// Members in iteration order.
    #[inline]
    pub fn as_slice(&self) -> &[EntityId] {
        &self.dense
    }

    /// Iterates members in iteration order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.dense.iter().copied()
    }

    /// Removes every member. Allocated pages are kept for reuse.
    pub fn clear(&mut self) {
        for index in 0..self.dense.len() {
            let entity = self.dense[index];
            *self.slot_mut(entity) = ABSENT;
        }
        self.dense.clear();
    }
}
