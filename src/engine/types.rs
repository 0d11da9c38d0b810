//! Core identifiers, component bitsets and access sets.
//!
//! This module defines the **fundamental value types** shared by every other
//! part of the engine: entity and component identifiers, the fixed-width
//! [`Bitset`] used to describe component sets, and the [`AccessSets`] used by
//! the stage scheduler to decide which systems may run side by side.
//!
//! ## Bitsets
//!
//! A bitset has one bit per component type registered in the enclosing
//! [`Settings`](crate::engine::settings::Settings). Its *width* is that
//! component count, and it is backed by a fixed array of `u64` words so that
//! matching never allocates:
//!
//! ```text
//! | word 0: components 0..63 | word 1: components 64..127 | ... |
//! ```
//!
//! A system's bitset is built once from its signature; an entity's bitset
//! changes whenever components are inserted or removed. The subscription rule
//! is a plain subset test, see [`matches`].
//!
//! ## Safety and Performance
//!
//! No unsafe code. All bit operations are branch-light word loops over at
//! most [`BITSET_WORDS`] words.

use std::fmt;

use crate::engine::error::ConfigError;


/// Identifier of a live entity. Validity is owned by the storage collaborator.
pub type EntityId = u32;

/// Identifier of a registered component type, dense in `[0, component_count)`.
pub type ComponentId = u16;

/// Unique identifier for a system.
pub type SystemId = u16;

/// Index of a slice within one parallel dispatch.
pub type SplitIndex = usize;

/// Maximum number of component types a configuration may declare.
pub const BITSET_CAP: usize = 256;

/// Number of `u64` words required to represent a full bitset.
pub const BITSET_WORDS: usize = (BITSET_CAP + 63) / 64;

/// Fixed-width bit vector encoding a set of component types.
///
/// ## Invariants
/// * `width <= BITSET_CAP`
/// * no bit at an index `>= width` is ever set

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bitset {
    width: u16,
    words: [u64; BITSET_WORDS],
}

impl Bitset {
    /// Creates an empty bitset of the given width.
    ///
    /// ## Errors
    /// Returns [`ConfigError::BitsetTooWide`] if `width` exceeds [`BITSET_CAP`].

    pub fn empty(width: usize) -> Result<Self, ConfigError> {
        if width > BITSET_CAP {
            return Err(ConfigError::BitsetTooWide { width, cap: BITSET_CAP });
        }
        Ok(Self { width: width as u16, words: [0u64; BITSET_WORDS] })
    }

    /// Number of component types this bitset can describe.
    #[inline]
    pub fn width(&self) -> usize {
        self.width as usize
    }

    /// Sets the bit corresponding to `component_id`.
    ///
    /// ## Errors
    /// Returns [`ConfigError::ComponentOutOfRange`] if the id is not below the width.
    #[inline]
    pub fn set(&mut self, component_id: ComponentId) -> Result<(), ConfigError> {
        self.check(component_id)?;
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.words[index] |= 1u64 << bits;
        Ok(())
    }

    /// Clears the bit corresponding to `component_id`. Out-of-range ids are ignored.
    #[inline]
    pub fn clear(&mut self, component_id: ComponentId) {
        if (component_id as usize) >= self.width() { return; }
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.words[index] &= !(1u64 << bits);
    }

    /// Returns `true` if `component_id` is present in this bitset.
    #[inline]
    pub fn has(&self, component_id: ComponentId) -> bool {
        if (component_id as usize) >= self.width() { return false; }
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        (self.words[index] >> bits) & 1 == 1
    }

    /// Returns `true` if no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&word| word == 0)
    }

    /// Number of set bits.
    #[inline]
    pub fn count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Returns `true` if every bit set in `other` is also set in `self`.
    #[inline]
    pub fn contains_all(&self, other: &Bitset) -> bool {
        for (word_a, word_b) in self.words.iter().zip(other.words.iter()) {
            if (word_a & word_b) != *word_b { return false; }
        }
        true
    }

    /// Returns `true` if the two bitsets share at least one set bit.
    #[inline]
    pub fn intersects(&self, other: &Bitset) -> bool {
        self.words.iter().zip(other.words.iter()).any(|(a, b)| (a & b) != 0)
    }

    /// Iterates over all component ids set in this bitset, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_index, &word)| {
                let base = word_index * 64;
                let mut bits = word;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let tz = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some((base + tz) as ComponentId)
                })
            })
    }

    fn check(&self, component_id: ComponentId) -> Result<(), ConfigError> {
        if (component_id as usize) < self.width() {
            Ok(())
        } else {
            Err(ConfigError::ComponentOutOfRange { component_id, width: self.width() })
        }
    }
}

/// Renders the bitset as a `0`/`1` string, component 0 first.
impl fmt::Display for Bitset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for component_id in 0..self.width() {
            f.write_str(if self.has(component_id as ComponentId) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl fmt::Debug for Bitset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitset")
            .field("width", &self.width)
            .field("bits", &format_args!("{self}"))
            .finish()
    }
}

/// Builds a bitset of `width` from a list of component ids.
///
/// Deterministic: the result depends only on `width` and the set of ids.
///
/// ## Errors
/// Any id `>= width` is a configuration violation.

pub fn build_bitset(width: usize, component_ids: &[ComponentId]) -> Result<Bitset, ConfigError> {
    let mut bitset = Bitset::empty(width)?;
    for &component_id in component_ids { bitset.set(component_id)?; }
    Ok(bitset)
}

/// Subscription test: `true` iff every component the system requires is
/// present on the entity. Extra entity components are ignored.

#[inline]
pub fn matches(system_bitset: &Bitset, entity_bitset: &Bitset) -> bool {
    debug_assert_eq!(system_bitset.width(), entity_bitset.width(), "bitset width mismatch");
    entity_bitset.contains_all(system_bitset)
}

/// Access mode for a component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    /// Required to be present, never touched.
    Require,
    /// Read-only access.
    Read,
    /// Exclusive write access.
    Write,
}

/// Declares the component access set of a system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessSets {
    /// Components read by the system.
    pub read: Bitset,
    /// Components written by the system.
    pub write: Bitset,
}

impl AccessSets {
    /// Creates empty access sets of the given width.
    pub fn empty(width: usize) -> Result<Self, ConfigError> {
        Ok(Self { read: Bitset::empty(width)?, write: Bitset::empty(width)? })
    }

    /// Returns `true` if this access set conflicts with another.
    #[inline]
    pub fn conflicts_with(&self, other: &AccessSets) -> bool {
        // W∩W, W∩R or R∩W
        self.write.intersects(&other.write)
            || self.write.intersects(&other.read)
            || self.read.intersects(&other.write)
    }
}
