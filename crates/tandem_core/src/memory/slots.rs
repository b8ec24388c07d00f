//! # Slot Arena
//!
//! Fixed-capacity storage addressed directly by entity id.
//!
//! A parallel presence bitmap makes iteration skip empty words 64 slots at a
//! time, so the per-frame walk costs O(live) rather than O(capacity) once
//! the arena is sparse.

use thiserror::Error;

use crate::EntityId;

/// Errors from slot arena operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotError {
    /// The id is past the arena's capacity.
    #[error("entity {id} out of range (capacity {capacity})")]
    OutOfRange {
        /// Offending id.
        id: EntityId,
        /// Arena capacity.
        capacity: usize,
    },
}

/// Arena of optional values indexed by entity id.
///
/// # Thread Safety
///
/// NOT thread-safe. Each context owns its own arena.
#[derive(Debug, Clone)]
pub struct SlotArena<T> {
    slots: Box<[Option<T>]>,
    present: Box<[u64]>,
    len: usize,
}

impl<T> SlotArena<T> {
    /// Creates an arena with room for ids `0..capacity`.
    ///
    /// All memory is pre-allocated upfront.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let slots: Vec<Option<T>> = (0..capacity).map(|_| None).collect();
        Self {
            slots: slots.into_boxed_slice(),
            present: vec![0; capacity.div_ceil(64)].into_boxed_slice(),
            len: 0,
        }
    }

    /// Maximum number of slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no slot is occupied.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn index(&self, id: EntityId) -> Result<usize, SlotError> {
        let index = id as usize;
        if index < self.slots.len() {
            Ok(index)
        } else {
            Err(SlotError::OutOfRange {
                id,
                capacity: self.slots.len(),
            })
        }
    }

    /// Stores `value` at `id`, returning the previous occupant.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::OutOfRange`] if `id` is past capacity.
    pub fn insert(&mut self, id: EntityId, value: T) -> Result<Option<T>, SlotError> {
        let index = self.index(id)?;
        let previous = self.slots[index].replace(value);
        if previous.is_none() {
            self.present[index / 64] |= 1 << (index % 64);
            self.len += 1;
        }
        Ok(previous)
    }

    /// Removes and returns the value at `id`.
    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let index = self.index(id).ok()?;
        let removed = self.slots[index].take();
        if removed.is_some() {
            self.present[index / 64] &= !(1 << (index % 64));
            self.len -= 1;
        }
        removed
    }

    /// Returns true if `id` is occupied.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    /// Shared access to the value at `id`.
    #[inline]
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.slots.get(id as usize)?.as_ref()
    }

    /// Mutable access to the value at `id`.
    #[inline]
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.slots.get_mut(id as usize)?.as_mut()
    }

    /// Occupied ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.present
            .iter()
            .enumerate()
            .filter(|(_, word)| **word != 0)
            .flat_map(|(word_idx, &word)| {
                let mut bits = word;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let bit = bits.trailing_zeros() as usize;
                    bits &= bits - 1; // Clear lowest set bit
                    // Capacity fits in EntityId by construction of `index`
                    EntityId::try_from(word_idx * 64 + bit).ok()
                })
            })
    }

    /// Occupied `(id, value)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.ids().filter_map(|id| self.get(id).map(|v| (id, v)))
    }

    /// Mutable `(id, value)` pairs in ascending id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                let id = EntityId::try_from(index).ok()?;
                slot.as_mut().map(|v| (id, v))
            })
    }

    /// Empties every slot.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.present.fill(0);
        self.len = 0;
    }
}
