//! Non-owning links from a chunk to the 26 chunks around it.
//!
//! Links are [`Weak`] references, so a chunk never keeps an unloaded neighbor alive.
//! A chunk holds its links behind an `Arc` that is swapped as a whole, so a reader sees
//! either the previous link set or the new one.

use std::sync::{Arc, Weak};

use cgmath::Vector3;

use super::Chunk;
use crate::engine_state::voxels::block::block_side::BlockSide;

/// Number of slots in the 3×3×3 neighbor grid. The centre slot is the chunk itself
/// and is never populated.
pub const NEIGHBOR_SLOTS: usize = 27;

/// A 3×3×3 grid of weak references to adjacent chunks.
#[derive(Clone, Default)]
pub struct NeighborLinks {
    slots: [Option<Weak<Chunk>>; NEIGHBOR_SLOTS],
}

impl NeighborLinks {
    /// A link set with every slot empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot index of a grid offset with components in `-1..=1`.
    ///
    /// # Returns
    /// `None` for the centre slot and for offsets outside the grid.
    pub fn slot_of(offset: Vector3<i32>) -> Option<usize> {
        let in_range = |v: i32| (-1..=1).contains(&v);
        if !(in_range(offset.x) && in_range(offset.y) && in_range(offset.z)) {
            return None;
        }
        let slot = ((offset.x + 1) + (offset.y + 1) * 3 + (offset.z + 1) * 9) as usize;
        (slot != 13).then_some(slot)
    }

    /// Grid offset of a slot index.
    pub fn offset_of(slot: usize) -> Vector3<i32> {
        let slot = slot as i32;
        Vector3::new(slot % 3 - 1, (slot / 3) % 3 - 1, slot / 9 - 1)
    }

    /// Links `chunk` at `offset`. Offsets outside the grid are ignored.
    pub fn link(&mut self, offset: Vector3<i32>, chunk: &Arc<Chunk>) {
        if let Some(slot) = Self::slot_of(offset) {
            self.slots[slot] = Some(Arc::downgrade(chunk));
        }
    }

    /// The neighbor at `offset`, if it is linked and still alive.
    pub fn get(&self, offset: Vector3<i32>) -> Option<Arc<Chunk>> {
        let slot = Self::slot_of(offset)?;
        self.slots[slot].as_ref()?.upgrade()
    }

    /// The neighbor across one face.
    pub fn face(&self, side: BlockSide) -> Option<Arc<Chunk>> {
        self.get(side.offset())
    }

    /// Whether a slot holds a link, alive or not.
    pub fn is_linked(&self, offset: Vector3<i32>) -> bool {
        Self::slot_of(offset).is_some_and(|slot| self.slots[slot].is_some())
    }

    /// Number of populated slots.
    pub fn linked_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether both link sets point at exactly the same chunks.
    pub fn same_links(&self, other: &NeighborLinks) -> bool {
        self.slots
            .iter()
            .zip(other.slots.iter())
            .all(|pair| match pair {
                (None, None) => true,
                (Some(a), Some(b)) => Weak::ptr_eq(a, b),
                _ => false,
            })
    }

    /// Faces linked in `self` whose link is absent from, or different in, `previous`.
    pub fn new_face_links<'a>(
        &'a self,
        previous: &'a NeighborLinks,
    ) -> impl Iterator<Item = BlockSide> + 'a {
        BlockSide::all().into_iter().filter(move |side| {
            let Some(slot) = Self::slot_of(side.offset()) else {
                return false;
            };
            match (&self.slots[slot], &previous.slots[slot]) {
                (Some(current), Some(old)) => !Weak::ptr_eq(current, old),
                (Some(_), None) => true,
                _ => false,
            }
        })
    }

    /// Faces linked in `previous` whose link is absent from, or different in, `self`.
    pub fn lost_face_links<'a>(
        &'a self,
        previous: &'a NeighborLinks,
    ) -> impl Iterator<Item = BlockSide> + 'a {
        previous.new_face_links(self)
    }
}
