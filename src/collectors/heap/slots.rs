//! generational slot table backing the heap
//!
//! every live object occupies one slot. sweeping a slot bumps its generation,
//! so handles taken before the sweep never match the slot again, even after
//! the slot is reused by a new object. a slot that reaches the last generation
//! is retired for good and never holds an object again

use core::ptr::NonNull;

use rust_alloc::vec::Vec;

use crate::Object;

use super::gc_box::GcBox;

pub(crate) type ErasedBox = NonNull<GcBox<dyn Object>>;

// only empty, retired slots carry this generation
const RETIRED_GENERATION: u32 = u32::MAX;

/// A weak handle into a [`Heap`](super::Heap): a slot index plus the generation
/// the slot had when the object was allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeakSlot {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl WeakSlot {
    /// A handle that matches no slot, for objects the heap does not own.
    pub(crate) const DETACHED: Self = Self {
        index: u32::MAX,
        generation: RETIRED_GENERATION,
    };

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<ErasedBox>,
}

#[derive(Debug, Default)]
pub(crate) struct SlotTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl SlotTable {
    pub(crate) fn reserve(&mut self, additional: usize) {
        self.slots.reserve(additional);
    }

    pub(crate) fn live(&self) -> usize {
        self.live
    }

    /// Places the box produced by `make` in a free slot.
    ///
    /// `make` receives the handle of the slot so the box can record it.
    pub(crate) fn insert_with(&mut self, make: impl FnOnce(WeakSlot) -> ErasedBox) -> ErasedBox {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len())
                    .expect("slot table overflow: more than u32::MAX slots");
                self.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                index
            }
        };

        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.entry.is_none(), "free list handed out an occupied slot");
        let ptr = make(WeakSlot {
            index,
            generation: slot.generation,
        });
        slot.entry = Some(ptr);
        self.live += 1;
        ptr
    }

    pub(crate) fn get(&self, handle: WeakSlot) -> Option<ErasedBox> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation == handle.generation {
            slot.entry
        } else {
            None
        }
    }

    /// Empties every slot whose object has no roots and returns the removed boxes.
    ///
    /// The boxes are not dropped here; the caller drops them once it released
    /// its borrow of the table.
    pub(crate) fn sweep_unrooted(&mut self) -> Vec<(u32, ErasedBox)> {
        let mut dead = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(ptr) = slot.entry else {
                continue;
            };
            // SAFETY: occupied slots always point at a live box
            if unsafe { ptr.as_ref() }.header.is_rooted() {
                continue;
            }
            slot.entry = None;
            // occupied slots are always below the retired generation, so this
            // cannot wrap. a retired slot leaves the free list for good,
            // otherwise an ancient handle could match it again
            slot.generation += 1;
            if slot.generation < RETIRED_GENERATION {
                self.free.push(index as u32);
            }
            dead.push((index as u32, ptr));
        }
        self.live -= dead.len();
        dead
    }
}
