//! Implementation of a heap allocated, root counted box

use core::cell::Cell;
use core::fmt;

use super::WeakSlot;

pub(crate) struct GcHeader {
    root_count: Cell<u32>,
    slot: WeakSlot,
}

impl fmt::Debug for GcHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GcHeader {{ roots: {}, slot: {}@{} }}",
            self.root_count.get(),
            self.slot.index,
            self.slot.generation
        )
    }
}

impl GcHeader {
    // a new header starts with the root of the `Gc` returned by `alloc`
    pub(crate) const fn new_rooted(slot: WeakSlot) -> Self {
        Self {
            root_count: Cell::new(1),
            slot,
        }
    }

    pub(crate) fn inc_roots(&self) {
        // crash on overflow to prevent memory bugs
        self.root_count.set(
            self.root_count
                .get()
                .checked_add(1)
                .expect("root count overflow: more than u32::MAX roots on a single GcBox"),
        );
    }

    pub(crate) fn dec_roots(&self) {
        // avoid crashing in a destructor if the root count somehow breaks
        self.root_count.set(self.root_count.get().saturating_sub(1));
    }

    pub(crate) fn is_rooted(&self) -> bool {
        self.root_count.get() > 0
    }

    pub(crate) fn roots(&self) -> u32 {
        self.root_count.get()
    }

    pub(crate) fn slot(&self) -> WeakSlot {
        self.slot
    }
}

#[derive(Debug)]
#[repr(C)]
pub(crate) struct GcBox<T: ?Sized + 'static> {
    pub(crate) header: GcHeader,
    value: T,
}

impl<T> GcBox<T> {
    pub(crate) fn new(value: T, slot: WeakSlot) -> Self {
        Self {
            header: GcHeader::new_rooted(slot),
            value,
        }
    }
}

impl<T: ?Sized> GcBox<T> {
    pub(crate) fn value(&self) -> &T {
        &self.value
    }
}
