use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;

use crate::Object;

use super::WeakSlot;
use super::gc_box::GcBox;
use super::slots::ErasedBox;

/// A rooted pointer to an object on a [`Heap`](super::Heap).
///
/// While any `Gc` to an object exists the heap will not reclaim it.
pub struct Gc {
    ptr: ErasedBox,
    marker: PhantomData<GcBox<dyn Object>>,
}

impl Gc {
    // SAFETY: the caller transfers one already counted root to the new `Gc`
    pub(crate) unsafe fn from_rooted(ptr: ErasedBox) -> Self {
        Self {
            ptr,
            marker: PhantomData,
        }
    }

    // SAFETY: `ptr` must point at a box that is still owned by the heap
    pub(crate) unsafe fn pin(ptr: ErasedBox) -> Self {
        unsafe { ptr.as_ref() }.header.inc_roots();
        // SAFETY: we just counted the root
        unsafe { Self::from_rooted(ptr) }
    }

    pub(crate) fn as_erased(&self) -> ErasedBox {
        self.ptr
    }

    fn inner(&self) -> &GcBox<dyn Object> {
        // SAFETY: a rooted box is never freed by the heap
        unsafe { self.ptr.as_ref() }
    }

    /// Whether both pointers refer to the same object.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        core::ptr::addr_eq(this.ptr.as_ptr(), other.ptr.as_ptr())
    }

    /// The number of `Gc` values currently rooting the object.
    pub fn roots(this: &Self) -> u32 {
        this.inner().header.roots()
    }

    pub fn slot(this: &Self) -> WeakSlot {
        this.inner().header.slot()
    }
}

impl Clone for Gc {
    fn clone(&self) -> Self {
        // Increment root count and copy pointer
        self.inner().header.inc_roots();
        Self {
            ptr: self.ptr,
            marker: PhantomData,
        }
    }
}

impl Drop for Gc {
    fn drop(&mut self) {
        self.inner().header.dec_roots();
    }
}

impl Deref for Gc {
    type Target = dyn Object;

    fn deref(&self) -> &Self::Target {
        self.inner().value()
    }
}

impl fmt::Debug for Gc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gc")
            .field("class", &self.class_name())
            .field("header", &self.inner().header)
            .finish()
    }
}
