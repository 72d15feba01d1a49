//! A deferred, root-counted object heap.
//!
//! Objects live in a generational slot table. A `Gc` roots its object; the
//! object becomes garbage once its root count drops to zero, but it is only
//! reclaimed by the next [`Heap::collect`]. Collections run when requested and
//! whenever the allocation threshold is reached, so from the point of view of a
//! weak reference they happen at arbitrary points.
//!
//! This heap does not trace. An unrooted cycle of objects holding `Gc`s to each
//! other keeps itself alive.

use core::cell::{Cell, RefCell};
use core::fmt;

use hashbrown::HashMap;
use rust_alloc::boxed::Box;
use rust_alloc::rc::{Rc, Weak};
use rustc_hash::FxBuildHasher;

use crate::{Collector, Error, Object, WeakRef};

mod gc;
mod gc_box;
mod slots;


pub use gc::Gc;
pub use slots::WeakSlot;

use gc_box::GcBox;
use slots::{ErasedBox, SlotTable};

// the weak-tracking table: slot index -> number of registered weak references
type WeakRegistry = HashMap<u32, usize, FxBuildHasher>;

/// The heap itself. Dropping it reclaims every unrooted object and turns every
/// weak handle into it dead.
pub struct Heap {
    state: Rc<HeapState>,
    collect_threshold: usize,
    allocs_since_collect: Cell<usize>,
}

impl Default for Heap {
    fn default() -> Self {
        Self {
            state: Rc::new(HeapState::default()),
            collect_threshold: Self::DEFAULT_COLLECT_THRESHOLD,
            allocs_since_collect: Cell::new(0),
        }
    }
}

impl Heap {
    /// Allocations between two implicit collections unless configured otherwise.
    pub const DEFAULT_COLLECT_THRESHOLD: usize = 1024;

    /// Runs a collection before an allocation once `threshold` objects were
    /// allocated since the last one. Zero disables implicit collections.
    pub fn with_collect_threshold(mut self, threshold: usize) -> Self {
        self.collect_threshold = threshold;
        self
    }

    pub fn with_capacity(self, capacity: usize) -> Self {
        self.state.slots.borrow_mut().reserve(capacity);
        self
    }

    /// Moves `value` onto the heap and returns the first root to it.
    pub fn alloc<T: Object>(&self, value: T) -> Gc {
        // run any deferred collection before allocating
        if self.collect_threshold > 0 && self.allocs_since_collect.get() >= self.collect_threshold
        {
            self.collect();
        }
        self.allocs_since_collect
            .set(self.allocs_since_collect.get() + 1);

        let ptr = self.state.slots.borrow_mut().insert_with(|slot| {
            let gc_box: Box<GcBox<dyn Object>> = Box::new(GcBox::new(value, slot));
            ErasedBox::from(Box::leak(gc_box))
        });
        // SAFETY: a new box starts with one root, which the returned `Gc` takes over
        unsafe { Gc::from_rooted(ptr) }
    }

    /// Reclaims every object that has no roots and returns how many were reclaimed.
    pub fn collect(&self) -> usize {
        self.allocs_since_collect.set(0);
        self.state.collect()
    }

    /// The collector value weak references into this heap are built with.
    pub fn collector(&self) -> HeapRef {
        HeapRef {
            state: Rc::downgrade(&self.state),
        }
    }

    /// Creates a weak reference to `object`.
    pub fn weak(&self, object: &Gc) -> Result<WeakRef<HeapRef>, Error> {
        WeakRef::new_in(object, self.collector())
    }

    /// The number of objects currently occupying a slot, garbage included.
    pub fn live_objects(&self) -> usize {
        self.state.slots.borrow().live()
    }

    /// The number of completed collections.
    pub fn collections(&self) -> usize {
        self.state.collections.get()
    }

    /// The number of weak references currently registered for `object`.
    pub fn weak_count(&self, object: &Gc) -> usize {
        self.state
            .weak_registry
            .borrow()
            .get(&Gc::slot(object).index)
            .copied()
            .unwrap_or(0)
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("live_objects", &self.live_objects())
            .field("collections", &self.collections())
            .field("collect_threshold", &self.collect_threshold)
            .finish()
    }
}

#[derive(Default)]
struct HeapState {
    slots: RefCell<SlotTable>,
    weak_registry: RefCell<WeakRegistry>,
    collections: Cell<usize>,
    // true during a collection, collections requested from drop glue are skipped
    is_collecting: Cell<bool>,
}

// RAII guard that clears `is_collecting` even if a drop impl panics
struct CollectingGuard<'a>(&'a Cell<bool>);

impl Drop for CollectingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl HeapState {
    fn collect(&self) -> usize {
        if self.is_collecting.replace(true) {
            return 0;
        }
        let _guard = CollectingGuard(&self.is_collecting);

        let mut reclaimed = 0;
        // dropping an object can release the last root of another one, so keep
        // sweeping until a pass finds nothing
        loop {
            let dead = self.slots.borrow_mut().sweep_unrooted();
            if dead.is_empty() {
                break;
            }
            {
                let mut registry = self.weak_registry.borrow_mut();
                for (index, _) in &dead {
                    registry.remove(index);
                }
            }
            reclaimed += dead.len();
            // no table borrow is held here, drop glue may use the heap
            for (_, ptr) in dead {
                // SAFETY: the box left the table unrooted, nothing else points at it
                drop(unsafe { Box::from_raw(ptr.as_ptr()) });
            }
        }

        self.collections.set(self.collections.get() + 1);
        tracing::debug!(
            reclaimed,
            live = self.slots.borrow().live(),
            "heap collection finished"
        );
        reclaimed
    }

    fn owns(&self, object: &Gc) -> bool {
        self.slots
            .borrow()
            .get(Gc::slot(object))
            .is_some_and(|ptr| core::ptr::addr_eq(ptr.as_ptr(), object.as_erased().as_ptr()))
    }
}

impl Drop for HeapState {
    fn drop(&mut self) {
        // objects still rooted by an outstanding `Gc` are leaked instead of
        // freed under it
        let reclaimed = self.collect();
        let leaked = self.slots.get_mut().live();
        if leaked > 0 {
            tracing::debug!(reclaimed, leaked, "heap dropped with rooted objects");
        }
    }
}

/// A non-owning reference to a [`Heap`], used as the collector of weak references
/// into it.
#[derive(Clone)]
pub struct HeapRef {
    state: Weak<HeapState>,
}

impl fmt::Debug for HeapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapRef")
            .field("heap_alive", &(self.state.strong_count() > 0))
            .finish()
    }
}

impl Collector for HeapRef {
    type Target = dyn Object;
    type Root = Gc;
    type Handle = WeakSlot;

    fn register_weak(&self, object: &Gc) -> WeakSlot {
        let handle = Gc::slot(object);
        if let Some(state) = self.state.upgrade() {
            // an object of another heap could share index and generation with
            // one of ours, so its handle must never match
            if !state.owns(object) {
                tracing::debug!(
                    slot = handle.index,
                    "object is not on this heap, weak reference detached"
                );
                return WeakSlot::DETACHED;
            }
            let mut registry = state.weak_registry.borrow_mut();
            let count = registry.entry(handle.index).or_insert(0);
            *count += 1;
            tracing::trace!(slot = handle.index, weak_refs = *count, "registered weak reference");
        }
        handle
    }

    fn is_alive(&self, handle: &WeakSlot) -> bool {
        self.state
            .upgrade()
            .is_some_and(|state| state.slots.borrow().get(*handle).is_some())
    }

    fn pin(&self, handle: &WeakSlot) -> Option<Gc> {
        let state = self.state.upgrade()?;
        let slots = state.slots.borrow();
        let ptr = slots.get(*handle)?;
        // SAFETY: the slot still holds the box and we hold the table borrow,
        // so no sweep can run between the lookup and the root increment
        Some(unsafe { Gc::pin(ptr) })
    }

    fn release_weak(&self, handle: &WeakSlot) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        // a swept slot already lost its entry, and its index may belong to a
        // new object by now
        if state.slots.borrow().get(*handle).is_none() {
            return;
        }
        let mut registry = state.weak_registry.borrow_mut();
        if let Some(count) = registry.get_mut(&handle.index) {
            *count -= 1;
            if *count == 0 {
                registry.remove(&handle.index);
            }
        }
        tracing::trace!(slot = handle.index, "released weak reference");
    }
}
