// `Collector` trait
//
// key design decisions:
// - the collector is a value handed to each weak reference, never a global
// - `pin` is the only way from a handle back to the object; it must check
//   liveness and take the strong reference in one step, so a collection
//   can never land between the two

use core::ops::Deref;

use crate::Object;

/// The memory manager that owns the objects weak references point at.
pub trait Collector {
    /// The object type strong references dereference to.
    type Target: Object + ?Sized;

    /// A strong reference; holding one keeps the object from being reclaimed.
    type Root: Clone + Deref<Target = Self::Target> + 'static;

    /// A non-owning handle into the collector's weak-tracking table.
    type Handle: 'static;

    /// Creates a handle to `object` that never itself prevents reclamation.
    fn register_weak(&self, object: &Self::Root) -> Self::Handle;

    /// Whether the object behind `handle` has not been reclaimed yet.
    ///
    /// This is a snapshot. Never follow it with a fetch; use [`Collector::pin`].
    fn is_alive(&self, handle: &Self::Handle) -> bool;

    /// Upgrades `handle` to a strong reference, or returns `None` if the object
    /// has already been reclaimed.
    fn pin(&self, handle: &Self::Handle) -> Option<Self::Root>;

    /// Called once when the weak reference owning `handle` is dropped.
    fn release_weak(&self, handle: &Self::Handle) {
        let _ = handle;
    }
}
