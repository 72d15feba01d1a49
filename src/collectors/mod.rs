//! Host collectors a [`WeakRef`](crate::WeakRef) can be built against.
//!
//! - [`RcCollector`]: single-threaded reference counting, reclamation on the
//!   last strong drop.
//! - [`ArcCollector`]: the thread-safe variant, reclamation may race any call.
//! - [`Heap`]: a deferred root-counted heap; objects are reclaimed only by
//!   [`Heap::collect`], either explicitly or when the allocation threshold is hit.

mod arc;
mod rc;

pub mod heap;

pub use arc::{ArcCollector, SharedObject};
pub use heap::{Gc, Heap, HeapRef, WeakSlot};
pub use rc::RcCollector;
