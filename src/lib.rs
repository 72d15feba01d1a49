//! Weak references to collector-managed objects.
//!
//! A [`WeakRef`] observes an object without keeping it alive. It can be probed
//! for liveness, pinned back into a strong reference, or used as if it were the
//! object itself by forwarding operations to the pinned target.
//!
//! The memory manager is never assumed to be global: every weak reference is
//! built against a [`Collector`] value. The [`collectors`] module carries the
//! hosts shipped with this crate.

#![no_std]

extern crate self as weakref;

extern crate alloc as rust_alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

mod error;
mod object;
mod value;
mod weak;

pub mod collector;
pub mod collectors;

pub use collector::Collector;
pub use error::Error;
pub use object::Object;
pub use value::{FromValue, IntoValue, Symbol, Value, check_arity};
pub use weak::WeakRef;
pub use weakref_derive::methods;
