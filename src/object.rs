//! The capability interface of objects a weak reference can forward to.

use core::any::Any;
use core::fmt;

use crate::{Error, Value};

#[doc(hidden)]
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An object that accepts operations by name.
///
/// Implementations are usually generated with [`macro@crate::methods`].
pub trait Object: AsAny {
    fn class_name(&self) -> &'static str;

    fn responds_to(&self, method: &str) -> bool;

    /// Invokes `method` with `args`.
    ///
    /// Errors raised here reach the caller of a forwarded operation unchanged.
    fn send(&self, method: &str, args: &[Value]) -> Result<Value, Error>;

    /// Whether this object is itself a weak reference.
    ///
    /// Proxies around a weak reference may return `true` so they are rejected as
    /// weak reference targets too.
    fn is_weak_ref(&self) -> bool {
        false
    }
}

impl dyn Object {
    pub fn is<T: Object>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl dyn Object + Send + Sync {
    pub fn is<T: Object>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for dyn Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.class_name()).finish_non_exhaustive()
    }
}

impl fmt::Debug for dyn Object + Send + Sync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.class_name()).finish_non_exhaustive()
    }
}
