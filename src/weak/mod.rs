//! The weak reference itself.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::{Collector, Error, Object, Value, check_arity};

#[cfg(test)]
mod tests;

const CLASS_NAME: &str = "WeakRef";
const ALIVE_QUERY: &str = "weakref_alive?";

/// A reference that observes and uses an object without keeping it alive.
///
/// A `WeakRef` always refers to the object it was built with, or to nothing
/// once the collector reclaimed that object. Death is observed, never caused:
/// the transition from alive to dead is the collector's decision, and once a
/// `WeakRef` has seen it the reference stays dead.
pub struct WeakRef<C: Collector> {
    collector: C,
    handle: C::Handle,
    // latched the first time death is observed
    expired: AtomicBool,
}

impl<C: Collector> WeakRef<C> {
    /// Creates a weak reference to `candidate`, registered with `collector`.
    ///
    /// Fails with [`Error::InvalidArgument`] if `candidate` is itself a weak
    /// reference, alive or not.
    pub fn new_in(candidate: &C::Root, collector: C) -> Result<Self, Error> {
        if Object::is_weak_ref(&**candidate) {
            return Err(Error::InvalidArgument);
        }

        let handle = collector.register_weak(candidate);
        Ok(Self {
            collector,
            handle,
            expired: AtomicBool::new(false),
        })
    }

    pub fn collector(&self) -> &C {
        &self.collector
    }

    /// Whether the target has not been reclaimed yet.
    ///
    /// The answer may be stale by the time it is used. Use [`WeakRef::dereference`]
    /// or [`WeakRef::forward`] to actually reach the target.
    pub fn is_alive(&self) -> bool {
        if self.expired.load(Ordering::Acquire) {
            return false;
        }
        if self.collector.is_alive(&self.handle) {
            true
        } else {
            self.expire();
            false
        }
    }

    /// Pins the target and returns a strong reference to it.
    ///
    /// Fails with [`Error::DanglingReference`] once the target was reclaimed.
    pub fn dereference(&self) -> Result<C::Root, Error> {
        if self.expired.load(Ordering::Acquire) {
            return Err(Error::DanglingReference);
        }
        match self.collector.pin(&self.handle) {
            Some(root) => Ok(root),
            None => {
                self.expire();
                Err(Error::DanglingReference)
            }
        }
    }

    /// Invokes `method` on the target as if it were called on the target directly.
    ///
    /// A dead target fails with [`Error::DanglingReference`]. A live target that
    /// does not respond to `method` fails with [`Error::MethodNotFound`] naming
    /// the weak reference as receiver. Errors raised by the target's operation are
    /// returned unchanged.
    pub fn forward(&self, method: &str, args: &[Value]) -> Result<Value, Error> {
        let target = self.dereference()?;
        if !target.responds_to(method) {
            return Err(Error::method_not_found(CLASS_NAME, method));
        }
        target.send(method, args)
    }

    /// Runs `f` on the pinned target.
    pub fn with<R>(&self, f: impl FnOnce(&C::Target) -> R) -> Result<R, Error> {
        let target = self.dereference()?;
        Ok(f(&*target))
    }

    /// Runs the fallible `f` on the pinned target; its errors are passed through.
    pub fn try_with<R, E>(&self, f: impl FnOnce(&C::Target) -> Result<R, E>) -> Result<R, E>
    where
        E: From<Error>,
    {
        let target = self.dereference()?;
        f(&*target)
    }

    fn expire(&self) {
        if !self.expired.swap(true, Ordering::AcqRel) {
            tracing::trace!("weak reference observed its target reclaimed");
        }
    }
}

impl<C: Collector> Drop for WeakRef<C> {
    fn drop(&mut self) {
        self.collector.release_weak(&self.handle);
    }
}

impl<C: Collector> fmt::Debug for WeakRef<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(CLASS_NAME)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

impl<C: Collector + 'static> Object for WeakRef<C> {
    fn class_name(&self) -> &'static str {
        CLASS_NAME
    }

    fn responds_to(&self, method: &str) -> bool {
        method == ALIVE_QUERY || self.with(|target| target.responds_to(method)).unwrap_or(false)
    }

    fn send(&self, method: &str, args: &[Value]) -> Result<Value, Error> {
        if method == ALIVE_QUERY {
            check_arity(args, 0)?;
            return Ok(Value::Bool(self.is_alive()));
        }
        self.forward(method, args)
    }

    fn is_weak_ref(&self) -> bool {
        true
    }
}
