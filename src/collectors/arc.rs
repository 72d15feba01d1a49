use rust_alloc::sync::{Arc, Weak};

use crate::{Collector, Error, Object, WeakRef};

/// An object that can be shared across threads.
pub type SharedObject = dyn Object + Send + Sync;

/// Atomic reference counting as the memory manager.
///
/// `pin` is `Weak::upgrade`, a compare-and-increment on the strong count, so a
/// pin racing the last strong drop either wins a reference or observes death.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArcCollector;

impl ArcCollector {
    pub fn weak(&self, object: &Arc<SharedObject>) -> Result<WeakRef<Self>, Error> {
        WeakRef::new_in(object, *self)
    }
}

impl Collector for ArcCollector {
    type Target = SharedObject;
    type Root = Arc<SharedObject>;
    type Handle = Weak<SharedObject>;

    fn register_weak(&self, object: &Arc<SharedObject>) -> Weak<SharedObject> {
        Arc::downgrade(object)
    }

    fn is_alive(&self, handle: &Weak<SharedObject>) -> bool {
        handle.strong_count() > 0
    }

    fn pin(&self, handle: &Weak<SharedObject>) -> Option<Arc<SharedObject>> {
        handle.upgrade()
    }
}
