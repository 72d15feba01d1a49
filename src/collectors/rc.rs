use rust_alloc::rc::{Rc, Weak};

use crate::{Collector, Error, Object, WeakRef};

/// Rust's own reference counting as the memory manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct RcCollector;

impl RcCollector {
    pub fn weak(&self, object: &Rc<dyn Object>) -> Result<WeakRef<Self>, Error> {
        WeakRef::new_in(object, *self)
    }
}

impl Collector for RcCollector {
    type Target = dyn Object;
    type Root = Rc<dyn Object>;
    type Handle = Weak<dyn Object>;

    fn register_weak(&self, object: &Rc<dyn Object>) -> Weak<dyn Object> {
        Rc::downgrade(object)
    }

    fn is_alive(&self, handle: &Weak<dyn Object>) -> bool {
        handle.strong_count() > 0
    }

    fn pin(&self, handle: &Weak<dyn Object>) -> Option<Rc<dyn Object>> {
        handle.upgrade()
    }
}
