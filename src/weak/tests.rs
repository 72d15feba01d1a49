use core::cell::Cell;

use rust_alloc::rc::Rc;
use rust_alloc::sync::Arc;
use rust_alloc::vec::Vec;

use proptest::prelude::*;

use crate::collectors::{ArcCollector, Gc, Heap, RcCollector, SharedObject};
use crate::{Collector, Error, Object, Symbol, Value, WeakRef, methods};

struct Probe {
    label: &'static str,
}

#[methods]
impl Probe {
    fn test(&self) -> Symbol {
        Symbol::new("test")
    }

    fn label(&self) -> &'static str {
        self.label
    }

    fn add(&self, a: i64, b: i64) -> i64 {
        a.wrapping_add(b)
    }

    fn fail(&self) -> Result<Value, Error> {
        Err(Error::raised("ProbeError", "probe failed"))
    }

    #[method(name = "ready?")]
    fn is_ready(&self) -> bool {
        true
    }
}

fn probe() -> Probe {
    Probe { label: "probe" }
}

#[test]
fn alive_right_after_construction() {
    let heap = Heap::default();
    let o = heap.alloc(probe());
    let r = heap.weak(&o).unwrap();
    assert!(r.is_alive());

    let o: Rc<dyn Object> = Rc::new(probe());
    let r = RcCollector.weak(&o).unwrap();
    assert!(r.is_alive());
}

#[test]
fn forwards_zero_argument_operation() {
    let heap = Heap::default();
    let o = heap.alloc(probe());
    let r = heap.weak(&o).unwrap();
    assert_eq!(r.forward("test", &[]), Ok(Value::symbol("test")));

    let o: Rc<dyn Object> = Rc::new(probe());
    let r = RcCollector.weak(&o).unwrap();
    assert_eq!(r.forward("test", &[]), Ok(Value::symbol("test")));
}

#[test]
fn forwarding_matches_direct_call() {
    let heap = Heap::default();
    let o = heap.alloc(probe());
    let r = heap.weak(&o).unwrap();

    let args = [Value::Integer(40), Value::Integer(2)];
    assert_eq!(r.forward("add", &args), o.send("add", &args));
    assert_eq!(r.forward("ready?", &[]), Ok(Value::Bool(true)));
    assert_eq!(
        r.forward("label", &[]),
        Ok(Value::Str(rust_alloc::string::String::from("probe")))
    );
}

#[test]
fn dead_after_collection() {
    let heap = Heap::default();
    let o = heap.alloc(probe());
    let r = heap.weak(&o).unwrap();
    drop(o);

    // unrooted but not yet reclaimed
    assert!(r.is_alive());
    heap.collect();
    assert!(!r.is_alive());
}

#[test]
fn dead_after_last_rc_drop() {
    let o: Rc<dyn Object> = Rc::new(probe());
    let r = RcCollector.weak(&o).unwrap();
    drop(o);
    assert!(!r.is_alive());
    assert_eq!(r.dereference().unwrap_err(), Error::DanglingReference);
}

#[test]
fn weakref_of_weakref_is_rejected() {
    let heap = Heap::default();
    let o = heap.alloc(probe());
    let r1 = heap.alloc(heap.weak(&o).unwrap());
    assert_eq!(heap.weak(&r1).unwrap_err(), Error::InvalidArgument);

    let o: Rc<dyn Object> = Rc::new(probe());
    let r1: Rc<dyn Object> = Rc::new(RcCollector.weak(&o).unwrap());
    assert_eq!(RcCollector.weak(&r1).unwrap_err(), Error::InvalidArgument);
}

#[test]
fn dead_weakref_is_still_rejected() {
    let heap = Heap::default();
    let o = heap.alloc(probe());
    let r1 = heap.alloc(heap.weak(&o).unwrap());
    drop(o);
    heap.collect();

    assert_eq!(r1.send("weakref_alive?", &[]), Ok(Value::Bool(false)));
    assert_eq!(heap.weak(&r1).unwrap_err(), Error::InvalidArgument);
}

#[test]
fn forward_after_collection_is_dangling() {
    let heap = Heap::default();
    let o = heap.alloc(probe());
    let r = heap.weak(&o).unwrap();
    drop(o);
    heap.collect();

    assert_eq!(r.forward("test", &[]), Err(Error::DanglingReference));
    // the dead check comes before the method lookup
    assert_eq!(r.forward("missing", &[]), Err(Error::DanglingReference));
    assert_eq!(r.dereference().unwrap_err(), Error::DanglingReference);
}

#[test]
fn unsupported_operation_names_the_weakref() {
    let o: Rc<dyn Object> = Rc::new(probe());
    let r = RcCollector.weak(&o).unwrap();
    assert_eq!(
        r.forward("missing", &[]),
        Err(Error::MethodNotFound {
            receiver: "WeakRef",
            method: "missing".into(),
        })
    );
    // the target itself would name its own class
    assert_eq!(
        o.send("missing", &[]),
        Err(Error::method_not_found("Probe", "missing"))
    );
}

#[test]
fn target_errors_pass_through() {
    let o: Rc<dyn Object> = Rc::new(probe());
    let r = RcCollector.weak(&o).unwrap();
    assert_eq!(r.forward("fail", &[]), o.send("fail", &[]));
    assert_eq!(
        r.forward("fail", &[]),
        Err(Error::raised("ProbeError", "probe failed"))
    );
    assert_eq!(
        r.forward("add", &[Value::Integer(1)]),
        Err(Error::ArgumentCount {
            given: 1,
            expected: 2
        })
    );
    assert_eq!(
        r.forward("add", &[Value::Integer(1), Value::symbol("two")]),
        Err(Error::TypeMismatch {
            expected: "integer",
            found: "symbol"
        })
    );
}

#[test]
fn pin_returns_the_wrapped_object() {
    let heap = Heap::default();
    let o = heap.alloc(probe());
    let r = heap.weak(&o).unwrap();
    let pinned = r.dereference().unwrap();
    assert!(Gc::ptr_eq(&pinned, &o));
    assert_eq!(Gc::roots(&o), 2);
    drop(pinned);
    assert_eq!(Gc::roots(&o), 1);

    let o: Rc<dyn Object> = Rc::new(probe());
    let r = RcCollector.weak(&o).unwrap();
    assert!(Rc::ptr_eq(&r.dereference().unwrap(), &o));
}

#[test]
fn typed_access_through_with() {
    let o: Rc<dyn Object> = Rc::new(Probe { label: "typed" });
    let r = RcCollector.weak(&o).unwrap();
    let label = r.with(|target| target.downcast_ref::<Probe>().map(|p| p.label));
    assert_eq!(label, Ok(Some("typed")));

    drop(o);
    assert_eq!(r.with(|_| ()), Err(Error::DanglingReference));
}

#[test]
fn try_with_passes_closure_errors_through() {
    #[derive(Debug, PartialEq)]
    enum AppError {
        Weak(Error),
        NotAProbe,
    }

    impl From<Error> for AppError {
        fn from(e: Error) -> Self {
            Self::Weak(e)
        }
    }

    let o: Rc<dyn Object> = Rc::new(probe());
    let r = RcCollector.weak(&o).unwrap();

    let ok: Result<&str, AppError> = r.try_with(|target| {
        target
            .downcast_ref::<Probe>()
            .map(|p| p.label)
            .ok_or(AppError::NotAProbe)
    });
    assert_eq!(ok, Ok("probe"));

    let not_a_probe: Result<(), AppError> = r.try_with(|_| Err(AppError::NotAProbe));
    assert_eq!(not_a_probe, Err(AppError::NotAProbe));

    drop(o);
    let dead: Result<(), AppError> = r.try_with(|_| Ok(()));
    assert_eq!(dead, Err(AppError::Weak(Error::DanglingReference)));
}

#[test]
fn weakref_is_an_object() {
    let heap = Heap::default();
    let o = heap.alloc(probe());
    let r = heap.alloc(heap.weak(&o).unwrap());

    assert_eq!(r.class_name(), "WeakRef");
    assert!(r.is_weak_ref());
    assert!(r.responds_to("weakref_alive?"));
    assert!(r.responds_to("test"));
    assert!(!r.responds_to("missing"));
    assert_eq!(r.send("weakref_alive?", &[]), Ok(Value::Bool(true)));
    assert_eq!(r.send("test", &[]), Ok(Value::symbol("test")));

    drop(o);
    heap.collect();
    assert!(r.responds_to("weakref_alive?"));
    assert!(!r.responds_to("test"));
    assert_eq!(r.send("weakref_alive?", &[]), Ok(Value::Bool(false)));
    assert_eq!(r.send("test", &[]), Err(Error::DanglingReference));
}

#[test]
fn reused_slot_does_not_revive_old_reference() {
    let heap = Heap::default();
    let o = heap.alloc(probe());
    let slot = Gc::slot(&o);
    let r = heap.weak(&o).unwrap();
    drop(o);
    heap.collect();

    let replacement = heap.alloc(Probe { label: "replacement" });
    assert_eq!(Gc::slot(&replacement).index(), slot.index());
    assert!(!r.is_alive());
    assert_eq!(r.forward("label", &[]), Err(Error::DanglingReference));
}

// a collector whose answers the test controls, including wrong ones
#[derive(Clone)]
struct Scripted {
    alive: Rc<Cell<bool>>,
    pins: Rc<Cell<usize>>,
    target: Rc<dyn Object>,
}

impl Collector for Scripted {
    type Target = dyn Object;
    type Root = Rc<dyn Object>;
    type Handle = ();

    fn register_weak(&self, _object: &Rc<dyn Object>) {}

    fn is_alive(&self, _handle: &()) -> bool {
        self.alive.get()
    }

    fn pin(&self, _handle: &()) -> Option<Rc<dyn Object>> {
        self.pins.set(self.pins.get() + 1);
        self.alive.get().then(|| Rc::clone(&self.target))
    }
}

#[test]
fn death_is_latched() {
    let target: Rc<dyn Object> = Rc::new(probe());
    let collector = Scripted {
        alive: Rc::new(Cell::new(true)),
        pins: Rc::new(Cell::new(0)),
        target: Rc::clone(&target),
    };
    let r = WeakRef::new_in(&target, collector.clone()).unwrap();
    assert!(r.is_alive());
    assert!(r.dereference().is_ok());
    assert_eq!(collector.pins.get(), 1);

    collector.alive.set(false);
    assert!(!r.is_alive());

    // a collector that claims the object came back is not believed
    collector.alive.set(true);
    assert!(!r.is_alive());
    assert_eq!(r.forward("test", &[]), Err(Error::DanglingReference));
    assert_eq!(collector.pins.get(), 1);
}

#[test]
fn concurrent_forwarding_races_last_drop() {
    let strong: Arc<SharedObject> = Arc::new(Probe { label: "shared" });
    let weak = Arc::new(ArcCollector.weak(&strong).unwrap());

    let workers = (0..4)
        .map(|_| {
            let weak = Arc::clone(&weak);
            std::thread::spawn(move || {
                let mut seen_dead = false;
                for _ in 0..10_000 {
                    match weak.forward("test", &[]) {
                        Ok(value) => {
                            assert!(!seen_dead, "target came back after death");
                            assert_eq!(value, Value::symbol("test"));
                        }
                        Err(Error::DanglingReference) => seen_dead = true,
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
            })
        })
        .collect::<Vec<_>>();

    drop(strong);
    for worker in workers {
        worker.join().unwrap();
    }
    assert!(!weak.is_alive());
    assert_eq!(weak.forward("test", &[]), Err(Error::DanglingReference));
}

#[test]
fn arc_weakref_nests_are_rejected() {
    let strong: Arc<SharedObject> = Arc::new(probe());
    let r1: Arc<SharedObject> = Arc::new(ArcCollector.weak(&strong).unwrap());
    assert_eq!(
        ArcCollector.weak(&r1).unwrap_err(),
        Error::InvalidArgument
    );
}

#[derive(Debug, Clone)]
enum Step {
    Allocate,
    DropRoot,
    CloneRoot,
    Collect,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Allocate),
        Just(Step::DropRoot),
        Just(Step::CloneRoot),
        Just(Step::Collect),
    ]
}

proptest! {
    #[test]
    fn death_is_monotonic(steps in proptest::collection::vec(step(), 1..64)) {
        let heap = Heap::default().with_collect_threshold(3);
        let mut roots = Vec::new();
        roots.push(heap.alloc(probe()));
        let r = heap.weak(&roots[0]).unwrap();
        let mut fillers = Vec::new();
        let mut was_dead = false;

        for step in steps {
            match step {
                Step::Allocate => fillers.push(heap.alloc(Probe { label: "filler" })),
                Step::DropRoot => {
                    roots.pop();
                }
                Step::CloneRoot => {
                    if let Some(root) = roots.last() {
                        roots.push(root.clone());
                    }
                }
                Step::Collect => {
                    heap.collect();
                }
            }

            let alive = r.is_alive();
            prop_assert!(!(was_dead && alive), "weak reference came back to life");
            if !roots.is_empty() {
                // a rooted target is never reclaimed
                prop_assert!(alive);
                prop_assert_eq!(r.forward("test", &[]), Ok(Value::symbol("test")));
            }
            if !alive {
                prop_assert_eq!(r.forward("test", &[]), Err(Error::DanglingReference));
            }
            was_dead = !alive;
        }
    }

    #[test]
    fn forwarding_equals_direct_send(a in any::<i64>(), b in any::<i64>()) {
        let o: Rc<dyn Object> = Rc::new(probe());
        let r = RcCollector.weak(&o).unwrap();
        let args = [Value::Integer(a), Value::Integer(b)];
        prop_assert_eq!(r.forward("add", &args), o.send("add", &args));
        prop_assert_eq!(r.forward("add", &args), Ok(Value::Integer(a.wrapping_add(b))));
    }
}
