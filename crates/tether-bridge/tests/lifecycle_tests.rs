//! Handle lifecycle: finalization, referenced objects and expiry.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tether_bridge::{
    BridgeError, Callable, ClassId, Finalization, Handle, HandleHeap, Ownership, Runtime, Scope,
    Value,
};

/// Counts how many times its destructor ran
struct Tracked {
    id: i64,
    drops: Rc<Cell<usize>>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

fn runtime() -> Runtime {
    let mut rt = Runtime::new();
    let class = rt.classes_mut().register_type::<Tracked>("Tracked").unwrap();
    rt.classes_mut()
        .install_getter(class, Scope::Instance, "id", Callable::field_getter(|t: &Tracked| &t.id))
        .unwrap();
    rt
}

fn tracked(id: i64, drops: &Rc<Cell<usize>>) -> Tracked {
    Tracked {
        id,
        drops: Rc::clone(drops),
    }
}

// ============================================================================
// Owned objects
// ============================================================================

#[test]
fn test_owned_destroyed_exactly_once() {
    let drops = Rc::new(Cell::new(0));
    let mut rt = runtime();

    let value = rt.wrap(tracked(1, &drops)).unwrap();
    assert_eq!(rt.handle_of(&value).unwrap().ownership(), Ownership::Owned);
    assert_eq!(rt.handle_count(), 1);

    assert_eq!(rt.collect_garbage(), 1);
    assert_eq!(drops.get(), 1);

    assert_eq!(rt.collect_garbage(), 0);
    drop(rt);
    assert_eq!(drops.get(), 1);
}

#[test]
fn test_global_keeps_object_alive() {
    let drops = Rc::new(Cell::new(0));
    let mut rt = runtime();

    let value = rt.wrap(tracked(2, &drops)).unwrap();
    rt.set_global("keep", value);

    assert_eq!(rt.collect_garbage(), 0);
    let kept = rt.global("keep");
    assert_eq!(rt.get_field(&kept, "id").unwrap(), Value::Integer(2));

    rt.remove_global("keep");
    drop(kept);
    assert_eq!(rt.collect_garbage(), 1);
    assert_eq!(drops.get(), 1);
}

#[test]
fn test_runtime_drop_finalizes_remaining() {
    let drops = Rc::new(Cell::new(0));
    let mut rt = runtime();

    rt.wrap(tracked(1, &drops)).unwrap();
    rt.wrap(tracked(2, &drops)).unwrap();
    assert_eq!(drops.get(), 0);

    drop(rt);
    assert_eq!(drops.get(), 2);
}

#[test]
fn test_stale_value_after_collection() {
    let drops = Rc::new(Cell::new(0));
    let mut rt = runtime();

    let stale = rt.wrap(tracked(1, &drops)).unwrap();
    rt.collect_garbage();
    let _fresh = rt.wrap(tracked(2, &drops)).unwrap();

    // The slot is reused but the generation differs
    assert!(matches!(rt.handle_of(&stale), Err(BridgeError::InvalidReceiver { .. })));
}

// ============================================================================
// Referenced objects
// ============================================================================

#[test]
fn test_referenced_never_destroyed_by_script() {
    let drops = Rc::new(Cell::new(0));
    let object = Rc::new(RefCell::new(tracked(3, &drops)));
    let mut rt = runtime();

    let value = rt.wrap_ref(&object).unwrap();
    assert_eq!(
        rt.handle_of(&value).unwrap().ownership(),
        Ownership::ReferencedMutable
    );

    assert_eq!(rt.collect_garbage(), 1);
    drop(rt);
    assert_eq!(drops.get(), 0);
    assert_eq!(object.borrow().id, 3);
}

#[test]
fn test_referenced_object_expires() {
    let drops = Rc::new(Cell::new(0));
    let object = Rc::new(RefCell::new(tracked(4, &drops)));
    let mut rt = runtime();

    let value = rt.wrap_const(&object).unwrap();
    assert_eq!(rt.get_field(&value, "id").unwrap(), Value::Integer(4));

    drop(object);
    assert_eq!(drops.get(), 1);
    assert!(!rt.handle_of(&value).unwrap().is_alive());

    let err = rt.get_field(&value, "id").unwrap_err();
    assert!(matches!(err, BridgeError::Expired(_)));
    assert_eq!(rt.stack_depth(), 0);
}

// ============================================================================
// Heap and handles
// ============================================================================

#[test]
fn test_finalize_outcomes() {
    let drops = Rc::new(Cell::new(0));
    let mut heap = HandleHeap::new();
    let class = ClassId::new(0);

    let owned = heap.alloc(Handle::owned(tracked(1, &drops), class));
    let shared = Rc::new(RefCell::new(tracked(2, &drops)));
    let referenced = heap.alloc(Handle::referenced(&shared, class));

    assert_eq!(heap.free(referenced), Some(Finalization::Released));
    assert_eq!(heap.free(owned), Some(Finalization::Destroyed));
    assert_eq!(heap.free(owned), None);
    assert_eq!(drops.get(), 1);
}

#[test]
fn test_finalize_during_active_call_is_deferred() {
    let drops = Rc::new(Cell::new(0));
    let class = ClassId::new(0);
    let handle = Handle::owned(tracked(1, &drops), class);

    let in_use = handle.object().unwrap();
    assert_eq!(handle.finalize(), Finalization::Deferred);
    assert_eq!(drops.get(), 0);

    drop(in_use);
    assert_eq!(drops.get(), 1);
}

#[test]
fn test_heap_sweep_keeps_reachable() {
    let drops = Rc::new(Cell::new(0));
    let mut heap = HandleHeap::new();
    let class = ClassId::new(0);

    let refs: Vec<_> = (0..4)
        .map(|id| heap.alloc(Handle::owned(tracked(id, &drops), class)))
        .collect();

    assert_eq!(heap.sweep([refs[1], refs[3]]), 2);
    assert_eq!(heap.live_count(), 2);
    assert!(heap.contains(refs[1]));
    assert!(!heap.contains(refs[0]));
    assert_eq!(drops.get(), 2);
}

#[test]
fn test_embedder_access_through_handle() {
    let drops = Rc::new(Cell::new(0));
    let mut rt = runtime();

    let value = rt.wrap(tracked(5, &drops)).unwrap();
    let handle = rt.handle_of(&value).unwrap();
    handle.with_mut(|t: &mut Tracked| t.id += 1).unwrap();
    assert_eq!(handle.with(|t: &Tracked| t.id).unwrap(), 6);
    assert!(matches!(
        handle.with(|_: &String| ()),
        Err(BridgeError::InvalidReceiver { .. })
    ));

    let object = Rc::new(RefCell::new(tracked(7, &drops)));
    let read_only = rt.wrap_const(&object).unwrap();
    let handle = rt.handle_of(&read_only).unwrap();
    assert!(matches!(
        handle.with_mut(|t: &mut Tracked| t.id = 0),
        Err(BridgeError::ConstViolation(_))
    ));
    assert_eq!(object.borrow().id, 7);
}
