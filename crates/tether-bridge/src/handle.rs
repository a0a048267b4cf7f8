//! Handles: host-managed proxies for native objects
//!
//! Every native object visible to scripts sits behind exactly one [`Handle`]
//! per proxy. The handle records the object's type identity, its class table
//! and how it is owned:
//!
//! ```text
//! Owned             Rc<RefCell<dyn Any>>    the handle is the owner; finalize drops it
//! ReferencedMutable Weak<RefCell<dyn Any>>  native code owns it; finalize is a no-op
//! ReferencedConst   Weak<RefCell<dyn Any>>  same, and mutating members are refused
//! ```
//!
//! Referenced handles never keep the object alive. If the owner drops it while
//! a proxy still exists, later calls fail with [`BridgeError::Expired`].
//!
//! Handles live in a [`HandleHeap`] owned by the host. The host's collector
//! calls [`HandleHeap::sweep`] with the reachable references; every other
//! handle is finalized exactly once, because [`Handle::finalize`] consumes it.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::dispatch::ClassId;
use crate::error::{BridgeError, BridgeResult};
use crate::host::HostStack;
use crate::logging::trace;
use crate::value::Value;

/// Shared, dynamically borrowed native object
pub type NativeObject = Rc<RefCell<dyn Any>>;

/// How the script side relates to the native object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The handle owns the object and destroys it on finalization
    Owned,
    /// The object is owned elsewhere and may be mutated through the handle
    ReferencedMutable,
    /// The object is owned elsewhere and is read-only through the handle
    ReferencedConst,
}

enum Storage {
    Owned(NativeObject),
    Referenced(Weak<RefCell<dyn Any>>),
    ReferencedConst(Weak<RefCell<dyn Any>>),
}

/// What finalizing a handle did to the native object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalization {
    /// The destructor ran
    Destroyed,
    /// An active call still holds the object; the destructor runs when it returns
    Deferred,
    /// Referenced object, left to its owner
    Released,
}

/// Reference to a handle slot in the host heap.
///
/// Slots are reused; the generation makes stale references resolve to `None`
/// instead of to a newer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleRef {
    index: u32,
    generation: u32,
}

impl HandleRef {
    /// Slot index in the heap
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// Tagged wrapper around a native object's storage
pub struct Handle {
    type_id: TypeId,
    type_name: &'static str,
    class: ClassId,
    storage: Storage,
}

impl Handle {
    /// Wrap a value the script side will own
    pub fn owned<T: 'static>(value: T, class: ClassId) -> Self {
        let object: NativeObject = Rc::new(RefCell::new(value));
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            class,
            storage: Storage::Owned(object),
        }
    }

    /// Reference an object owned by native code
    pub fn referenced<T: 'static>(object: &Rc<RefCell<T>>, class: ClassId) -> Self {
        let weak: Weak<RefCell<T>> = Rc::downgrade(object);
        let weak: Weak<RefCell<dyn Any>> = weak;
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            class,
            storage: Storage::Referenced(weak),
        }
    }

    /// Reference an object owned by native code, read-only
    pub fn referenced_const<T: 'static>(object: &Rc<RefCell<T>>, class: ClassId) -> Self {
        let weak: Weak<RefCell<T>> = Rc::downgrade(object);
        let weak: Weak<RefCell<dyn Any>> = weak;
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            class,
            storage: Storage::ReferencedConst(weak),
        }
    }

    /// Ownership mode
    pub fn ownership(&self) -> Ownership {
        match self.storage {
            Storage::Owned(_) => Ownership::Owned,
            Storage::Referenced(_) => Ownership::ReferencedMutable,
            Storage::ReferencedConst(_) => Ownership::ReferencedConst,
        }
    }

    /// Whether mutating members are refused
    pub fn is_const(&self) -> bool {
        matches!(self.storage, Storage::ReferencedConst(_))
    }

    /// Type identity of the wrapped object
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Type name of the wrapped object
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Class table of the wrapped object's runtime type
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Check the exact native type
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Whether a referenced object is still alive (always true when owned)
    pub fn is_alive(&self) -> bool {
        match &self.storage {
            Storage::Owned(_) => true,
            Storage::Referenced(weak) | Storage::ReferencedConst(weak) => weak.strong_count() > 0,
        }
    }

    /// Strong reference to the object for the duration of a call
    pub fn object(&self) -> BridgeResult<NativeObject> {
        match &self.storage {
            Storage::Owned(object) => Ok(Rc::clone(object)),
            Storage::Referenced(weak) | Storage::ReferencedConst(weak) => {
                weak.upgrade().ok_or(BridgeError::Expired(self.type_name))
            }
        }
    }

    /// Borrow the object as exactly `T`
    pub fn with<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> BridgeResult<R> {
        let object = self.object()?;
        let guard = object
            .try_borrow()
            .map_err(|_| BridgeError::Reentrant(self.type_name))?;
        let value = guard
            .downcast_ref::<T>()
            .ok_or_else(|| self.receiver_mismatch::<T>())?;
        Ok(f(value))
    }

    /// Mutably borrow the object as exactly `T`
    pub fn with_mut<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> BridgeResult<R> {
        if self.is_const() {
            return Err(BridgeError::ConstViolation(self.type_name));
        }
        let object = self.object()?;
        let mut guard = object
            .try_borrow_mut()
            .map_err(|_| BridgeError::Reentrant(self.type_name))?;
        let value = guard
            .downcast_mut::<T>()
            .ok_or_else(|| self.receiver_mismatch::<T>())?;
        Ok(f(value))
    }

    fn receiver_mismatch<T: 'static>(&self) -> BridgeError {
        BridgeError::InvalidReceiver {
            expected: std::any::type_name::<T>(),
            got: self.type_name.to_string(),
        }
    }

    /// Finalizer hook. Consumes the handle, so it can only run once.
    pub fn finalize(self) -> Finalization {
        let outcome = match self.storage {
            Storage::Owned(object) => {
                if Rc::strong_count(&object) == 1 {
                    drop(object);
                    Finalization::Destroyed
                } else {
                    Finalization::Deferred
                }
            }
            Storage::Referenced(_) | Storage::ReferencedConst(_) => Finalization::Released,
        };
        trace!(type_name = self.type_name, ?outcome, "finalized handle");
        outcome
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("type_name", &self.type_name)
            .field("class", &self.class)
            .field("ownership", &self.ownership())
            .finish()
    }
}

// ============================================================================
// Wrapping and unwrapping
// ============================================================================

fn class_for<T: 'static>(host: &dyn HostStack) -> BridgeResult<ClassId> {
    host.classes()
        .class_of_type(TypeId::of::<T>())
        .ok_or(BridgeError::UnregisteredType(std::any::type_name::<T>()))
}

/// Move a native value to the script side.
///
/// The class lookup is the only fallible step before the handle is published,
/// so a failure drops `value` normally and nothing is left for the collector.
pub fn wrap_owned<T: 'static>(host: &mut dyn HostStack, value: T) -> BridgeResult<Value> {
    let class = class_for::<T>(host)?;
    let handle = host.register_handle(Handle::owned(value, class))?;
    Ok(Value::Userdata(handle))
}

/// Expose a natively owned object by mutable reference
pub fn wrap_ref<T: 'static>(host: &mut dyn HostStack, object: &Rc<RefCell<T>>) -> BridgeResult<Value> {
    let class = class_for::<T>(host)?;
    let handle = host.register_handle(Handle::referenced(object, class))?;
    Ok(Value::Userdata(handle))
}

/// Expose a natively owned object by const reference
pub fn wrap_const_ref<T: 'static>(
    host: &mut dyn HostStack,
    object: &Rc<RefCell<T>>,
) -> BridgeResult<Value> {
    let class = class_for::<T>(host)?;
    let handle = host.register_handle(Handle::referenced_const(object, class))?;
    Ok(Value::Userdata(handle))
}

/// Resolve a proxy value to its handle
pub fn unwrap_value<'h>(host: &'h dyn HostStack, value: &Value) -> BridgeResult<&'h Handle> {
    let handle = value.as_userdata().ok_or(BridgeError::InvalidReceiver {
        expected: "userdata",
        got: value.type_name().to_string(),
    })?;
    host.handle(handle).ok_or(BridgeError::InvalidReceiver {
        expected: "userdata",
        got: "finalized handle".to_string(),
    })
}

// ============================================================================
// HandleHeap
// ============================================================================

struct HeapSlot {
    generation: u32,
    handle: Option<Handle>,
}

/// Slot arena holding the live handles of one host
#[derive(Default)]
pub struct HandleHeap {
    slots: Vec<HeapSlot>,
    free: Vec<u32>,
    live: usize,
}

impl HandleHeap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a handle and return its reference
    pub fn alloc(&mut self, handle: Handle) -> HandleRef {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.handle = Some(handle);
            return HandleRef {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(HeapSlot {
            generation: 0,
            handle: Some(handle),
        });
        HandleRef {
            index,
            generation: 0,
        }
    }

    /// Resolve a reference
    pub fn get(&self, handle: HandleRef) -> Option<&Handle> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.handle.as_ref())
    }

    /// Check if a reference is live
    pub fn contains(&self, handle: HandleRef) -> bool {
        self.get(handle).is_some()
    }

    /// Remove and finalize one handle
    pub fn free(&mut self, handle: HandleRef) -> Option<Finalization> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        let taken = slot.handle.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Some(taken.finalize())
    }

    /// Finalize every live handle not in `reachable`. Returns the number finalized.
    pub fn sweep(&mut self, reachable: impl IntoIterator<Item = HandleRef>) -> usize {
        let mut marked = vec![false; self.slots.len()];
        for handle in reachable {
            if self.contains(handle) {
                marked[handle.index()] = true;
            }
        }

        let mut finalized = 0;
        for index in 0..self.slots.len() {
            if marked[index] || self.slots[index].handle.is_none() {
                continue;
            }
            let handle = HandleRef {
                index: index as u32,
                generation: self.slots[index].generation,
            };
            if self.free(handle).is_some() {
                finalized += 1;
            }
        }
        finalized
    }

    /// Number of live handles
    pub fn live_count(&self) -> usize {
        self.live
    }
}

impl Drop for HandleHeap {
    fn drop(&mut self) {
        // Host shutdown: finalize everything still live
        for slot in &mut self.slots {
            if let Some(handle) = slot.handle.take() {
                handle.finalize();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Probe {
        drops: Rc<Cell<usize>>,
    }

    impl Drop for Probe {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    fn class() -> ClassId {
        ClassId::new(0)
    }

    #[test]
    fn test_owned_destroyed_once() {
        let drops = Rc::new(Cell::new(0));
        let handle = Handle::owned(Probe { drops: drops.clone() }, class());
        assert_eq!(handle.ownership(), Ownership::Owned);

        assert_eq!(handle.finalize(), Finalization::Destroyed);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_referenced_never_destroyed() {
        let drops = Rc::new(Cell::new(0));
        let object = Rc::new(RefCell::new(Probe { drops: drops.clone() }));
        let handle = Handle::referenced(&object, class());
        assert_eq!(handle.ownership(), Ownership::ReferencedMutable);

        assert_eq!(handle.finalize(), Finalization::Released);
        assert_eq!(drops.get(), 0);

        drop(object);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_deferred_while_borrowed() {
        let drops = Rc::new(Cell::new(0));
        let handle = Handle::owned(Probe { drops: drops.clone() }, class());
        let in_flight = handle.object().unwrap();

        assert_eq!(handle.finalize(), Finalization::Deferred);
        assert_eq!(drops.get(), 0);
        drop(in_flight);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_expired_reference() {
        let object = Rc::new(RefCell::new(5i32));
        let handle = Handle::referenced(&object, class());
        assert!(handle.is_alive());
        drop(object);

        assert!(!handle.is_alive());
        assert!(matches!(handle.object(), Err(BridgeError::Expired(_))));
    }

    #[test]
    fn test_with_and_with_mut() {
        let object = Rc::new(RefCell::new(5i32));
        let handle = Handle::referenced(&object, class());

        handle.with_mut(|v: &mut i32| *v += 1).unwrap();
        assert_eq!(handle.with(|v: &i32| *v).unwrap(), 6);
        assert!(matches!(
            handle.with(|_: &String| ()),
            Err(BridgeError::InvalidReceiver { .. })
        ));
    }

    #[test]
    fn test_const_refuses_mutation() {
        let object = Rc::new(RefCell::new(5i32));
        let handle = Handle::referenced_const(&object, class());
        assert!(handle.is_const());
        assert!(matches!(
            handle.with_mut(|v: &mut i32| *v += 1),
            Err(BridgeError::ConstViolation(_))
        ));
        assert_eq!(*object.borrow(), 5);
    }

    #[test]
    fn test_heap_generations() {
        let mut heap = HandleHeap::new();
        let first = heap.alloc(Handle::owned(1i32, class()));
        assert!(heap.contains(first));

        assert_eq!(heap.free(first), Some(Finalization::Destroyed));
        assert!(!heap.contains(first));
        assert_eq!(heap.free(first), None);

        let second = heap.alloc(Handle::owned(2i32, class()));
        assert_eq!(second.index(), first.index());
        assert!(heap.get(first).is_none());
        assert!(heap.get(second).unwrap().is::<i32>());
    }

    #[test]
    fn test_sweep_keeps_reachable() {
        let drops = Rc::new(Cell::new(0));
        let mut heap = HandleHeap::new();
        let kept = heap.alloc(Handle::owned(Probe { drops: drops.clone() }, class()));
        let _lost = heap.alloc(Handle::owned(Probe { drops: drops.clone() }, class()));

        assert_eq!(heap.sweep([kept]), 1);
        assert_eq!(drops.get(), 1);
        assert_eq!(heap.live_count(), 1);

        assert_eq!(heap.sweep([kept]), 0);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_heap_drop_finalizes_remaining() {
        let drops = Rc::new(Cell::new(0));
        let mut heap = HandleHeap::new();
        heap.alloc(Handle::owned(Probe { drops: drops.clone() }, class()));
        drop(heap);
        assert_eq!(drops.get(), 1);
    }
}
