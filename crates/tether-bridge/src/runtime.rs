//! In-memory reference host
//!
//! [`Runtime`] implements [`HostStack`] on top of a [`Stack`], a
//! [`HandleHeap`] and a [`ClassRegistry`]. It is what the test suite runs
//! against and what an embedder without an interpreter of its own can drive
//! directly:
//!
//! ```ignore
//! let mut rt = Runtime::new();
//! let point = rt.classes_mut().register_type::<Point>("Point")?;
//! rt.classes_mut().install_property(
//!     point,
//!     Scope::Instance,
//!     "x",
//!     Callable::field_getter(|p: &Point| &p.x),
//!     Some(Callable::field_setter(|p: &mut Point| &mut p.x)),
//! )?;
//!
//! let p = rt.wrap(Point { x: 1, y: 2 })?;
//! rt.set_field(&p, "x", Value::Integer(5))?;
//! assert_eq!(rt.get_field(&p, "x")?, Value::Integer(5));
//! ```
//!
//! # Collection
//!
//! Handles are reachable while a `Userdata` value sits on the stack or in a
//! global. [`Runtime::collect_garbage`] finalizes everything else. Values an
//! embedder keeps in Rust variables are not roots; store them in a global to
//! keep them alive across a collection.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::callable::Callable;
use crate::config::{ResourceLimits, RuntimeOptions};
use crate::dispatch::ClassRegistry;
use crate::error::{BridgeError, BridgeResult};
use crate::handle::{self, Handle, HandleHeap, HandleRef};
use crate::host::HostStack;
use crate::invoke;
use crate::logging::{debug, trace};
use crate::resolver;
use crate::stack::Stack;
use crate::value::Value;

/// Reference host runtime
pub struct Runtime {
    stack: Stack,
    classes: ClassRegistry,
    heap: HandleHeap,
    globals: FxHashMap<String, Value>,
    limits: ResourceLimits,
    index: Value,
    new_index: Value,
}

impl Runtime {
    /// Create a runtime with default options
    pub fn new() -> Self {
        Self::with_options(RuntimeOptions::default())
    }

    /// Create a runtime with specific options
    pub fn with_options(options: RuntimeOptions) -> Self {
        Self {
            stack: Stack::with_limits(&options.limits),
            classes: ClassRegistry::new(),
            heap: HandleHeap::new(),
            globals: FxHashMap::default(),
            limits: options.limits,
            index: Value::function(Callable::callback(resolver::index)),
            new_index: Value::function(Callable::callback(resolver::new_index)),
        }
    }

    /// Class registry, for registration
    pub fn classes_mut(&mut self) -> &mut ClassRegistry {
        &mut self.classes
    }

    /// Resource limits
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    // ========================================================================
    // Calls and field access
    // ========================================================================

    /// Call `function` with `args` at a protected boundary and collect its results
    pub fn call(&mut self, function: &Value, args: &[Value]) -> BridgeResult<Vec<Value>> {
        let callee = self.stack.frame_len();
        self.stack.push(function.clone())?;
        for arg in args {
            if let Err(error) = self.stack.push(arg.clone()) {
                self.stack.truncate(callee);
                return Err(error);
            }
        }

        let count = self.call_back(callee, args.len())?;
        let results = self.stack.split_off(callee);
        debug_assert_eq!(results.len(), count);
        Ok(results)
    }

    /// Read a field through the `index` metamethod
    pub fn get_field(&mut self, object: &Value, key: &str) -> BridgeResult<Value> {
        let index = self.index.clone();
        let results = self.call(&index, &[object.clone(), Value::string(key)])?;
        Ok(results.into_iter().next().unwrap_or_default())
    }

    /// Write a field through the `new_index` metamethod
    pub fn set_field(&mut self, object: &Value, key: &str, value: Value) -> BridgeResult<()> {
        let new_index = self.new_index.clone();
        self.call(&new_index, &[object.clone(), Value::string(key), value])?;
        Ok(())
    }

    /// Look up `name` on `object` and call it with `object` as receiver
    pub fn call_method(&mut self, object: &Value, name: &str, args: &[Value]) -> BridgeResult<Vec<Value>> {
        let method = self.get_field(object, name)?;
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(object.clone());
        full.extend_from_slice(args);
        self.call(&method, &full)
    }

    // ========================================================================
    // Native objects
    // ========================================================================

    /// Move a native value into a new owned handle
    pub fn wrap<T: 'static>(&mut self, value: T) -> BridgeResult<Value> {
        handle::wrap_owned(self, value)
    }

    /// Expose a natively owned object by mutable reference
    pub fn wrap_ref<T: 'static>(&mut self, object: &Rc<RefCell<T>>) -> BridgeResult<Value> {
        handle::wrap_ref(self, object)
    }

    /// Expose a natively owned object by const reference
    pub fn wrap_const<T: 'static>(&mut self, object: &Rc<RefCell<T>>) -> BridgeResult<Value> {
        handle::wrap_const_ref(self, object)
    }

    /// Handle behind a proxy value
    pub fn handle_of(&self, value: &Value) -> BridgeResult<&Handle> {
        handle::unwrap_value(self, value)
    }

    // ========================================================================
    // Globals
    // ========================================================================

    /// Get a global variable (nil when unset)
    pub fn global(&self, name: &str) -> Value {
        self.globals.get(name).cloned().unwrap_or_default()
    }

    /// Set a global variable
    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    /// Remove a global variable
    pub fn remove_global(&mut self, name: &str) -> Option<Value> {
        self.globals.remove(name)
    }

    // ========================================================================
    // Collection
    // ========================================================================

    /// Finalize every handle not reachable from the stack or the globals.
    /// Returns the number of handles finalized.
    pub fn collect_garbage(&mut self) -> usize {
        let roots = self
            .stack
            .iter_values()
            .chain(self.globals.values())
            .filter_map(Value::as_userdata);
        let finalized = self.heap.sweep(roots);
        debug!(finalized, live = self.heap.live_count(), "collected handles");
        finalized
    }

    /// Number of live handles
    pub fn handle_count(&self) -> usize {
        self.heap.live_count()
    }

    /// Total number of stack slots in use
    pub fn stack_depth(&self) -> usize {
        self.stack.depth()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl HostStack for Runtime {
    fn push(&mut self, value: Value) -> BridgeResult<()> {
        self.stack.push(value)
    }

    fn read(&self, index: usize) -> Option<Value> {
        self.stack.get(index).cloned()
    }

    fn arg_count(&self) -> usize {
        self.stack.frame_len()
    }

    fn pop(&mut self, count: usize) {
        self.stack.pop(count);
    }

    fn call_back(&mut self, callee: usize, nargs: usize) -> BridgeResult<usize> {
        let callable = match self.stack.get(callee) {
            Some(Value::Function(callable)) => Rc::clone(callable),
            other => {
                let kind = other.map_or("nil", Value::type_name);
                self.stack.truncate(callee);
                return Err(BridgeError::NotCallable(kind));
            }
        };

        debug_assert_eq!(
            callee + nargs + 1,
            self.stack.frame_len(),
            "callee and arguments must be the top of the frame"
        );
        if let Err(error) = self.stack.push_frame(callee) {
            self.stack.truncate(callee);
            return Err(error);
        }
        trace!(kind = callable.kind_name(), nargs, depth = self.stack.frame_count(), "call");

        match invoke::call(&callable, self) {
            Ok(results) => Ok(self.stack.return_from_frame(results)),
            Err(error) => {
                self.stack.unwind_frame();
                Err(error)
            }
        }
    }

    fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    fn handle(&self, handle: HandleRef) -> Option<&Handle> {
        self.heap.get(handle)
    }

    fn register_handle(&mut self, handle: Handle) -> BridgeResult<HandleRef> {
        if let Some(max) = self.limits.max_handles {
            if self.heap.live_count() >= max {
                return Err(BridgeError::HandleLimit(max));
            }
        }
        trace!(
            type_name = handle.type_name(),
            ownership = ?handle.ownership(),
            "registering handle"
        );
        Ok(self.heap.alloc(handle))
    }
}
