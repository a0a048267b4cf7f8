//! HostStack trait: the runtime stack operations the bridge consumes
//!
//! The scripting runtime implements this trait; the resolver, the invocation
//! adapter and the marshalling helpers program against it and never see the
//! interpreter's internals. [`crate::Runtime`] is the in-memory implementation
//! used by the test suite and by embedders without a runtime of their own.
//!
//! # Indexing
//!
//! Slot indices are relative to the current call frame: slot 0 is the first
//! value the caller passed. For member callables that is the receiver.
//!
//! # Errors
//!
//! Raising a runtime error is expressed by returning `Err(BridgeError)`.
//! `call_back` unwinds the callee's frame before handing the error back, so
//! the stack is balanced on both paths.

use crate::dispatch::ClassRegistry;
use crate::error::BridgeResult;
use crate::handle::{Handle, HandleRef};
use crate::value::{Value, ValueKind};

/// Abstract host runtime stack.
pub trait HostStack {
    // ========================================================================
    // Stack access
    // ========================================================================

    /// Push a value on top of the current frame
    fn push(&mut self, value: Value) -> BridgeResult<()>;

    /// Read the value in slot `index` of the current frame
    fn read(&self, index: usize) -> Option<Value>;

    /// Number of slots in the current frame
    fn arg_count(&self) -> usize;

    /// Pop up to `count` values from the top of the current frame
    fn pop(&mut self, count: usize);

    /// Check the kind of slot `index`
    fn type_check(&self, index: usize, kind: ValueKind) -> bool {
        self.read(index).is_some_and(|v| v.kind() == kind)
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Call the function in slot `callee` with the `nargs` values above it.
    ///
    /// The function and its arguments must be the top `nargs + 1` slots. On
    /// success they are replaced by the results, starting at `callee`, and the
    /// number of results is returned. On failure the stack is truncated to
    /// `callee` and the error is propagated.
    fn call_back(&mut self, callee: usize, nargs: usize) -> BridgeResult<usize>;

    // ========================================================================
    // Native objects
    // ========================================================================

    /// Class tables known to this host
    fn classes(&self) -> &ClassRegistry;

    /// Resolve a handle reference; `None` once the handle has been finalized
    fn handle(&self, handle: HandleRef) -> Option<&Handle>;

    /// Hand a handle to the collector. The collector finalizes it once the
    /// returned reference is no longer reachable.
    fn register_handle(&mut self, handle: Handle) -> BridgeResult<HandleRef>;
}
