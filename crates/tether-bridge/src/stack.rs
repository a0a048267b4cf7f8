//! Value stack and call frames for the reference host
//!
//! # Memory Layout
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ Frame N (current)                   │
//! │   arg₁                    slot 1    │
//! │   arg₀ / receiver         slot 0    │  ← base
//! ├─────────────────────────────────────┤
//! │   callee                            │  ← base - 1
//! │ Frame N-1                           │
//! │   ...                               │
//! └─────────────────────────────────────┘
//! ```
//!
//! Slot indices handed out through [`crate::HostStack`] are relative to the
//! current frame's base. Returning from a frame moves its top results down
//! to the callee slot and drops everything above them.

use crate::config::ResourceLimits;
use crate::error::{BridgeError, BridgeResult};
use crate::value::Value;

/// Activation record for one native call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    /// Absolute index of slot 0
    pub base: usize,
}

impl CallFrame {
    /// Absolute index of the callee slot
    #[inline]
    pub fn callee(&self) -> usize {
        self.base - 1
    }
}

/// Value stack with call frames
#[derive(Debug, Default)]
pub struct Stack {
    slots: Vec<Value>,
    frames: Vec<CallFrame>,
    max_slots: Option<usize>,
    max_frames: Option<usize>,
}

impl Stack {
    /// Create an unlimited stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stack honoring the slot and call depth limits
    pub fn with_limits(limits: &ResourceLimits) -> Self {
        Self {
            slots: Vec::with_capacity(64),
            frames: Vec::with_capacity(16),
            max_slots: limits.max_stack_slots,
            max_frames: limits.max_call_depth,
        }
    }

    // ========================================================================
    // Slot Operations
    // ========================================================================

    /// Absolute index of the current frame's slot 0
    #[inline]
    pub fn base(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.base)
    }

    /// Push a value onto the current frame
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::StackOverflow` if the slot limit is reached.
    pub fn push(&mut self, value: Value) -> BridgeResult<()> {
        if self.max_slots.is_some_and(|max| self.slots.len() >= max) {
            return Err(BridgeError::StackOverflow);
        }
        self.slots.push(value);
        Ok(())
    }

    /// Pop up to `count` values, never below the current frame's base
    pub fn pop(&mut self, count: usize) {
        let keep = self.slots.len().saturating_sub(count).max(self.base());
        self.slots.truncate(keep);
    }

    /// Value at frame-relative `index`
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.slots.get(self.base() + index)
    }

    /// Number of slots in the current frame
    #[inline]
    pub fn frame_len(&self) -> usize {
        self.slots.len() - self.base()
    }

    /// Shrink the current frame to `len` slots
    pub fn truncate(&mut self, len: usize) {
        self.slots.truncate(self.base() + len);
    }

    /// Remove and return the current frame's slots from `index` up
    pub fn split_off(&mut self, index: usize) -> Vec<Value> {
        let at = (self.base() + index).min(self.slots.len());
        self.slots.split_off(at)
    }

    /// Total number of slots in use
    #[inline]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Check if stack is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    // ========================================================================
    // Call Frame Management
    // ========================================================================

    /// Open a frame whose callee sits at frame-relative `callee`.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::StackOverflow` if the call depth limit is reached.
    pub fn push_frame(&mut self, callee: usize) -> BridgeResult<()> {
        if self.max_frames.is_some_and(|max| self.frames.len() >= max) {
            return Err(BridgeError::StackOverflow);
        }
        let base = self.base() + callee + 1;
        self.frames.push(CallFrame { base });
        Ok(())
    }

    /// Close the current frame, keeping its top `results` values.
    ///
    /// The results replace the callee slot and everything above it. Returns
    /// how many were kept, which is less than `results` only if the frame
    /// held fewer values.
    pub fn return_from_frame(&mut self, results: usize) -> usize {
        let Some(frame) = self.frames.pop() else {
            return 0;
        };
        let top = self.slots.len();
        let kept = results.min(top.saturating_sub(frame.base));
        self.slots.drain(frame.callee()..top - kept);
        kept
    }

    /// Close the current frame after an error, dropping the callee and the frame
    pub fn unwind_frame(&mut self) {
        if let Some(frame) = self.frames.pop() {
            self.slots.truncate(frame.callee());
        }
    }

    /// Number of active frames
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    // ========================================================================
    // GC Root Integration
    // ========================================================================

    /// Iterate over all values on the stack (for GC)
    pub fn iter_values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.slots.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================
