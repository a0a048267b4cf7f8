//! Tether - native object bridge for an embedded stack-based scripting runtime
//!
//! Exposes Rust types, functions and data members to a dynamic runtime through
//! metatable-style dispatch: a field name on a proxy resolves to a method, a
//! property getter or a property setter, walking a single-inheritance chain of
//! dispatch tables when the symbol is not found locally.
//!
//! # Layers
//!
//! - [`value`], [`convert`], [`marshal`]: values in stack slots and typed conversion
//! - [`handle`]: handles wrapping native objects, with ownership and constness
//! - [`dispatch`]: dispatch tables and the class registry
//! - [`resolver`]: the `index` / `new_index` metamethods
//! - [`callable`], [`invoke`]: native callables and their trampolines
//! - [`runtime`]: an in-memory host implementing [`HostStack`]
//!
//! # Example
//!
//! ```ignore
//! use tether_bridge::{Callable, Runtime, Scope, Value};
//!
//! struct Counter { hits: i64 }
//!
//! let mut rt = Runtime::new();
//! let counter = rt.classes_mut().register_type::<Counter>("Counter")?;
//! rt.classes_mut().install_method(
//!     counter,
//!     Scope::Instance,
//!     "hit",
//!     Callable::method(|c: &mut Counter, by: i64| { c.hits += by; c.hits }),
//! )?;
//!
//! let c = rt.wrap(Counter { hits: 0 })?;
//! assert_eq!(rt.call_method(&c, "hit", &[Value::Integer(2)])?, vec![Value::Integer(2)]);
//! ```

#![warn(missing_docs)]

pub(crate) mod logging;

pub mod callable;
pub mod config;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod handle;
pub mod host;
pub mod invoke;
pub mod marshal;
pub mod resolver;
pub mod runtime;
pub mod stack;
pub mod value;

pub use callable::{Callable, IntoConstMethod, IntoFunction, IntoFunctor, IntoMethod, Receiver};
pub use config::{ResourceLimits, RuntimeOptions};
pub use convert::{ConstRef, FromScript, Owned, Ref, ToScript};
pub use dispatch::{ClassId, ClassRegistry, DispatchTable, Inherits, MemberSet, Scope, View};
pub use error::{BridgeError, BridgeResult};
pub use handle::{Finalization, Handle, HandleHeap, HandleRef, Ownership};
pub use host::HostStack;
pub use resolver::{index, lookup_read, lookup_write, new_index, ReadLookup, ReadMember, WriteLookup, WriteMember};
pub use runtime::Runtime;
pub use value::{Value, ValueKind};
