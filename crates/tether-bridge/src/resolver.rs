//! Field resolution over dispatch table chains
//!
//! [`index`] and [`new_index`] are the two metamethods a host installs on
//! every proxy. Both run as raw callbacks on a frame the host prepared:
//!
//! ```text
//! index      [proxy, symbol]          -> 1 result
//! new_index  [proxy, symbol, value]   -> 0 results
//! ```
//!
//! Reading walks the chain and checks methods before getters at each level.
//! A miss anywhere reads as nil. Writing walks the setter tables and a miss
//! is an error.
//!
//! The pure lookups [`lookup_read`] and [`lookup_write`] are exposed on their
//! own and report how many tables they touched.

use std::rc::Rc;

use crate::callable::Callable;
use crate::dispatch::{ClassId, ClassRegistry, View};
use crate::error::{BridgeError, BridgeResult};
use crate::handle;
use crate::host::HostStack;
use crate::logging::trace;
use crate::marshal::adjust_results;
use crate::value::Value;

/// What a field read found
#[derive(Debug, Clone)]
pub enum ReadMember {
    /// A method, returned to the caller uninvoked
    Method(Rc<Callable>),
    /// A property getter, invoked with the proxy as receiver
    Getter(Rc<Callable>),
    /// Nothing in the whole chain
    Absent,
}

/// Outcome of [`lookup_read`]
#[derive(Debug, Clone)]
pub struct ReadLookup {
    /// Member found
    pub member: ReadMember,
    /// Tables inspected, including the one that matched
    pub tables_visited: usize,
}

/// What a field write found
#[derive(Debug, Clone)]
pub enum WriteMember {
    /// The setter to invoke
    Setter(Rc<Callable>),
    /// The view has no setter table (const proxies)
    NoSetterTable,
    /// Every setter table in the chain was searched
    Exhausted,
}

/// Outcome of [`lookup_write`]
#[derive(Debug, Clone)]
pub struct WriteLookup {
    /// Member found
    pub member: WriteMember,
    /// Tables inspected
    pub tables_visited: usize,
}

/// Resolve a read of `symbol` starting at `class`
pub fn lookup_read(registry: &ClassRegistry, class: ClassId, view: View, symbol: &str) -> ReadLookup {
    let mut tables_visited = 0;
    for table in registry.chain(class) {
        tables_visited += 1;
        if let Some(method) = table.method(view, symbol) {
            trace!(symbol, class = table.name(), depth = tables_visited, "resolved method");
            return ReadLookup {
                member: ReadMember::Method(Rc::clone(method)),
                tables_visited,
            };
        }
        if let Some(getter) = table.getter(view, symbol) {
            trace!(symbol, class = table.name(), depth = tables_visited, "resolved getter");
            return ReadLookup {
                member: ReadMember::Getter(Rc::clone(getter)),
                tables_visited,
            };
        }
    }

    trace!(symbol, depth = tables_visited, "absent");
    ReadLookup {
        member: ReadMember::Absent,
        tables_visited,
    }
}

/// Resolve a write of `symbol` starting at `class`
pub fn lookup_write(registry: &ClassRegistry, class: ClassId, view: View, symbol: &str) -> WriteLookup {
    let mut tables_visited = 0;
    for table in registry.chain(class) {
        tables_visited += 1;
        let Some(setters) = table.setters(view) else {
            return WriteLookup {
                member: WriteMember::NoSetterTable,
                tables_visited,
            };
        };
        if let Some(setter) = setters.setter(symbol) {
            return WriteLookup {
                member: WriteMember::Setter(Rc::clone(setter)),
                tables_visited,
            };
        }
    }

    WriteLookup {
        member: WriteMember::Exhausted,
        tables_visited,
    }
}

/// Class and view a proxy resolves through
fn target(host: &dyn HostStack, proxy: &Value) -> BridgeResult<(ClassId, View)> {
    match proxy {
        Value::Userdata(_) => {
            let handle = handle::unwrap_value(host, proxy)?;
            let view = if handle.is_const() {
                View::Const
            } else {
                View::Instance
            };
            Ok((handle.class(), view))
        }
        Value::Class(class) => Ok((*class, View::Static)),
        other => Err(BridgeError::NotIndexable(other.type_name())),
    }
}

/// Field read metamethod. Frame: `[proxy, symbol]`.
///
/// Leaves exactly one value on top: the method, the getter's first result,
/// or nil.
pub fn index(host: &mut dyn HostStack) -> BridgeResult<usize> {
    let proxy = host.read(0).unwrap_or_default();
    let (class, view) = target(&*host, &proxy)?;
    let symbol = match host.read(1) {
        Some(Value::String(symbol)) => symbol,
        _ => {
            host.push(Value::Nil)?;
            return Ok(1);
        }
    };

    match lookup_read(host.classes(), class, view, &symbol).member {
        ReadMember::Method(method) => host.push(Value::Function(method))?,
        ReadMember::Getter(getter) => {
            let callee = host.arg_count();
            host.push(Value::Function(getter))?;
            let nargs = if view == View::Static {
                0
            } else {
                host.push(proxy)?;
                1
            };
            let got = host.call_back(callee, nargs)?;
            adjust_results(host, got, 1)?;
        }
        ReadMember::Absent => host.push(Value::Nil)?,
    }
    Ok(1)
}

/// Field write metamethod. Frame: `[proxy, symbol, value]`.
///
/// # Errors
///
/// - `NoSuchMember` through a view without setters
/// - `NotWritable` when no table in the chain has a setter for the symbol
/// - whatever the setter raises (`ReadOnly` for read-only properties)
pub fn new_index(host: &mut dyn HostStack) -> BridgeResult<usize> {
    let proxy = host.read(0).unwrap_or_default();
    let (class, view) = target(&*host, &proxy)?;
    let symbol: Rc<str> = match host.read(1) {
        Some(Value::String(symbol)) => symbol,
        Some(other) => Rc::from(other.to_string()),
        None => Rc::from("nil"),
    };
    let value = host.read(2).unwrap_or_default();

    match lookup_write(host.classes(), class, view, &symbol).member {
        WriteMember::Setter(setter) => {
            let callee = host.arg_count();
            host.push(Value::Function(setter))?;
            let mut nargs = 1;
            if view != View::Static {
                host.push(proxy)?;
                nargs += 1;
            }
            host.push(value)?;
            let got = host.call_back(callee, nargs)?;
            host.pop(got);
            Ok(0)
        }
        WriteMember::NoSetterTable => Err(BridgeError::NoSuchMember(symbol.to_string())),
        WriteMember::Exhausted => Err(BridgeError::NotWritable(symbol.to_string())),
    }
}
