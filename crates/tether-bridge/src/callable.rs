//! Native callables
//!
//! A [`Callable`] is what a dispatch table stores and what a `Function` value
//! carries. Each variant owns a trampoline: a type-erased closure that reads
//! its declared parameters from the frame, runs the native code under the
//! panic guard and pushes the result.
//!
//! ```text
//! Function     Fn(A0..An) -> R               args from slot 0
//! Functor      FnMut(A0..An) -> R            args from slot 0, captured mutable state
//! Method       Fn(&mut T, A0..An) -> R       receiver in slot 0, args from slot 1
//! ConstMethod  Fn(&T, A0..An) -> R           same, callable through const proxies
//! Callback     Fn(&mut dyn HostStack)        raw frame access, no marshalling
//! ```
//!
//! Trampolines for arities 0 through 6 are generated by `impl_arities!`.
//!
//! # Example
//!
//! ```ignore
//! let add = Callable::function(|a: i32, b: i32| a + b);
//! let grow = Callable::method(|p: &mut Point, by: f64| p.scale(by));
//! let len = Callable::const_method(|p: &Point| p.length());
//! ```

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::convert::{FromScript, ToScript};
use crate::error::{BridgeError, BridgeResult};
use crate::host::HostStack;
use crate::invoke;
use crate::marshal::read_arg;

/// Free-function trampoline: `(host, first argument slot) -> results pushed`
pub type Trampoline = dyn Fn(&mut dyn HostStack, usize) -> BridgeResult<usize>;

/// Stateful trampoline
pub type FunctorTrampoline = RefCell<dyn FnMut(&mut dyn HostStack, usize) -> BridgeResult<usize>>;

/// Member trampoline over a type-erased mutable receiver
pub type MethodTrampoline =
    dyn Fn(&mut (dyn Any + 'static), &mut dyn HostStack, usize) -> BridgeResult<usize>;

/// Member trampoline over a type-erased shared receiver
pub type ConstMethodTrampoline =
    dyn Fn(&(dyn Any + 'static), &mut dyn HostStack, usize) -> BridgeResult<usize>;

/// Raw stack callback
pub type RawCallback = dyn Fn(&mut dyn HostStack) -> BridgeResult<usize>;

/// Native type a member callable is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receiver {
    /// Type identity checked against the handle
    pub type_id: TypeId,
    /// Type name for errors
    pub type_name: &'static str,
}

impl Receiver {
    /// Receiver descriptor for `T`
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }
}

/// A native callable with its trampoline
pub enum Callable {
    /// Stateless free function
    Function(Box<Trampoline>),
    /// Callable object with mutable captured state
    Functor(Box<FunctorTrampoline>),
    /// Member function taking `&mut T`
    Method {
        /// Bound receiver type
        receiver: Receiver,
        /// Trampoline
        trampoline: Box<MethodTrampoline>,
    },
    /// Member function taking `&T`
    ConstMethod {
        /// Bound receiver type
        receiver: Receiver,
        /// Trampoline
        trampoline: Box<ConstMethodTrampoline>,
    },
    /// Native callback with raw frame access
    Callback(Box<RawCallback>),
}

impl Callable {
    /// Wrap a free function
    pub fn function<Args, F: IntoFunction<Args>>(f: F) -> Self {
        Callable::Function(f.into_trampoline())
    }

    /// Wrap a callable object with mutable state
    pub fn functor<Args, F: IntoFunctor<Args>>(f: F) -> Self {
        Callable::Functor(f.into_trampoline())
    }

    /// Wrap a member function taking `&mut T`
    pub fn method<T: 'static, Args, F: IntoMethod<T, Args>>(f: F) -> Self {
        Callable::Method {
            receiver: Receiver::of::<T>(),
            trampoline: f.into_trampoline(),
        }
    }

    /// Wrap a member function taking `&T`
    pub fn const_method<T: 'static, Args, F: IntoConstMethod<T, Args>>(f: F) -> Self {
        Callable::ConstMethod {
            receiver: Receiver::of::<T>(),
            trampoline: f.into_trampoline(),
        }
    }

    /// Wrap a raw stack callback. The frame is passed through untouched and the
    /// callback returns how many values it left on top.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&mut dyn HostStack) -> BridgeResult<usize> + 'static,
    {
        Callable::Callback(Box::new(f))
    }

    /// Raw callback bound to a mutable receiver; slot 0 of the frame is the receiver
    pub fn member_callback<T, F>(f: F) -> Self
    where
        T: 'static,
        F: Fn(&mut T, &mut dyn HostStack) -> BridgeResult<usize> + 'static,
    {
        Callable::Method {
            receiver: Receiver::of::<T>(),
            trampoline: Box::new(
                move |object: &mut (dyn Any + 'static), host: &mut dyn HostStack, _base: usize| {
                    let this = downcast_mut::<T>(object)?;
                    invoke::guard(|| f(this, host))?
                },
            ),
        }
    }

    /// Raw callback bound to a shared receiver
    pub fn const_member_callback<T, F>(f: F) -> Self
    where
        T: 'static,
        F: Fn(&T, &mut dyn HostStack) -> BridgeResult<usize> + 'static,
    {
        Callable::ConstMethod {
            receiver: Receiver::of::<T>(),
            trampoline: Box::new(
                move |object: &(dyn Any + 'static), host: &mut dyn HostStack, _base: usize| {
                    let this = downcast_ref::<T>(object)?;
                    invoke::guard(|| f(this, host))?
                },
            ),
        }
    }

    // ========================================================================
    // Property accessors
    // ========================================================================

    /// Getter over a data member, e.g. `Callable::field_getter(|p: &Point| &p.x)`
    pub fn field_getter<T, V, G>(get: G) -> Self
    where
        T: 'static,
        V: Clone + ToScript + 'static,
        G: Fn(&T) -> &V + 'static,
    {
        Callable::const_method(move |this: &T| get(this).clone())
    }

    /// Setter over a data member, e.g. `Callable::field_setter(|p: &mut Point| &mut p.x)`
    pub fn field_setter<T, V, S>(access: S) -> Self
    where
        T: 'static,
        V: FromScript + 'static,
        S: Fn(&mut T) -> &mut V + 'static,
    {
        Callable::method(move |this: &mut T, value: V| {
            *access(this) = value;
        })
    }

    /// Getter over a shared variable cell (static or global scope)
    pub fn variable_getter<V>(cell: Rc<RefCell<V>>) -> Self
    where
        V: Clone + ToScript + 'static,
    {
        Callable::Function(Box::new(move |host: &mut dyn HostStack, _base: usize| {
            let value = cell
                .try_borrow()
                .map_err(|_| BridgeError::Reentrant(std::any::type_name::<V>()))?
                .clone();
            value.push(host)
        }))
    }

    /// Setter over a shared variable cell
    pub fn variable_setter<V>(cell: Rc<RefCell<V>>) -> Self
    where
        V: FromScript + 'static,
    {
        Callable::Function(Box::new(move |host: &mut dyn HostStack, base: usize| {
            let value = read_arg::<V>(&*host, base, 0)?;
            *cell
                .try_borrow_mut()
                .map_err(|_| BridgeError::Reentrant(std::any::type_name::<V>()))? = value;
            Ok(0)
        }))
    }

    /// Synthetic setter for read-only properties
    pub fn read_only(symbol: &str) -> Self {
        let symbol = symbol.to_string();
        Callable::callback(move |_host| Err(BridgeError::ReadOnly(symbol.clone())))
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Variant name for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Callable::Function(_) => "function",
            Callable::Functor(_) => "functor",
            Callable::Method { .. } => "method",
            Callable::ConstMethod { .. } => "const method",
            Callable::Callback(_) => "callback",
        }
    }

    /// Receiver type of member variants
    pub fn receiver(&self) -> Option<&Receiver> {
        match self {
            Callable::Method { receiver, .. } | Callable::ConstMethod { receiver, .. } => Some(receiver),
            _ => None,
        }
    }

    /// Whether the callable may be reached through a const proxy
    pub fn is_const_safe(&self) -> bool {
        !matches!(self, Callable::Method { .. })
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.receiver() {
            Some(receiver) => write!(f, "Callable::{}<{}>", self.kind_name(), receiver.type_name),
            None => write!(f, "Callable::{}", self.kind_name()),
        }
    }
}

fn downcast_mut<'a, T: 'static>(object: &'a mut (dyn Any + 'static)) -> BridgeResult<&'a mut T> {
    object.downcast_mut::<T>().ok_or(BridgeError::InvalidReceiver {
        expected: std::any::type_name::<T>(),
        got: "object of another type".to_string(),
    })
}

fn downcast_ref<'a, T: 'static>(object: &'a (dyn Any + 'static)) -> BridgeResult<&'a T> {
    object.downcast_ref::<T>().ok_or(BridgeError::InvalidReceiver {
        expected: std::any::type_name::<T>(),
        got: "object of another type".to_string(),
    })
}

// ============================================================================
// Trampoline generation
// ============================================================================

/// Rust functions usable as [`Callable::Function`]
pub trait IntoFunction<Args> {
    /// Build the trampoline
    fn into_trampoline(self) -> Box<Trampoline>;
}

/// Rust closures usable as [`Callable::Functor`]
pub trait IntoFunctor<Args> {
    /// Build the trampoline
    fn into_trampoline(self) -> Box<FunctorTrampoline>;
}

/// Rust functions usable as [`Callable::Method`] on `T`
pub trait IntoMethod<T, Args> {
    /// Build the trampoline
    fn into_trampoline(self) -> Box<MethodTrampoline>;
}

/// Rust functions usable as [`Callable::ConstMethod`] on `T`
pub trait IntoConstMethod<T, Args> {
    /// Build the trampoline
    fn into_trampoline(self) -> Box<ConstMethodTrampoline>;
}

// Parameters are read in declaration order, so the first bad or missing
// argument is the one reported.
macro_rules! impl_arities {
    ($($A:ident => $i:tt),*) => {
        impl<F, R, $($A,)*> IntoFunction<($($A,)*)> for F
        where
            F: Fn($($A),*) -> R + 'static,
            R: ToScript,
            $($A: FromScript,)*
        {
            #[allow(non_snake_case, unused_variables)]
            fn into_trampoline(self) -> Box<Trampoline> {
                Box::new(move |host: &mut dyn HostStack, base: usize| {
                    $(let $A = read_arg::<$A>(&*host, base + $i, $i)?;)*
                    let result = invoke::guard(|| (self)($($A),*))?;
                    result.push(host)
                })
            }
        }

        impl<F, R, $($A,)*> IntoFunctor<($($A,)*)> for F
        where
            F: FnMut($($A),*) -> R + 'static,
            R: ToScript,
            $($A: FromScript,)*
        {
            #[allow(non_snake_case, unused_variables)]
            fn into_trampoline(mut self) -> Box<FunctorTrampoline> {
                Box::new(RefCell::new(move |host: &mut dyn HostStack, base: usize| {
                    $(let $A = read_arg::<$A>(&*host, base + $i, $i)?;)*
                    let result = invoke::guard(|| (self)($($A),*))?;
                    result.push(host)
                }))
            }
        }

        impl<F, R, T, $($A,)*> IntoMethod<T, ($($A,)*)> for F
        where
            F: Fn(&mut T, $($A),*) -> R + 'static,
            T: 'static,
            R: ToScript,
            $($A: FromScript,)*
        {
            #[allow(non_snake_case, unused_variables)]
            fn into_trampoline(self) -> Box<MethodTrampoline> {
                Box::new(
                    move |object: &mut (dyn Any + 'static), host: &mut dyn HostStack, base: usize| {
                        $(let $A = read_arg::<$A>(&*host, base + $i, $i)?;)*
                        let this = downcast_mut::<T>(object)?;
                        let result = invoke::guard(|| (self)(this, $($A),*))?;
                        result.push(host)
                    },
                )
            }
        }

        impl<F, R, T, $($A,)*> IntoConstMethod<T, ($($A,)*)> for F
        where
            F: Fn(&T, $($A),*) -> R + 'static,
            T: 'static,
            R: ToScript,
            $($A: FromScript,)*
        {
            #[allow(non_snake_case, unused_variables)]
            fn into_trampoline(self) -> Box<ConstMethodTrampoline> {
                Box::new(
                    move |object: &(dyn Any + 'static), host: &mut dyn HostStack, base: usize| {
                        $(let $A = read_arg::<$A>(&*host, base + $i, $i)?;)*
                        let this = downcast_ref::<T>(object)?;
                        let result = invoke::guard(|| (self)(this, $($A),*))?;
                        result.push(host)
                    },
                )
            }
        }
    };
}

impl_arities!();
impl_arities!(A0 => 0);
impl_arities!(A0 => 0, A1 => 1);
impl_arities!(A0 => 0, A1 => 1, A2 => 2);
impl_arities!(A0 => 0, A1 => 1, A2 => 2, A3 => 3);
impl_arities!(A0 => 0, A1 => 1, A2 => 2, A3 => 3, A4 => 4);
impl_arities!(A0 => 0, A1 => 1, A2 => 2, A3 => 3, A4 => 4, A5 => 5);
