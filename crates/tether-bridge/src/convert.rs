//! Conversion traits between script values and Rust types.
//!
//! `FromScript` reads a declared parameter out of a stack slot; `ToScript`
//! pushes a native result. The invocation adapter chains one `FromScript`
//! conversion per declared parameter, in order.
//!
//! # Example
//!
//! ```ignore
//! use tether_bridge::{FromScript, Value};
//!
//! assert_eq!(i32::from_value(&Value::Integer(7)), Some(7));
//! assert_eq!(<Option<i32>>::from_absent(), Some(None));
//! ```

use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

use crate::dispatch::ClassId;
use crate::error::{BridgeError, BridgeResult};
use crate::handle::{self, HandleRef};
use crate::host::HostStack;
use crate::value::Value;

/// Convert a stack value into a Rust parameter.
pub trait FromScript: Sized {
    /// Kind name reported when the conversion fails
    fn expected() -> &'static str;

    /// Convert a present value, `None` on type mismatch
    fn from_value(value: &Value) -> Option<Self>;

    /// Convert a missing argument. Only optional parameters accept one.
    fn from_absent() -> Option<Self> {
        None
    }
}

/// Push a Rust result onto the host stack.
pub trait ToScript {
    /// Push `self`, returning the number of slots pushed
    fn push(self, host: &mut dyn HostStack) -> BridgeResult<usize>;
}

// ============================================================================
// Integers and floats
// ============================================================================

macro_rules! impl_integer {
    ($($ty:ty),*) => {$(
        impl FromScript for $ty {
            fn expected() -> &'static str {
                "integer"
            }

            fn from_value(value: &Value) -> Option<Self> {
                value.as_integer().and_then(|i| <$ty>::try_from(i).ok())
            }
        }

        impl ToScript for $ty {
            fn push(self, host: &mut dyn HostStack) -> BridgeResult<usize> {
                host.push(Value::Integer(i64::from(self)))?;
                Ok(1)
            }
        }
    )*};
}

impl_integer!(i8, i16, i32, i64, u8, u16, u32);

impl FromScript for usize {
    fn expected() -> &'static str {
        "integer"
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_integer().and_then(|i| usize::try_from(i).ok())
    }
}

impl ToScript for usize {
    fn push(self, host: &mut dyn HostStack) -> BridgeResult<usize> {
        let value = match i64::try_from(self) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Number(self as f64),
        };
        host.push(value)?;
        Ok(1)
    }
}

impl FromScript for f64 {
    fn expected() -> &'static str {
        "number"
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_number()
    }
}

impl ToScript for f64 {
    fn push(self, host: &mut dyn HostStack) -> BridgeResult<usize> {
        host.push(Value::Number(self))?;
        Ok(1)
    }
}

impl FromScript for f32 {
    fn expected() -> &'static str {
        "number"
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_number().map(|n| n as f32)
    }
}

impl ToScript for f32 {
    fn push(self, host: &mut dyn HostStack) -> BridgeResult<usize> {
        host.push(Value::Number(f64::from(self)))?;
        Ok(1)
    }
}

// ============================================================================
// Booleans and strings
// ============================================================================

impl FromScript for bool {
    fn expected() -> &'static str {
        "boolean"
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl ToScript for bool {
    fn push(self, host: &mut dyn HostStack) -> BridgeResult<usize> {
        host.push(Value::Boolean(self))?;
        Ok(1)
    }
}

impl FromScript for String {
    fn expected() -> &'static str {
        "string"
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

impl ToScript for String {
    fn push(self, host: &mut dyn HostStack) -> BridgeResult<usize> {
        host.push(Value::String(Rc::from(self)))?;
        Ok(1)
    }
}

impl FromScript for Rc<str> {
    fn expected() -> &'static str {
        "string"
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Rc::clone(s)),
            _ => None,
        }
    }
}

impl ToScript for Rc<str> {
    fn push(self, host: &mut dyn HostStack) -> BridgeResult<usize> {
        host.push(Value::String(self))?;
        Ok(1)
    }
}

impl ToScript for &str {
    fn push(self, host: &mut dyn HostStack) -> BridgeResult<usize> {
        host.push(Value::string(self))?;
        Ok(1)
    }
}

// ============================================================================
// Values, handles and classes
// ============================================================================

impl FromScript for Value {
    fn expected() -> &'static str {
        "value"
    }

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }

    fn from_absent() -> Option<Self> {
        Some(Value::Nil)
    }
}

impl ToScript for Value {
    fn push(self, host: &mut dyn HostStack) -> BridgeResult<usize> {
        host.push(self)?;
        Ok(1)
    }
}

impl FromScript for HandleRef {
    fn expected() -> &'static str {
        "userdata"
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_userdata()
    }
}

impl ToScript for HandleRef {
    fn push(self, host: &mut dyn HostStack) -> BridgeResult<usize> {
        host.push(Value::Userdata(self))?;
        Ok(1)
    }
}

impl FromScript for ClassId {
    fn expected() -> &'static str {
        "table"
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_class()
    }
}

// ============================================================================
// Option, unit and Result
// ============================================================================

impl<T: FromScript> FromScript for Option<T> {
    fn expected() -> &'static str {
        T::expected()
    }

    fn from_value(value: &Value) -> Option<Self> {
        if value.is_nil() {
            Some(None)
        } else {
            T::from_value(value).map(Some)
        }
    }

    fn from_absent() -> Option<Self> {
        Some(None)
    }
}

impl<T: ToScript> ToScript for Option<T> {
    fn push(self, host: &mut dyn HostStack) -> BridgeResult<usize> {
        match self {
            Some(value) => value.push(host),
            None => {
                host.push(Value::Nil)?;
                Ok(1)
            }
        }
    }
}

// Unit results push nothing
impl ToScript for () {
    fn push(self, _host: &mut dyn HostStack) -> BridgeResult<usize> {
        Ok(0)
    }
}

// Fallible native functions: the error becomes a runtime error
impl<T: ToScript, E: Display> ToScript for Result<T, E> {
    fn push(self, host: &mut dyn HostStack) -> BridgeResult<usize> {
        match self {
            Ok(value) => value.push(host),
            Err(error) => Err(BridgeError::NativeCallFailure(error.to_string())),
        }
    }
}

// ============================================================================
// Native objects
// ============================================================================

/// Native object passed by value; the script side takes ownership.
pub struct Owned<T>(pub T);

/// Native object passed by mutable reference; the caller keeps ownership.
pub struct Ref<T>(pub Rc<RefCell<T>>);

/// Native object passed by const reference; the caller keeps ownership.
pub struct ConstRef<T>(pub Rc<RefCell<T>>);

impl<T: 'static> ToScript for Owned<T> {
    fn push(self, host: &mut dyn HostStack) -> BridgeResult<usize> {
        let value = handle::wrap_owned(host, self.0)?;
        host.push(value)?;
        Ok(1)
    }
}

impl<T: 'static> ToScript for Ref<T> {
    fn push(self, host: &mut dyn HostStack) -> BridgeResult<usize> {
        let value = handle::wrap_ref(host, &self.0)?;
        host.push(value)?;
        Ok(1)
    }
}

impl<T: 'static> ToScript for ConstRef<T> {
    fn push(self, host: &mut dyn HostStack) -> BridgeResult<usize> {
        let value = handle::wrap_const_ref(host, &self.0)?;
        host.push(value)?;
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_conversions() {
        assert_eq!(i32::from_value(&Value::Integer(42)), Some(42));
        assert_eq!(i32::from_value(&Value::Integer(i64::MAX)), None);
        assert_eq!(u8::from_value(&Value::Integer(-1)), None);
        assert_eq!(i64::from_value(&Value::Number(8.0)), Some(8));
        assert_eq!(i32::from_value(&Value::from("42")), None);
        assert_eq!(i32::expected(), "integer");
    }

    #[test]
    fn test_number_accepts_integer() {
        assert_eq!(f64::from_value(&Value::Integer(2)), Some(2.0));
        assert_eq!(f64::from_value(&Value::Boolean(true)), None);
    }

    #[test]
    fn test_string_is_strict() {
        assert_eq!(String::from_value(&Value::from("a")), Some("a".to_string()));
        assert_eq!(String::from_value(&Value::Integer(1)), None);
    }

    #[test]
    fn test_option_accepts_nil_and_absent() {
        assert_eq!(<Option<i32>>::from_value(&Value::Nil), Some(None));
        assert_eq!(<Option<i32>>::from_value(&Value::Integer(5)), Some(Some(5)));
        assert_eq!(<Option<i32>>::from_value(&Value::from("x")), None);
        assert_eq!(<Option<i32>>::from_absent(), Some(None));
        assert_eq!(i32::from_absent(), None);
    }

    #[test]
    fn test_value_passthrough() {
        assert_eq!(Value::from_value(&Value::Integer(1)), Some(Value::Integer(1)));
        assert_eq!(Value::from_absent(), Some(Value::Nil));
    }
}
