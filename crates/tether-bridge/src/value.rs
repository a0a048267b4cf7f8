//! Script-side values as they sit in host stack slots
//!
//! # Variants
//!
//! ```text
//! Nil / Boolean / Integer / Number / String   plain data, copied across the boundary
//! Function(Rc<Callable>)                      a native callable left on the stack
//! Userdata(HandleRef)                         proxy for a native object (see handle.rs)
//! Class(ClassId)                              proxy for a class table (static access)
//! ```
//!
//! Cloning a value is cheap: strings and callables are reference-counted,
//! handles and classes are plain ids.

use std::fmt;
use std::rc::Rc;

use crate::callable::Callable;
use crate::dispatch::ClassId;
use crate::handle::HandleRef;

/// A value in a host stack slot
#[derive(Clone, Default)]
pub enum Value {
    /// Absent / empty
    #[default]
    Nil,
    /// Boolean
    Boolean(bool),
    /// 64-bit integer
    Integer(i64),
    /// 64-bit float
    Number(f64),
    /// Immutable string
    String(Rc<str>),
    /// Native callable
    Function(Rc<Callable>),
    /// Handle to a native object
    Userdata(HandleRef),
    /// Class table, used for static member access
    Class(ClassId),
}

/// Runtime kind of a [`Value`], used for type checks and error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `nil`
    Nil,
    /// `boolean`
    Boolean,
    /// `integer`
    Integer,
    /// `number`
    Number,
    /// `string`
    String,
    /// `function`
    Function,
    /// `userdata`
    Userdata,
    /// `table`
    Table,
}

impl ValueKind {
    /// Script-facing name of the kind
    pub const fn name(self) -> &'static str {
        match self {
            ValueKind::Nil => "nil",
            ValueKind::Boolean => "boolean",
            ValueKind::Integer => "integer",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Function => "function",
            ValueKind::Userdata => "userdata",
            ValueKind::Table => "table",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// Create a string value
    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    /// Wrap a callable
    pub fn function(callable: Callable) -> Self {
        Value::Function(Rc::new(callable))
    }

    // ========================================================================
    // Type checks
    // ========================================================================

    /// Kind of this value
    pub const fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Integer(_) => ValueKind::Integer,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Function(_) => ValueKind::Function,
            Value::Userdata(_) => ValueKind::Userdata,
            Value::Class(_) => ValueKind::Table,
        }
    }

    /// Type name for diagnostics
    pub const fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Check if value is nil
    #[inline]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    // ========================================================================
    // Extractors
    // ========================================================================

    /// Extract boolean value
    #[inline]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract integer value.
    ///
    /// Floats with an exact integer representation are accepted.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Some(*n as i64),
            _ => None,
        }
    }

    /// Extract numeric value (integers widen to float)
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Extract string contents
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Extract the callable
    pub fn as_function(&self) -> Option<&Rc<Callable>> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Extract the handle reference
    pub const fn as_userdata(&self) -> Option<HandleRef> {
        match self {
            Value::Userdata(h) => Some(*h),
            _ => None,
        }
    }

    /// Extract the class id
    pub const fn as_class(&self) -> Option<ClassId> {
        match self {
            Value::Class(c) => Some(*c),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Integer(a), Value::Number(b)) | (Value::Number(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Userdata(a), Value::Userdata(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Value::Nil"),
            Value::Boolean(b) => write!(f, "Value::Boolean({})", b),
            Value::Integer(i) => write!(f, "Value::Integer({})", i),
            Value::Number(n) => write!(f, "Value::Number({})", n),
            Value::String(s) => write!(f, "Value::String({:?})", s),
            Value::Function(c) => write!(f, "Value::Function({})", c.kind_name()),
            Value::Userdata(h) => write!(f, "Value::Userdata({:?})", h),
            Value::Class(c) => write!(f, "Value::Class({})", c.index()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}: {:?}", other.type_name(), other),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nil_default() {
        let v = Value::default();
        assert!(v.is_nil());
        assert_eq!(v.kind(), ValueKind::Nil);
        assert_eq!(v.type_name(), "nil");
    }

    #[test]
    fn test_integer_and_number() {
        assert_eq!(Value::Integer(42).as_integer(), Some(42));
        assert_eq!(Value::Number(3.0).as_integer(), Some(3));
        assert_eq!(Value::Number(3.5).as_integer(), None);
        assert_eq!(Value::Integer(2).as_number(), Some(2.0));
        assert_eq!(Value::Integer(2), Value::Number(2.0));
    }

    #[test]
    fn test_string() {
        let v = Value::from("hello");
        assert_eq!(v.as_str(), Some("hello"));
        assert_eq!(v.kind(), ValueKind::String);
        assert_eq!(v.to_string(), "hello");
        assert_eq!(v.as_integer(), None);
    }

    #[test]
    fn test_type_discrimination() {
        let b = Value::Boolean(true);
        assert_eq!(b.as_bool(), Some(true));
        assert_eq!(b.as_number(), None);
        assert_eq!(Value::Class(ClassId::new(3)).kind(), ValueKind::Table);
        assert_eq!(ValueKind::Userdata.to_string(), "userdata");
    }

    #[test]
    fn test_debug_format() {
        let s = format!("{:?}", Value::Integer(42));
        assert!(s.contains("42"));
    }
}
