//! Stack-level marshalling helpers used by the trampolines and the resolver.

use crate::convert::FromScript;
use crate::error::{BridgeError, BridgeResult};
use crate::host::HostStack;
use crate::value::Value;

/// Read the declared parameter `index` from frame slot `slot`.
///
/// A missing slot is only accepted by parameters whose type has an absent
/// form (`Option<T>`, `Value`); anything else is an argument mismatch at
/// `index`, never an out-of-bounds access.
pub fn read_arg<T: FromScript>(host: &dyn HostStack, slot: usize, index: usize) -> BridgeResult<T> {
    match host.read(slot) {
        Some(value) => T::from_value(&value)
            .ok_or_else(|| BridgeError::mismatch(index, T::expected(), value.type_name())),
        None => T::from_absent().ok_or_else(|| BridgeError::mismatch(index, T::expected(), "no value")),
    }
}

/// Normalize the `got` results on top of the frame to exactly `wanted`,
/// padding with nil or dropping the surplus from the top.
pub fn adjust_results(host: &mut dyn HostStack, got: usize, wanted: usize) -> BridgeResult<()> {
    if got > wanted {
        host.pop(got - wanted);
    } else {
        for _ in got..wanted {
            host.push(Value::Nil)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    #[test]
    fn test_read_arg_converts() {
        let mut rt = Runtime::new();
        rt.push(Value::Integer(42)).unwrap();
        rt.push(Value::from("a")).unwrap();

        assert_eq!(read_arg::<i32>(&rt, 0, 0).unwrap(), 42);
        assert_eq!(read_arg::<String>(&rt, 1, 1).unwrap(), "a");
    }

    #[test]
    fn test_read_arg_mismatch_reports_index() {
        let mut rt = Runtime::new();
        rt.push(Value::from("a")).unwrap();

        let err = read_arg::<i32>(&rt, 0, 0).unwrap_err();
        assert_eq!(err, BridgeError::mismatch(0, "integer", "string"));
    }

    #[test]
    fn test_read_arg_missing_slot() {
        let rt = Runtime::new();
        let err = read_arg::<i32>(&rt, 3, 2).unwrap_err();
        assert_eq!(err, BridgeError::mismatch(2, "integer", "no value"));
        assert_eq!(read_arg::<Option<i32>>(&rt, 3, 2).unwrap(), None);
    }

    #[test]
    fn test_adjust_results_pads_and_truncates() {
        let mut rt = Runtime::new();
        adjust_results(&mut rt, 0, 1).unwrap();
        assert_eq!(rt.arg_count(), 1);
        assert!(rt.read(0).unwrap().is_nil());

        rt.push(Value::Integer(1)).unwrap();
        rt.push(Value::Integer(2)).unwrap();
        adjust_results(&mut rt, 3, 1).unwrap();
        assert_eq!(rt.arg_count(), 1);
    }
}
