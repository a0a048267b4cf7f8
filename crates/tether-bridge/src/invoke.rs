//! Invocation adapter: runs a [`Callable`] against the current frame.
//!
//! Free functions and functors read their parameters from slot 0. Member
//! callables find their receiver in slot 0 and their parameters from slot 1.
//! Receiver extraction:
//!
//! 1. slot 0 must hold a live handle;
//! 2. a mutating member is refused on a const handle;
//! 3. the handle's class chain must reach the bound receiver type through
//!    registered upcasts;
//! 4. the object is borrowed for the duration of the call, so re-entering
//!    the same object from a nested mutating call is an error, not aliasing.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::callable::{Callable, Receiver};
use crate::dispatch::Upcast;
use crate::error::{BridgeError, BridgeResult};
use crate::handle::{self, NativeObject};
use crate::host::HostStack;
use crate::logging::warn;

/// Run native code, turning a panic into `NativeCallFailure`
pub fn guard<R>(f: impl FnOnce() -> R) -> BridgeResult<R> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        warn!(%message, "native call panicked");
        BridgeError::NativeCallFailure(message)
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "native call panicked".to_string()
    }
}

/// Invoke `callable` on the current frame, returning the number of results
/// left on top of it.
pub fn call(callable: &Callable, host: &mut dyn HostStack) -> BridgeResult<usize> {
    match callable {
        Callable::Function(trampoline) => trampoline(host, 0),
        Callable::Functor(cell) => {
            let mut trampoline = cell
                .try_borrow_mut()
                .map_err(|_| BridgeError::Reentrant("functor"))?;
            (&mut *trampoline)(host, 0)
        }
        Callable::Method {
            receiver,
            trampoline,
        } => {
            let (object, path) = receiver_object(&*host, receiver, true)?;
            let mut borrow = object
                .try_borrow_mut()
                .map_err(|_| BridgeError::Reentrant(receiver.type_name))?;
            let mut this: &mut (dyn Any + 'static) = &mut *borrow;
            for upcast in &path {
                this = upcast
                    .apply_mut(this)
                    .ok_or_else(|| invalid_receiver(receiver, "object of another type"))?;
            }
            trampoline(this, host, 1)
        }
        Callable::ConstMethod {
            receiver,
            trampoline,
        } => {
            let (object, path) = receiver_object(&*host, receiver, false)?;
            let borrow = object
                .try_borrow()
                .map_err(|_| BridgeError::Reentrant(receiver.type_name))?;
            let mut this: &(dyn Any + 'static) = &*borrow;
            for upcast in &path {
                this = upcast
                    .apply_ref(this)
                    .ok_or_else(|| invalid_receiver(receiver, "object of another type"))?;
            }
            trampoline(this, host, 1)
        }
        Callable::Callback(callback) => callback(host),
    }
}

fn invalid_receiver(receiver: &Receiver, got: &str) -> BridgeError {
    BridgeError::InvalidReceiver {
        expected: receiver.type_name,
        got: got.to_string(),
    }
}

/// Resolve slot 0 to a strong reference to the receiver object plus the casts
/// that take it to the bound receiver type.
fn receiver_object(
    host: &dyn HostStack,
    receiver: &Receiver,
    mutating: bool,
) -> BridgeResult<(NativeObject, Vec<Upcast>)> {
    let value = host
        .read(0)
        .ok_or_else(|| invalid_receiver(receiver, "no value"))?;
    let handle = handle::unwrap_value(host, &value)
        .map_err(|_| invalid_receiver(receiver, value.type_name()))?;

    if mutating && handle.is_const() {
        return Err(BridgeError::ConstViolation(handle.type_name()));
    }

    let path = host
        .classes()
        .upcasts(handle.class(), receiver.type_id)
        .ok_or_else(|| invalid_receiver(receiver, handle.type_name()))?;
    let object = handle.object()?;
    Ok((object, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Inherits;
    use crate::runtime::Runtime;
    use crate::value::Value;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Account {
        balance: i64,
    }

    struct Savings {
        account: Account,
        rate: f64,
    }

    impl Inherits<Account> for Savings {
        fn parent(&self) -> &Account {
            &self.account
        }

        fn parent_mut(&mut self) -> &mut Account {
            &mut self.account
        }
    }

    fn runtime() -> Runtime {
        let mut rt = Runtime::new();
        let account = rt.classes_mut().register_type::<Account>("Account").unwrap();
        rt.classes_mut()
            .register_derived::<Savings, Account>("Savings", account)
            .unwrap();
        rt
    }

    fn call_value(rt: &mut Runtime, callable: Callable, args: &[Value]) -> BridgeResult<Vec<Value>> {
        rt.call(&Value::function(callable), args)
    }

    #[test]
    fn test_guard_catches_panic() {
        let result: BridgeResult<()> = guard(|| panic!("native failure"));
        assert_eq!(
            result,
            Err(BridgeError::NativeCallFailure("native failure".to_string()))
        );
        assert_eq!(guard(|| 7), Ok(7));
    }

    #[test]
    fn test_function_arguments() {
        let mut rt = runtime();
        let add = Callable::function(|a: i32, b: i32| a + b);

        let results = call_value(&mut rt, add, &[Value::Integer(2), Value::Integer(3)]).unwrap();
        assert_eq!(results, vec![Value::Integer(5)]);
    }

    #[test]
    fn test_unit_result_pushes_nothing() {
        let mut rt = runtime();
        let results = call_value(&mut rt, Callable::function(|_: i32| ()), &[Value::Integer(1)]).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_method_mutates_receiver() {
        let mut rt = runtime();
        let account = rt.wrap(Account { balance: 10 }).unwrap();
        let deposit = Callable::method(|a: &mut Account, amount: i64| {
            a.balance += amount;
            a.balance
        });

        let results = call_value(&mut rt, deposit, &[account, Value::Integer(5)]).unwrap();
        assert_eq!(results, vec![Value::Integer(15)]);
    }

    #[test]
    fn test_method_through_upcast() {
        let mut rt = runtime();
        let savings = rt
            .wrap(Savings {
                account: Account { balance: 100 },
                rate: 0.5,
            })
            .unwrap();
        let balance = Callable::const_method(|a: &Account| a.balance);
        let rate = Callable::const_method(|s: &Savings| s.rate);

        assert_eq!(
            call_value(&mut rt, balance, &[savings.clone()]).unwrap(),
            vec![Value::Integer(100)]
        );
        assert_eq!(
            call_value(&mut rt, rate, &[savings]).unwrap(),
            vec![Value::Number(0.5)]
        );
    }

    #[test]
    fn test_wrong_receiver_type() {
        let mut rt = runtime();
        let account = rt.wrap(Account { balance: 1 }).unwrap();
        let rate = Callable::const_method(|s: &Savings| s.rate);

        let err = call_value(&mut rt, rate, &[account]).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidReceiver { .. }));

        let err = call_value(
            &mut rt,
            Callable::const_method(|a: &Account| a.balance),
            &[Value::Integer(3)],
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidReceiver { .. }));
    }

    #[test]
    fn test_const_receiver_rejects_mutation() {
        let mut rt = runtime();
        let object = Rc::new(RefCell::new(Account { balance: 4 }));
        let proxy = rt.wrap_const(&object).unwrap();

        let err = call_value(
            &mut rt,
            Callable::method(|a: &mut Account| a.balance = 0),
            &[proxy.clone()],
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::ConstViolation(_)));
        assert_eq!(object.borrow().balance, 4);

        let read = call_value(&mut rt, Callable::const_method(|a: &Account| a.balance), &[proxy]);
        assert_eq!(read.unwrap(), vec![Value::Integer(4)]);
    }

    #[test]
    fn test_expired_receiver() {
        let mut rt = runtime();
        let object = Rc::new(RefCell::new(Account { balance: 4 }));
        let proxy = rt.wrap_ref(&object).unwrap();
        drop(object);

        let err = call_value(&mut rt, Callable::const_method(|a: &Account| a.balance), &[proxy]);
        assert!(matches!(err, Err(BridgeError::Expired(_))));
    }

    #[test]
    fn test_functor_keeps_state() {
        let mut rt = runtime();
        let mut total = 0i64;
        let counter = Value::function(Callable::functor(move |n: i64| {
            total += n;
            total
        }));

        rt.call(&counter, &[Value::Integer(2)]).unwrap();
        let results = rt.call(&counter, &[Value::Integer(3)]).unwrap();
        assert_eq!(results, vec![Value::Integer(5)]);
    }

    #[test]
    fn test_callback_sees_raw_frame() {
        let mut rt = runtime();
        let count = Callable::callback(|host| {
            let n = host.arg_count() as i64;
            host.push(Value::Integer(n))?;
            Ok(1)
        });

        let results = call_value(&mut rt, count, &[Value::Nil, Value::Nil, Value::Nil]).unwrap();
        assert_eq!(results, vec![Value::Integer(3)]);
    }

    #[test]
    fn test_stack_balanced_after_failure() {
        let mut rt = runtime();
        let depth = rt.stack_depth();
        let failing = Callable::function(|_: i32, _: String| -> i32 { panic!("boom") });

        let err = call_value(&mut rt, failing, &[Value::Integer(1), Value::from("s")]).unwrap_err();
        assert_eq!(err, BridgeError::NativeCallFailure("boom".to_string()));
        assert_eq!(rt.stack_depth(), depth);
    }
}
