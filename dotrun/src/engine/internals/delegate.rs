//! Delegate construction and invocation.
//!
//! Delegate types declare their `.ctor(object, native int)` and `Invoke`
//! as runtime-provided; since every delegate type carries its own name,
//! the two are dispatched by method name (see
//! [`super::runtime_fallback`]) instead of per-type registrations.
//!
//! A constructed delegate is an ordinary heap object with two fields:
//! `_target` (the bound receiver, null for static methods) and `_method`
//! (the method descriptor, unwrapped from the boxed `System.IntPtr` that
//! `ldftn` pushes).

use crate::engine::{
    error::RuntimeError,
    internals::arg,
    value::Value,
    Engine,
};

/// `.ctor(object target, native int method)` on a fresh delegate object.
pub fn construct(engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let Value::Object { handle, .. } = arg(args, 0)? else {
        return Err(RuntimeError::Internal(
            "delegate constructor without an instance".to_string(),
        ));
    };
    let target = arg(args, 1)?.clone();
    let pointer = arg(args, 2)?;

    let method = match pointer {
        // ldftn wraps the descriptor in a boxed System.IntPtr
        Value::Object { handle: ptr, .. } => engine.heap.load_field(*ptr, "PtrToMethod")?,
        Value::MethodPtr(m) => Value::MethodPtr(m.clone()),
        other => {
            return Err(RuntimeError::Internal(format!(
                "delegate constructor expected a method pointer, found {other}"
            )))
        }
    };

    engine.heap.store_field(*handle, "_target", target)?;
    engine.heap.store_field(*handle, "_method", method)?;
    Ok(None)
}

/// `Invoke(...)` on a constructed delegate: re-enters the interpreter.
pub fn invoke(engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let Value::Object { handle, .. } = arg(args, 0)? else {
        return Err(RuntimeError::Internal(
            "delegate invocation without an instance".to_string(),
        ));
    };

    let Value::MethodPtr(method) = engine.heap.load_field(*handle, "_method")? else {
        return Err(RuntimeError::Internal(
            "delegate has no bound method".to_string(),
        ));
    };

    let target = engine.heap.load_field(*handle, "_target")?;
    let receiver = if target.is_null() { None } else { Some(target) };

    engine.call_method(&method, receiver, args[1..].to_vec())
}
