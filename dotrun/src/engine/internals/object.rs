//! `System.Object`, `System.Type`, `System.Array` and `System.Exception`
//! internal methods.
//!
//! `GetType` produces a boxed `System.Type` object carrying `_name` and
//! `_namespace` fields; the `Type` accessors read those fields back.
//! Exception objects keep their message in a `_message` field, which is
//! also what the engine's error banner reads.

use std::sync::Arc;

use crate::engine::{
    error::RuntimeError,
    internals::{arg, InternalRegistry},
    value::{CompareOp, Value},
    Engine,
};

/// Registers the object/reflection surface.
pub fn register(registry: &mut InternalRegistry) {
    registry.register("System.Object.GetType", get_type);
    registry.register("System.Object.ToString", to_string);
    registry.register("System.Object.Equals", equals);
    registry.register("System.Array.get_Length", array_length);
    registry.register("System.Exception..ctor", exception_ctor);
    registry.register("System.Exception.get_Message", exception_message);
    registry.register("System.Type.get_Name", type_name);
    registry.register("System.Type.get_FullName", type_full_name);
    registry.register("System.Type.ToString", type_full_name);
}

fn get_type(engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let (namespace, name) = match arg(args, 0)? {
        Value::Object { ty, .. } => (ty.namespace.clone(), ty.name.clone()),
        Value::Str(_) => ("System".to_string(), "String".to_string()),
        Value::Int32(_) => ("System".to_string(), "Int32".to_string()),
        Value::Int64(_) => ("System".to_string(), "Int64".to_string()),
        Value::Float32(_) => ("System".to_string(), "Single".to_string()),
        Value::Float64(_) => ("System".to_string(), "Double".to_string()),
        Value::Boolean(_) => ("System".to_string(), "Boolean".to_string()),
        Value::Array(_) => ("System".to_string(), "Array".to_string()),
        Value::IntPtr(_) => ("System".to_string(), "IntPtr".to_string()),
        Value::Type(ty) => (ty.namespace.clone(), ty.name.clone()),
        Value::Null => return Err(RuntimeError::NullReference),
        _ => ("System".to_string(), "Object".to_string()),
    };

    Ok(Some(engine.boxed_type_object(&namespace, &name)))
}

fn to_string(_engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let receiver = arg(args, 0)?;
    Ok(Some(Value::Str(receiver.to_string().into())))
}

fn equals(_engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let a = arg(args, 0)?;
    let b = arg(args, 1)?;
    Ok(Some(Value::Boolean(a.compare(b, CompareOp::Eq)?)))
}

fn array_length(engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    match arg(args, 0)? {
        Value::Array(handle) => {
            let length = engine.heap.array_len(*handle)?;
            Ok(Some(Value::Int32(length as i32)))
        }
        Value::Null => Err(RuntimeError::NullReference),
        other => Err(RuntimeError::Internal(format!(
            "get_Length receiver is not an array: {other}"
        ))),
    }
}

fn exception_ctor(engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let Value::Object { handle, .. } = arg(args, 0)? else {
        return Err(RuntimeError::Internal(
            "exception constructor without an instance".to_string(),
        ));
    };

    let message = match args.get(1) {
        Some(Value::Str(text)) => Value::Str(Arc::clone(text)),
        Some(Value::Null) | None => Value::Str("".into()),
        Some(other) => Value::Str(other.to_string().into()),
    };
    engine.heap.store_field(*handle, "_message", message)?;
    Ok(None)
}

fn exception_message(engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    match arg(args, 0)? {
        Value::Object { handle, .. } => {
            let message = engine
                .heap
                .load_field(*handle, "_message")
                .unwrap_or(Value::Str("".into()));
            Ok(Some(message))
        }
        Value::Null => Err(RuntimeError::NullReference),
        other => Err(RuntimeError::Internal(format!(
            "get_Message receiver is not an exception: {other}"
        ))),
    }
}

fn type_name(engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    read_type_field(engine, args, false)
}

fn type_full_name(engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    read_type_field(engine, args, true)
}

fn read_type_field(
    engine: &mut Engine,
    args: &[Value],
    full: bool,
) -> Result<Option<Value>, RuntimeError> {
    match arg(args, 0)? {
        Value::Object { handle, .. } => {
            let name = engine.heap.load_field(*handle, "_name")?;
            if !full {
                return Ok(Some(name));
            }
            let namespace = engine.heap.load_field(*handle, "_namespace")?;
            let text = match (&namespace, &name) {
                (Value::Str(ns), Value::Str(n)) if !ns.is_empty() => format!("{ns}.{n}"),
                (_, Value::Str(n)) => n.to_string(),
                _ => name.to_string(),
            };
            Ok(Some(Value::Str(text.into())))
        }
        Value::Type(ty) => Ok(Some(Value::Str(if full {
            ty.full_name().into()
        } else {
            ty.name.as_str().into()
        }))),
        Value::Null => Err(RuntimeError::NullReference),
        other => Err(RuntimeError::Internal(format!(
            "type accessor receiver is not a type: {other}"
        ))),
    }
}
