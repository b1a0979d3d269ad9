//! Numeric parse and format internal methods.
//!
//! | Method | Behaviour |
//! |--------|-----------|
//! | `Int32.Parse(s)` | Decimal parse; `FormatException` on bad input |
//! | `Int32.ToString()` | Decimal text |
//! | `Int64.ToString()` | Decimal text |
//! | `Single.ToString()` / `Double.ToString()` | Shortest round-trip text |
//! | `Boolean.ToString()` | `True` / `False` |

use crate::engine::{
    error::RuntimeError,
    internals::{arg, InternalRegistry},
    value::Value,
    Engine,
};

/// Registers the numeric surface.
pub fn register(registry: &mut InternalRegistry) {
    registry.register("System.Int32.Parse", int32_parse);
    registry.register("System.Int32.ToString", value_to_string);
    registry.register("System.Int64.ToString", value_to_string);
    registry.register("System.Single.ToString", value_to_string);
    registry.register("System.Double.ToString", value_to_string);
    registry.register("System.Boolean.ToString", value_to_string);
}

fn int32_parse(engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let text = arg(args, 0)?.as_str()?;

    match text.trim().parse::<i32>() {
        Ok(value) => Ok(Some(Value::Int32(value))),
        Err(_) => Err(engine.raise(
            "System",
            "FormatException",
            "Input string was not in a correct format.",
        )),
    }
}

fn value_to_string(_engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let receiver = arg(args, 0)?;
    Ok(Some(Value::Str(receiver.to_string().into())))
}
