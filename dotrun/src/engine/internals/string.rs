//! `System.String` internal methods.
//!
//! Strings are immutable interned text in the value model; every method
//! here produces a fresh value rather than mutating. Indices follow the
//! base library's character positions.
//!
//! | Method | Behaviour |
//! |--------|-----------|
//! | `Concat(a, b[, c[, d]])` | Concatenates the textual form of each value |
//! | `Substring(start[, length])` | Slice by character position |
//! | `ToUpper()` / `ToLower()` | Case conversion |
//! | `get_Length()` | Character count |
//! | `get_Chars(i)` | Character at position, as its code point |
//! | `Equals` / `op_Equality` / `op_Inequality` | Content equality |
//! | `IndexOf(needle)` | First position of a char or substring, -1 if absent |
//! | `ToString()` | Identity |

use crate::engine::{
    error::RuntimeError,
    internals::{arg, InternalRegistry},
    value::Value,
    Engine,
};

/// Registers the string surface.
pub fn register(registry: &mut InternalRegistry) {
    registry.register("System.String.Concat", concat);
    registry.register("System.String.Substring", substring);
    registry.register("System.String.ToUpper", to_upper);
    registry.register("System.String.ToLower", to_lower);
    registry.register("System.String.get_Length", get_length);
    registry.register("System.String.get_Chars", get_chars);
    registry.register("System.String.Equals", equals);
    registry.register("System.String.op_Equality", equals);
    registry.register("System.String.op_Inequality", not_equals);
    registry.register("System.String.IndexOf", index_of);
    registry.register("System.String.ToString", to_string);
    registry.register("System.String.Contains", contains);
}

fn concat(_engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let mut text = String::new();
    for value in args {
        if !value.is_null() {
            text.push_str(&value.to_string());
        }
    }
    Ok(Some(Value::Str(text.into())))
}

fn substring(engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let text = arg(args, 0)?.as_str()?;
    let chars: Vec<char> = text.chars().collect();

    let start = arg(args, 1)?.as_i32()?;
    let length = match args.get(2) {
        Some(value) => value.as_i32()?,
        None => chars.len() as i32 - start,
    };

    if start < 0 || length < 0 || (start + length) as usize > chars.len() {
        return Err(engine.raise(
            "System",
            "ArgumentOutOfRangeException",
            "Index and length must refer to a location within the string.",
        ));
    }

    let slice: String = chars[start as usize..(start + length) as usize].iter().collect();
    Ok(Some(Value::Str(slice.into())))
}

fn to_upper(_engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let text = arg(args, 0)?.as_str()?;
    Ok(Some(Value::Str(text.to_uppercase().into())))
}

fn to_lower(_engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let text = arg(args, 0)?.as_str()?;
    Ok(Some(Value::Str(text.to_lowercase().into())))
}

fn get_length(_engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let text = arg(args, 0)?.as_str()?;
    Ok(Some(Value::Int32(text.chars().count() as i32)))
}

fn get_chars(engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let text = arg(args, 0)?.as_str()?;
    let index = arg(args, 1)?.as_i32()?;

    match usize::try_from(index).ok().and_then(|i| text.chars().nth(i)) {
        Some(ch) => Ok(Some(Value::Int32(ch as i32))),
        None => Err(engine.raise(
            "System",
            "IndexOutOfRangeException",
            "Index was outside the bounds of the string.",
        )),
    }
}

fn equals(_engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    Ok(Some(Value::Boolean(content_equal(args)?)))
}

fn not_equals(_engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    Ok(Some(Value::Boolean(!content_equal(args)?)))
}

fn content_equal(args: &[Value]) -> Result<bool, RuntimeError> {
    let a = arg(args, 0)?;
    let b = arg(args, 1)?;
    Ok(match (a, b) {
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Null, Value::Null) => true,
        _ => false,
    })
}

fn index_of(_engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let text = arg(args, 0)?.as_str()?;
    let chars: Vec<char> = text.chars().collect();

    let position = match arg(args, 1)? {
        Value::Str(needle) => {
            let needle: Vec<char> = needle.chars().collect();
            if needle.is_empty() {
                Some(0)
            } else {
                chars
                    .windows(needle.len())
                    .position(|window| window == needle.as_slice())
            }
        }
        other => {
            let code = other.as_i32()?;
            chars.iter().position(|&c| c as i32 == code)
        }
    };

    Ok(Some(Value::Int32(
        position.map_or(-1, |p| p as i32),
    )))
}

fn contains(_engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let text = arg(args, 0)?.as_str()?;
    let needle = arg(args, 1)?.as_str()?;
    Ok(Some(Value::Boolean(text.contains(needle.as_ref()))))
}

fn to_string(_engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    Ok(Some(arg(args, 0)?.clone()))
}
