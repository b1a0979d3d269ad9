//! `System.Console` internal methods.
//!
//! Output goes through the engine's owned writer (the host's stdout by
//! default), which is what makes console programs assertable in tests.
//!
//! | Method | Behaviour |
//! |--------|-----------|
//! | `Console.WriteLine()` | Writes a newline |
//! | `Console.WriteLine(x)` | Writes the value's text and a newline |
//! | `Console.Write(x)` | Writes the value's text |
//! | `Console.ReadLine()` | Reads one line; null at end of input |

use crate::engine::{error::RuntimeError, value::Value, Engine, internals::InternalRegistry};

/// Registers the console surface.
pub fn register(registry: &mut InternalRegistry) {
    registry.register("System.Console.WriteLine", write_line);
    registry.register("System.Console.Write", write);
    registry.register("System.Console.ReadLine", read_line);
}

fn write_line(engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let text = args.first().map(ToString::to_string).unwrap_or_default();
    emit(engine, &text)?;
    emit(engine, "\n")?;
    Ok(None)
}

fn write(engine: &mut Engine, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let text = args.first().map(ToString::to_string).unwrap_or_default();
    emit(engine, &text)?;
    Ok(None)
}

fn read_line(engine: &mut Engine, _args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let mut line = String::new();
    let read = engine
        .input
        .read_line(&mut line)
        .map_err(|e| RuntimeError::Internal(format!("stdin read failed: {e}")))?;

    if read == 0 {
        return Ok(Some(Value::Null));
    }
    let trimmed = line.trim_end_matches(['\n', '\r']);
    Ok(Some(Value::Str(trimmed.into())))
}

fn emit(engine: &mut Engine, text: &str) -> Result<(), RuntimeError> {
    use std::io::Write;

    write!(engine.out, "{text}")
        .and_then(|()| engine.out.flush())
        .map_err(|e| RuntimeError::Internal(format!("stdout write failed: {e}")))
}
