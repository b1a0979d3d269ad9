//! Runtime (CLR-tier) errors.
//!
//! These are the failures that surface while *executing* loaded code, as
//! opposed to the loading/decoding failures in [`crate::Error`]. Every
//! variant maps to the short kind string that appears in the engine's
//! error banner; managed exceptions raised by `throw` carry the thrown
//! object so catch handlers can receive it.

use thiserror::Error;

use crate::engine::value::Value;

/// An error raised during managed execution.
///
/// All runtime errors are fatal to the current run unless a try/catch
/// region in an active frame handles them; recovery is never local to an
/// instruction.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The main assembly has no entry point.
    #[error("the assembly does not define an entry point")]
    EntryPointNotFound,

    /// A call site did not resolve against the loaded assemblies.
    #[error("could not resolve {name} with signature {sig}")]
    MethodNotFound {
        /// Fully qualified name of the requested method.
        name: String,
        /// Canonical signature string of the request.
        sig: String,
    },

    /// A null reference was dereferenced.
    #[error("object reference not set to an instance of an object")]
    NullReference,

    /// Integer division by zero or a related arithmetic fault.
    #[error("{0}")]
    Arithmetic(String),

    /// A cast or type expectation failed.
    #[error("{0}")]
    InvalidCast(String),

    /// An array was indexed outside its bounds.
    #[error("index {index} is outside the bounds of the array (length {length})")]
    IndexOutOfRange {
        /// The offending index.
        index: i64,
        /// The array length.
        length: usize,
    },

    /// An engine-level invariant failed: stack underflow, an unsupported
    /// opcode, a type mismatch on a primitive operand, a missing field or
    /// a missing internal method.
    #[error("{0}")]
    Internal(String),

    /// A managed exception raised by `throw` (or rethrown by the engine on
    /// behalf of an internal method).
    #[error("{message}")]
    Managed {
        /// The thrown exception object.
        exception: Value,
        /// The exception's `_message` field, if present.
        message: String,
        /// Full name of the exception's declared type.
        type_name: String,
    },
}

impl RuntimeError {
    /// Returns the short kind string used in the error banner.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            RuntimeError::EntryPointNotFound => "EntryPointNotFoundException",
            RuntimeError::MethodNotFound { .. } => "MethodNotFound",
            RuntimeError::NullReference => "NullReferenceException",
            RuntimeError::Arithmetic(_) => "ArithmeticError",
            RuntimeError::InvalidCast(_) => "InvalidCast",
            RuntimeError::IndexOutOfRange { .. } => "IndexOutOfRange",
            RuntimeError::Internal(_) => "Internal",
            RuntimeError::Managed { type_name, .. } => type_name,
        }
    }
}
