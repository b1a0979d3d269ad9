//! The internal-method registry: the host-implemented base library.
//!
//! Methods marked `InternalCall` or runtime-provided in metadata have no
//! CIL body; the engine maps them to host callbacks registered here under
//! canonical names:
//!
//! - internal calls: `Namespace.Type.Method` (e.g. `System.Console.WriteLine`)
//! - runtime-provided: `Namespace_Type.Method_impl` (dots of the declaring
//!   type become underscores)
//!
//! The same registry also stands in for assemblies that exist only as
//! internal methods: a call site that resolves nowhere is retried against
//! the `Namespace.Type.Method` key before it becomes an error.
//!
//! Callbacks receive the receiver (when the method has one) followed by
//! the parameters, all left-to-right, and must not retain references to
//! the caller's stack beyond their own invocation - the `fn` pointer type
//! enforces that statelessness. They may allocate on the engine's heap
//! and may fail with a runtime error, which the interpreter treats as a
//! thrown exception.

mod console;
mod delegate;
mod number;
mod object;
mod string;

use rustc_hash::FxHashMap;

use crate::{
    engine::{error::RuntimeError, value::Value, Engine},
    metadata::typesystem::MethodDesc,
};

/// A host callback implementing one base-library method.
///
/// Receives the argument slice (receiver first when present) and returns
/// the method's value, or `None` for `void`.
pub type InternalFn = fn(&mut Engine, &[Value]) -> Result<Option<Value>, RuntimeError>;

/// Registry of internal methods by canonical name.
#[derive(Default)]
pub struct InternalRegistry {
    map: FxHashMap<String, InternalFn>,
}

impl InternalRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        InternalRegistry::default()
    }

    /// Binds a canonical name to a callback; the last registration wins.
    pub fn register(&mut self, canonical: &str, callback: InternalFn) {
        self.map.insert(canonical.to_string(), callback);
    }

    /// Looks up a callback by canonical name.
    #[must_use]
    pub fn lookup(&self, canonical: &str) -> Option<InternalFn> {
        self.map.get(canonical).copied()
    }

    /// Returns `true` if the canonical name is registered.
    #[must_use]
    pub fn contains(&self, canonical: &str) -> bool {
        self.map.contains_key(canonical)
    }

    /// Returns the number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Registers the complete base-library surface.
pub fn register_all(registry: &mut InternalRegistry) {
    console::register(registry);
    string::register(registry);
    number::register(registry);
    object::register(registry);
}

/// Computes the canonical registry name for a metadata method.
#[must_use]
pub fn canonical_name(method: &MethodDesc) -> String {
    let declaring = method.declaring_full_name();
    if method.is_runtime_impl() {
        format!("{}.{}_impl", declaring.replace('.', "_"), method.name)
    } else {
        format!("{declaring}.{}", method.name)
    }
}

/// Fallback for runtime-provided methods with no registered name.
///
/// Delegate types declare their `.ctor` and `Invoke` as runtime-provided,
/// and every delegate type has its own canonical name; rather than
/// registering per type, the two are recognized here by method name.
#[must_use]
pub fn runtime_fallback(method: &MethodDesc) -> Option<InternalFn> {
    match method.name.as_str() {
        ".ctor" => Some(delegate::construct),
        "Invoke" => Some(delegate::invoke),
        _ => None,
    }
}

/// Reads a required argument.
pub(crate) fn arg<'a>(args: &'a [Value], index: usize) -> Result<&'a Value, RuntimeError> {
    args.get(index).ok_or_else(|| {
        RuntimeError::Internal(format!("internal method expected argument {index}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        signatures::{ElemKind, MethodSig},
        token::Token,
        typesystem::{MethodAttributes, MethodImplAttributes},
    };
    use std::sync::OnceLock;

    fn method(name: &str, impl_attrs: MethodImplAttributes) -> MethodDesc {
        let sig = MethodSig {
            has_this: true,
            params: Vec::new(),
            ret: ElemKind::Void,
        };
        let sig_string = sig.to_string();
        MethodDesc {
            token: Token::new(0x06000001),
            name: name.to_string(),
            declaring_namespace: "System.Text".to_string(),
            declaring_name: "Builder".to_string(),
            sig,
            sig_string,
            rva: 0,
            param_list: 0,
            attributes: MethodAttributes::empty(),
            impl_attributes: impl_attrs,
            body: OnceLock::new(),
        }
    }

    #[test]
    fn canonical_names() {
        let internal = method("Append", MethodImplAttributes::INTERNAL_CALL);
        assert_eq!(canonical_name(&internal), "System.Text.Builder.Append");

        let runtime = method("Invoke", MethodImplAttributes::RUNTIME);
        assert_eq!(canonical_name(&runtime), "System_Text_Builder.Invoke_impl");
    }

    #[test]
    fn default_registrations_present() {
        let mut registry = InternalRegistry::new();
        register_all(&mut registry);

        for name in [
            "System.Console.WriteLine",
            "System.Console.Write",
            "System.String.Concat",
            "System.String.Substring",
            "System.Int32.Parse",
            "System.Object.GetType",
            "System.Exception.get_Message",
        ] {
            assert!(registry.contains(name), "missing {name}");
        }
        assert!(!registry.contains("System.Console.Beep"));
    }
}
