//! The resolved type system: immutable descriptors for types, fields and
//! methods, plus the symbolic sites (`CallSite`, `FieldSite`, `TypeSite`)
//! that instruction operands carry.
//!
//! Descriptors are produced once by the image loader and never mutated
//! afterwards; they are shared via [`Arc`], and two descriptors of the same
//! underlying entity are pointer-equal. The execution engine relies on both
//! properties: values hold `Arc<TypeDesc>` directly, and the resolver
//! compares descriptors by identity.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use bitflags::bitflags;

use crate::{
    disassembler::MethodBody,
    metadata::{signatures::{ElemKind, MethodSig}, token::Token},
};

bitflags! {
    /// `TypeAttributes` bitmask (ECMA-335 II.23.1.15), reduced to the bits
    /// the interpreter inspects.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeAttributes: u32 {
        /// The type is an interface.
        const INTERFACE = 0x0000_0020;
        /// The type is abstract.
        const ABSTRACT = 0x0000_0080;
        /// The type is sealed.
        const SEALED = 0x0000_0100;
    }
}

bitflags! {
    /// `MethodAttributes` bitmask (ECMA-335 II.23.1.10), reduced.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodAttributes: u16 {
        /// The method is static.
        const STATIC = 0x0010;
        /// The method is virtual.
        const VIRTUAL = 0x0040;
        /// The method hides by name+sig.
        const HIDE_BY_SIG = 0x0080;
        /// The method is abstract.
        const ABSTRACT = 0x0400;
        /// Special name (`.ctor`, `.cctor`, accessors).
        const SPECIAL_NAME = 0x0800;
    }
}

bitflags! {
    /// `MethodImplAttributes` bitmask (ECMA-335 II.23.1.11), reduced.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodImplAttributes: u16 {
        /// Code-type mask; value 3 means runtime-provided.
        const CODE_TYPE_MASK = 0x0003;
        /// The body is provided by the runtime.
        const RUNTIME = 0x0003;
        /// The body is an internal call into the host.
        const INTERNAL_CALL = 0x1000;
    }
}

/// Immutable descriptor of a field.
#[derive(Debug)]
pub struct FieldDesc {
    /// Field name.
    pub name: String,
    /// Zero-based position within the declaring type's field list.
    pub ordinal: usize,
    /// Decoded signature kind.
    pub kind: ElemKind,
}

/// Immutable descriptor of a method.
///
/// The body slot is populated by the image loader for methods with an RVA;
/// extern and runtime-provided methods leave it empty.
#[derive(Debug)]
pub struct MethodDesc {
    /// Metadata token of the method row.
    pub token: Token,
    /// Method name (`Main`, `.ctor`, `.cctor`, ...).
    pub name: String,
    /// Namespace of the declaring type.
    pub declaring_namespace: String,
    /// Simple name of the declaring type.
    pub declaring_name: String,
    /// Decoded signature.
    pub sig: MethodSig,
    /// Canonical rendering of the signature, cached for resolver matching.
    pub sig_string: String,
    /// RVA of the body; 0 for extern/runtime methods.
    pub rva: u32,
    /// First row of the method's param run (disambiguates overloads).
    pub param_list: u32,
    /// `MethodAttributes` of the row.
    pub attributes: MethodAttributes,
    /// `MethodImplAttributes` of the row.
    pub impl_attributes: MethodImplAttributes,
    /// Decoded body, set once during load.
    pub body: OnceLock<Arc<MethodBody>>,
}

impl MethodDesc {
    /// Returns the full name of the declaring type.
    #[must_use]
    pub fn declaring_full_name(&self) -> String {
        full_name(&self.declaring_namespace, &self.declaring_name)
    }

    /// Returns `true` if the method is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.attributes.contains(MethodAttributes::STATIC)
    }

    /// Returns `true` if the body is an internal call into the host.
    #[must_use]
    pub fn is_internal_call(&self) -> bool {
        self.impl_attributes
            .contains(MethodImplAttributes::INTERNAL_CALL)
    }

    /// Returns `true` if the body is provided by the runtime.
    #[must_use]
    pub fn is_runtime_impl(&self) -> bool {
        self.impl_attributes & MethodImplAttributes::CODE_TYPE_MASK
            == MethodImplAttributes::RUNTIME
    }

    /// Returns the declared parameter count (excluding `this`).
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.sig.param_count()
    }

    /// Returns the decoded body, if one was loaded.
    #[must_use]
    pub fn body(&self) -> Option<&Arc<MethodBody>> {
        self.body.get()
    }
}

impl fmt::Display for MethodDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.declaring_full_name(), self.name, self.sig_string)
    }
}

/// Immutable descriptor of a type.
#[derive(Debug)]
pub struct TypeDesc {
    /// Metadata token of the type row.
    pub token: Token,
    /// Namespace, possibly empty.
    pub namespace: String,
    /// Simple name.
    pub name: String,
    /// `TypeAttributes` of the row.
    pub attributes: TypeAttributes,
    /// Simple name of the owning assembly.
    pub assembly: String,
    /// Fields in declaration order.
    pub fields: Vec<Arc<FieldDesc>>,
    /// Methods in declaration order.
    pub methods: Vec<Arc<MethodDesc>>,
}

impl TypeDesc {
    /// Returns `Namespace.Name`, or just `Name` for the empty namespace.
    #[must_use]
    pub fn full_name(&self) -> String {
        full_name(&self.namespace, &self.name)
    }

    /// Returns `true` if the type is an interface.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.attributes.contains(TypeAttributes::INTERFACE)
    }

    /// Finds a method by name and signature string.
    #[must_use]
    pub fn method(&self, name: &str, sig_string: &str) -> Option<&Arc<MethodDesc>> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.sig_string == sig_string)
    }

    /// Finds a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Arc<FieldDesc>> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Creates a synthetic descriptor for a runtime-provided type such as
    /// `System.IntPtr` or `System.RuntimeTypeHandle`.
    ///
    /// Synthetic types carry no metadata token, no members and belong to no
    /// assembly; they exist so heap objects always have a declared type.
    #[must_use]
    pub fn synthetic(namespace: &str, name: &str) -> Arc<TypeDesc> {
        Arc::new(TypeDesc {
            token: Token::new(0),
            namespace: namespace.to_string(),
            name: name.to_string(),
            attributes: TypeAttributes::empty(),
            assembly: String::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        })
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

fn full_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

/// The symbolic operand of a `call`/`callvirt`/`newobj` instruction.
///
/// A call site describes the intended target without naming a concrete
/// descriptor; the resolver turns it into one against the set of loaded
/// assemblies.
#[derive(Debug, Clone)]
pub struct CallSite {
    /// Namespace of the target's declaring type.
    pub namespace: String,
    /// Simple name of the target's declaring type.
    pub type_name: String,
    /// Target method name.
    pub method_name: String,
    /// Decoded signature of the target.
    pub sig: MethodSig,
    /// Canonical signature string (resolver comparison key).
    pub sig_string: String,
    /// RVA when the site names a method of the current image, else 0.
    pub rva: u32,
    /// Param-list index when the site names a method of the current image.
    pub param_list: Option<u32>,
}

impl CallSite {
    /// Returns the full name of the declaring type.
    #[must_use]
    pub fn type_full_name(&self) -> String {
        full_name(&self.namespace, &self.type_name)
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} {}",
            self.type_full_name(),
            self.method_name,
            self.sig_string
        )
    }
}

/// The symbolic operand of a field access instruction.
#[derive(Debug, Clone)]
pub struct FieldSite {
    /// Full name of the declaring type.
    pub type_full_name: String,
    /// Field name.
    pub name: String,
}

impl fmt::Display for FieldSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.type_full_name, self.name)
    }
}

/// The symbolic operand of a type-referencing instruction
/// (`ldtoken`, `newarr`, `castclass`, ...).
#[derive(Debug, Clone)]
pub struct TypeSite {
    /// Namespace, possibly empty.
    pub namespace: String,
    /// Simple name.
    pub name: String,
}

impl TypeSite {
    /// Returns `Namespace.Name`, or just `Name` for the empty namespace.
    #[must_use]
    pub fn full_name(&self) -> String {
        full_name(&self.namespace, &self.name)
    }
}

impl fmt::Display for TypeSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_names() {
        let site = TypeSite {
            namespace: "System".to_string(),
            name: "Console".to_string(),
        };
        assert_eq!(site.full_name(), "System.Console");

        let global = TypeSite {
            namespace: String::new(),
            name: "Program".to_string(),
        };
        assert_eq!(global.full_name(), "Program");
    }

    #[test]
    fn synthetic_types_are_empty() {
        let ty = TypeDesc::synthetic("System", "IntPtr");
        assert_eq!(ty.full_name(), "System.IntPtr");
        assert!(ty.fields.is_empty());
        assert!(ty.token.is_null());
    }

    #[test]
    fn impl_attribute_decoding() {
        let runtime = MethodImplAttributes::from_bits_truncate(0x0003);
        assert_eq!(
            runtime & MethodImplAttributes::CODE_TYPE_MASK,
            MethodImplAttributes::RUNTIME
        );

        let internal = MethodImplAttributes::from_bits_truncate(0x1000);
        assert!(internal.contains(MethodImplAttributes::INTERNAL_CALL));
    }
}
