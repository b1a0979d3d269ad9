//! Signature blob decoding (ECMA-335 II.23.2).
//!
//! Field, method and local-variable signatures are stored as compressed
//! binary blobs in the `#Blob` heap. This module decodes them into
//! [`ElemKind`] trees and [`MethodSig`] summaries. The element set is
//! closed: generics, function pointers and custom modifiers beyond
//! skip-over are rejected as [`crate::Error::NotSupported`] rather than
//! guessed at.

use std::fmt;

use crate::{file::parser::Parser, metadata::token::Token, Error::NotSupported, Result};

// Element type constants (ECMA-335 II.23.1.16)
const ELEMENT_TYPE_VOID: u8 = 0x01;
const ELEMENT_TYPE_BOOLEAN: u8 = 0x02;
const ELEMENT_TYPE_CHAR: u8 = 0x03;
const ELEMENT_TYPE_I1: u8 = 0x04;
const ELEMENT_TYPE_U1: u8 = 0x05;
const ELEMENT_TYPE_I2: u8 = 0x06;
const ELEMENT_TYPE_U2: u8 = 0x07;
const ELEMENT_TYPE_I4: u8 = 0x08;
const ELEMENT_TYPE_U4: u8 = 0x09;
const ELEMENT_TYPE_I8: u8 = 0x0A;
const ELEMENT_TYPE_U8: u8 = 0x0B;
const ELEMENT_TYPE_R4: u8 = 0x0C;
const ELEMENT_TYPE_R8: u8 = 0x0D;
const ELEMENT_TYPE_STRING: u8 = 0x0E;
const ELEMENT_TYPE_PTR: u8 = 0x0F;
const ELEMENT_TYPE_BYREF: u8 = 0x10;
const ELEMENT_TYPE_VALUETYPE: u8 = 0x11;
const ELEMENT_TYPE_CLASS: u8 = 0x12;
const ELEMENT_TYPE_SZARRAY: u8 = 0x1D;
const ELEMENT_TYPE_I: u8 = 0x18;
const ELEMENT_TYPE_U: u8 = 0x19;
const ELEMENT_TYPE_OBJECT: u8 = 0x1C;
const ELEMENT_TYPE_CMOD_REQD: u8 = 0x1F;
const ELEMENT_TYPE_CMOD_OPT: u8 = 0x20;
const ELEMENT_TYPE_PINNED: u8 = 0x45;

// Calling convention masks (II.23.2.1)
const SIG_HASTHIS: u8 = 0x20;
const SIG_GENERIC: u8 = 0x10;
const SIG_FIELD: u8 = 0x06;
const SIG_LOCALS: u8 = 0x07;

/// The kind tag produced by decoding one type position of a signature.
///
/// This is the closed element set the interpreter supports. Small integer
/// kinds are kept distinct here (the metadata needs them for display and
/// defaulting) even though they widen to `Int32` on the evaluation stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElemKind {
    /// `void` (return positions only).
    Void,
    /// `bool`.
    Boolean,
    /// `char` (UTF-16 code unit).
    Char,
    /// `int8` / `uint8`.
    I1,
    /// `uint8`.
    U1,
    /// `int16`.
    I2,
    /// `uint16`.
    U2,
    /// `int32`.
    I4,
    /// `uint32`.
    U4,
    /// `int64`.
    I8,
    /// `uint64`.
    U8,
    /// `float32`.
    R4,
    /// `float64`.
    R8,
    /// `string`.
    String,
    /// `object`.
    Object,
    /// Native-sized integer.
    I,
    /// Native-sized unsigned integer.
    U,
    /// A class reference; the token targets TypeDef or TypeRef.
    Class(Token),
    /// A value type; the token targets TypeDef or TypeRef.
    ValueType(Token),
    /// Single-dimensional, zero-based array of the element kind.
    SzArray(Box<ElemKind>),
    /// Managed pointer to the element kind (`ref`/`out`).
    ByRef(Box<ElemKind>),
    /// Unmanaged pointer to the element kind.
    Ptr(Box<ElemKind>),
}

impl ElemKind {
    /// Returns `true` for kinds stored as references (default `null`).
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            ElemKind::String
                | ElemKind::Object
                | ElemKind::Class(_)
                | ElemKind::SzArray(_)
                | ElemKind::ByRef(_)
        )
    }
}

impl fmt::Display for ElemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElemKind::Void => write!(f, "void"),
            ElemKind::Boolean => write!(f, "bool"),
            ElemKind::Char => write!(f, "char"),
            ElemKind::I1 => write!(f, "int8"),
            ElemKind::U1 => write!(f, "uint8"),
            ElemKind::I2 => write!(f, "int16"),
            ElemKind::U2 => write!(f, "uint16"),
            ElemKind::I4 => write!(f, "int32"),
            ElemKind::U4 => write!(f, "uint32"),
            ElemKind::I8 => write!(f, "int64"),
            ElemKind::U8 => write!(f, "uint64"),
            ElemKind::R4 => write!(f, "float32"),
            ElemKind::R8 => write!(f, "float64"),
            ElemKind::String => write!(f, "string"),
            ElemKind::Object => write!(f, "object"),
            ElemKind::I => write!(f, "native int"),
            ElemKind::U => write!(f, "native uint"),
            ElemKind::Class(_) => write!(f, "class"),
            ElemKind::ValueType(_) => write!(f, "valuetype"),
            ElemKind::SzArray(inner) => write!(f, "{inner}[]"),
            ElemKind::ByRef(inner) => write!(f, "{inner}&"),
            ElemKind::Ptr(inner) => write!(f, "{inner}*"),
        }
    }
}

/// A decoded method signature.
///
/// The rendered form (via [`fmt::Display`]) is the canonical signature
/// string the method resolver compares: two signatures match if and only if
/// their rendered forms are equal. Class and value-type positions render
/// without their token so that a `TypeRef` in the caller matches the
/// `TypeDef` in the callee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSig {
    /// `true` when the method has an implicit `this` parameter.
    pub has_this: bool,
    /// Parameter kinds in declaration order.
    pub params: Vec<ElemKind>,
    /// Return kind; [`ElemKind::Void`] when nothing is returned.
    pub ret: ElemKind,
}

impl MethodSig {
    /// Returns `true` if the method produces a value.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        self.ret != ElemKind::Void
    }

    /// Returns the declared parameter count (excluding `this`).
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_this {
            write!(f, "instance ")?;
        }
        write!(f, "{}(", self.ret)?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                write!(f, ",")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ")")
    }
}

/// Decodes one type position, including custom-modifier skip-over.
fn parse_elem(parser: &mut Parser<'_>) -> Result<ElemKind> {
    let mut element = parser.read_le::<u8>()?;

    // Custom modifiers and `pinned` wrap the real element; skip them
    while element == ELEMENT_TYPE_CMOD_REQD
        || element == ELEMENT_TYPE_CMOD_OPT
        || element == ELEMENT_TYPE_PINNED
    {
        if element != ELEMENT_TYPE_PINNED {
            let _modifier = parser.read_compressed_u32()?;
        }
        element = parser.read_le::<u8>()?;
    }

    Ok(match element {
        ELEMENT_TYPE_VOID => ElemKind::Void,
        ELEMENT_TYPE_BOOLEAN => ElemKind::Boolean,
        ELEMENT_TYPE_CHAR => ElemKind::Char,
        ELEMENT_TYPE_I1 => ElemKind::I1,
        ELEMENT_TYPE_U1 => ElemKind::U1,
        ELEMENT_TYPE_I2 => ElemKind::I2,
        ELEMENT_TYPE_U2 => ElemKind::U2,
        ELEMENT_TYPE_I4 => ElemKind::I4,
        ELEMENT_TYPE_U4 => ElemKind::U4,
        ELEMENT_TYPE_I8 => ElemKind::I8,
        ELEMENT_TYPE_U8 => ElemKind::U8,
        ELEMENT_TYPE_R4 => ElemKind::R4,
        ELEMENT_TYPE_R8 => ElemKind::R8,
        ELEMENT_TYPE_STRING => ElemKind::String,
        ELEMENT_TYPE_OBJECT => ElemKind::Object,
        ELEMENT_TYPE_I => ElemKind::I,
        ELEMENT_TYPE_U => ElemKind::U,
        ELEMENT_TYPE_CLASS => ElemKind::Class(decode_type_def_or_ref(parser)?),
        ELEMENT_TYPE_VALUETYPE => ElemKind::ValueType(decode_type_def_or_ref(parser)?),
        ELEMENT_TYPE_SZARRAY => ElemKind::SzArray(Box::new(parse_elem(parser)?)),
        ELEMENT_TYPE_BYREF => ElemKind::ByRef(Box::new(parse_elem(parser)?)),
        ELEMENT_TYPE_PTR => ElemKind::Ptr(Box::new(parse_elem(parser)?)),
        _ => return Err(NotSupported),
    })
}

/// Decodes a `TypeDefOrRefEncoded` compressed token (II.23.2.8).
fn decode_type_def_or_ref(parser: &mut Parser<'_>) -> Result<Token> {
    let encoded = parser.read_compressed_u32()?;
    let row = encoded >> 2;
    let table = match encoded & 0x3 {
        0 => 0x02,
        1 => 0x01,
        2 => 0x1B,
        _ => return Err(NotSupported),
    };
    Ok(Token::from_parts(table, row))
}

/// Parses a field signature blob (prolog 0x06).
///
/// # Errors
///
/// Returns a malformed error for a wrong prolog, [`NotSupported`] for
/// elements outside the supported set.
pub fn parse_field_sig(blob: &[u8]) -> Result<ElemKind> {
    let mut parser = Parser::new(blob);
    let prolog = parser.read_le::<u8>()?;
    if prolog & 0x0F != SIG_FIELD {
        return Err(malformed_error!(
            "Field signature has prolog 0x{:02X}",
            prolog
        ));
    }
    parse_elem(&mut parser)
}

/// Parses a method signature blob (MethodDefSig / MethodRefSig).
///
/// # Errors
///
/// Returns [`NotSupported`] for generic or vararg signatures and for
/// elements outside the supported set.
pub fn parse_method_sig(blob: &[u8]) -> Result<MethodSig> {
    let mut parser = Parser::new(blob);
    let conv = parser.read_le::<u8>()?;

    if conv & SIG_GENERIC != 0 {
        return Err(NotSupported);
    }
    if conv & 0x0F == 0x05 {
        // vararg
        return Err(NotSupported);
    }

    let has_this = conv & SIG_HASTHIS != 0;
    let param_count = parser.read_compressed_u32()? as usize;
    let ret = parse_elem(&mut parser)?;

    let mut params = Vec::with_capacity(param_count);
    for _ in 0..param_count {
        params.push(parse_elem(&mut parser)?);
    }

    Ok(MethodSig {
        has_this,
        params,
        ret,
    })
}

/// Parses a local-variable signature blob (prolog 0x07).
///
/// # Errors
///
/// Returns a malformed error for a wrong prolog, [`NotSupported`] for
/// elements outside the supported set.
pub fn parse_locals_sig(blob: &[u8]) -> Result<Vec<ElemKind>> {
    let mut parser = Parser::new(blob);
    let prolog = parser.read_le::<u8>()?;
    if prolog != SIG_LOCALS {
        return Err(malformed_error!(
            "Locals signature has prolog 0x{:02X}",
            prolog
        ));
    }

    let count = parser.read_compressed_u32()? as usize;
    let mut locals = Vec::with_capacity(count);
    for _ in 0..count {
        locals.push(parse_elem(&mut parser)?);
    }
    Ok(locals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_method_sig() {
        // static void Main(string[] args): default conv, 1 param, void ret, szarray string
        let blob = [0x00, 0x01, 0x01, 0x1D, 0x0E];
        let sig = parse_method_sig(&blob).unwrap();
        assert!(!sig.has_this);
        assert!(!sig.returns_value());
        assert_eq!(sig.params, vec![ElemKind::SzArray(Box::new(ElemKind::String))]);
        assert_eq!(sig.to_string(), "void(string[])");
    }

    #[test]
    fn instance_method_sig() {
        // instance int32 (int32, int32)
        let blob = [0x20, 0x02, 0x08, 0x08, 0x08];
        let sig = parse_method_sig(&blob).unwrap();
        assert!(sig.has_this);
        assert_eq!(sig.param_count(), 2);
        assert_eq!(sig.to_string(), "instance int32(int32,int32)");
    }

    #[test]
    fn class_positions_render_tokenless() {
        // instance void (class TypeRef#2)
        let blob = [0x20, 0x01, 0x01, 0x12, 0x09];
        let sig = parse_method_sig(&blob).unwrap();
        assert_eq!(sig.params[0], ElemKind::Class(Token::from_parts(0x01, 2)));
        assert_eq!(sig.to_string(), "instance void(class)");
    }

    #[test]
    fn field_sig() {
        let blob = [0x06, 0x08];
        assert_eq!(parse_field_sig(&blob).unwrap(), ElemKind::I4);

        let string_field = [0x06, 0x0E];
        assert_eq!(parse_field_sig(&string_field).unwrap(), ElemKind::String);
    }

    #[test]
    fn locals_sig() {
        let blob = [0x07, 0x02, 0x08, 0x0E];
        let locals = parse_locals_sig(&blob).unwrap();
        assert_eq!(locals, vec![ElemKind::I4, ElemKind::String]);
    }

    #[test]
    fn generic_rejected() {
        let blob = [0x10, 0x01, 0x01, 0x01, 0x08];
        assert!(parse_method_sig(&blob).is_err());
    }
}
