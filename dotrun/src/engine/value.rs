//! The tagged runtime value.
//!
//! Every value the engine touches - evaluation-stack slots, locals,
//! arguments, object fields, array elements, statics - is a [`Value`].
//! Reference kinds hold stable integer handles into the engine's stores,
//! never pointers, so copying a value never duplicates a heap entity.
//!
//! Arithmetic, comparison and conversion are closed over the kind set and
//! pattern-match exhaustively; there is no open extension point.

use std::{fmt, sync::Arc};

use crate::{
    engine::error::RuntimeError,
    metadata::{
        signatures::ElemKind,
        typesystem::{MethodDesc, TypeDesc},
    },
};

/// Binary operations over two [`Value`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division (integer division faults on zero, floats follow IEEE-754).
    Div,
    /// Remainder.
    Rem,
    /// Bitwise AND (32-bit integers only).
    And,
    /// Bitwise OR (32-bit integers only).
    Or,
    /// Bitwise XOR (32-bit integers only).
    Xor,
    /// Left shift (32-bit integers only).
    Shl,
    /// Arithmetic right shift (32-bit integers only).
    Shr,
    /// Logical right shift (32-bit integers only).
    ShrUn,
}

/// Unary operations over one [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Bitwise complement (32-bit integers only).
    Not,
}

/// Comparison operations; the unsigned forms reinterpret integer bit
/// patterns and use unordered semantics for floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal (unordered for floats).
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Less than, unsigned/unordered.
    LtUn,
    /// Less than or equal, unsigned/unordered.
    LeUn,
    /// Greater than, unsigned/unordered.
    GtUn,
    /// Greater than or equal, unsigned/unordered.
    GeUn,
}

/// Conversion targets of the `conv.*` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ConvKind {
    I1,
    I2,
    I4,
    I8,
    U1,
    U2,
    U4,
    U8,
    R4,
    R8,
    I,
    U,
}

/// A runtime value.
///
/// The kind set is closed; see the module docs. `Object` carries its
/// declared type descriptor alongside the heap handle, `Type` is a type
/// descriptor without an instance (reflection tokens), and `MethodPtr`
/// references a method descriptor (delegates, `ldftn`).
#[derive(Debug, Clone)]
pub enum Value {
    /// Uninitialized slot.
    None,
    /// The shared null reference; equal only to itself.
    Null,
    /// Signed 32-bit integer.
    Int32(i32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// IEEE-754 binary32.
    Float32(f32),
    /// IEEE-754 binary64.
    Float64(f64),
    /// Strictly two-valued boolean.
    Boolean(bool),
    /// Interned, immutable text.
    Str(Arc<str>),
    /// Handle into the array store.
    Array(usize),
    /// Handle into the object store plus the declared type descriptor.
    Object {
        /// Stable handle into the object store.
        handle: usize,
        /// Declared type of the instance.
        ty: Arc<TypeDesc>,
    },
    /// A type descriptor without an instance (reflection tokens).
    Type(Arc<TypeDesc>),
    /// A method descriptor reference (delegates, `ldftn`).
    MethodPtr(Arc<MethodDesc>),
    /// Untyped pointer-sized integer.
    IntPtr(i64),
}

/// Internal numeric view used by the arithmetic paths.
enum Num {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    /// Returns the default value for a signature element kind.
    ///
    /// Integers default to 0, floats to 0.0, booleans to `false`, and
    /// every reference kind to [`Value::Null`].
    #[must_use]
    pub fn default_for(kind: &ElemKind) -> Value {
        match kind {
            ElemKind::Boolean => Value::Boolean(false),
            ElemKind::Char
            | ElemKind::I1
            | ElemKind::U1
            | ElemKind::I2
            | ElemKind::U2
            | ElemKind::I4
            | ElemKind::U4 => Value::Int32(0),
            ElemKind::I8 | ElemKind::U8 => Value::Int64(0),
            ElemKind::R4 => Value::Float32(0.0),
            ElemKind::R8 => Value::Float64(0.0),
            ElemKind::I | ElemKind::U | ElemKind::Ptr(_) => Value::IntPtr(0),
            ElemKind::Void => Value::None,
            ElemKind::String
            | ElemKind::Object
            | ElemKind::Class(_)
            | ElemKind::ValueType(_)
            | ElemKind::SzArray(_)
            | ElemKind::ByRef(_) => Value::Null,
        }
    }

    /// Returns `true` if this is the null reference.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness for conditional branches: any non-zero integer or any
    /// non-null reference is true.
    #[must_use]
    pub fn is_true(&self) -> bool {
        match self {
            Value::Int32(v) => *v != 0,
            Value::Int64(v) | Value::IntPtr(v) => *v != 0,
            Value::Float32(v) => *v != 0.0,
            Value::Float64(v) => *v != 0.0,
            Value::Boolean(v) => *v,
            Value::Null | Value::None => false,
            Value::Str(_)
            | Value::Array(_)
            | Value::Object { .. }
            | Value::Type(_)
            | Value::MethodPtr(_) => true,
        }
    }

    /// Extracts an `i32`, accepting booleans as 0/1.
    ///
    /// # Errors
    /// Returns an internal error for any other kind.
    pub fn as_i32(&self) -> Result<i32, RuntimeError> {
        match self {
            Value::Int32(v) => Ok(*v),
            Value::Boolean(v) => Ok(i32::from(*v)),
            other => Err(type_mismatch("int32", other)),
        }
    }

    /// Extracts the string payload.
    ///
    /// # Errors
    /// Returns an internal error for any other kind.
    pub fn as_str(&self) -> Result<&Arc<str>, RuntimeError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(type_mismatch("string", other)),
        }
    }

    fn numeric(&self) -> Result<Num, RuntimeError> {
        match self {
            Value::Int32(v) => Ok(Num::I32(*v)),
            Value::Boolean(v) => Ok(Num::I32(i32::from(*v))),
            Value::Int64(v) | Value::IntPtr(v) => Ok(Num::I64(*v)),
            Value::Float32(v) => Ok(Num::F32(*v)),
            Value::Float64(v) => Ok(Num::F64(*v)),
            other => Err(type_mismatch("numeric operand", other)),
        }
    }

    /// Applies a binary arithmetic or bitwise operation.
    ///
    /// Numeric promotion: same kind computes in that kind; `Int32` widens
    /// to `Int64` or either float; `Float32` widens to `Float64`. Integer
    /// division/remainder by zero fails with an arithmetic error; float
    /// division follows IEEE-754.
    ///
    /// # Errors
    ///
    /// Returns an arithmetic error for integer division by zero, or an
    /// internal error for non-numeric operands and for bitwise/shift
    /// operations on anything but two `Int32`s.
    pub fn binary_op(&self, rhs: &Value, op: BinaryOp) -> Result<Value, RuntimeError> {
        match op {
            BinaryOp::And
            | BinaryOp::Or
            | BinaryOp::Xor
            | BinaryOp::Shl
            | BinaryOp::Shr
            | BinaryOp::ShrUn => {
                let a = self.as_i32()?;
                let b = rhs.as_i32()?;
                let result = match op {
                    BinaryOp::And => a & b,
                    BinaryOp::Or => a | b,
                    BinaryOp::Xor => a ^ b,
                    BinaryOp::Shl => a.wrapping_shl(b as u32),
                    BinaryOp::Shr => a.wrapping_shr(b as u32),
                    BinaryOp::ShrUn => ((a as u32).wrapping_shr(b as u32)) as i32,
                    _ => unreachable!(),
                };
                Ok(Value::Int32(result))
            }
            _ => match promote(self.numeric()?, rhs.numeric()?) {
                (Num::I32(a), Num::I32(b)) => int32_op(a, b, op),
                (Num::I64(a), Num::I64(b)) => int64_op(a, b, op),
                (Num::F32(a), Num::F32(b)) => Ok(Value::Float32(float_op(a, b, op))),
                (Num::F64(a), Num::F64(b)) => Ok(Value::Float64(float_op(a, b, op))),
                _ => Err(RuntimeError::Internal(
                    "numeric promotion produced mixed kinds".to_string(),
                )),
            },
        }
    }

    /// Applies a unary operation.
    ///
    /// # Errors
    ///
    /// Returns an internal error for non-numeric operands, or for `not` on
    /// anything but `Int32`.
    pub fn unary_op(&self, op: UnaryOp) -> Result<Value, RuntimeError> {
        match op {
            UnaryOp::Neg => match self.numeric()? {
                Num::I32(v) => Ok(Value::Int32(v.wrapping_neg())),
                Num::I64(v) => Ok(Value::Int64(v.wrapping_neg())),
                Num::F32(v) => Ok(Value::Float32(-v)),
                Num::F64(v) => Ok(Value::Float64(-v)),
            },
            UnaryOp::Not => Ok(Value::Int32(!self.as_i32()?)),
        }
    }

    /// Compares two values, returning the CIL truth value.
    ///
    /// Equality is defined across all kinds (null equals only null,
    /// objects and arrays compare by handle, strings by content). The
    /// ordering forms require numeric operands; unsigned forms reinterpret
    /// the bit pattern, and on floats use unordered semantics.
    ///
    /// # Errors
    ///
    /// Returns an internal error for an ordering comparison on non-numeric
    /// operands.
    pub fn compare(&self, rhs: &Value, op: CompareOp) -> Result<bool, RuntimeError> {
        match op {
            CompareOp::Eq => Ok(self.ref_eq(rhs)),
            CompareOp::Ne => Ok(!self.ref_eq(rhs)),
            _ => match promote(self.numeric()?, rhs.numeric()?) {
                (Num::I32(a), Num::I32(b)) => Ok(match op {
                    CompareOp::Lt => a < b,
                    CompareOp::Le => a <= b,
                    CompareOp::Gt => a > b,
                    CompareOp::Ge => a >= b,
                    CompareOp::LtUn => (a as u32) < (b as u32),
                    CompareOp::LeUn => (a as u32) <= (b as u32),
                    CompareOp::GtUn => (a as u32) > (b as u32),
                    CompareOp::GeUn => (a as u32) >= (b as u32),
                    CompareOp::Eq | CompareOp::Ne => unreachable!(),
                }),
                (Num::I64(a), Num::I64(b)) => Ok(match op {
                    CompareOp::Lt => a < b,
                    CompareOp::Le => a <= b,
                    CompareOp::Gt => a > b,
                    CompareOp::Ge => a >= b,
                    CompareOp::LtUn => (a as u64) < (b as u64),
                    CompareOp::LeUn => (a as u64) <= (b as u64),
                    CompareOp::GtUn => (a as u64) > (b as u64),
                    CompareOp::GeUn => (a as u64) >= (b as u64),
                    CompareOp::Eq | CompareOp::Ne => unreachable!(),
                }),
                (Num::F32(a), Num::F32(b)) => Ok(float_compare(f64::from(a), f64::from(b), op)),
                (Num::F64(a), Num::F64(b)) => Ok(float_compare(a, b, op)),
                _ => Err(RuntimeError::Internal(
                    "numeric promotion produced mixed kinds".to_string(),
                )),
            },
        }
    }

    fn ref_eq(&self, rhs: &Value) -> bool {
        match (self, rhs) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object { handle: a, .. }, Value::Object { handle: b, .. }) => a == b,
            (Value::Type(a), Value::Type(b)) => Arc::ptr_eq(a, b),
            (Value::MethodPtr(a), Value::MethodPtr(b)) => Arc::ptr_eq(a, b),
            _ => match (self.numeric(), rhs.numeric()) {
                (Ok(a), Ok(b)) => match promote(a, b) {
                    (Num::I32(a), Num::I32(b)) => a == b,
                    (Num::I64(a), Num::I64(b)) => a == b,
                    (Num::F32(a), Num::F32(b)) => a == b,
                    (Num::F64(a), Num::F64(b)) => a == b,
                    _ => false,
                },
                _ => false,
            },
        }
    }

    /// Converts the value to the indicated kind.
    ///
    /// Widening is lossless, narrowing wraps modulo 2^n, float-to-integer
    /// truncates toward zero.
    ///
    /// # Errors
    ///
    /// Returns an internal error for non-numeric sources.
    pub fn convert(&self, kind: ConvKind) -> Result<Value, RuntimeError> {
        let wide = match self.numeric()? {
            Num::I32(v) => Ok(i64::from(v)),
            Num::I64(v) => Ok(v),
            Num::F32(v) => Err(f64::from(v)),
            Num::F64(v) => Err(v),
        };

        // Unify on i64 with wrap, or f64; float->int truncates toward zero
        let as_i64 = |w: std::result::Result<i64, f64>| match w {
            Ok(v) => v,
            Err(f) => f.trunc() as i64,
        };
        let as_f64 = |w: std::result::Result<i64, f64>| match w {
            Ok(v) => v as f64,
            Err(f) => f,
        };

        Ok(match kind {
            ConvKind::I1 => Value::Int32(i32::from(as_i64(wide) as i8)),
            ConvKind::U1 => Value::Int32(i32::from(as_i64(wide) as u8)),
            ConvKind::I2 => Value::Int32(i32::from(as_i64(wide) as i16)),
            ConvKind::U2 => Value::Int32(i32::from(as_i64(wide) as u16)),
            ConvKind::I4 => Value::Int32(as_i64(wide) as i32),
            ConvKind::U4 => Value::Int32(as_i64(wide) as u32 as i32),
            ConvKind::I8 => Value::Int64(as_i64(wide)),
            ConvKind::U8 => Value::Int64(as_i64(wide)),
            ConvKind::R4 => Value::Float32(as_f64(wide) as f32),
            ConvKind::R8 => Value::Float64(as_f64(wide)),
            ConvKind::I | ConvKind::U => Value::IntPtr(as_i64(wide)),
        })
    }
}

/// Promotes two numeric views to a common kind (Int32 -> Int64 -> Float32
/// -> Float64).
fn promote(a: Num, b: Num) -> (Num, Num) {
    use Num::{F32, F64, I32, I64};

    match (a, b) {
        (I32(a), I64(b)) => (I64(i64::from(a)), I64(b)),
        (I64(a), I32(b)) => (I64(a), I64(i64::from(b))),
        (I32(a), F32(b)) => (F32(a as f32), F32(b)),
        (F32(a), I32(b)) => (F32(a), F32(b as f32)),
        (I32(a), F64(b)) => (F64(f64::from(a)), F64(b)),
        (F64(a), I32(b)) => (F64(a), F64(f64::from(b))),
        (I64(a), F32(b)) => (F64(a as f64), F64(f64::from(b))),
        (F32(a), I64(b)) => (F64(f64::from(a)), F64(b as f64)),
        (I64(a), F64(b)) => (F64(a as f64), F64(b)),
        (F64(a), I64(b)) => (F64(a), F64(b as f64)),
        (F32(a), F64(b)) => (F64(f64::from(a)), F64(b)),
        (F64(a), F32(b)) => (F64(a), F64(f64::from(b))),
        same => same,
    }
}

fn int32_op(a: i32, b: i32, op: BinaryOp) -> Result<Value, RuntimeError> {
    Ok(Value::Int32(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(RuntimeError::Arithmetic(
                    "attempted to divide by zero".to_string(),
                ));
            }
            a.wrapping_div(b)
        }
        BinaryOp::Rem => {
            if b == 0 {
                return Err(RuntimeError::Arithmetic(
                    "attempted to divide by zero".to_string(),
                ));
            }
            a.wrapping_rem(b)
        }
        _ => unreachable!(),
    }))
}

fn int64_op(a: i64, b: i64, op: BinaryOp) -> Result<Value, RuntimeError> {
    Ok(Value::Int64(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(RuntimeError::Arithmetic(
                    "attempted to divide by zero".to_string(),
                ));
            }
            a.wrapping_div(b)
        }
        BinaryOp::Rem => {
            if b == 0 {
                return Err(RuntimeError::Arithmetic(
                    "attempted to divide by zero".to_string(),
                ));
            }
            a.wrapping_rem(b)
        }
        _ => unreachable!(),
    }))
}

fn float_op<T>(a: T, b: T, op: BinaryOp) -> T
where
    T: std::ops::Add<Output = T>
        + std::ops::Sub<Output = T>
        + std::ops::Mul<Output = T>
        + std::ops::Div<Output = T>
        + std::ops::Rem<Output = T>,
{
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => unreachable!(),
    }
}

fn float_compare(a: f64, b: f64, op: CompareOp) -> bool {
    let unordered = a.is_nan() || b.is_nan();
    match op {
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
        // Unordered forms are true when either operand is NaN
        CompareOp::LtUn => unordered || a < b,
        CompareOp::LeUn => unordered || a <= b,
        CompareOp::GtUn => unordered || a > b,
        CompareOp::GeUn => unordered || a >= b,
        CompareOp::Eq | CompareOp::Ne => unreachable!(),
    }
}

fn type_mismatch(expected: &str, found: &Value) -> RuntimeError {
    RuntimeError::Internal(format!("expected {expected}, found {found}"))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, ""),
            Value::Null => write!(f, "null"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            // Console output follows the base library's casing
            Value::Boolean(v) => write!(f, "{}", if *v { "True" } else { "False" }),
            Value::Str(s) => write!(f, "{s}"),
            Value::Array(handle) => write!(f, "array@{handle}"),
            Value::Object { ty, .. } => write!(f, "{}", ty.full_name()),
            Value::Type(ty) => write!(f, "{}", ty.full_name()),
            Value::MethodPtr(m) => write!(f, "&{}.{}", m.declaring_full_name(), m.name),
            Value::IntPtr(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_kind_arithmetic() {
        let sum = Value::Int32(2).binary_op(&Value::Int32(3), BinaryOp::Add).unwrap();
        assert!(matches!(sum, Value::Int32(5)));

        let product = Value::Int64(6).binary_op(&Value::Int64(7), BinaryOp::Mul).unwrap();
        assert!(matches!(product, Value::Int64(42)));
    }

    #[test]
    fn promotion_is_symmetric() {
        // Int32 + Float32 promotes to Float32, in both operand orders
        let a = Value::Int32(3);
        let b = Value::Float32(0.5);
        match (a.binary_op(&b, BinaryOp::Add).unwrap(), b.binary_op(&a, BinaryOp::Add).unwrap()) {
            (Value::Float32(x), Value::Float32(y)) => {
                assert!((x - 3.5).abs() < f32::EPSILON);
                assert!((y - 3.5).abs() < f32::EPSILON);
            }
            other => panic!("expected two Float32, got {other:?}"),
        }

        // Int32 + Int64 promotes to Int64
        match Value::Int32(1).binary_op(&Value::Int64(2), BinaryOp::Add).unwrap() {
            Value::Int64(3) => {}
            other => panic!("expected Int64(3), got {other:?}"),
        }

        // Float32 + Float64 promotes to Float64
        match Value::Float32(1.0).binary_op(&Value::Float64(2.0), BinaryOp::Add).unwrap() {
            Value::Float64(v) => assert!((v - 3.0).abs() < f64::EPSILON),
            other => panic!("expected Float64, got {other:?}"),
        }
    }

    #[test]
    fn integer_division_by_zero_faults() {
        let err = Value::Int32(1)
            .binary_op(&Value::Int32(0), BinaryOp::Div)
            .unwrap_err();
        assert_eq!(err.kind(), "ArithmeticError");

        let err = Value::Int64(1)
            .binary_op(&Value::Int64(0), BinaryOp::Rem)
            .unwrap_err();
        assert_eq!(err.kind(), "ArithmeticError");
    }

    #[test]
    fn float_division_by_zero_follows_ieee() {
        match Value::Float64(1.0).binary_op(&Value::Float64(0.0), BinaryOp::Div).unwrap() {
            Value::Float64(v) => assert!(v.is_infinite()),
            other => panic!("expected infinity, got {other:?}"),
        }
        match Value::Float64(0.0).binary_op(&Value::Float64(0.0), BinaryOp::Div).unwrap() {
            Value::Float64(v) => assert!(v.is_nan()),
            other => panic!("expected NaN, got {other:?}"),
        }
    }

    #[test]
    fn bitwise_requires_int32() {
        assert!(Value::Int32(6).binary_op(&Value::Int32(3), BinaryOp::And).is_ok());
        assert!(Value::Int64(6).binary_op(&Value::Int64(3), BinaryOp::And).is_err());
    }

    #[test]
    fn null_compares_only_to_itself() {
        assert!(Value::Null.compare(&Value::Null, CompareOp::Eq).unwrap());
        assert!(!Value::Null.compare(&Value::Int32(0), CompareOp::Eq).unwrap());
        assert!(!Value::Int32(0).compare(&Value::Null, CompareOp::Eq).unwrap());
    }

    #[test]
    fn unsigned_comparison_reinterprets() {
        // -1 as u32 is the maximum, so unsigned "greater than 1" holds
        assert!(Value::Int32(-1).compare(&Value::Int32(1), CompareOp::GtUn).unwrap());
        assert!(!Value::Int32(-1).compare(&Value::Int32(1), CompareOp::Gt).unwrap());
    }

    #[test]
    fn conversions_wrap_and_truncate() {
        match Value::Int32(0x1_FF).convert(ConvKind::U1).unwrap() {
            Value::Int32(0xFF) => {}
            other => panic!("unexpected {other:?}"),
        }
        match Value::Int64(0x1_0000_0001).convert(ConvKind::I4).unwrap() {
            Value::Int32(1) => {}
            other => panic!("unexpected {other:?}"),
        }
        match Value::Float64(-2.9).convert(ConvKind::I4).unwrap() {
            Value::Int32(-2) => {}
            other => panic!("unexpected {other:?}"),
        }
        match Value::Int32(3).convert(ConvKind::R4).unwrap() {
            Value::Float32(v) => assert!((v - 3.0).abs() < f32::EPSILON),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn truthiness() {
        assert!(Value::Int32(-5).is_true());
        assert!(!Value::Int32(0).is_true());
        assert!(!Value::Null.is_true());
        assert!(Value::Str(Arc::from("")).is_true());
        assert!(Value::Array(0).is_true());
    }

    #[test]
    fn string_equality_is_by_content() {
        let a = Value::Str(Arc::from("abc"));
        let b = Value::Str(Arc::from("abc"));
        assert!(a.compare(&b, CompareOp::Eq).unwrap());
    }

    #[test]
    fn defaults_follow_kind() {
        assert!(matches!(Value::default_for(&ElemKind::I4), Value::Int32(0)));
        assert!(matches!(Value::default_for(&ElemKind::Boolean), Value::Boolean(false)));
        assert!(matches!(Value::default_for(&ElemKind::String), Value::Null));
        assert!(matches!(Value::default_for(&ElemKind::R8), Value::Float64(_)));
    }
}
