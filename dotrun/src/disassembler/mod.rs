//! CIL method-body decoding.
//!
//! This module turns the raw bytes of a method body into the form the
//! interpreter consumes: a header summary (stack depth, local kinds), a
//! flat instruction list with operands already resolved against the
//! metadata (string literals, call sites, field sites, type sites), a
//! byte-offset-to-index map for branch targeting, and the exception-region
//! clauses for try/catch/finally support.
//!
//! Token operands are resolved through the [`TokenResolver`] trait, which
//! the image layer implements; the decoder itself never touches metadata
//! tables directly.
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Section 25.4 - Method Header Format
//! - ECMA-335 6th Edition, Partition III - CIL Instruction Set

pub mod opcodes;

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::{
    file::parser::Parser,
    metadata::{
        signatures::ElemKind,
        token::Token,
        typesystem::{CallSite, FieldSite, TypeSite},
    },
    Result,
};
use opcodes::{spec, spec_fe, OperandClass, FE_PREFIX};

// Method header flags (II.25.4)
const HEADER_TINY: u8 = 0x2;
const HEADER_FAT: u8 = 0x3;
const HEADER_MORE_SECTS: u16 = 0x8;
const HEADER_INIT_LOCALS: u16 = 0x10;

// Method data section flags (II.25.4.5)
const SECT_EH_TABLE: u8 = 0x01;
const SECT_FAT_FORMAT: u8 = 0x40;
const SECT_MORE_SECTS: u8 = 0x80;

// Exception clause flags (II.25.4.6)
const CLAUSE_CATCH: u32 = 0x0000;
const CLAUSE_FILTER: u32 = 0x0001;
const CLAUSE_FINALLY: u32 = 0x0002;
const CLAUSE_FAULT: u32 = 0x0004;

/// Resolves raw metadata tokens into decoded instruction operands.
///
/// Implemented by the image layer; a decoded instruction never carries a
/// raw token the interpreter would have to resolve at execution time
/// (standalone-signature tokens excepted, which only `calli` uses).
pub trait TokenResolver {
    /// Resolves a `#US` token into the string literal.
    ///
    /// # Errors
    /// Returns an error for a token outside the heap.
    fn user_string(&self, token: Token) -> Result<String>;

    /// Resolves a MethodDef/MemberRef token into a call site.
    ///
    /// # Errors
    /// Returns an error for tokens into other tables.
    fn call_site(&self, token: Token) -> Result<CallSite>;

    /// Resolves a Field/MemberRef token into a field site.
    ///
    /// # Errors
    /// Returns an error for tokens into other tables.
    fn field_site(&self, token: Token) -> Result<FieldSite>;

    /// Resolves a TypeDef/TypeRef token into a type site.
    ///
    /// # Errors
    /// Returns an error for tokens into other tables.
    fn type_site(&self, token: Token) -> Result<TypeSite>;

    /// Resolves a StandAloneSig token into local-variable kinds.
    ///
    /// # Errors
    /// Returns an error for a missing or malformed signature.
    fn locals(&self, token: Token) -> Result<Vec<ElemKind>>;
}

/// A decoded instruction operand.
///
/// Operands are fully resolved at decode time; the interpreter pattern
/// matches on this enum and never sees the raw encoding.
#[derive(Debug, Clone)]
pub enum Operand {
    /// No operand.
    None,
    /// 32-bit integer immediate (also carries widened `.s` forms).
    Int32(i32),
    /// 64-bit integer immediate.
    Int64(i64),
    /// 32-bit float immediate.
    Float32(f32),
    /// 64-bit float immediate.
    Float64(f64),
    /// Local or argument index.
    Var(u16),
    /// Absolute byte offset of the branch target within the method body.
    Branch(u32),
    /// Jump table of absolute byte offsets.
    Switch(Vec<u32>),
    /// Resolved string literal.
    String(Arc<str>),
    /// Resolved field reference.
    Field(FieldSite),
    /// Resolved call site.
    Call(CallSite),
    /// Resolved type reference.
    Type(TypeSite),
    /// An unresolved token (standalone signatures).
    Token(Token),
}

/// A single decoded CIL instruction.
#[derive(Debug, Clone)]
pub struct Instruction {
    /// Mnemonic from the ECMA-335 table (e.g. `"ldc.i4.s"`).
    pub mnemonic: &'static str,
    /// Primary opcode byte.
    pub opcode: u8,
    /// Prefix byte; 0 or [`FE_PREFIX`].
    pub prefix: u8,
    /// Byte position within the method body.
    pub offset: u32,
    /// Relative index within the decoded sequence.
    pub index: u32,
    /// Encoded size in bytes, operand included.
    pub size: u32,
    /// Decoded operand.
    pub operand: Operand,
}

/// Kind of an exception-region clause.
#[derive(Debug, Clone)]
pub enum ClauseKind {
    /// `catch`, optionally typed; `None` catches everything.
    Catch(Option<TypeSite>),
    /// `filter` (not executed by this interpreter; treated as catch-all).
    Filter,
    /// `finally`.
    Finally,
    /// `fault` (runs only on exceptional exit).
    Fault,
}

/// One exception-region clause of a method body.
#[derive(Debug, Clone)]
pub struct ExceptionClause {
    /// Clause kind.
    pub kind: ClauseKind,
    /// Byte offset of the protected region.
    pub try_offset: u32,
    /// Byte length of the protected region.
    pub try_length: u32,
    /// Byte offset of the handler.
    pub handler_offset: u32,
    /// Byte length of the handler.
    pub handler_length: u32,
}

impl ExceptionClause {
    /// Returns `true` if the protected region covers the given byte offset.
    #[must_use]
    pub fn protects(&self, offset: u32) -> bool {
        offset >= self.try_offset && offset < self.try_offset + self.try_length
    }

    /// Returns `true` if the handler region covers the given byte offset.
    #[must_use]
    pub fn handles_at(&self, offset: u32) -> bool {
        offset >= self.handler_offset && offset < self.handler_offset + self.handler_length
    }
}

/// A fully decoded method body.
#[derive(Debug)]
pub struct MethodBody {
    /// Declared maximum evaluation-stack depth.
    pub max_stack: usize,
    /// Local variable kinds in slot order.
    pub locals: Vec<ElemKind>,
    /// `true` when locals must be zero-initialized.
    pub init_locals: bool,
    /// Decoded instructions in stream order.
    pub instructions: Vec<Instruction>,
    /// Byte-offset to instruction-index map for branch targeting.
    pub offset_index: FxHashMap<u32, usize>,
    /// Exception-region clauses, innermost first as encoded.
    pub handlers: Vec<ExceptionClause>,
}

impl MethodBody {
    /// Builds a body from parts, deriving the offset map.
    ///
    /// This is also the constructor test fixtures use to synthesize bodies
    /// without going through the binary decoder.
    #[must_use]
    pub fn from_parts(
        instructions: Vec<Instruction>,
        locals: Vec<ElemKind>,
        handlers: Vec<ExceptionClause>,
    ) -> MethodBody {
        let offset_index = instructions
            .iter()
            .enumerate()
            .map(|(index, instr)| (instr.offset, index))
            .collect();

        MethodBody {
            max_stack: 8,
            locals,
            init_locals: true,
            instructions,
            offset_index,
            handlers,
        }
    }

    /// Maps a byte offset to the index of the instruction at that offset.
    ///
    /// # Errors
    /// Returns a malformed error when the offset does not start an
    /// instruction.
    pub fn index_of(&self, offset: u32) -> Result<usize> {
        self.offset_index.get(&offset).copied().ok_or_else(|| {
            malformed_error!("Branch target 0x{:X} is not an instruction boundary", offset)
        })
    }
}

/// Decodes a complete method body (header, code, exception sections).
///
/// # Arguments
///
/// * `data` - The bytes at the method's RVA, header first. May extend past
///   the body; the header bounds what is read.
/// * `resolver` - Token resolution against the owning image.
///
/// # Errors
///
/// Returns an error for a malformed header, an unknown opcode byte, or a
/// token that does not resolve.
pub fn decode_body(data: &[u8], resolver: &dyn TokenResolver) -> Result<MethodBody> {
    if data.is_empty() {
        return Err(malformed_error!("Provided data for body decoding is empty"));
    }

    let first = data[0];
    let (header_size, code_size, max_stack, init_locals, more_sects, locals_token) =
        match first & 0x3 {
            HEADER_TINY => ((1usize), (first >> 2) as usize, 8usize, false, false, 0u32),
            HEADER_FAT => {
                let mut parser = Parser::new(data);
                let flags = parser.read_le::<u16>()?;
                let header_size = ((flags >> 12) & 0xF) as usize * 4;
                let max_stack = parser.read_le::<u16>()? as usize;
                let code_size = parser.read_le::<u32>()? as usize;
                let locals_token = parser.read_le::<u32>()?;
                (
                    header_size,
                    code_size,
                    max_stack,
                    flags & HEADER_INIT_LOCALS != 0,
                    flags & HEADER_MORE_SECTS != 0,
                    locals_token,
                )
            }
            _ => {
                return Err(malformed_error!(
                    "Unknown method header kind 0x{:X}",
                    first & 0x3
                ))
            }
        };

    if header_size + code_size > data.len() {
        return Err(crate::Error::OutOfBounds);
    }

    let locals = if locals_token != 0 {
        resolver.locals(Token::new(locals_token))?
    } else {
        Vec::new()
    };

    let code = &data[header_size..header_size + code_size];
    let instructions = decode_stream(code, resolver)?;

    let handlers = if more_sects {
        decode_sections(data, header_size + code_size, resolver)?
    } else {
        Vec::new()
    };

    let mut body = MethodBody::from_parts(instructions, locals, handlers);
    body.max_stack = max_stack;
    body.init_locals = init_locals;
    Ok(body)
}

/// Decodes a raw code region into an instruction list.
///
/// # Arguments
///
/// * `code` - The instruction bytes (no header).
/// * `resolver` - Token resolution against the owning image.
///
/// # Errors
///
/// Returns an error for unknown opcodes or unresolvable tokens.
pub fn decode_stream(code: &[u8], resolver: &dyn TokenResolver) -> Result<Vec<Instruction>> {
    let mut parser = Parser::new(code);
    let mut instructions = Vec::new();

    while parser.has_more_data() {
        let offset = parser.pos() as u32;
        let index = instructions.len() as u32;

        let mut prefix = 0u8;
        let mut opcode = parser.read_le::<u8>()?;
        let (mnemonic, operand_class) = if opcode == FE_PREFIX {
            prefix = FE_PREFIX;
            opcode = parser.read_le::<u8>()?;
            spec_fe(opcode)
                .ok_or_else(|| malformed_error!("Unknown opcode 0xFE 0x{:02X}", opcode))?
        } else {
            spec(opcode).ok_or_else(|| malformed_error!("Unknown opcode 0x{:02X}", opcode))?
        };

        let operand = read_operand(&mut parser, operand_class, offset, resolver)?;
        let size = parser.pos() as u32 - offset;

        instructions.push(Instruction {
            mnemonic,
            opcode,
            prefix,
            offset,
            index,
            size,
            operand,
        });
    }

    Ok(instructions)
}

fn read_operand(
    parser: &mut Parser<'_>,
    class: OperandClass,
    instr_offset: u32,
    resolver: &dyn TokenResolver,
) -> Result<Operand> {
    Ok(match class {
        OperandClass::None => Operand::None,
        OperandClass::VarShort => Operand::Var(u16::from(parser.read_le::<u8>()?)),
        OperandClass::Var => Operand::Var(parser.read_le::<u16>()?),
        OperandClass::IntShort => Operand::Int32(i32::from(parser.read_le::<i8>()?)),
        OperandClass::Int => Operand::Int32(parser.read_le::<i32>()?),
        OperandClass::Long => Operand::Int64(parser.read_le::<i64>()?),
        OperandClass::FloatShort => Operand::Float32(parser.read_le::<f32>()?),
        OperandClass::Float => Operand::Float64(parser.read_le::<f64>()?),
        OperandClass::BranchShort => {
            let displacement = i32::from(parser.read_le::<i8>()?);
            Operand::Branch(branch_target(instr_offset, parser.pos() as u32, displacement)?)
        }
        OperandClass::Branch => {
            let displacement = parser.read_le::<i32>()?;
            Operand::Branch(branch_target(instr_offset, parser.pos() as u32, displacement)?)
        }
        OperandClass::Switch => {
            let count = parser.read_le::<u32>()? as usize;
            let mut displacements = Vec::with_capacity(count);
            for _ in 0..count {
                displacements.push(parser.read_le::<i32>()?);
            }
            let next = parser.pos() as u32;
            let targets = displacements
                .into_iter()
                .map(|d| branch_target(instr_offset, next, d))
                .collect::<Result<Vec<u32>>>()?;
            Operand::Switch(targets)
        }
        OperandClass::StringTok => {
            let token = Token::new(parser.read_le::<u32>()?);
            Operand::String(Arc::from(resolver.user_string(token)?))
        }
        OperandClass::MethodTok => {
            let token = Token::new(parser.read_le::<u32>()?);
            Operand::Call(resolver.call_site(token)?)
        }
        OperandClass::FieldTok => {
            let token = Token::new(parser.read_le::<u32>()?);
            Operand::Field(resolver.field_site(token)?)
        }
        OperandClass::TypeTok => {
            let token = Token::new(parser.read_le::<u32>()?);
            Operand::Type(resolver.type_site(token)?)
        }
        OperandClass::AnyTok => {
            let token = Token::new(parser.read_le::<u32>()?);
            // ldtoken can name a type, field or method; only types are
            // meaningful to this interpreter
            match resolver.type_site(token) {
                Ok(site) => Operand::Type(site),
                Err(_) => Operand::Token(token),
            }
        }
        OperandClass::SigTok => Operand::Token(Token::new(parser.read_le::<u32>()?)),
    })
}

/// Computes an absolute branch target from the byte after the instruction.
fn branch_target(instr_offset: u32, next_offset: u32, displacement: i32) -> Result<u32> {
    let target = i64::from(next_offset) + i64::from(displacement);
    u32::try_from(target).map_err(|_| {
        malformed_error!(
            "Branch at 0x{:X} targets negative offset {}",
            instr_offset,
            target
        )
    })
}

/// Decodes the method-data sections following the code (exception tables).
fn decode_sections(
    data: &[u8],
    code_end: usize,
    resolver: &dyn TokenResolver,
) -> Result<Vec<ExceptionClause>> {
    let mut offset = (code_end + 3) & !3;
    let mut clauses = Vec::new();

    loop {
        let mut parser = Parser::new(data);
        parser.seek(offset)?;

        let kind = parser.read_le::<u8>()?;
        let is_fat = kind & SECT_FAT_FORMAT != 0;

        let data_size = if is_fat {
            let b1 = parser.read_le::<u8>()?;
            let b2 = parser.read_le::<u8>()?;
            let b3 = parser.read_le::<u8>()?;
            usize::from(b1) | (usize::from(b2) << 8) | (usize::from(b3) << 16)
        } else {
            let size = usize::from(parser.read_le::<u8>()?);
            let _padding = parser.read_le::<u16>()?;
            size
        };

        if kind & SECT_EH_TABLE != 0 {
            let clause_size = if is_fat { 24 } else { 12 };
            let count = (data_size - 4) / clause_size;
            for _ in 0..count {
                clauses.push(read_clause(&mut parser, is_fat, resolver)?);
            }
        }

        if kind & SECT_MORE_SECTS == 0 {
            break;
        }
        offset = (offset + data_size + 3) & !3;
    }

    Ok(clauses)
}

fn read_clause(
    parser: &mut Parser<'_>,
    is_fat: bool,
    resolver: &dyn TokenResolver,
) -> Result<ExceptionClause> {
    let (flags, try_offset, try_length, handler_offset, handler_length) = if is_fat {
        (
            parser.read_le::<u32>()?,
            parser.read_le::<u32>()?,
            parser.read_le::<u32>()?,
            parser.read_le::<u32>()?,
            parser.read_le::<u32>()?,
        )
    } else {
        (
            u32::from(parser.read_le::<u16>()?),
            u32::from(parser.read_le::<u16>()?),
            u32::from(parser.read_le::<u8>()?),
            u32::from(parser.read_le::<u16>()?),
            u32::from(parser.read_le::<u8>()?),
        )
    };
    let class_or_filter = parser.read_le::<u32>()?;

    let kind = match flags {
        CLAUSE_CATCH => {
            let token = Token::new(class_or_filter);
            ClauseKind::Catch(if token.is_null() {
                None
            } else {
                resolver.type_site(token).ok()
            })
        }
        CLAUSE_FILTER => ClauseKind::Filter,
        CLAUSE_FINALLY => ClauseKind::Finally,
        CLAUSE_FAULT => ClauseKind::Fault,
        _ => {
            return Err(malformed_error!(
                "Unknown exception clause flags 0x{:X}",
                flags
            ))
        }
    };

    Ok(ExceptionClause {
        kind,
        try_offset,
        try_length,
        handler_offset,
        handler_length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullResolver;

    impl TokenResolver for NullResolver {
        fn user_string(&self, _token: Token) -> Result<String> {
            Ok("fixture".to_string())
        }
        fn call_site(&self, _token: Token) -> Result<CallSite> {
            Err(crate::Error::NotSupported)
        }
        fn field_site(&self, _token: Token) -> Result<FieldSite> {
            Err(crate::Error::NotSupported)
        }
        fn type_site(&self, _token: Token) -> Result<TypeSite> {
            Err(crate::Error::NotSupported)
        }
        fn locals(&self, _token: Token) -> Result<Vec<ElemKind>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn decode_simple_stream() {
        // nop, ldc.i4.s 42, ldc.i4 7, add, ret
        let code = [0x00, 0x1F, 0x2A, 0x20, 0x07, 0x00, 0x00, 0x00, 0x58, 0x2A];
        let instrs = decode_stream(&code, &NullResolver).unwrap();
        assert_eq!(instrs.len(), 5);

        assert_eq!(instrs[0].mnemonic, "nop");
        assert_eq!(instrs[1].mnemonic, "ldc.i4.s");
        assert!(matches!(instrs[1].operand, Operand::Int32(42)));
        assert_eq!(instrs[2].mnemonic, "ldc.i4");
        assert!(matches!(instrs[2].operand, Operand::Int32(7)));
        assert_eq!(instrs[3].mnemonic, "add");
        assert_eq!(instrs[4].mnemonic, "ret");

        // Offsets and sizes line up
        assert_eq!(instrs[1].offset, 1);
        assert_eq!(instrs[1].size, 2);
        assert_eq!(instrs[2].offset, 3);
        assert_eq!(instrs[2].size, 5);
        assert_eq!(instrs[4].index, 4);
    }

    #[test]
    fn branch_targets_are_absolute() {
        // 0: br.s +2 (-> 4), 2: nop, 3: nop, 4: ret
        let code = [0x2B, 0x02, 0x00, 0x00, 0x2A];
        let instrs = decode_stream(&code, &NullResolver).unwrap();
        match &instrs[0].operand {
            Operand::Branch(target) => assert_eq!(*target, 4),
            other => panic!("expected branch operand, got {other:?}"),
        }

        // Backward branch: 0: nop, 1: br.s -3 (-> 0)
        let back = [0x00, 0x2B, 0xFD];
        let instrs = decode_stream(&back, &NullResolver).unwrap();
        match &instrs[1].operand {
            Operand::Branch(target) => assert_eq!(*target, 0),
            other => panic!("expected branch operand, got {other:?}"),
        }
    }

    #[test]
    fn tiny_header_body() {
        // Tiny header: size 3 -> (3 << 2) | 0x2 = 0x0E; code: nop nop ret
        let data = [0x0E, 0x00, 0x00, 0x2A];
        let body = decode_body(&data, &NullResolver).unwrap();
        assert_eq!(body.instructions.len(), 3);
        assert_eq!(body.max_stack, 8);
        assert!(body.locals.is_empty());
        assert!(body.handlers.is_empty());
    }

    #[test]
    fn offset_map_round_trip() {
        let code = [0x00, 0x1F, 0x2A, 0x58, 0x2A];
        let instrs = decode_stream(&code, &NullResolver).unwrap();
        let body = MethodBody::from_parts(instrs, Vec::new(), Vec::new());

        assert_eq!(body.index_of(0).unwrap(), 0);
        assert_eq!(body.index_of(1).unwrap(), 1);
        assert_eq!(body.index_of(3).unwrap(), 2);
        assert!(body.index_of(2).is_err());
    }

    #[test]
    fn fe_page_decodes() {
        // ceq is FE 01
        let code = [0xFE, 0x01, 0x2A];
        let instrs = decode_stream(&code, &NullResolver).unwrap();
        assert_eq!(instrs[0].mnemonic, "ceq");
        assert_eq!(instrs[0].prefix, FE_PREFIX);
        assert_eq!(instrs[0].size, 2);
        assert_eq!(instrs[1].offset, 2);
    }

    #[test]
    fn clause_region_predicates() {
        let clause = ExceptionClause {
            kind: ClauseKind::Finally,
            try_offset: 2,
            try_length: 6,
            handler_offset: 8,
            handler_length: 3,
        };
        assert!(clause.protects(2));
        assert!(clause.protects(7));
        assert!(!clause.protects(8));
        assert!(clause.handles_at(8));
        assert!(!clause.handles_at(11));
    }
}
