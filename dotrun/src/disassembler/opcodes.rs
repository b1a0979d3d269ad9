//! CIL opcode metadata (ECMA-335 III).
//!
//! Maps raw opcode bytes - on both encoding pages - to their mnemonic and
//! operand class. The decoder drives its cursor entirely off this table, so
//! an opcode missing here is an undecodable method, not a silently skipped
//! byte.

/// Shared first byte of the two-byte encoding page.
pub const FE_PREFIX: u8 = 0xFE;

/// How an opcode encodes its inline operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandClass {
    /// No inline operand.
    None,
    /// One-byte local/argument index (`ShortInlineVar`).
    VarShort,
    /// Two-byte local/argument index (`InlineVar`).
    Var,
    /// One-byte signed immediate (`ShortInlineI`).
    IntShort,
    /// Four-byte signed immediate (`InlineI`).
    Int,
    /// Eight-byte signed immediate (`InlineI8`).
    Long,
    /// Four-byte float immediate (`ShortInlineR`).
    FloatShort,
    /// Eight-byte float immediate (`InlineR`).
    Float,
    /// Four-byte `#US` token (`InlineString`).
    StringTok,
    /// Four-byte method token (`InlineMethod`).
    MethodTok,
    /// Four-byte field token (`InlineField`).
    FieldTok,
    /// Four-byte type token (`InlineType`).
    TypeTok,
    /// Four-byte token of any kind (`InlineTok`).
    AnyTok,
    /// Four-byte standalone-signature token (`InlineSig`).
    SigTok,
    /// One-byte relative branch target (`ShortInlineBrTarget`).
    BranchShort,
    /// Four-byte relative branch target (`InlineBrTarget`).
    Branch,
    /// Jump table: count plus that many four-byte targets (`InlineSwitch`).
    Switch,
}

impl OperandClass {
    /// Returns the operand size in bytes; [`OperandClass::Switch`] is
    /// variable and reports only its count field.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            OperandClass::None => 0,
            OperandClass::VarShort
            | OperandClass::IntShort
            | OperandClass::BranchShort => 1,
            OperandClass::Var => 2,
            OperandClass::Int
            | OperandClass::FloatShort
            | OperandClass::StringTok
            | OperandClass::MethodTok
            | OperandClass::FieldTok
            | OperandClass::TypeTok
            | OperandClass::AnyTok
            | OperandClass::SigTok
            | OperandClass::Branch
            | OperandClass::Switch => 4,
            OperandClass::Long | OperandClass::Float => 8,
        }
    }
}

/// Looks up the mnemonic and operand class of a single-byte opcode.
#[must_use]
pub fn spec(opcode: u8) -> Option<(&'static str, OperandClass)> {
    use OperandClass as O;

    Some(match opcode {
        0x00 => ("nop", O::None),
        0x01 => ("break", O::None),
        0x02 => ("ldarg.0", O::None),
        0x03 => ("ldarg.1", O::None),
        0x04 => ("ldarg.2", O::None),
        0x05 => ("ldarg.3", O::None),
        0x06 => ("ldloc.0", O::None),
        0x07 => ("ldloc.1", O::None),
        0x08 => ("ldloc.2", O::None),
        0x09 => ("ldloc.3", O::None),
        0x0A => ("stloc.0", O::None),
        0x0B => ("stloc.1", O::None),
        0x0C => ("stloc.2", O::None),
        0x0D => ("stloc.3", O::None),
        0x0E => ("ldarg.s", O::VarShort),
        0x0F => ("ldarga.s", O::VarShort),
        0x10 => ("starg.s", O::VarShort),
        0x11 => ("ldloc.s", O::VarShort),
        0x12 => ("ldloca.s", O::VarShort),
        0x13 => ("stloc.s", O::VarShort),
        0x14 => ("ldnull", O::None),
        0x15 => ("ldc.i4.m1", O::None),
        0x16 => ("ldc.i4.0", O::None),
        0x17 => ("ldc.i4.1", O::None),
        0x18 => ("ldc.i4.2", O::None),
        0x19 => ("ldc.i4.3", O::None),
        0x1A => ("ldc.i4.4", O::None),
        0x1B => ("ldc.i4.5", O::None),
        0x1C => ("ldc.i4.6", O::None),
        0x1D => ("ldc.i4.7", O::None),
        0x1E => ("ldc.i4.8", O::None),
        0x1F => ("ldc.i4.s", O::IntShort),
        0x20 => ("ldc.i4", O::Int),
        0x21 => ("ldc.i8", O::Long),
        0x22 => ("ldc.r4", O::FloatShort),
        0x23 => ("ldc.r8", O::Float),
        0x25 => ("dup", O::None),
        0x26 => ("pop", O::None),
        0x27 => ("jmp", O::MethodTok),
        0x28 => ("call", O::MethodTok),
        0x29 => ("calli", O::SigTok),
        0x2A => ("ret", O::None),
        0x2B => ("br.s", O::BranchShort),
        0x2C => ("brfalse.s", O::BranchShort),
        0x2D => ("brtrue.s", O::BranchShort),
        0x2E => ("beq.s", O::BranchShort),
        0x2F => ("bge.s", O::BranchShort),
        0x30 => ("bgt.s", O::BranchShort),
        0x31 => ("ble.s", O::BranchShort),
        0x32 => ("blt.s", O::BranchShort),
        0x33 => ("bne.un.s", O::BranchShort),
        0x34 => ("bge.un.s", O::BranchShort),
        0x35 => ("bgt.un.s", O::BranchShort),
        0x36 => ("ble.un.s", O::BranchShort),
        0x37 => ("blt.un.s", O::BranchShort),
        0x38 => ("br", O::Branch),
        0x39 => ("brfalse", O::Branch),
        0x3A => ("brtrue", O::Branch),
        0x3B => ("beq", O::Branch),
        0x3C => ("bge", O::Branch),
        0x3D => ("bgt", O::Branch),
        0x3E => ("ble", O::Branch),
        0x3F => ("blt", O::Branch),
        0x40 => ("bne.un", O::Branch),
        0x41 => ("bge.un", O::Branch),
        0x42 => ("bgt.un", O::Branch),
        0x43 => ("ble.un", O::Branch),
        0x44 => ("blt.un", O::Branch),
        0x45 => ("switch", O::Switch),
        0x46 => ("ldind.i1", O::None),
        0x47 => ("ldind.u1", O::None),
        0x48 => ("ldind.i2", O::None),
        0x49 => ("ldind.u2", O::None),
        0x4A => ("ldind.i4", O::None),
        0x4B => ("ldind.u4", O::None),
        0x4C => ("ldind.i8", O::None),
        0x4D => ("ldind.i", O::None),
        0x4E => ("ldind.r4", O::None),
        0x4F => ("ldind.r8", O::None),
        0x50 => ("ldind.ref", O::None),
        0x51 => ("stind.ref", O::None),
        0x52 => ("stind.i1", O::None),
        0x53 => ("stind.i2", O::None),
        0x54 => ("stind.i4", O::None),
        0x55 => ("stind.i8", O::None),
        0x56 => ("stind.r4", O::None),
        0x57 => ("stind.r8", O::None),
        0x58 => ("add", O::None),
        0x59 => ("sub", O::None),
        0x5A => ("mul", O::None),
        0x5B => ("div", O::None),
        0x5C => ("div.un", O::None),
        0x5D => ("rem", O::None),
        0x5E => ("rem.un", O::None),
        0x5F => ("and", O::None),
        0x60 => ("or", O::None),
        0x61 => ("xor", O::None),
        0x62 => ("shl", O::None),
        0x63 => ("shr", O::None),
        0x64 => ("shr.un", O::None),
        0x65 => ("neg", O::None),
        0x66 => ("not", O::None),
        0x67 => ("conv.i1", O::None),
        0x68 => ("conv.i2", O::None),
        0x69 => ("conv.i4", O::None),
        0x6A => ("conv.i8", O::None),
        0x6B => ("conv.r4", O::None),
        0x6C => ("conv.r8", O::None),
        0x6D => ("conv.u4", O::None),
        0x6E => ("conv.u8", O::None),
        0x6F => ("callvirt", O::MethodTok),
        0x70 => ("cpobj", O::TypeTok),
        0x71 => ("ldobj", O::TypeTok),
        0x72 => ("ldstr", O::StringTok),
        0x73 => ("newobj", O::MethodTok),
        0x74 => ("castclass", O::TypeTok),
        0x75 => ("isinst", O::TypeTok),
        0x76 => ("conv.r.un", O::None),
        0x79 => ("unbox", O::TypeTok),
        0x7A => ("throw", O::None),
        0x7B => ("ldfld", O::FieldTok),
        0x7C => ("ldflda", O::FieldTok),
        0x7D => ("stfld", O::FieldTok),
        0x7E => ("ldsfld", O::FieldTok),
        0x7F => ("ldsflda", O::FieldTok),
        0x80 => ("stsfld", O::FieldTok),
        0x81 => ("stobj", O::TypeTok),
        0x8C => ("box", O::TypeTok),
        0x8D => ("newarr", O::TypeTok),
        0x8E => ("ldlen", O::None),
        0x8F => ("ldelema", O::TypeTok),
        0x90 => ("ldelem.i1", O::None),
        0x91 => ("ldelem.u1", O::None),
        0x92 => ("ldelem.i2", O::None),
        0x93 => ("ldelem.u2", O::None),
        0x94 => ("ldelem.i4", O::None),
        0x95 => ("ldelem.u4", O::None),
        0x96 => ("ldelem.i8", O::None),
        0x97 => ("ldelem.i", O::None),
        0x98 => ("ldelem.r4", O::None),
        0x99 => ("ldelem.r8", O::None),
        0x9A => ("ldelem.ref", O::None),
        0x9B => ("stelem.i", O::None),
        0x9C => ("stelem.i1", O::None),
        0x9D => ("stelem.i2", O::None),
        0x9E => ("stelem.i4", O::None),
        0x9F => ("stelem.i8", O::None),
        0xA0 => ("stelem.r4", O::None),
        0xA1 => ("stelem.r8", O::None),
        0xA2 => ("stelem.ref", O::None),
        0xA3 => ("ldelem", O::TypeTok),
        0xA4 => ("stelem", O::TypeTok),
        0xA5 => ("unbox.any", O::TypeTok),
        0xC3 => ("ckfinite", O::None),
        0xC6 => ("mkrefany", O::TypeTok),
        0xD0 => ("ldtoken", O::AnyTok),
        0xD1 => ("conv.u2", O::None),
        0xD2 => ("conv.u1", O::None),
        0xD3 => ("conv.i", O::None),
        0xD4 => ("conv.ovf.i", O::None),
        0xD5 => ("conv.ovf.u", O::None),
        0xD6 => ("add.ovf", O::None),
        0xD7 => ("add.ovf.un", O::None),
        0xD8 => ("mul.ovf", O::None),
        0xD9 => ("mul.ovf.un", O::None),
        0xDA => ("sub.ovf", O::None),
        0xDB => ("sub.ovf.un", O::None),
        0xDC => ("endfinally", O::None),
        0xDD => ("leave", O::Branch),
        0xDE => ("leave.s", O::BranchShort),
        0xDF => ("stind.i", O::None),
        0xE0 => ("conv.u", O::None),
        _ => return None,
    })
}

/// Looks up the mnemonic and operand class of a `0xFE`-prefixed opcode.
#[must_use]
pub fn spec_fe(opcode: u8) -> Option<(&'static str, OperandClass)> {
    use OperandClass as O;

    Some(match opcode {
        0x00 => ("arglist", O::None),
        0x01 => ("ceq", O::None),
        0x02 => ("cgt", O::None),
        0x03 => ("cgt.un", O::None),
        0x04 => ("clt", O::None),
        0x05 => ("clt.un", O::None),
        0x06 => ("ldftn", O::MethodTok),
        0x07 => ("ldvirtftn", O::MethodTok),
        0x09 => ("ldarg", O::Var),
        0x0A => ("ldarga", O::Var),
        0x0B => ("starg", O::Var),
        0x0C => ("ldloc", O::Var),
        0x0D => ("ldloca", O::Var),
        0x0E => ("stloc", O::Var),
        0x0F => ("localloc", O::None),
        0x11 => ("endfilter", O::None),
        0x12 => ("unaligned.", O::IntShort),
        0x13 => ("volatile.", O::None),
        0x14 => ("tail.", O::None),
        0x15 => ("initobj", O::TypeTok),
        0x16 => ("constrained.", O::TypeTok),
        0x17 => ("cpblk", O::None),
        0x18 => ("initblk", O::None),
        0x1A => ("rethrow", O::None),
        0x1C => ("sizeof", O::TypeTok),
        0x1D => ("refanytype", O::None),
        0x1E => ("readonly.", O::None),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_integrity() {
        // Every defined single-byte opcode decodes to a nonempty mnemonic
        let mut count = 0;
        for opcode in 0..=0xE0u8 {
            if let Some((mnemonic, _)) = spec(opcode) {
                assert!(!mnemonic.is_empty());
                count += 1;
            }
        }
        assert!(count > 180, "expected a dense single-byte page, got {count}");

        // Holes stay holes
        assert!(spec(0x24).is_none());
        assert!(spec(0xFE).is_none());
    }

    #[test]
    fn operand_sizes() {
        assert_eq!(spec(0x1F).unwrap().1.size(), 1); // ldc.i4.s
        assert_eq!(spec(0x20).unwrap().1.size(), 4); // ldc.i4
        assert_eq!(spec(0x21).unwrap().1.size(), 8); // ldc.i8
        assert_eq!(spec(0x2B).unwrap().1.size(), 1); // br.s
        assert_eq!(spec_fe(0x01).unwrap().1.size(), 0); // ceq
        assert_eq!(spec_fe(0x0C).unwrap().1.size(), 2); // ldloc
    }
}
