//! The `#~` stream: table header decoding and raw row access.
//!
//! The tables stream begins with a header describing which of the 45
//! ECMA-335 tables are present and how many rows each has; the rows follow
//! back to back with index widths that depend on the row counts and heap
//! sizes. [`Tables`] decodes the header, computes every table's row size
//! (so tables this interpreter does not consume can still be skipped), and
//! hands out positioned [`Parser`] cursors plus typed row readers for the
//! tables the loader needs.
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Section 22 - Metadata Logical Format
//! - ECMA-335 6th Edition, Partition II, Section 24.2.6 - `#~` Stream

use crate::{file::parser::Parser, Result};

/// Number of table slots addressed by the `valid` bitmask.
pub const TABLE_COUNT: usize = 64;

/// Table identifiers used by this crate (ECMA-335 II.22).
#[allow(missing_docs)]
pub mod table {
    pub const MODULE: usize = 0x00;
    pub const TYPE_REF: usize = 0x01;
    pub const TYPE_DEF: usize = 0x02;
    pub const FIELD: usize = 0x04;
    pub const METHOD_DEF: usize = 0x06;
    pub const PARAM: usize = 0x08;
    pub const INTERFACE_IMPL: usize = 0x09;
    pub const MEMBER_REF: usize = 0x0A;
    pub const STAND_ALONE_SIG: usize = 0x11;
    pub const MODULE_REF: usize = 0x1A;
    pub const TYPE_SPEC: usize = 0x1B;
    pub const ASSEMBLY: usize = 0x20;
    pub const ASSEMBLY_REF: usize = 0x23;
}

/// Coded-index families (ECMA-335 II.24.2.6).
///
/// Each family is the set of tables a coded index can point into plus the
/// number of tag bits; the byte width of the index depends on the largest
/// member table.
#[derive(Debug, Clone, Copy)]
pub enum CodedIndex {
    /// TypeDef | TypeRef | TypeSpec (2 tag bits).
    TypeDefOrRef,
    /// Field | Param | Property (2 tag bits).
    HasConstant,
    /// The 22-member custom-attribute parent family (5 tag bits).
    HasCustomAttribute,
    /// Field | Param (1 tag bit).
    HasFieldMarshal,
    /// TypeDef | MethodDef | Assembly (2 tag bits).
    HasDeclSecurity,
    /// TypeDef | TypeRef | ModuleRef | MethodDef | TypeSpec (3 tag bits).
    MemberRefParent,
    /// Event | Property (1 tag bit).
    HasSemantics,
    /// MethodDef | MemberRef (1 tag bit).
    MethodDefOrRef,
    /// Field | MethodDef (1 tag bit).
    MemberForwarded,
    /// File | AssemblyRef | ExportedType (2 tag bits).
    Implementation,
    /// MethodDef | MemberRef (3 tag bits).
    CustomAttributeType,
    /// Module | ModuleRef | AssemblyRef | TypeRef (2 tag bits).
    ResolutionScope,
    /// TypeDef | MethodDef (1 tag bit).
    TypeOrMethodDef,
}

impl CodedIndex {
    fn tag_bits(self) -> u32 {
        match self {
            CodedIndex::HasFieldMarshal
            | CodedIndex::HasSemantics
            | CodedIndex::MethodDefOrRef
            | CodedIndex::MemberForwarded
            | CodedIndex::TypeOrMethodDef => 1,
            CodedIndex::TypeDefOrRef
            | CodedIndex::HasConstant
            | CodedIndex::HasDeclSecurity
            | CodedIndex::Implementation
            | CodedIndex::ResolutionScope => 2,
            CodedIndex::MemberRefParent | CodedIndex::CustomAttributeType => 3,
            CodedIndex::HasCustomAttribute => 5,
        }
    }

    fn members(self) -> &'static [usize] {
        match self {
            CodedIndex::TypeDefOrRef => &[0x02, 0x01, 0x1B],
            CodedIndex::HasConstant => &[0x04, 0x08, 0x17],
            CodedIndex::HasCustomAttribute => &[
                0x06, 0x04, 0x01, 0x02, 0x08, 0x09, 0x0A, 0x00, 0x0E, 0x17, 0x14, 0x11, 0x1A,
                0x1B, 0x20, 0x23, 0x26, 0x27, 0x28, 0x2A, 0x2C, 0x2B,
            ],
            CodedIndex::HasFieldMarshal => &[0x04, 0x08],
            CodedIndex::HasDeclSecurity => &[0x02, 0x06, 0x20],
            CodedIndex::MemberRefParent => &[0x02, 0x01, 0x1A, 0x06, 0x1B],
            CodedIndex::HasSemantics => &[0x14, 0x17],
            CodedIndex::MethodDefOrRef => &[0x06, 0x0A],
            CodedIndex::MemberForwarded => &[0x04, 0x06],
            CodedIndex::Implementation => &[0x26, 0x23, 0x27],
            CodedIndex::CustomAttributeType => &[0x06, 0x0A],
            CodedIndex::ResolutionScope => &[0x00, 0x1A, 0x23, 0x01],
            CodedIndex::TypeOrMethodDef => &[0x02, 0x06],
        }
    }

    /// Splits a decoded coded-index value into (member table, row).
    #[must_use]
    pub fn decode(self, value: u32) -> (usize, u32) {
        let bits = self.tag_bits();
        let tag = (value & ((1 << bits) - 1)) as usize;
        let row = value >> bits;
        let members = self.members();
        let table = members.get(tag).copied().unwrap_or(usize::MAX);
        (table, row)
    }
}

/// A decoded `#~` stream: row counts, widths, and per-table byte offsets.
pub struct Tables<'a> {
    data: &'a [u8],
    heap_sizes: u8,
    row_counts: [u32; TABLE_COUNT],
    row_sizes: [usize; TABLE_COUNT],
    offsets: [usize; TABLE_COUNT],
}

impl<'a> Tables<'a> {
    /// Decodes the tables-stream header and computes the row layout.
    ///
    /// # Arguments
    ///
    /// * `data` - The full `#~` stream.
    ///
    /// # Errors
    ///
    /// Returns a malformed error if the header is truncated or a row count
    /// overflows the stream.
    pub fn parse(data: &'a [u8]) -> Result<Tables<'a>> {
        let mut parser = Parser::new(data);

        let _reserved = parser.read_le::<u32>()?;
        let _major = parser.read_le::<u8>()?;
        let _minor = parser.read_le::<u8>()?;
        let heap_sizes = parser.read_le::<u8>()?;
        let _reserved2 = parser.read_le::<u8>()?;
        let valid = parser.read_le::<u64>()?;
        let _sorted = parser.read_le::<u64>()?;

        let mut row_counts = [0u32; TABLE_COUNT];
        for (index, count) in row_counts.iter_mut().enumerate() {
            if valid & (1u64 << index) != 0 {
                *count = parser.read_le::<u32>()?;
            }
        }

        let mut tables = Tables {
            data,
            heap_sizes,
            row_counts,
            row_sizes: [0; TABLE_COUNT],
            offsets: [0; TABLE_COUNT],
        };

        let mut offset = parser.pos();
        for index in 0..TABLE_COUNT {
            if tables.row_counts[index] == 0 {
                continue;
            }
            let size = tables.row_size(index)?;
            tables.row_sizes[index] = size;
            tables.offsets[index] = offset;
            offset = offset
                .checked_add(size * tables.row_counts[index] as usize)
                .ok_or_else(|| malformed_error!("Table {} overflows the stream", index))?;
        }

        if offset > data.len() {
            return Err(malformed_error!(
                "Tables occupy {} bytes but the stream has {}",
                offset,
                data.len()
            ));
        }

        Ok(tables)
    }

    /// Returns the number of rows in the given table.
    #[must_use]
    pub fn row_count(&self, table: usize) -> u32 {
        self.row_counts.get(table).copied().unwrap_or(0)
    }

    /// Returns `true` if the `#Strings` heap uses 4-byte indexes.
    #[must_use]
    pub fn wide_strings(&self) -> bool {
        self.heap_sizes & 0x01 != 0
    }

    /// Returns `true` if the `#GUID` heap uses 4-byte indexes.
    #[must_use]
    pub fn wide_guids(&self) -> bool {
        self.heap_sizes & 0x02 != 0
    }

    /// Returns `true` if the `#Blob` heap uses 4-byte indexes.
    #[must_use]
    pub fn wide_blobs(&self) -> bool {
        self.heap_sizes & 0x04 != 0
    }

    /// Returns `true` if simple indexes into `table` use 4 bytes.
    #[must_use]
    pub fn wide_index(&self, table: usize) -> bool {
        self.row_count(table) > 0xFFFF
    }

    /// Returns `true` if the given coded-index family uses 4 bytes.
    #[must_use]
    pub fn wide_coded(&self, coded: CodedIndex) -> bool {
        let max_rows = coded
            .members()
            .iter()
            .map(|&t| self.row_count(t))
            .max()
            .unwrap_or(0);
        max_rows >= (1u32 << (16 - coded.tag_bits()))
    }

    fn string_size(&self) -> usize {
        if self.wide_strings() {
            4
        } else {
            2
        }
    }

    fn guid_size(&self) -> usize {
        if self.wide_guids() {
            4
        } else {
            2
        }
    }

    fn blob_size(&self) -> usize {
        if self.wide_blobs() {
            4
        } else {
            2
        }
    }

    fn index_size(&self, table: usize) -> usize {
        if self.wide_index(table) {
            4
        } else {
            2
        }
    }

    fn coded_size(&self, coded: CodedIndex) -> usize {
        if self.wide_coded(coded) {
            4
        } else {
            2
        }
    }

    /// Computes the byte size of one row of `table` (ECMA-335 II.22).
    fn row_size(&self, table: usize) -> Result<usize> {
        use CodedIndex as C;

        let s = self.string_size();
        let g = self.guid_size();
        let b = self.blob_size();

        Ok(match table {
            0x00 => 2 + s + g + g + g,
            0x01 => self.coded_size(C::ResolutionScope) + s + s,
            0x02 => {
                4 + s
                    + s
                    + self.coded_size(C::TypeDefOrRef)
                    + self.index_size(table::FIELD)
                    + self.index_size(table::METHOD_DEF)
            }
            0x03 => self.index_size(table::FIELD),
            0x04 => 2 + s + b,
            0x05 => self.index_size(table::METHOD_DEF),
            0x06 => 4 + 2 + 2 + s + b + self.index_size(table::PARAM),
            0x07 => self.index_size(table::PARAM),
            0x08 => 2 + 2 + s,
            0x09 => self.index_size(table::TYPE_DEF) + self.coded_size(C::TypeDefOrRef),
            0x0A => self.coded_size(C::MemberRefParent) + s + b,
            0x0B => 1 + 1 + self.coded_size(C::HasConstant) + b,
            0x0C => {
                self.coded_size(C::HasCustomAttribute) + self.coded_size(C::CustomAttributeType) + b
            }
            0x0D => self.coded_size(C::HasFieldMarshal) + b,
            0x0E => 2 + self.coded_size(C::HasDeclSecurity) + b,
            0x0F => 2 + 4 + self.index_size(table::TYPE_DEF),
            0x10 => 4 + self.index_size(table::FIELD),
            0x11 => b,
            0x12 => self.index_size(table::TYPE_DEF) + self.index_size(0x14),
            0x13 => self.index_size(0x14),
            0x14 => 2 + s + self.coded_size(C::TypeDefOrRef),
            0x15 => self.index_size(table::TYPE_DEF) + self.index_size(0x17),
            0x16 => self.index_size(0x17),
            0x17 => 2 + s + b,
            0x18 => 2 + self.index_size(table::METHOD_DEF) + self.coded_size(C::HasSemantics),
            0x19 => {
                self.index_size(table::TYPE_DEF)
                    + self.coded_size(C::MethodDefOrRef)
                    + self.coded_size(C::MethodDefOrRef)
            }
            0x1A => s,
            0x1B => b,
            0x1C => 2 + self.coded_size(C::MemberForwarded) + s + self.index_size(table::MODULE_REF),
            0x1D => 4 + self.index_size(table::FIELD),
            0x1E => 4 + 4,
            0x1F => 4,
            0x20 => 4 + 2 + 2 + 2 + 2 + 4 + b + s + s,
            0x21 => 4,
            0x22 => 4 + 4 + 4,
            0x23 => 2 + 2 + 2 + 2 + 4 + b + s + s + b,
            0x24 => 4 + self.index_size(table::ASSEMBLY_REF),
            0x25 => 4 + 4 + 4 + self.index_size(table::ASSEMBLY_REF),
            0x26 => 4 + s + b,
            0x27 => 4 + 4 + s + s + self.coded_size(C::Implementation),
            0x28 => 4 + 4 + s + self.coded_size(C::Implementation),
            0x29 => self.index_size(table::TYPE_DEF) + self.index_size(table::TYPE_DEF),
            0x2A => 2 + 2 + self.coded_size(C::TypeOrMethodDef) + s,
            0x2B => self.coded_size(C::MethodDefOrRef) + b,
            0x2C => self.index_size(0x2A) + self.coded_size(C::TypeDefOrRef),
            _ => {
                return Err(malformed_error!(
                    "Unknown metadata table 0x{:02X} is present",
                    table
                ))
            }
        })
    }

    /// Returns a parser positioned at the start of the given one-based row.
    ///
    /// # Errors
    ///
    /// Returns a malformed error if the row does not exist.
    pub fn row(&self, table: usize, row: u32) -> Result<Parser<'a>> {
        if row == 0 || row > self.row_count(table) {
            return Err(malformed_error!(
                "Row {} does not exist in table 0x{:02X} ({} rows)",
                row,
                table,
                self.row_count(table)
            ));
        }

        let offset = self.offsets[table] + self.row_sizes[table] * (row as usize - 1);
        let mut parser = Parser::new(self.data);
        parser.seek(offset)?;
        Ok(parser)
    }

    /// Reads a `#Strings` index at the cursor.
    pub(crate) fn read_string(&self, parser: &mut Parser<'_>) -> Result<u32> {
        parser.read_index(self.wide_strings())
    }

    /// Reads a `#Blob` index at the cursor.
    pub(crate) fn read_blob(&self, parser: &mut Parser<'_>) -> Result<u32> {
        parser.read_index(self.wide_blobs())
    }

    /// Reads a simple table index at the cursor.
    pub(crate) fn read_table_index(&self, parser: &mut Parser<'_>, table: usize) -> Result<u32> {
        parser.read_index(self.wide_index(table))
    }

    /// Reads and decodes a coded index at the cursor into (table, row).
    pub(crate) fn read_coded(
        &self,
        parser: &mut Parser<'_>,
        coded: CodedIndex,
    ) -> Result<(usize, u32)> {
        let raw = parser.read_index(self.wide_coded(coded))?;
        Ok(coded.decode(raw))
    }
}

// ── Typed rows for the tables the loader consumes ──────────────────────────

/// Decoded `Module` row (0x00).
pub struct ModuleRow {
    /// `#Strings` index of the module name.
    pub name: u32,
}

/// Decoded `TypeRef` row (0x01).
pub struct TypeRefRow {
    /// Resolution scope as (table, row).
    pub resolution_scope: (usize, u32),
    /// `#Strings` index of the simple name.
    pub name: u32,
    /// `#Strings` index of the namespace.
    pub namespace: u32,
}

/// Decoded `TypeDef` row (0x02).
pub struct TypeDefRow {
    /// `TypeAttributes` bitmask.
    pub flags: u32,
    /// `#Strings` index of the simple name.
    pub name: u32,
    /// `#Strings` index of the namespace.
    pub namespace: u32,
    /// Extends as (table, row); row 0 when absent.
    pub extends: (usize, u32),
    /// First row of this type's field run.
    pub field_list: u32,
    /// First row of this type's method run.
    pub method_list: u32,
}

/// Decoded `Field` row (0x04).
pub struct FieldRow {
    /// `FieldAttributes` bitmask.
    pub flags: u16,
    /// `#Strings` index of the field name.
    pub name: u32,
    /// `#Blob` index of the field signature.
    pub signature: u32,
}

/// Decoded `MethodDef` row (0x06).
pub struct MethodDefRow {
    /// RVA of the method body; 0 for abstract/extern methods.
    pub rva: u32,
    /// `MethodImplAttributes` bitmask.
    pub impl_flags: u16,
    /// `MethodAttributes` bitmask.
    pub flags: u16,
    /// `#Strings` index of the method name.
    pub name: u32,
    /// `#Blob` index of the method signature.
    pub signature: u32,
    /// First row of this method's param run.
    pub param_list: u32,
}

/// Decoded `InterfaceImpl` row (0x09).
pub struct InterfaceImplRow {
    /// Implementing `TypeDef` row.
    pub class: u32,
    /// Implemented interface as (table, row).
    pub interface: (usize, u32),
}

/// Decoded `MemberRef` row (0x0A).
pub struct MemberRefRow {
    /// Parent as (table, row).
    pub class: (usize, u32),
    /// `#Strings` index of the member name.
    pub name: u32,
    /// `#Blob` index of the member signature.
    pub signature: u32,
}

/// Decoded `StandAloneSig` row (0x11).
pub struct StandAloneSigRow {
    /// `#Blob` index of the signature.
    pub signature: u32,
}

/// Decoded `Assembly` row (0x20).
pub struct AssemblyRow {
    /// `#Strings` index of the assembly simple name.
    pub name: u32,
}

/// Decoded `AssemblyRef` row (0x23).
pub struct AssemblyRefRow {
    /// `#Strings` index of the referenced assembly's simple name.
    pub name: u32,
}

impl<'a> Tables<'a> {
    /// Reads the `Module` row.
    ///
    /// # Errors
    /// Returns an error if the row does not exist or is truncated.
    pub fn module(&self, row: u32) -> Result<ModuleRow> {
        let mut p = self.row(table::MODULE, row)?;
        let _generation = p.read_le::<u16>()?;
        let name = self.read_string(&mut p)?;
        Ok(ModuleRow { name })
    }

    /// Reads a `TypeRef` row.
    ///
    /// # Errors
    /// Returns an error if the row does not exist or is truncated.
    pub fn type_ref(&self, row: u32) -> Result<TypeRefRow> {
        let mut p = self.row(table::TYPE_REF, row)?;
        let resolution_scope = self.read_coded(&mut p, CodedIndex::ResolutionScope)?;
        let name = self.read_string(&mut p)?;
        let namespace = self.read_string(&mut p)?;
        Ok(TypeRefRow {
            resolution_scope,
            name,
            namespace,
        })
    }

    /// Reads a `TypeDef` row.
    ///
    /// # Errors
    /// Returns an error if the row does not exist or is truncated.
    pub fn type_def(&self, row: u32) -> Result<TypeDefRow> {
        let mut p = self.row(table::TYPE_DEF, row)?;
        let flags = p.read_le::<u32>()?;
        let name = self.read_string(&mut p)?;
        let namespace = self.read_string(&mut p)?;
        let extends = self.read_coded(&mut p, CodedIndex::TypeDefOrRef)?;
        let field_list = self.read_table_index(&mut p, table::FIELD)?;
        let method_list = self.read_table_index(&mut p, table::METHOD_DEF)?;
        Ok(TypeDefRow {
            flags,
            name,
            namespace,
            extends,
            field_list,
            method_list,
        })
    }

    /// Reads a `Field` row.
    ///
    /// # Errors
    /// Returns an error if the row does not exist or is truncated.
    pub fn field(&self, row: u32) -> Result<FieldRow> {
        let mut p = self.row(table::FIELD, row)?;
        let flags = p.read_le::<u16>()?;
        let name = self.read_string(&mut p)?;
        let signature = self.read_blob(&mut p)?;
        Ok(FieldRow {
            flags,
            name,
            signature,
        })
    }

    /// Reads a `MethodDef` row.
    ///
    /// # Errors
    /// Returns an error if the row does not exist or is truncated.
    pub fn method_def(&self, row: u32) -> Result<MethodDefRow> {
        let mut p = self.row(table::METHOD_DEF, row)?;
        let rva = p.read_le::<u32>()?;
        let impl_flags = p.read_le::<u16>()?;
        let flags = p.read_le::<u16>()?;
        let name = self.read_string(&mut p)?;
        let signature = self.read_blob(&mut p)?;
        let param_list = self.read_table_index(&mut p, table::PARAM)?;
        Ok(MethodDefRow {
            rva,
            impl_flags,
            flags,
            name,
            signature,
            param_list,
        })
    }

    /// Reads an `InterfaceImpl` row.
    ///
    /// # Errors
    /// Returns an error if the row does not exist or is truncated.
    pub fn interface_impl(&self, row: u32) -> Result<InterfaceImplRow> {
        let mut p = self.row(table::INTERFACE_IMPL, row)?;
        let class = self.read_table_index(&mut p, table::TYPE_DEF)?;
        let interface = self.read_coded(&mut p, CodedIndex::TypeDefOrRef)?;
        Ok(InterfaceImplRow { class, interface })
    }

    /// Reads a `MemberRef` row.
    ///
    /// # Errors
    /// Returns an error if the row does not exist or is truncated.
    pub fn member_ref(&self, row: u32) -> Result<MemberRefRow> {
        let mut p = self.row(table::MEMBER_REF, row)?;
        let class = self.read_coded(&mut p, CodedIndex::MemberRefParent)?;
        let name = self.read_string(&mut p)?;
        let signature = self.read_blob(&mut p)?;
        Ok(MemberRefRow {
            class,
            name,
            signature,
        })
    }

    /// Reads a `StandAloneSig` row.
    ///
    /// # Errors
    /// Returns an error if the row does not exist or is truncated.
    pub fn stand_alone_sig(&self, row: u32) -> Result<StandAloneSigRow> {
        let mut p = self.row(table::STAND_ALONE_SIG, row)?;
        let signature = self.read_blob(&mut p)?;
        Ok(StandAloneSigRow { signature })
    }

    /// Reads the `Assembly` row.
    ///
    /// # Errors
    /// Returns an error if the row does not exist or is truncated.
    pub fn assembly(&self, row: u32) -> Result<AssemblyRow> {
        let mut p = self.row(table::ASSEMBLY, row)?;
        let _hash_alg = p.read_le::<u32>()?;
        let _version = (
            p.read_le::<u16>()?,
            p.read_le::<u16>()?,
            p.read_le::<u16>()?,
            p.read_le::<u16>()?,
        );
        let _flags = p.read_le::<u32>()?;
        let _public_key = self.read_blob(&mut p)?;
        let name = self.read_string(&mut p)?;
        Ok(AssemblyRow { name })
    }

    /// Reads an `AssemblyRef` row.
    ///
    /// # Errors
    /// Returns an error if the row does not exist or is truncated.
    pub fn assembly_ref(&self, row: u32) -> Result<AssemblyRefRow> {
        let mut p = self.row(table::ASSEMBLY_REF, row)?;
        let _version = (
            p.read_le::<u16>()?,
            p.read_le::<u16>()?,
            p.read_le::<u16>()?,
            p.read_le::<u16>()?,
        );
        let _flags = p.read_le::<u32>()?;
        let _public_key_or_token = self.read_blob(&mut p)?;
        let name = self.read_string(&mut p)?;
        Ok(AssemblyRefRow { name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coded_index_decode() {
        // TypeDefOrRef: tag 1 = TypeRef, row = value >> 2
        let (table, row) = CodedIndex::TypeDefOrRef.decode(0x0D);
        assert_eq!(table, table::TYPE_REF);
        assert_eq!(row, 3);

        // ResolutionScope: tag 2 = AssemblyRef
        let (table, row) = CodedIndex::ResolutionScope.decode(0x06);
        assert_eq!(table, table::ASSEMBLY_REF);
        assert_eq!(row, 1);
    }

    #[test]
    fn empty_stream_rejected() {
        assert!(Tables::parse(&[]).is_err());
    }

    fn minimal_stream() -> Vec<u8> {
        // Header with only the Module table (1 row), narrow heaps
        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_le_bytes()); // reserved
        data.push(2); // major
        data.push(0); // minor
        data.push(0); // heap sizes (all narrow)
        data.push(1); // reserved
        data.extend_from_slice(&1u64.to_le_bytes()); // valid: Module only
        data.extend_from_slice(&0u64.to_le_bytes()); // sorted
        data.extend_from_slice(&1u32.to_le_bytes()); // Module row count
                                                     // Module row: generation u16, name S2, mvid G2, encid G2, encbaseid G2
        data.extend_from_slice(&[0, 0, 0x05, 0, 1, 0, 0, 0, 0, 0]);
        data
    }

    #[test]
    fn module_row_parses() {
        let data = minimal_stream();
        let tables = Tables::parse(&data).unwrap();
        assert_eq!(tables.row_count(table::MODULE), 1);
        assert_eq!(tables.row_count(table::TYPE_DEF), 0);

        let module = tables.module(1).unwrap();
        assert_eq!(module.name, 0x05);
        assert!(tables.module(2).is_err());
    }
}
