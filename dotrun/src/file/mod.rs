//! PE file handling for .NET assemblies.
//!
//! This module provides the physical layer under the metadata system: it
//! loads a PE32/PE32+ image, validates that a CLI runtime header is present,
//! and translates relative virtual addresses to file offsets through the
//! section table. Header parsing is delegated to `goblin`; the handful of
//! fields the interpreter needs are copied into owned structures so no
//! borrow of the parse survives.
//!
//! # References
//!
//! - Microsoft PE/COFF Specification
//! - ECMA-335 6th Edition, Partition II, Section 25 - File Format Extensions

pub mod parser;

use std::{fs, path::Path};

use goblin::pe::PE;
use memmap2::Mmap;

use crate::{
    Error::{Empty, NotSupported},
    Result,
};

/// An owned copy of the section-table fields needed for address translation.
#[derive(Debug, Clone)]
pub struct Section {
    /// Section name (trailing NULs stripped).
    pub name: String,
    /// RVA at which the section is mapped.
    pub virtual_address: u32,
    /// Size of the section once mapped.
    pub virtual_size: u32,
    /// File offset of the section's raw data.
    pub pointer_to_raw_data: u32,
    /// Size of the raw data on disk.
    pub size_of_raw_data: u32,
}

/// The CLI (Cor20) header of a .NET image.
///
/// Only the fields consumed by the loader are retained; the remainder of the
/// 72-byte structure (resources, strong name, vtable fixups) is skipped.
#[derive(Debug, Clone, Copy)]
pub struct CliHeader {
    /// RVA of the physical metadata (the `BSJB` root).
    pub metadata_rva: u32,
    /// Size of the physical metadata in bytes.
    pub metadata_size: u32,
    /// Runtime flags (`COMIMAGE_FLAGS_*`).
    pub flags: u32,
    /// Metadata token of the entry-point method, 0 for a library.
    pub entry_point_token: u32,
}

enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Backing {
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::Mapped(map) => map,
            Backing::Owned(vec) => vec,
        }
    }
}

/// A loaded PE file with .NET metadata.
///
/// `File` is the entry point of the physical layer. Construction validates
/// that the image is a PE with a CLR runtime header; anything else is
/// rejected with [`NotSupported`]. The struct owns its bytes (memory-mapped
/// for on-disk files) and exposes bounds-checked slicing plus RVA
/// translation.
///
/// # Examples
///
/// ```rust,no_run
/// use dotrun::File;
/// use std::path::Path;
///
/// let file = File::from_file(Path::new("program.exe"))?;
/// let cli = file.cli();
/// println!("metadata at RVA 0x{:x}, {} bytes", cli.metadata_rva, cli.metadata_size);
/// # Ok::<(), dotrun::Error>(())
/// ```
pub struct File {
    data: Backing,
    is_64bit: bool,
    sections: Vec<Section>,
    cli: CliHeader,
}

impl File {
    /// Loads a PE file from the given path.
    ///
    /// The file is memory-mapped for efficient access.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the PE file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid PE, or has
    /// no CLR runtime header.
    pub fn from_file(path: &Path) -> Result<File> {
        let handle = fs::File::open(path)?;
        // SAFETY: the mapping is read-only and lives as long as `File`; the
        // interpreter never writes the backing file while it is loaded.
        let map = unsafe { Mmap::map(&handle)? };
        Self::load(Backing::Mapped(map))
    }

    /// Loads a PE file from a memory buffer.
    ///
    /// # Arguments
    ///
    /// * `data` - The bytes of the PE file.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is empty, not valid PE, or has no CLR
    /// runtime header.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        Self::load(Backing::Owned(data))
    }

    fn load(data: Backing) -> Result<File> {
        if data.bytes().is_empty() {
            return Err(Empty);
        }

        let pe = PE::parse(data.bytes())?;
        let optional = pe.header.optional_header.ok_or(NotSupported)?;

        let clr_dir = *optional
            .data_directories
            .get_clr_runtime_header()
            .ok_or(NotSupported)?;
        if clr_dir.virtual_address == 0 || clr_dir.size == 0 {
            return Err(NotSupported);
        }

        let sections = pe
            .sections
            .iter()
            .map(|s| Section {
                name: String::from_utf8_lossy(&s.name)
                    .trim_end_matches('\0')
                    .to_string(),
                virtual_address: s.virtual_address,
                virtual_size: s.virtual_size,
                pointer_to_raw_data: s.pointer_to_raw_data,
                size_of_raw_data: s.size_of_raw_data,
            })
            .collect::<Vec<_>>();
        let is_64bit = pe.is_64;

        let cli = {
            let offset = rva_to_offset(&sections, clr_dir.virtual_address)?;
            let mut parser = parser::Parser::new(data.bytes());
            parser.seek(offset)?;

            let cb = parser.read_le::<u32>()?;
            if cb < 72 {
                return Err(malformed_error!("CLI header too small: {} bytes", cb));
            }
            let _major = parser.read_le::<u16>()?;
            let _minor = parser.read_le::<u16>()?;
            let metadata_rva = parser.read_le::<u32>()?;
            let metadata_size = parser.read_le::<u32>()?;
            let flags = parser.read_le::<u32>()?;
            let entry_point_token = parser.read_le::<u32>()?;

            CliHeader {
                metadata_rva,
                metadata_size,
                flags,
                entry_point_token,
            }
        };

        Ok(File {
            data,
            is_64bit,
            sections,
            cli,
        })
    }

    /// Returns the raw bytes of the image.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.bytes()
    }

    /// Returns the total length of the image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.bytes().len()
    }

    /// Returns `true` if the image contains no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.bytes().is_empty()
    }

    /// Returns `true` for a PE32+ image.
    #[must_use]
    pub fn is_64bit(&self) -> bool {
        self.is_64bit
    }

    /// Returns the parsed CLI header.
    #[must_use]
    pub fn cli(&self) -> CliHeader {
        self.cli
    }

    /// Returns the owned section table.
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Translates a relative virtual address to a file offset.
    ///
    /// # Errors
    ///
    /// Returns a malformed error if the RVA falls outside every section.
    pub fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        rva_to_offset(&self.sections, rva)
    }

    /// Returns `len` bytes starting at the given file offset.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = offset.checked_add(len).ok_or(crate::Error::OutOfBounds)?;
        if end > self.data.bytes().len() {
            return Err(crate::Error::OutOfBounds);
        }
        Ok(&self.data.bytes()[offset..end])
    }
}

fn rva_to_offset(sections: &[Section], rva: u32) -> Result<usize> {
    for section in sections {
        let size = section.virtual_size.max(section.size_of_raw_data);
        if rva >= section.virtual_address && rva < section.virtual_address + size {
            return Ok((rva - section.virtual_address + section.pointer_to_raw_data) as usize);
        }
    }

    Err(malformed_error!(
        "RVA 0x{:X} is not covered by any section",
        rva
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(name: &str, va: u32, vsize: u32, raw: u32, raw_size: u32) -> Section {
        Section {
            name: name.to_string(),
            virtual_address: va,
            virtual_size: vsize,
            pointer_to_raw_data: raw,
            size_of_raw_data: raw_size,
        }
    }

    #[test]
    fn rva_translation() {
        let sections = vec![
            section(".text", 0x2000, 0x1000, 0x200, 0x1000),
            section(".rsrc", 0x4000, 0x300, 0x1200, 0x400),
        ];

        assert_eq!(rva_to_offset(&sections, 0x2000).unwrap(), 0x200);
        assert_eq!(rva_to_offset(&sections, 0x2050).unwrap(), 0x250);
        assert_eq!(rva_to_offset(&sections, 0x4100).unwrap(), 0x1300);
        assert!(rva_to_offset(&sections, 0x8000).is_err());
    }

    #[test]
    fn empty_input_rejected() {
        assert!(matches!(File::from_mem(Vec::new()), Err(Empty)));
    }

    #[test]
    fn garbage_input_rejected() {
        assert!(File::from_mem(vec![0u8; 64]).is_err());
    }
}
