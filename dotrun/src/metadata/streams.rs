//! Physical metadata streams: the `BSJB` root and the heap accessors.
//!
//! A .NET image carries its metadata as a root header followed by named
//! streams. This module parses the root and exposes bounds-checked views
//! over the three heaps the interpreter consumes:
//!
//! - `#Strings` - null-terminated UTF-8 identifier names
//! - `#US` - length-prefixed UTF-16 user string literals (`ldstr`)
//! - `#Blob` - length-prefixed binary blobs (signatures)
//!
//! The `#~` (tables) stream is decoded separately by
//! [`crate::metadata::tables`].
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Section 24 - Metadata Physical Layout

use widestring::Utf16Str;

use crate::{file::parser::Parser, Error::OutOfBounds, Result};

/// Magic signature of the metadata root ("BSJB").
const METADATA_SIGNATURE: u32 = 0x424A_5342;

/// Header of a single named stream within the metadata root.
#[derive(Debug, Clone)]
pub struct StreamHeader {
    /// Offset of the stream, relative to the metadata root.
    pub offset: u32,
    /// Size of the stream in bytes.
    pub size: u32,
    /// Stream name (`#~`, `#Strings`, `#US`, `#GUID`, `#Blob`).
    pub name: String,
}

/// The parsed metadata root: version string and stream directory.
#[derive(Debug)]
pub struct MetadataRoot {
    /// Version string from the root header (e.g. `v4.0.30319`).
    pub version: String,
    /// Stream directory in declaration order.
    pub streams: Vec<StreamHeader>,
}

impl MetadataRoot {
    /// Parses the metadata root from the bytes at the metadata RVA.
    ///
    /// # Errors
    ///
    /// Returns a malformed error if the `BSJB` signature is missing or the
    /// stream directory is truncated.
    pub fn parse(data: &[u8]) -> Result<MetadataRoot> {
        let mut parser = Parser::new(data);

        let signature = parser.read_le::<u32>()?;
        if signature != METADATA_SIGNATURE {
            return Err(malformed_error!(
                "Invalid metadata signature: 0x{:08X}",
                signature
            ));
        }

        let _major = parser.read_le::<u16>()?;
        let _minor = parser.read_le::<u16>()?;
        let _reserved = parser.read_le::<u32>()?;

        let version_len = parser.read_le::<u32>()? as usize;
        let version_bytes = parser.read_slice(version_len)?;
        let version = version_bytes
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect::<String>();

        let _flags = parser.read_le::<u16>()?;
        let stream_count = parser.read_le::<u16>()?;

        let mut streams = Vec::with_capacity(usize::from(stream_count));
        for _ in 0..stream_count {
            let offset = parser.read_le::<u32>()?;
            let size = parser.read_le::<u32>()?;
            let name = parser.read_string_utf8()?;

            // Stream names are padded to a 4-byte boundary including the terminator
            let consumed = name.len() + 1;
            let padding = (4 - (consumed % 4)) % 4;
            parser.advance_by(padding)?;

            streams.push(StreamHeader { offset, size, name });
        }

        Ok(MetadataRoot { version, streams })
    }

    /// Finds a stream header by name.
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&StreamHeader> {
        self.streams.iter().find(|s| s.name == name)
    }
}

/// View over the `#Strings` heap.
///
/// Entries are null-terminated UTF-8; offset 0 is always the empty string.
pub struct Strings<'a> {
    data: &'a [u8],
}

impl<'a> Strings<'a> {
    /// Creates a view over the raw heap bytes.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Strings { data }
    }

    /// Returns the string starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfBounds`] for an offset past the heap, or a malformed
    /// error for invalid UTF-8.
    pub fn get(&self, offset: u32) -> Result<&'a str> {
        let start = offset as usize;
        if start >= self.data.len() {
            return Err(OutOfBounds);
        }

        let end = self.data[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|i| start + i)
            .ok_or(OutOfBounds)?;

        std::str::from_utf8(&self.data[start..end])
            .map_err(|_| malformed_error!("Invalid UTF-8 in #Strings at offset 0x{:X}", offset))
    }
}

/// View over the `#US` heap of user string literals.
///
/// Each entry is an ECMA-335 compressed length followed by UTF-16LE code
/// units and a trailing flag byte.
pub struct UserStrings<'a> {
    data: &'a [u8],
}

impl<'a> UserStrings<'a> {
    /// Creates a view over the raw heap bytes.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        UserStrings { data }
    }

    /// Returns the string literal starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfBounds`] for a truncated entry, or a malformed error
    /// for an odd payload or unpaired surrogates.
    pub fn get(&self, offset: u32) -> Result<String> {
        let mut parser = Parser::new(self.data);
        parser.seek(offset as usize)?;

        let byte_len = parser.read_compressed_u32()? as usize;
        if byte_len == 0 {
            return Ok(String::new());
        }

        // The final byte is a flag, not character data
        let char_bytes = byte_len - 1;
        if char_bytes % 2 != 0 {
            return Err(malformed_error!(
                "Odd #US payload length {} at offset 0x{:X}",
                char_bytes,
                offset
            ));
        }

        let raw = parser.read_slice(char_bytes)?;
        let units = raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect::<Vec<u16>>();

        Utf16Str::from_slice(&units)
            .map(|s| s.to_string())
            .map_err(|_| malformed_error!("Invalid UTF-16 in #US at offset 0x{:X}", offset))
    }
}

/// View over the `#Blob` heap.
pub struct Blob<'a> {
    data: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Creates a view over the raw heap bytes.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Blob { data }
    }

    /// Returns the blob starting at `offset` (without its length prefix).
    ///
    /// # Errors
    ///
    /// Returns [`OutOfBounds`] for a truncated blob.
    pub fn get(&self, offset: u32) -> Result<&'a [u8]> {
        let mut parser = Parser::new(self.data);
        parser.seek(offset as usize)?;

        let len = parser.read_compressed_u32()? as usize;
        parser.read_slice(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_heap() {
        let heap = b"\0Main\0System\0";
        let strings = Strings::new(heap);
        assert_eq!(strings.get(0).unwrap(), "");
        assert_eq!(strings.get(1).unwrap(), "Main");
        assert_eq!(strings.get(6).unwrap(), "System");
        assert!(strings.get(64).is_err());
    }

    #[test]
    fn user_strings_heap() {
        // offset 0: empty entry; offset 1: "Hi" as UTF-16LE + flag byte
        let heap = [0x00, 0x05, b'H', 0x00, b'i', 0x00, 0x00];
        let us = UserStrings::new(&heap);
        assert_eq!(us.get(0).unwrap(), "");
        assert_eq!(us.get(1).unwrap(), "Hi");
    }

    #[test]
    fn blob_heap() {
        let heap = [0x00, 0x03, 0x20, 0x00, 0x01];
        let blob = Blob::new(&heap);
        assert_eq!(blob.get(1).unwrap(), &[0x20, 0x00, 0x01]);
        assert!(blob.get(5).is_err());
    }

    #[test]
    fn root_rejects_bad_signature() {
        let data = [0u8; 32];
        assert!(MetadataRoot::parse(&data).is_err());
    }
}
