//! ZIP container reading and writing.
//!
//! Java archives are ZIP files. This module implements just the parts of the
//! format the protection pipeline needs:
//!
//! - [`ZipReader`] walks the local headers front to back, the way a streaming
//!   JAR reader does, inflating and CRC-checking every entry. The central
//!   directory is never consulted, so archives whose central directory is
//!   damaged still read as long as their local headers are intact.
//! - [`ZipWriter`] emits local headers with sizes and CRC filled in (no data
//!   descriptors), a central directory and the end-of-central-directory
//!   record.
//!
//! Only the STORED (0) and DEFLATED (8) methods are supported. ZIP64 sizes
//! are understood on input; output never needs them because a run fails
//! with [`Error::UnsupportedFeature`] before a limit would be crossed.

mod reader;
mod writer;

use std::fmt;

pub use reader::{ZipEntry, ZipReader};
pub use writer::{WriteSummary, WrittenEntry, ZipWriter};

use crate::{Error, Result};

/// Record signatures.
pub mod signature {
    /// Local file header.
    pub const LOCAL_FILE_HEADER: u32 = 0x0403_4b50;
    /// Central directory file header.
    pub const CENTRAL_DIRECTORY: u32 = 0x0201_4b50;
    /// End of central directory record.
    pub const END_OF_CENTRAL_DIRECTORY: u32 = 0x0605_4b50;
    /// ZIP64 end of central directory record.
    pub const ZIP64_END_OF_CENTRAL_DIRECTORY: u32 = 0x0606_4b50;
    /// ZIP64 end of central directory locator.
    pub const ZIP64_LOCATOR: u32 = 0x0706_4b50;
    /// Optional signature preceding a data descriptor.
    pub const DATA_DESCRIPTOR: u32 = 0x0807_4b50;
}

/// General purpose bit flags.
pub mod flags {
    /// Entry data is encrypted.
    pub const ENCRYPTED: u16 = 0x0001;
    /// CRC and sizes follow the data in a data descriptor.
    pub const DATA_DESCRIPTOR: u16 = 0x0008;
    /// File name is UTF-8.
    pub const UTF8: u16 = 0x0800;
}

/// Extra field header IDs.
pub mod extra {
    /// ZIP64 extended information.
    pub const ZIP64: u16 = 0x0001;
    /// JAR marker written on the first entry of a Java archive.
    pub const JAR_MAGIC: u16 = 0xCAFE;
}

/// Size of the fixed part of a local file header.
pub(crate) const LOCAL_HEADER_LEN: usize = 30;

/// Compression method of a ZIP entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    /// Uncompressed.
    Stored,
    /// Raw deflate.
    Deflated,
}

impl CompressionMethod {
    /// Parses a method number from an entry header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedMethod`] for anything but 0 and 8.
    pub fn from_u16(method: u16) -> Result<Self> {
        match method {
            0 => Ok(Self::Stored),
            8 => Ok(Self::Deflated),
            other => Err(Error::UnsupportedMethod { method: other }),
        }
    }

    /// Returns the method number written to headers.
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflated => 8,
        }
    }

    /// Returns the "version needed to extract" for this method.
    pub const fn version_needed(self) -> u16 {
        match self {
            Self::Stored => 10,
            Self::Deflated => 20,
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stored => f.write_str("stored"),
            Self::Deflated => f.write_str("deflated"),
        }
    }
}
