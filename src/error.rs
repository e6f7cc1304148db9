//! Error types for archive protection runs.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes of a protection run, along with a convenient
//! [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! A run is all-or-nothing: every variant below aborts the run, except where
//! the documentation of an operation says a condition is tolerated (a shim
//! class of unexpected shape is passed through unpatched, and duplicate
//! resource paths outside the mergeable kinds are resolved last-write-wins).
//!
//! ```rust,no_run
//! use jarcloak::{ArchivePolicy, Error, PipelineMode, Protector};
//! use jarcloak::trace::NoTrace;
//!
//! fn run(encoder: &dyn jarcloak::EncodeHook) -> jarcloak::Result<()> {
//!     let policy = ArchivePolicy::new("com/acme");
//!     let protector = Protector::new(&policy, encoder);
//!     match protector.protect_file("app.jar", "app-enc.jar", PipelineMode::Streaming, &mut NoTrace) {
//!         Ok(stats) => {
//!             println!("encoded {} classes", stats.encoded);
//!             Ok(())
//!         }
//!         Err(Error::MissingManifestAttribute { attribute }) => {
//!             eprintln!("manifest has no {attribute}");
//!             Err(Error::MissingManifestAttribute { attribute })
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! # fn main() {}
//! ```

use std::io;
use std::path::PathBuf;

/// Helper struct for formatting CrcMismatch error messages.
struct CrcMismatchDisplay<'a> {
    path: &'a str,
    expected: u32,
    actual: u32,
}

impl std::fmt::Display for CrcMismatchDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CRC mismatch for entry '{}': expected {:#010x}, got {:#010x}",
            self.path, self.expected, self.actual
        )
    }
}

/// The main error type for archive protection.
///
/// # Error Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io] | File system operations |
/// | Archive | [`InvalidFormat`][Self::InvalidFormat], [`CorruptEntry`][Self::CorruptEntry], [`CrcMismatch`][Self::CrcMismatch] | Malformed or truncated archive |
/// | Compatibility | [`UnsupportedMethod`][Self::UnsupportedMethod], [`UnsupportedFeature`][Self::UnsupportedFeature] | Encrypted entries, exotic methods, ZIP64 output |
/// | Input | [`InvalidEntryPath`][Self::InvalidEntryPath], [`DuplicateEntry`][Self::DuplicateEntry], [`MissingManifestAttribute`][Self::MissingManifestAttribute] | Archive content the run cannot process |
/// | Output | [`OutputOverwritesInput`][Self::OutputOverwritesInput] | Output path resolves to the input file |
/// | Bytecode | [`InvalidClassFile`][Self::InvalidClassFile], [`PatchFailed`][Self::PatchFailed] | Shim class cannot be rewritten |
/// | Hooks | [`EncodeFailed`][Self::EncodeFailed], [`MissingDecodeHelper`][Self::MissingDecodeHelper] | External encoder or decode helper problems |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading the input or writing the output.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input is not a ZIP-family archive.
    #[error("Invalid archive format: {0}")]
    InvalidFormat(String),

    /// An entry header or its data is corrupt or truncated.
    ///
    /// The offset is relative to the start of the archive level being read
    /// (nested archives report offsets inside their own bytes).
    #[error("Corrupt entry at offset {offset:#x}: {reason}")]
    CorruptEntry {
        /// The byte offset where corruption was detected.
        offset: u64,
        /// A description of the corruption.
        reason: String,
    },

    /// An entry uses a compression method other than STORED or DEFLATED.
    #[error("Unsupported compression method: {method}")]
    UnsupportedMethod {
        /// The ZIP method number found in the entry header.
        method: u16,
    },

    /// The archive needs a feature this crate does not implement.
    #[error("Unsupported feature: {feature}")]
    UnsupportedFeature {
        /// The name of the unsupported feature.
        feature: &'static str,
    },

    /// The CRC-32 of an inflated entry does not match its header.
    #[error("{}", CrcMismatchDisplay { path: path.as_str(), expected: *expected, actual: *actual })]
    CrcMismatch {
        /// The entry path.
        path: String,
        /// The CRC recorded in the archive.
        expected: u32,
        /// The CRC of the data actually read.
        actual: u32,
    },

    /// The same path was written twice to one archive level.
    #[error("Duplicate entry: {path}")]
    DuplicateEntry {
        /// The duplicated path.
        path: String,
    },

    /// An entry path cannot be used as a key (NUL byte, empty or `..` segment).
    #[error("Invalid entry path: {0}")]
    InvalidEntryPath(String),

    /// The output path resolves to the input archive.
    #[error("Output {} would overwrite the input archive", path.display())]
    OutputOverwritesInput {
        /// The offending output path.
        path: PathBuf,
    },

    /// The top-level manifest lacks an attribute the run depends on.
    ///
    /// The two-pass mode needs `Main-Class` to decide whether the archive is
    /// an application-container archive that must be flattened.
    #[error("Manifest attribute missing: {attribute}")]
    MissingManifestAttribute {
        /// The attribute name.
        attribute: &'static str,
    },

    /// A class file could not be parsed or serialized.
    #[error("Invalid class file at offset {offset:#x}: {reason}")]
    InvalidClassFile {
        /// The byte offset inside the class file.
        offset: usize,
        /// A description of the problem.
        reason: String,
    },

    /// The shim class was recognized but the rewrite could not be applied.
    #[error("Cannot patch '{path}': {reason}")]
    PatchFailed {
        /// The class entry path (or method) being patched.
        path: String,
        /// Why the rewrite failed.
        reason: String,
    },

    /// The external encode hook failed for an entry.
    ///
    /// Never retried: the transform is not assumed to be idempotent.
    #[error("Encode hook failed for '{path}': {reason}")]
    EncodeFailed {
        /// The class entry path.
        path: String,
        /// The hook's error message.
        reason: String,
    },

    /// A weak-strength patch was injected but no decode helper class is
    /// present in the archive or configured on the policy.
    #[error("Decode helper class '{path}' is not in the archive and none was configured")]
    MissingDecodeHelper {
        /// The helper class entry path.
        path: String,
    },
}

/// A specialized Result type for protection operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Builds an [`Error::InvalidClassFile`].
    pub(crate) fn class_file(offset: usize, reason: impl Into<String>) -> Self {
        Self::InvalidClassFile {
            offset,
            reason: reason.into(),
        }
    }

    /// Builds an [`Error::CorruptEntry`].
    pub(crate) fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        Self::CorruptEntry {
            offset: offset as u64,
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error describes malformed archive input.
    pub fn is_archive_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFormat(_)
                | Self::CorruptEntry { .. }
                | Self::CrcMismatch { .. }
                | Self::UnsupportedMethod { .. }
                | Self::UnsupportedFeature { .. }
        )
    }
}
