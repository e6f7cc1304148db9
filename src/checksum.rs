//! Checksum computation utilities.
//!
//! ZIP entries carry a CRC-32 (IEEE 802.3 polynomial) of their uncompressed
//! data. The reader verifies it for every entry it inflates and the writer
//! records it in both the local header and the central directory.
//!
//! # Example
//!
//! ```rust
//! use jarcloak::checksum::{Checksum, Crc32};
//!
//! let mut crc32 = Crc32::new();
//! crc32.update(b"Hello, ");
//! crc32.update(b"World!");
//! assert_eq!(crc32.finalize(), Crc32::compute(b"Hello, World!"));
//! ```

use crate::{Error, Result};

/// Common trait for checksum computation.
pub trait Checksum: Default + Clone {
    /// The output type of this checksum.
    type Output: Copy + Eq + std::fmt::Debug;

    /// Creates a new checksum calculator.
    fn new() -> Self;

    /// Updates the checksum with additional data.
    fn update(&mut self, data: &[u8]);

    /// Finishes the checksum computation and returns the value.
    fn finalize(&self) -> Self::Output;

    /// Resets the checksum to its initial state.
    fn reset(&mut self);

    /// Computes the checksum of a single slice in one call.
    fn compute(data: &[u8]) -> Self::Output {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }
}

/// CRC-32 checksum calculator.
///
/// # Example
///
/// ```rust
/// use jarcloak::checksum::{Checksum, Crc32};
///
/// let crc = Crc32::compute(b"Hello, World!");
/// assert_eq!(crc, 0xEC4AC3D0);
/// ```
#[derive(Clone)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc32")
            .field("current", &self.hasher.clone().finalize())
            .finish()
    }
}

impl Checksum for Crc32 {
    type Output = u32;

    fn new() -> Self {
        Self {
            hasher: crc32fast::Hasher::new(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    fn reset(&mut self) {
        self.hasher.reset();
    }
}

/// Verifies the CRC-32 of `data` against the value recorded for `path`.
///
/// # Errors
///
/// Returns [`Error::CrcMismatch`] if the computed value differs.
pub fn verify_crc32(path: &str, data: &[u8], expected: u32) -> Result<()> {
    let actual = Crc32::compute(data);
    if actual != expected {
        return Err(Error::CrcMismatch {
            path: path.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}
