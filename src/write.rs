//! Output archive assembly.
//!
//! [`ArchiveWriter`] wraps [`ZipWriter`] with the layout rules of a Java
//! archive: the manifest comes first, nested archives under a library
//! directory are stored uncompressed (the container reads them in place),
//! and directories are written at most once.

use std::io::Write;

use log::debug;

use crate::entry_path::MANIFEST_PATH;
use crate::store::EntryStore;
use crate::timestamp::DosDateTime;
use crate::zip::{CompressionMethod, WriteSummary, WrittenEntry, ZipWriter};
use crate::{EntryPath, Result};

/// How an entry's data is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMethod {
    /// Uncompressed, with CRC and sizes in the local header.
    Stored,
    /// Deflate-compressed.
    Deflated,
}

impl StorageMethod {
    /// Chooses the method for `path`.
    ///
    /// Nested archives under `BOOT-INF/lib/` or `WEB-INF/lib/` are stored;
    /// everything else is deflated.
    ///
    /// ```
    /// use jarcloak::EntryPath;
    /// use jarcloak::write::StorageMethod;
    ///
    /// let lib = EntryPath::new("BOOT-INF/lib/x.jar").unwrap();
    /// let other = EntryPath::new("plugins/x.jar").unwrap();
    /// assert_eq!(StorageMethod::for_entry(&lib), StorageMethod::Stored);
    /// assert_eq!(StorageMethod::for_entry(&other), StorageMethod::Deflated);
    /// ```
    pub fn for_entry(path: &EntryPath) -> Self {
        if path.is_nested_archive() && path.is_under_library_dir() {
            Self::Stored
        } else {
            Self::Deflated
        }
    }
}

impl From<StorageMethod> for CompressionMethod {
    fn from(method: StorageMethod) -> Self {
        match method {
            StorageMethod::Stored => Self::Stored,
            StorageMethod::Deflated => Self::Deflated,
        }
    }
}

/// Writes one output archive level.
#[derive(Debug)]
pub struct ArchiveWriter<W: Write> {
    zip: ZipWriter<W>,
    parent_dirs: bool,
}

impl<W: Write> ArchiveWriter<W> {
    /// Creates a writer deflating at `level`.
    pub fn new(out: W, level: u32) -> Self {
        Self {
            zip: ZipWriter::new(out, level),
            parent_dirs: false,
        }
    }

    /// Writes missing parent directory entries before each entry.
    pub fn with_parent_dirs(mut self, enabled: bool) -> Self {
        self.parent_dirs = enabled;
        self
    }

    /// Returns `true` if `path` was already written.
    pub fn contains(&self, path: &EntryPath) -> bool {
        self.zip.contains(path)
    }

    /// Returns the number of entries written so far.
    pub fn len(&self) -> usize {
        self.zip.len()
    }

    /// Returns `true` if nothing was written yet.
    pub fn is_empty(&self) -> bool {
        self.zip.is_empty()
    }

    /// Writes `META-INF/` and `META-INF/MANIFEST.MF`.
    ///
    /// Must be the first call so the manifest leads the archive.
    pub fn write_manifest(&mut self, manifest: &[u8], modified: DosDateTime) -> Result<()> {
        let path = EntryPath::new(MANIFEST_PATH)?;
        for dir in path.parent_dirs() {
            self.write_directory(&dir, modified)?;
        }
        self.zip
            .add_entry(&path, manifest, CompressionMethod::Deflated, modified)?;
        Ok(())
    }

    /// Writes a directory entry unless it already exists.
    pub fn write_directory(&mut self, path: &EntryPath, modified: DosDateTime) -> Result<()> {
        if self.parent_dirs {
            self.write_parents(path, modified)?;
        }
        if self.zip.contains(path) {
            return Ok(());
        }
        self.zip.add_directory(path, modified)
    }

    fn write_parents(&mut self, path: &EntryPath, modified: DosDateTime) -> Result<()> {
        for dir in path.parent_dirs() {
            if !self.zip.contains(&dir) {
                self.zip.add_directory(&dir, modified)?;
            }
        }
        Ok(())
    }

    /// Writes a file entry with the method chosen by
    /// [`StorageMethod::for_entry`].
    ///
    /// # Errors
    ///
    /// Writing a path twice is [`Error::DuplicateEntry`](crate::Error::DuplicateEntry).
    pub fn write_entry(
        &mut self,
        path: &EntryPath,
        data: &[u8],
        modified: DosDateTime,
    ) -> Result<WrittenEntry> {
        if self.parent_dirs {
            self.write_parents(path, modified)?;
        }
        let method = StorageMethod::for_entry(path);
        let written = self.zip.add_entry(path, data, method.into(), modified)?;
        if method == StorageMethod::Stored {
            debug!(
                "stored {path}: {} bytes, crc {:#010x}",
                written.size, written.crc32
            );
        }
        Ok(written)
    }

    /// Writes every entry of `store` in order. Directories already written
    /// are skipped.
    pub fn write_store(&mut self, store: &EntryStore) -> Result<()> {
        for entry in store {
            if entry.path.is_directory() {
                self.write_directory(&entry.path, entry.modified)?;
            } else {
                self.write_entry(&entry.path, &entry.data, entry.modified)?;
            }
        }
        Ok(())
    }

    /// Writes the central directory and returns the sink.
    pub fn finish(self) -> Result<(W, WriteSummary)> {
        self.zip.finish()
    }
}
