//! ZIP archive writer.

use std::collections::HashSet;
use std::io::Write;

use super::{CompressionMethod, extra, flags, signature};
use crate::checksum::{Checksum, Crc32};
use crate::codec;
use crate::timestamp::DosDateTime;
use crate::{EntryPath, Error, Result};

/// "Version made by": MS-DOS host, spec version 2.0.
const VERSION_MADE_BY: u16 = 20;

/// External attribute bit marking a directory (MS-DOS).
const DOS_DIRECTORY_ATTRIBUTE: u32 = 0x10;

/// Extra field emitted on the first entry of a Java archive.
const JAR_MARKER: [u8; 4] = {
    let id = extra::JAR_MAGIC.to_le_bytes();
    [id[0], id[1], 0, 0]
};

/// Header values recorded for one written entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenEntry {
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Uncompressed size.
    pub size: u64,
    /// Size of the data as stored in the archive.
    pub compressed_size: u64,
    /// Method the data was stored with.
    pub method: CompressionMethod,
}

/// Totals reported when an archive is finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Number of entries written (directories included).
    pub entries: usize,
    /// Total archive size in bytes.
    pub bytes: u64,
}

#[derive(Debug)]
struct CentralRecord {
    name: String,
    method: CompressionMethod,
    modified: DosDateTime,
    crc32: u32,
    compressed_size: u32,
    size: u32,
    offset: u32,
    extra: Vec<u8>,
    directory: bool,
}

/// Writes a ZIP archive entry by entry.
///
/// Every local header carries the final CRC and sizes, so no data
/// descriptors are emitted. Writing the same path twice is an error.
///
/// # Example
///
/// ```
/// use jarcloak::zip::{CompressionMethod, ZipWriter};
/// use jarcloak::{DosDateTime, EntryPath};
///
/// let mut writer = ZipWriter::new(Vec::new(), 6);
/// let lib = EntryPath::new("BOOT-INF/lib/x.jar").unwrap();
/// let written = writer
///     .add_entry(&lib, b"PK\x05\x06", CompressionMethod::Stored, DosDateTime::EPOCH)
///     .unwrap();
/// assert_eq!(written.size, written.compressed_size);
/// let (bytes, summary) = writer.finish().unwrap();
/// assert_eq!(summary.entries, 1);
/// assert_eq!(summary.bytes, bytes.len() as u64);
/// ```
#[derive(Debug)]
pub struct ZipWriter<W: Write> {
    out: W,
    offset: u64,
    level: u32,
    records: Vec<CentralRecord>,
    names: HashSet<String>,
}

impl<W: Write> ZipWriter<W> {
    /// Creates a writer.
    ///
    /// # Arguments
    ///
    /// * `out` - Destination for archive bytes
    /// * `level` - Deflate level for [`CompressionMethod::Deflated`] entries
    pub fn new(out: W, level: u32) -> Self {
        Self {
            out,
            offset: 0,
            level: level.min(9),
            records: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// Returns the number of entries written so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no entry has been written yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns `true` if `path` has already been written.
    pub fn contains(&self, path: &EntryPath) -> bool {
        self.names.contains(path.as_str())
    }

    /// Writes a directory entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEntryPath`] if `path` is not a directory path
    /// and [`Error::DuplicateEntry`] if it was already written.
    pub fn add_directory(&mut self, path: &EntryPath, modified: DosDateTime) -> Result<()> {
        if !path.is_directory() {
            return Err(Error::InvalidEntryPath(format!(
                "{path}: directory entries must end with '/'"
            )));
        }
        self.write_record(path, &[], 0, CompressionMethod::Stored, 0, modified)?;
        Ok(())
    }

    /// Writes a file entry.
    ///
    /// The CRC and both sizes are computed here and written into the local
    /// header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateEntry`] for a repeated path,
    /// [`Error::UnsupportedFeature`] if the entry or archive would need ZIP64,
    /// or an I/O error from the destination.
    pub fn add_entry(
        &mut self,
        path: &EntryPath,
        data: &[u8],
        method: CompressionMethod,
        modified: DosDateTime,
    ) -> Result<WrittenEntry> {
        let crc32 = Crc32::compute(data);
        let compressed;
        let stored: &[u8] = match method {
            CompressionMethod::Stored => data,
            CompressionMethod::Deflated => {
                compressed = codec::deflate(data, self.level)?;
                &compressed
            }
        };
        self.write_record(path, stored, data.len() as u64, method, crc32, modified)?;
        Ok(WrittenEntry {
            crc32,
            size: data.len() as u64,
            compressed_size: stored.len() as u64,
            method,
        })
    }

    fn write_record(
        &mut self,
        path: &EntryPath,
        stored: &[u8],
        size: u64,
        method: CompressionMethod,
        crc32: u32,
        modified: DosDateTime,
    ) -> Result<()> {
        if self.names.contains(path.as_str()) {
            return Err(Error::DuplicateEntry {
                path: path.to_string(),
            });
        }
        if self.records.len() >= usize::from(u16::MAX) {
            return Err(Error::UnsupportedFeature {
                feature: "more than 65535 entries (ZIP64)",
            });
        }
        let offset = fits_u32(self.offset, "archive larger than 4 GiB (ZIP64)")?;
        let size = fits_u32(size, "entry larger than 4 GiB (ZIP64)")?;
        let compressed_size = fits_u32(stored.len() as u64, "entry larger than 4 GiB (ZIP64)")?;

        let name = path.as_str();
        let name_len = u16::try_from(name.len()).map_err(|_| {
            Error::InvalidEntryPath(format!("{name}: name longer than 65535 bytes"))
        })?;
        let extra_field = if self.records.is_empty() {
            JAR_MARKER.to_vec()
        } else {
            Vec::new()
        };

        let mut header = Vec::with_capacity(super::LOCAL_HEADER_LEN + name.len() + extra_field.len());
        header.extend_from_slice(&signature::LOCAL_FILE_HEADER.to_le_bytes());
        header.extend_from_slice(&method.version_needed().to_le_bytes());
        header.extend_from_slice(&flags::UTF8.to_le_bytes());
        header.extend_from_slice(&method.as_u16().to_le_bytes());
        header.extend_from_slice(&modified.time().to_le_bytes());
        header.extend_from_slice(&modified.date().to_le_bytes());
        header.extend_from_slice(&crc32.to_le_bytes());
        header.extend_from_slice(&compressed_size.to_le_bytes());
        header.extend_from_slice(&size.to_le_bytes());
        header.extend_from_slice(&name_len.to_le_bytes());
        header.extend_from_slice(&(extra_field.len() as u16).to_le_bytes());
        header.extend_from_slice(name.as_bytes());
        header.extend_from_slice(&extra_field);

        self.out.write_all(&header)?;
        self.out.write_all(stored)?;
        self.offset += (header.len() + stored.len()) as u64;

        self.names.insert(name.to_string());
        self.records.push(CentralRecord {
            name: name.to_string(),
            method,
            modified,
            crc32,
            compressed_size,
            size,
            offset,
            extra: extra_field,
            directory: path.is_directory(),
        });
        Ok(())
    }

    /// Writes the central directory and end record, returning the
    /// destination.
    pub fn finish(mut self) -> Result<(W, WriteSummary)> {
        let cd_offset = fits_u32(self.offset, "archive larger than 4 GiB (ZIP64)")?;
        let mut central = Vec::new();
        for record in &self.records {
            central.extend_from_slice(&signature::CENTRAL_DIRECTORY.to_le_bytes());
            central.extend_from_slice(&VERSION_MADE_BY.to_le_bytes());
            central.extend_from_slice(&record.method.version_needed().to_le_bytes());
            central.extend_from_slice(&flags::UTF8.to_le_bytes());
            central.extend_from_slice(&record.method.as_u16().to_le_bytes());
            central.extend_from_slice(&record.modified.time().to_le_bytes());
            central.extend_from_slice(&record.modified.date().to_le_bytes());
            central.extend_from_slice(&record.crc32.to_le_bytes());
            central.extend_from_slice(&record.compressed_size.to_le_bytes());
            central.extend_from_slice(&record.size.to_le_bytes());
            central.extend_from_slice(&(record.name.len() as u16).to_le_bytes());
            central.extend_from_slice(&(record.extra.len() as u16).to_le_bytes());
            // comment length, disk number start, internal attributes
            central.extend_from_slice(&[0; 6]);
            let external: u32 = if record.directory {
                DOS_DIRECTORY_ATTRIBUTE
            } else {
                0
            };
            central.extend_from_slice(&external.to_le_bytes());
            central.extend_from_slice(&record.offset.to_le_bytes());
            central.extend_from_slice(record.name.as_bytes());
            central.extend_from_slice(&record.extra);
        }
        let cd_size = fits_u32(central.len() as u64, "central directory larger than 4 GiB")?;
        let count = self.records.len() as u16;

        central.extend_from_slice(&signature::END_OF_CENTRAL_DIRECTORY.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&count.to_le_bytes());
        central.extend_from_slice(&count.to_le_bytes());
        central.extend_from_slice(&cd_size.to_le_bytes());
        central.extend_from_slice(&cd_offset.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());

        self.out.write_all(&central)?;
        self.out.flush()?;
        let summary = WriteSummary {
            entries: self.records.len(),
            bytes: self.offset + central.len() as u64,
        };
        Ok((self.out, summary))
    }
}

fn fits_u32(value: u64, feature: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::UnsupportedFeature { feature })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::ZipReader;

    fn path(s: &str) -> EntryPath {
        EntryPath::new(s).unwrap()
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut writer = ZipWriter::new(Vec::new(), 6);
        writer
            .add_entry(&path("a.txt"), b"1", CompressionMethod::Deflated, DosDateTime::EPOCH)
            .unwrap();
        let err = writer
            .add_entry(&path("a.txt"), b"2", CompressionMethod::Deflated, DosDateTime::EPOCH)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateEntry { path } if path == "a.txt"));
    }

    #[test]
    fn test_directory_requires_slash() {
        let mut writer = ZipWriter::new(Vec::new(), 6);
        assert!(writer.add_directory(&path("dir"), DosDateTime::EPOCH).is_err());
        assert!(writer.add_directory(&path("dir/"), DosDateTime::EPOCH).is_ok());
        assert!(writer.contains(&path("dir/")));
    }

    #[test]
    fn test_stored_entry_header_fields() {
        let data = b"nested archive bytes";
        let mut writer = ZipWriter::new(Vec::new(), 6);
        let written = writer
            .add_entry(
                &path("WEB-INF/lib/a.jar"),
                data,
                CompressionMethod::Stored,
                DosDateTime::EPOCH,
            )
            .unwrap();
        let (bytes, _) = writer.finish().unwrap();

        assert_eq!(written.crc32, Crc32::compute(data));
        assert_eq!(u16::from_le_bytes([bytes[8], bytes[9]]), 0);
        assert_eq!(
            u32::from_le_bytes([bytes[14], bytes[15], bytes[16], bytes[17]]),
            written.crc32
        );
        assert_eq!(
            u32::from_le_bytes([bytes[18], bytes[19], bytes[20], bytes[21]]),
            data.len() as u32
        );
        assert_eq!(
            u32::from_le_bytes([bytes[22], bytes[23], bytes[24], bytes[25]]),
            data.len() as u32
        );
    }

    #[test]
    fn test_empty_archive_reads_back() {
        let (bytes, summary) = ZipWriter::new(Vec::new(), 6).finish().unwrap();
        assert_eq!(summary.entries, 0);
        assert_eq!(bytes.len(), 22);
        let mut reader = ZipReader::new(&bytes).unwrap();
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_end_record_points_at_central_directory() {
        let mut writer = ZipWriter::new(Vec::new(), 6);
        writer
            .add_entry(&path("x"), b"abc", CompressionMethod::Stored, DosDateTime::EPOCH)
            .unwrap();
        let (bytes, _) = writer.finish().unwrap();
        let eocd = bytes.len() - 22;
        let cd_offset = u32::from_le_bytes([
            bytes[eocd + 16],
            bytes[eocd + 17],
            bytes[eocd + 18],
            bytes[eocd + 19],
        ]) as usize;
        assert_eq!(
            u32::from_le_bytes([
                bytes[cd_offset],
                bytes[cd_offset + 1],
                bytes[cd_offset + 2],
                bytes[cd_offset + 3]
            ]),
            signature::CENTRAL_DIRECTORY
        );
    }
}
