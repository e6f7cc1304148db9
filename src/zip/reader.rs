//! Streaming local-header reader.

use log::warn;

use super::{CompressionMethod, LOCAL_HEADER_LEN, extra, flags, signature};
use crate::checksum::verify_crc32;
use crate::codec;
use crate::timestamp::DosDateTime;
use crate::{EntryPath, Error, Result};

/// One fully read and verified archive entry.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    /// Normalized entry path.
    pub path: EntryPath,
    /// Method the entry was stored with.
    pub method: CompressionMethod,
    /// Modification time from the local header.
    pub modified: DosDateTime,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Uncompressed entry data.
    pub data: Vec<u8>,
    /// Offset of the local header within the archive bytes.
    pub offset: u64,
}

impl ZipEntry {
    /// Returns `true` for directory entries.
    pub fn is_directory(&self) -> bool {
        self.path.is_directory()
    }
}

/// Reads entries from an in-memory archive by walking its local headers.
///
/// Reading stops at the first central directory or end record, or when the
/// data ends exactly on an entry boundary.
///
/// # Examples
///
/// ```
/// use jarcloak::zip::{CompressionMethod, ZipReader, ZipWriter};
/// use jarcloak::{DosDateTime, EntryPath};
///
/// let mut writer = ZipWriter::new(Vec::new(), 6);
/// let path = EntryPath::new("hello.txt").unwrap();
/// writer.add_entry(&path, b"hi", CompressionMethod::Deflated, DosDateTime::EPOCH).unwrap();
/// let (bytes, _) = writer.finish().unwrap();
///
/// let mut reader = ZipReader::new(&bytes).unwrap();
/// let entry = reader.next_entry().unwrap().unwrap();
/// assert_eq!(entry.data, b"hi");
/// assert!(reader.next_entry().unwrap().is_none());
/// ```
#[derive(Debug)]
pub struct ZipReader<'a> {
    data: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> ZipReader<'a> {
    /// Creates a reader over archive bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] if the data does not start with a
    /// local file header or an end-of-central-directory record (empty
    /// archive).
    pub fn new(data: &'a [u8]) -> Result<Self> {
        match le_u32(data, 0) {
            Some(signature::LOCAL_FILE_HEADER) | Some(signature::END_OF_CENTRAL_DIRECTORY) => {
                Ok(Self {
                    data,
                    pos: 0,
                    done: false,
                })
            }
            _ => Err(Error::InvalidFormat("not a ZIP archive".into())),
        }
    }

    /// Reads the next entry.
    ///
    /// Returns `Ok(None)` once the entries are exhausted.
    ///
    /// # Errors
    ///
    /// Any structural problem, CRC or size mismatch, encrypted entry or
    /// unsupported method is reported as an error; the reader is then
    /// exhausted.
    pub fn next_entry(&mut self) -> Result<Option<ZipEntry>> {
        if self.done {
            return Ok(None);
        }
        let result = self.read_entry();
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result
    }

    fn read_entry(&mut self) -> Result<Option<ZipEntry>> {
        let start = self.pos;
        if start == self.data.len() {
            return Ok(None);
        }
        let sig = le_u32(self.data, start)
            .ok_or_else(|| Error::corrupt(start, "truncated record signature"))?;
        match sig {
            signature::LOCAL_FILE_HEADER => {}
            signature::CENTRAL_DIRECTORY
            | signature::END_OF_CENTRAL_DIRECTORY
            | signature::ZIP64_END_OF_CENTRAL_DIRECTORY
            | signature::ZIP64_LOCATOR => return Ok(None),
            other => {
                return Err(Error::corrupt(
                    start,
                    format!("unexpected record signature {other:#010x}"),
                ));
            }
        }

        let header = self
            .data
            .get(start..start + LOCAL_HEADER_LEN)
            .ok_or_else(|| Error::corrupt(start, "truncated local header"))?;
        let bit_flags = u16_at(header, 6);
        let method_raw = u16_at(header, 8);
        let modified = DosDateTime::from_fields(u16_at(header, 12), u16_at(header, 10));
        let header_crc = u32_at(header, 14);
        let mut compressed_size = u64::from(u32_at(header, 18));
        let mut size = u64::from(u32_at(header, 22));
        let name_len = usize::from(u16_at(header, 26));
        let extra_len = usize::from(u16_at(header, 28));

        if bit_flags & flags::ENCRYPTED != 0 {
            return Err(Error::UnsupportedFeature {
                feature: "encrypted entries",
            });
        }
        let method = CompressionMethod::from_u16(method_raw)?;

        let name_start = start + LOCAL_HEADER_LEN;
        let name_bytes = self
            .data
            .get(name_start..name_start + name_len)
            .ok_or_else(|| Error::corrupt(start, "truncated entry name"))?;
        let extra_start = name_start + name_len;
        let extra_bytes = self
            .data
            .get(extra_start..extra_start + extra_len)
            .ok_or_else(|| Error::corrupt(start, "truncated extra field"))?;

        let name = decode_name(name_bytes, bit_flags, start);
        let path = EntryPath::new(&name)?;

        let zip64 = apply_zip64(extra_bytes, &mut size, &mut compressed_size, start)?;

        let data_start = extra_start + extra_len;
        let (data, crc32) = if bit_flags & flags::DATA_DESCRIPTOR != 0 {
            self.read_with_descriptor(&path, method, data_start, zip64, start)?
        } else {
            self.read_sized(
                &path,
                method,
                data_start,
                compressed_size,
                size,
                header_crc,
                start,
            )?
        };

        verify_crc32(path.as_str(), &data, crc32)?;

        Ok(Some(ZipEntry {
            path,
            method,
            modified,
            crc32,
            data,
            offset: start as u64,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    fn read_sized(
        &mut self,
        path: &EntryPath,
        method: CompressionMethod,
        data_start: usize,
        compressed_size: u64,
        size: u64,
        crc32: u32,
        header_offset: usize,
    ) -> Result<(Vec<u8>, u32)> {
        let compressed_len = usize::try_from(compressed_size)
            .map_err(|_| Error::corrupt(header_offset, "compressed size out of range"))?;
        let end = data_start
            .checked_add(compressed_len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| Error::corrupt(header_offset, "entry data extends past end of archive"))?;
        let raw = &self.data[data_start..end];

        let data = match method {
            CompressionMethod::Stored => raw.to_vec(),
            CompressionMethod::Deflated => {
                let hint = usize::try_from(size).unwrap_or(0);
                let (data, _) = codec::inflate(raw, hint).map_err(|e| {
                    Error::corrupt(header_offset, format!("{}: {e}", path.as_str()))
                })?;
                data
            }
        };
        if data.len() as u64 != size {
            return Err(Error::corrupt(
                header_offset,
                format!(
                    "{}: size mismatch (header {size}, actual {})",
                    path.as_str(),
                    data.len()
                ),
            ));
        }

        self.pos = end;
        Ok((data, crc32))
    }

    fn read_with_descriptor(
        &mut self,
        path: &EntryPath,
        method: CompressionMethod,
        data_start: usize,
        zip64: bool,
        header_offset: usize,
    ) -> Result<(Vec<u8>, u32)> {
        if method == CompressionMethod::Stored {
            return Err(Error::UnsupportedFeature {
                feature: "stored entries with data descriptor",
            });
        }
        let (data, consumed) = codec::inflate(&self.data[data_start..], 0)
            .map_err(|e| Error::corrupt(header_offset, format!("{}: {e}", path.as_str())))?;

        let mut pos = data_start + consumed;
        if le_u32(self.data, pos) == Some(signature::DATA_DESCRIPTOR) {
            pos += 4;
        }
        let crc32 = le_u32(self.data, pos)
            .ok_or_else(|| Error::corrupt(pos, "truncated data descriptor"))?;
        pos += 4;
        let (compressed_size, size) = if zip64 {
            let c = le_u64(self.data, pos);
            let u = le_u64(self.data, pos + 8);
            pos += 16;
            (c, u)
        } else {
            let c = le_u32(self.data, pos).map(u64::from);
            let u = le_u32(self.data, pos + 4).map(u64::from);
            pos += 8;
            (c, u)
        };
        let (Some(compressed_size), Some(size)) = (compressed_size, size) else {
            return Err(Error::corrupt(data_start + consumed, "truncated data descriptor"));
        };

        if compressed_size != consumed as u64 || size != data.len() as u64 {
            return Err(Error::corrupt(
                header_offset,
                format!("{}: data descriptor sizes do not match entry data", path.as_str()),
            ));
        }

        self.pos = pos;
        Ok((data, crc32))
    }
}

impl Iterator for ZipReader<'_> {
    type Item = Result<ZipEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

/// Decodes an entry name, falling back to a lossy conversion for names that
/// are neither flagged nor valid UTF-8.
fn decode_name(bytes: &[u8], bit_flags: u16, offset: usize) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            if bit_flags & flags::UTF8 != 0 {
                warn!("entry at {offset:#x} is flagged UTF-8 but its name is not valid UTF-8");
            } else {
                warn!("entry at {offset:#x} has a non-UTF-8 name; decoding lossily");
            }
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Applies a ZIP64 extended information field, returning whether one was
/// present.
fn apply_zip64(
    extra_bytes: &[u8],
    size: &mut u64,
    compressed_size: &mut u64,
    offset: usize,
) -> Result<bool> {
    let mut pos = 0;
    while pos + 4 <= extra_bytes.len() {
        let id = u16_at(extra_bytes, pos);
        let len = usize::from(u16_at(extra_bytes, pos + 2));
        let body = extra_bytes
            .get(pos + 4..pos + 4 + len)
            .ok_or_else(|| Error::corrupt(offset, "truncated extra field entry"))?;
        if id == extra::ZIP64 {
            let mut field = 0;
            if *size == u64::from(u32::MAX) {
                *size = le_u64(body, field)
                    .ok_or_else(|| Error::corrupt(offset, "truncated ZIP64 size"))?;
                field += 8;
            }
            if *compressed_size == u64::from(u32::MAX) {
                *compressed_size = le_u64(body, field)
                    .ok_or_else(|| Error::corrupt(offset, "truncated ZIP64 compressed size"))?;
            }
            return Ok(true);
        }
        pos += 4 + len;
    }
    Ok(false)
}

fn u16_at(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn u32_at(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn le_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

fn le_u64(buf: &[u8], at: usize) -> Option<u64> {
    let bytes = buf.get(at..at.checked_add(8)?)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}
