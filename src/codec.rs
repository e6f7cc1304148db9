//! Raw deflate compression and decompression.
//!
//! ZIP entries with method 8 hold a raw deflate stream (no zlib header). When
//! an entry is followed by a data descriptor its compressed length is not
//! known up front, so [`inflate`] reports how many input bytes the stream
//! actually occupied.

use std::io::{self, Write};

use flate2::write::DeflateEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};

/// Default deflate level.
pub const DEFAULT_LEVEL: u32 = 6;

/// Upper bound for the initial output allocation taken from untrusted headers.
const MAX_INITIAL_CAPACITY: usize = 64 * 1024 * 1024;

/// Compresses `data` as a raw deflate stream.
///
/// # Arguments
///
/// * `data` - The bytes to compress
/// * `level` - Compression level (clamped to 0-9)
pub fn deflate(data: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(
        Vec::with_capacity(data.len() / 2 + 64),
        Compression::new(level.min(9)),
    );
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompresses one raw deflate stream from the start of `input`.
///
/// Returns the decompressed bytes and the number of input bytes consumed by
/// the stream. Trailing input after the end of the stream is left untouched.
///
/// # Arguments
///
/// * `input` - Buffer starting with a raw deflate stream
/// * `size_hint` - Expected decompressed size, used only for preallocation
///
/// # Errors
///
/// Returns an [`io::ErrorKind::InvalidData`] error for a corrupt stream and
/// [`io::ErrorKind::UnexpectedEof`] if the input ends before the stream does.
pub fn inflate(input: &[u8], size_hint: usize) -> io::Result<(Vec<u8>, usize)> {
    let mut decompress = Decompress::new(false);
    let initial = size_hint
        .min(input.len().saturating_mul(8))
        .clamp(256, MAX_INITIAL_CAPACITY);
    let mut output = Vec::with_capacity(initial);

    loop {
        if output.len() == output.capacity() {
            output.reserve(output.capacity().max(4096));
        }
        let before = consumed(&decompress);
        let produced = output.len();
        let status = decompress
            .decompress_vec(&input[before..], &mut output, FlushDecompress::None)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        match status {
            Status::StreamEnd => return Ok((output, consumed(&decompress))),
            Status::Ok | Status::BufError => {
                let stalled = consumed(&decompress) == before && output.len() == produced;
                if stalled && output.len() < output.capacity() {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "deflate stream truncated",
                    ));
                }
            }
        }
    }
}

fn consumed(decompress: &Decompress) -> usize {
    usize::try_from(decompress.total_in()).unwrap_or(usize::MAX)
}
