//! Fuzz target for reading archives from arbitrary bytes.
//!
//! Exercises local header parsing, ZIP64 extra fields, data descriptors and
//! inflation. The reader must never panic, and every entry it returns must
//! carry data matching its recorded CRC.
//!
//! Run with: cargo +nightly fuzz run zip_reader

#![no_main]

use jarcloak::checksum::{Checksum, Crc32};
use jarcloak::zip::ZipReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(reader) = ZipReader::new(data) else {
        return;
    };
    for entry in reader {
        match entry {
            Ok(entry) => assert_eq!(Crc32::compute(&entry.data), entry.crc32),
            Err(_) => break,
        }
    }
});
