//! Fuzz target for EntryPath::new with arbitrary string input.
//!
//! Entry paths are materialized onto disk by the two-pass pipeline, so an
//! accepted path must stay inside the scratch directory.
//!
//! Run with: cargo +nightly fuzz run entry_path
//!
//! Key security properties being tested:
//! - Path traversal rejection (`..` segments)
//! - Leading slashes stripped
//! - NUL byte handling

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(raw) = std::str::from_utf8(data) {
        if let Ok(path) = jarcloak::EntryPath::new(raw) {
            let normalized = path.as_str();

            assert!(
                !normalized.split('/').any(|segment| segment == ".."),
                "Path traversal found in normalized path: {:?}",
                normalized
            );
            assert!(
                !normalized.starts_with('/'),
                "Absolute path accepted: {:?}",
                normalized
            );
            assert!(
                !normalized.contains('\0'),
                "NUL byte in normalized path: {:?}",
                normalized
            );
        }
    }
});
