//! Fuzz target for patching arbitrary class files.
//!
//! Runs both patch strengths over the input. Parsing, code decoding and
//! offset remapping must fail with an error rather than panic, and a
//! successful patch must produce a class file that parses again.
//!
//! Run with: cargo +nightly fuzz run class_patch

#![no_main]

use jarcloak::classfile::ClassFile;
use jarcloak::{PatchSpec, PatchStrength, patch_class};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    for strength in [PatchStrength::Weak, PatchStrength::Strong] {
        let spec = PatchSpec {
            strength,
            ..PatchSpec::default()
        };
        if let Ok(result) = patch_class(data, &spec) {
            if result.injected {
                assert!(
                    ClassFile::parse(&result.data).is_ok(),
                    "patched class no longer parses"
                );
            }
        }
    }
});
