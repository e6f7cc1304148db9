//! # jarcloak
//!
//! Protects the application classes inside a Java archive.
//!
//! Classes under a target package are replaced by the output of an external
//! encode hook, and the class reader shim bundled with the application
//! (ASM's or Spring's `ClassReader`) is patched so that every class buffer
//! passes through a decode hook before it is parsed. Nested archives are
//! processed recursively, and metadata files contributed by more than one
//! archive are merged.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use jarcloak::{ArchivePolicy, PipelineMode, Protector, Result};
//! use jarcloak::hook::CommandHook;
//! use jarcloak::patch::PatchStrength;
//! use jarcloak::protect::output_path_for;
//! use jarcloak::trace::TreeTrace;
//! use std::path::Path;
//!
//! fn main() -> Result<()> {
//!     let policy = ArchivePolicy::new("com.acme")
//!         .strength(PatchStrength::Strong)
//!         .debug(true);
//!     let encoder = CommandHook::new("acme-encrypt").arg("--key-file=key.bin");
//!
//!     let input = Path::new("app.jar");
//!     let mut trace = TreeTrace::new(std::io::stdout(), policy.is_debug());
//!     let stats = Protector::new(&policy, &encoder).protect_file(
//!         input,
//!         output_path_for(input),
//!         PipelineMode::Streaming,
//!         &mut trace,
//!     )?;
//!     println!("{} classes encoded, {} hooks injected", stats.encoded, stats.hooks_injected);
//!     Ok(())
//! }
//! ```
//!
//! ## In-memory use
//!
//! Any `Fn(&[u8]) -> io::Result<Vec<u8>>` is an [`EncodeHook`]:
//!
//! ```rust
//! use jarcloak::{ArchivePolicy, PipelineMode, Protector};
//! use jarcloak::trace::NoTrace;
//! # use jarcloak::zip::{CompressionMethod, ZipWriter};
//! # use jarcloak::{DosDateTime, EntryPath};
//! # let mut zip = ZipWriter::new(Vec::new(), 6);
//! # zip.add_entry(&EntryPath::new("META-INF/MANIFEST.MF").unwrap(), b"Main-Class: com.acme.Main\r\n", CompressionMethod::Deflated, DosDateTime::EPOCH).unwrap();
//! # zip.add_entry(&EntryPath::new("com/acme/Main.class").unwrap(), b"\xca\xfe\xba\xbe", CompressionMethod::Deflated, DosDateTime::EPOCH).unwrap();
//! # let jar = zip.finish().unwrap().0;
//!
//! let policy = ArchivePolicy::new("com/acme");
//! let reverse = |data: &[u8]| -> std::io::Result<Vec<u8>> { Ok(data.iter().rev().copied().collect()) };
//! let (protected, stats) = Protector::new(&policy, &reverse)
//!     .protect_bytes(&jar, PipelineMode::TwoPass, &mut NoTrace)
//!     .unwrap();
//! assert_eq!(stats.encoded, 1);
//! # assert!(!protected.is_empty());
//! ```
//!
//! ## Modules
//!
//! | Module | Role |
//! |--------|------|
//! | [`walker`] | flattens nested archives into an [`store::EntryStore`] |
//! | [`merge`] | resolves paths contributed by more than one archive |
//! | [`transform`] | picks encrypt, patch or pass-through per class |
//! | [`patch`] | injects the decode hook call into the class reader shim |
//! | [`write`] | writes archive levels with the manifest first |
//! | [`protect`] | the two-pass and streaming pipelines |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli` | No | The `jarcloak` command-line tool |

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod checksum;
pub mod classfile;
pub mod codec;
pub mod entry_path;
pub mod error;
pub mod hook;
pub mod manifest;
pub mod merge;
pub mod patch;
pub mod policy;
pub mod properties;
pub mod protect;
pub mod store;
pub mod timestamp;
pub mod trace;
pub mod transform;
pub mod walker;
pub mod write;
pub mod zip;

pub use entry_path::{EntryKind, EntryPath};
pub use error::{Error, Result};
pub use timestamp::DosDateTime;

// Re-export the run API at crate root for convenience
pub use hook::{CommandHook, EncodeHook};
pub use patch::{PatchResult, PatchSpec, PatchStrength, patch_class};
pub use policy::ArchivePolicy;
pub use protect::{PipelineMode, ProtectStats, Protector};
pub use transform::{Action, SelectiveTransformer};
pub use walker::ArchiveWalker;
