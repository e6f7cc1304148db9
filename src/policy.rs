//! Run configuration.
//!
//! An [`ArchivePolicy`] is built once per run and borrowed by every
//! component, including each level of nested-archive recursion.

use std::path::{Path, PathBuf};

use crate::EntryPath;
use crate::codec::DEFAULT_LEVEL;
use crate::patch::{PatchSpec, PatchStrength};

/// Configuration for one protection run.
///
/// # Example
///
/// ```rust
/// use jarcloak::ArchivePolicy;
/// use jarcloak::patch::PatchStrength;
///
/// let policy = ArchivePolicy::new("com.acme.app")
///     .debug(true)
///     .strength(PatchStrength::Weak)
///     .ignore_class("com/acme/app/Bootstrap.class")
///     .compression_level(9);
///
/// assert_eq!(policy.target_prefix(), "com/acme/app");
/// assert!(policy.is_debug());
/// assert_eq!(policy.level(), 9);
/// ```
#[derive(Clone)]
pub struct ArchivePolicy {
    target_prefix: String,
    ignored_classes: Vec<String>,
    debug: bool,
    patch: PatchSpec,
    helper_bytes: Option<Vec<u8>>,
    level: u32,
    scratch_root: Option<PathBuf>,
}

impl std::fmt::Debug for ArchivePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchivePolicy")
            .field("target_prefix", &self.target_prefix)
            .field("ignored_classes", &self.ignored_classes)
            .field("debug", &self.debug)
            .field("patch", &self.patch)
            .field("helper_bytes", &self.helper_bytes.as_ref().map(Vec::len))
            .field("level", &self.level)
            .field("scratch_root", &self.scratch_root)
            .finish()
    }
}

impl ArchivePolicy {
    /// Creates a policy protecting classes whose path contains `prefix`.
    ///
    /// Dots in the prefix are converted to `/`, so `com.acme` and
    /// `com/acme` are equivalent. The decode helper class is ignored by
    /// default.
    pub fn new(prefix: impl AsRef<str>) -> Self {
        let patch = PatchSpec::default();
        let helper = patch.helper_entry_path();
        Self {
            target_prefix: prefix.as_ref().replace('.', "/"),
            ignored_classes: vec![helper],
            debug: false,
            patch,
            helper_bytes: None,
            level: DEFAULT_LEVEL,
            scratch_root: None,
        }
    }

    /// Enables the per-resource processing trace.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the patch strength.
    pub fn strength(mut self, strength: PatchStrength) -> Self {
        self.patch.strength = strength;
        self
    }

    /// Replaces the decode helper class (internal name, `/`-separated).
    ///
    /// The new helper is added to the ignore set; the previous default stays
    /// there as well.
    pub fn helper_class(mut self, internal_name: impl AsRef<str>) -> Self {
        self.patch.helper_class = internal_name.as_ref().replace('.', "/");
        let helper = self.patch.helper_entry_path();
        if !self.ignored_classes.contains(&helper) {
            self.ignored_classes.push(helper);
        }
        self
    }

    /// Supplies the decode helper class file added to weak-patched archives.
    pub fn helper_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.helper_bytes = Some(bytes);
        self
    }

    /// Excludes classes whose path contains `path` from encoding.
    pub fn ignore_class(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = path.trim_start_matches('/').to_string();
        if !path.is_empty() && !self.ignored_classes.contains(&path) {
            self.ignored_classes.push(path);
        }
        self
    }

    /// Sets the deflate level, clamping values above 9.
    pub fn compression_level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    /// Creates two-pass scratch directories under `root` instead of the
    /// system temporary directory.
    pub fn scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Returns the target package prefix (`/`-separated).
    pub fn target_prefix(&self) -> &str {
        &self.target_prefix
    }

    /// Returns the ignored class paths.
    pub fn ignored_classes(&self) -> &[String] {
        &self.ignored_classes
    }

    /// Returns `true` if the processing trace includes resources.
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Returns the patch parameters.
    pub fn patch_spec(&self) -> &PatchSpec {
        &self.patch
    }

    /// Returns the configured decode helper class file, if any.
    pub fn helper_class_bytes(&self) -> Option<&[u8]> {
        self.helper_bytes.as_deref()
    }

    /// Returns the deflate level.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Returns the scratch root, if set.
    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch_root.as_deref()
    }

    /// Returns `true` if `path` lies under the target package.
    pub fn is_target(&self, path: &EntryPath) -> bool {
        path.contains(&self.target_prefix)
    }

    /// Returns `true` if `path` matches an ignored class.
    pub fn is_ignored(&self, path: &EntryPath) -> bool {
        self.ignored_classes.iter().any(|ignored| path.contains(ignored))
    }
}
