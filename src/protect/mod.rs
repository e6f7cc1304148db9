//! End-to-end protection runs.
//!
//! A [`Protector`] turns an input archive into a protected one using one of
//! two pipelines:
//!
//! - [`PipelineMode::TwoPass`] flattens the archive and every nested archive
//!   into one entry store, merges duplicate metadata, transforms classes,
//!   materializes the result into a scratch directory and writes a single
//!   flat archive from it.
//! - [`PipelineMode::Streaming`] rewrites each archive level in place,
//!   keeping nested archives nested.
//!
//! Both apply the same per-class rules through
//! [`SelectiveTransformer`](crate::transform::SelectiveTransformer).

mod streaming;
mod two_pass;

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::hook::EncodeHook;
use crate::merge::MergePolicy;
use crate::patch::PatchStrength;
use crate::policy::ArchivePolicy;
use crate::trace::{IgnoreReason, Trace};
use crate::transform::{Action, SelectiveTransformer};
use crate::{EntryPath, Error, Result};

/// Suffix inserted before the extension of the output file name.
pub const OUTPUT_SUFFIX: &str = "-enc";

/// Which pipeline a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineMode {
    /// Flatten, transform, materialize, write one flat archive.
    TwoPass,
    /// Rewrite each archive level in place.
    #[default]
    Streaming,
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TwoPass => write!(f, "two-pass"),
            Self::Streaming => write!(f, "streaming"),
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtectStats {
    /// Nested archives processed.
    pub archives: usize,
    /// Class entries seen.
    pub classes: usize,
    /// Classes replaced by the encode hook's output.
    pub encoded: usize,
    /// Shim classes handed to the patcher.
    pub patched: usize,
    /// Shim classes that received a hook call.
    pub hooks_injected: usize,
    /// Non-class entries passed through.
    pub resources: usize,
    /// Duplicate paths combined by a merge rule.
    pub merged: usize,
    /// Duplicate paths resolved last-write-wins.
    pub replaced: usize,
    /// Entries left out of the output.
    pub ignored: usize,
    /// Decode helper classes added.
    pub helpers_added: usize,
    /// Input size in bytes.
    pub bytes_in: u64,
    /// Output size in bytes.
    pub bytes_out: u64,
}

/// Forwards events to another trace while counting them.
struct CountingTrace<'t> {
    inner: &'t mut dyn Trace,
    stats: ProtectStats,
}

impl<'t> CountingTrace<'t> {
    fn new(inner: &'t mut dyn Trace) -> Self {
        Self {
            inner,
            stats: ProtectStats::default(),
        }
    }
}

impl Trace for CountingTrace<'_> {
    fn on_archive(&mut self, path: &EntryPath, depth: usize) {
        self.stats.archives += 1;
        self.inner.on_archive(path, depth);
    }

    fn on_class(&mut self, path: &EntryPath, depth: usize, action: Action, injected: bool) {
        self.stats.classes += 1;
        match action {
            Action::Encrypt => self.stats.encoded += 1,
            Action::Patch => {
                self.stats.patched += 1;
                if injected {
                    self.stats.hooks_injected += 1;
                }
            }
            Action::PassThrough => {}
        }
        self.inner.on_class(path, depth, action, injected);
    }

    fn on_resource(&mut self, path: &EntryPath, depth: usize) {
        self.stats.resources += 1;
        self.inner.on_resource(path, depth);
    }

    fn on_ignored(&mut self, path: &EntryPath, depth: usize, reason: IgnoreReason) {
        self.stats.ignored += 1;
        self.inner.on_ignored(path, depth, reason);
    }

    fn on_merged(&mut self, path: &EntryPath, policy: MergePolicy) {
        if policy.is_merge() {
            self.stats.merged += 1;
        } else {
            self.stats.replaced += 1;
        }
        self.inner.on_merged(path, policy);
    }

    fn on_helper_added(&mut self, path: &EntryPath, depth: usize) {
        self.stats.helpers_added += 1;
        self.inner.on_helper_added(path, depth);
    }
}

/// Runs protection with one policy and encode hook.
///
/// # Example
///
/// ```rust,no_run
/// use jarcloak::{ArchivePolicy, PipelineMode, Protector};
/// use jarcloak::hook::CommandHook;
/// use jarcloak::trace::TreeTrace;
///
/// # fn main() -> jarcloak::Result<()> {
/// let policy = ArchivePolicy::new("com.acme");
/// let encoder = CommandHook::new("acme-encrypt");
/// let protector = Protector::new(&policy, &encoder);
///
/// let mut trace = TreeTrace::new(std::io::stdout(), false);
/// let stats = protector.protect_file("app.jar", "app-enc.jar", PipelineMode::TwoPass, &mut trace)?;
/// println!("{} classes encoded", stats.encoded);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Protector<'a> {
    policy: &'a ArchivePolicy,
    transformer: SelectiveTransformer<'a>,
}

impl<'a> Protector<'a> {
    /// Creates a protector.
    pub fn new(policy: &'a ArchivePolicy, hook: &'a dyn EncodeHook) -> Self {
        Self {
            policy,
            transformer: SelectiveTransformer::new(policy, hook),
        }
    }

    /// Returns the policy.
    pub fn policy(&self) -> &'a ArchivePolicy {
        self.policy
    }

    /// Protects an in-memory archive.
    ///
    /// # Errors
    ///
    /// Any error aborts the run; no output is produced.
    pub fn protect_bytes(
        &self,
        input: &[u8],
        mode: PipelineMode,
        trace: &mut dyn Trace,
    ) -> Result<(Vec<u8>, ProtectStats)> {
        let mut counting = CountingTrace::new(trace);
        info!(
            "protecting {} bytes ({mode}, {} patch, target {:?})",
            input.len(),
            self.policy.patch_spec().strength,
            self.policy.target_prefix()
        );
        let output = match mode {
            PipelineMode::TwoPass => two_pass::run(self, input, &mut counting)?,
            PipelineMode::Streaming => streaming::run(self, input, &mut counting)?,
        };

        let mut stats = counting.stats;
        stats.bytes_in = input.len() as u64;
        stats.bytes_out = output.len() as u64;
        info!(
            "encoded {} classes, patched {} shim classes ({} hooks injected), merged {} files",
            stats.encoded, stats.patched, stats.hooks_injected, stats.merged
        );
        Ok((output, stats))
    }

    /// Protects the archive at `input`, writing the result to `output`.
    ///
    /// The output is written to a temporary file next to `output` and moved
    /// into place only when the run succeeds; an existing file is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutputOverwritesInput`] if `input` and `output` are the
    /// same file, and any error of [`protect_bytes`](Self::protect_bytes).
    pub fn protect_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        mode: PipelineMode,
        trace: &mut dyn Trace,
    ) -> Result<ProtectStats> {
        let input = input.as_ref();
        let output = output.as_ref();
        if same_file(input, output) {
            return Err(Error::OutputOverwritesInput {
                path: output.to_path_buf(),
            });
        }

        let data = fs::read(input)?;
        let (protected, stats) = self.protect_bytes(&data, mode, trace)?;

        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = tempfile::Builder::new()
            .prefix(".jarcloak-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        temp.write_all(&protected)?;
        temp.as_file().sync_all()?;
        if output.exists() {
            warn!("replacing existing output {}", output.display());
        }
        temp.persist(output).map_err(|e| Error::Io(e.error))?;
        info!("wrote {}", output.display());
        Ok(stats)
    }

    pub(crate) fn transformer(&self) -> &SelectiveTransformer<'a> {
        &self.transformer
    }

    /// Returns the decode helper entry the weak strength needs, or `None`
    /// for the strong strength.
    pub(crate) fn helper_entry(&self) -> Result<Option<EntryPath>> {
        let spec = self.policy.patch_spec();
        if spec.strength != PatchStrength::Weak {
            return Ok(None);
        }
        EntryPath::new(&spec.helper_entry_path()).map(Some)
    }

    /// Returns the configured helper class bytes.
    pub(crate) fn helper_bytes(&self, path: &EntryPath) -> Result<&'a [u8]> {
        self.policy
            .helper_class_bytes()
            .ok_or_else(|| Error::MissingDecodeHelper {
                path: path.to_string(),
            })
    }
}

/// Returns the default output path for `input`: `app.jar` becomes
/// `app-enc.jar` in the same directory.
///
/// ```
/// use std::path::Path;
/// use jarcloak::protect::output_path_for;
///
/// assert_eq!(output_path_for(Path::new("dist/app.war")), Path::new("dist/app-enc.war"));
/// assert_eq!(output_path_for(Path::new("app")), Path::new("app-enc"));
/// ```
pub fn output_path_for(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{stem}{OUTPUT_SUFFIX}.{}", ext.to_string_lossy()),
        None => format!("{stem}{OUTPUT_SUFFIX}"),
    };
    input.with_file_name(name)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
