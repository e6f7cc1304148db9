//! Human-readable processing trace.
//!
//! A run reports what it does to every entry through the [`Trace`] trait.
//! [`TreeTrace`] renders the familiar entry tree:
//!
//! ```text
//! ├── [A] BOOT-INF/lib/x.jar
//! │   ├── [C] com/acme/Service.class [E]
//! │   ├── [R]  META-INF/services/foo
//! ├── [C] org/springframework/asm/ClassReader.class [P]
//! ```
//!
//! [`TraceLog`] records the same events for inspection.

use std::io::Write;

use crate::EntryPath;
use crate::merge::MergePolicy;
use crate::transform::Action;

/// Why an entry was left out of the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// A nested manifest; the top-level manifest is written separately.
    Manifest,
    /// A signature file that would no longer validate.
    Signature,
    /// A directory swallowed by container flattening.
    Flattened,
}

/// Receives processing events.
///
/// All methods have no-op defaults. `depth` is the archive nesting depth:
/// 0 for the top-level archive.
pub trait Trace {
    /// Called when a nested archive is about to be processed.
    fn on_archive(&mut self, path: &EntryPath, depth: usize) {
        let _ = (path, depth);
    }

    /// Called after a class entry was handled.
    fn on_class(&mut self, path: &EntryPath, depth: usize, action: Action, injected: bool) {
        let _ = (path, depth, action, injected);
    }

    /// Called for every resource passed through unchanged.
    fn on_resource(&mut self, path: &EntryPath, depth: usize) {
        let _ = (path, depth);
    }

    /// Called for entries dropped from the output.
    fn on_ignored(&mut self, path: &EntryPath, depth: usize, reason: IgnoreReason) {
        let _ = (path, depth, reason);
    }

    /// Called when a duplicate path was resolved.
    fn on_merged(&mut self, path: &EntryPath, policy: MergePolicy) {
        let _ = (path, policy);
    }

    /// Called when the decode helper class was added to an archive level.
    fn on_helper_added(&mut self, path: &EntryPath, depth: usize) {
        let _ = (path, depth);
    }
}

/// A trace that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTrace;

impl Trace for NoTrace {}

/// Renders events as an indented entry tree.
///
/// Archives and transformed classes are always shown; resources, ignored
/// entries and merges only when `verbose` is set.
#[derive(Debug)]
pub struct TreeTrace<W: Write> {
    out: W,
    verbose: bool,
}

impl<W: Write> TreeTrace<W> {
    /// Creates a tree renderer.
    pub fn new(out: W, verbose: bool) -> Self {
        Self { out, verbose }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, depth: usize, text: &str) {
        let indent = "│   ".repeat(depth);
        // Write errors never fail the run.
        let _ = writeln!(self.out, "{indent}├── {text}");
    }
}

impl<W: Write> Trace for TreeTrace<W> {
    fn on_archive(&mut self, path: &EntryPath, depth: usize) {
        self.line(depth, &format!("[A] {path}"));
    }

    fn on_class(&mut self, path: &EntryPath, depth: usize, action: Action, injected: bool) {
        let marker = match action {
            Action::Encrypt => " [E]",
            Action::Patch if injected => " [P]",
            Action::Patch => " [P?]",
            Action::PassThrough => {
                if self.verbose {
                    self.line(depth, &format!("[C] {path}"));
                }
                return;
            }
        };
        self.line(depth, &format!("[C] {path}{marker}"));
    }

    fn on_resource(&mut self, path: &EntryPath, depth: usize) {
        if self.verbose {
            self.line(depth, &format!("[R]  {path}"));
        }
    }

    fn on_ignored(&mut self, path: &EntryPath, depth: usize, reason: IgnoreReason) {
        if self.verbose {
            let tag = match reason {
                IgnoreReason::Manifest => "manifest",
                IgnoreReason::Signature => "signature",
                IgnoreReason::Flattened => "flattened",
            };
            self.line(depth, &format!("[-]  {path} ({tag})"));
        }
    }

    fn on_merged(&mut self, path: &EntryPath, policy: MergePolicy) {
        if self.verbose || policy.is_merge() {
            let _ = writeln!(self.out, "merge {path} ({policy})");
        }
    }

    fn on_helper_added(&mut self, path: &EntryPath, depth: usize) {
        self.line(depth, &format!("[+] {path}"));
    }
}

/// A recorded trace event.
///
/// Each variant mirrors the [`Trace`] method of the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// See [`Trace::on_archive`].
    Archive {
        /// Entry path.
        path: String,
        /// Nesting depth.
        depth: usize,
    },
    /// See [`Trace::on_class`].
    Class {
        /// Entry path.
        path: String,
        /// Nesting depth.
        depth: usize,
        /// Action taken.
        action: Action,
        /// Whether a decode hook call was injected.
        injected: bool,
    },
    /// See [`Trace::on_resource`].
    Resource {
        /// Entry path.
        path: String,
        /// Nesting depth.
        depth: usize,
    },
    /// See [`Trace::on_ignored`].
    Ignored {
        /// Entry path.
        path: String,
        /// Nesting depth.
        depth: usize,
        /// Why the entry was dropped.
        reason: IgnoreReason,
    },
    /// See [`Trace::on_merged`].
    Merged {
        /// Entry path.
        path: String,
        /// Policy applied.
        policy: MergePolicy,
    },
    /// See [`Trace::on_helper_added`].
    HelperAdded {
        /// Entry path.
        path: String,
        /// Nesting depth.
        depth: usize,
    },
}

/// Records every event in memory.
#[derive(Debug, Clone, Default)]
pub struct TraceLog {
    events: Vec<TraceEvent>,
}

impl TraceLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded events in order.
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Returns the classes recorded with `action`.
    pub fn classes_with(&self, action: Action) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TraceEvent::Class {
                    path, action: a, ..
                } if *a == action => Some(path.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Trace for TraceLog {
    fn on_archive(&mut self, path: &EntryPath, depth: usize) {
        self.events.push(TraceEvent::Archive {
            path: path.to_string(),
            depth,
        });
    }

    fn on_class(&mut self, path: &EntryPath, depth: usize, action: Action, injected: bool) {
        self.events.push(TraceEvent::Class {
            path: path.to_string(),
            depth,
            action,
            injected,
        });
    }

    fn on_resource(&mut self, path: &EntryPath, depth: usize) {
        self.events.push(TraceEvent::Resource {
            path: path.to_string(),
            depth,
        });
    }

    fn on_ignored(&mut self, path: &EntryPath, depth: usize, reason: IgnoreReason) {
        self.events.push(TraceEvent::Ignored {
            path: path.to_string(),
            depth,
            reason,
        });
    }

    fn on_merged(&mut self, path: &EntryPath, policy: MergePolicy) {
        self.events.push(TraceEvent::Merged {
            path: path.to_string(),
            policy,
        });
    }

    fn on_helper_added(&mut self, path: &EntryPath, depth: usize) {
        self.events.push(TraceEvent::HelperAdded {
            path: path.to_string(),
            depth,
        });
    }
}
