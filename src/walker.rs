//! Recursive archive flattening.
//!
//! [`ArchiveWalker`] reads an archive and every archive nested inside it
//! into a single [`EntryStore`]. Nested entries keep their own paths: an
//! entry `com/acme/A.class` inside `lib/x.jar` lands at `com/acme/A.class`,
//! not under `lib/x.jar/`. When two archives contribute the same path the
//! [`merge`](crate::merge) rules decide what is kept.
//!
//! Each archive level is read into its own store, which is then absorbed
//! into its parent in order; the parent owns the bytes from then on.

use log::{debug, info};

use crate::merge::{self, MergePolicy};
use crate::policy::ArchivePolicy;
use crate::store::{Entry, EntryStore};
use crate::trace::{IgnoreReason, Trace};
use crate::zip::ZipReader;
use crate::{EntryPath, Result};

/// Flattens an archive and its nested archives into one entry store.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveWalker<'p> {
    policy: &'p ArchivePolicy,
    container_mode: bool,
}

impl<'p> ArchiveWalker<'p> {
    /// Creates a walker.
    ///
    /// In container mode the `BOOT-INF/classes/` and `BOOT-INF/lib/`
    /// prefixes are stripped from every path, at every nesting level.
    pub fn new(policy: &'p ArchivePolicy, container_mode: bool) -> Self {
        Self {
            policy,
            container_mode,
        }
    }

    /// Returns the policy the walker was created with.
    pub fn policy(&self) -> &'p ArchivePolicy {
        self.policy
    }

    /// Walks `archive`, returning every leaf entry.
    ///
    /// Manifests and signature files are dropped. The returned store never
    /// contains a nested archive entry.
    ///
    /// # Errors
    ///
    /// Any read error at any nesting level aborts the walk.
    pub fn walk(&self, archive: &[u8], trace: &mut dyn Trace) -> Result<EntryStore> {
        let store = self.walk_level(archive, 0, trace)?;
        info!(
            "walked archive: {} entries, {} bytes",
            store.len(),
            store.total_size()
        );
        Ok(store)
    }

    fn walk_level(&self, archive: &[u8], depth: usize, trace: &mut dyn Trace) -> Result<EntryStore> {
        let mut store = EntryStore::new();
        let mut reader = ZipReader::new(archive)?;

        while let Some(zip_entry) = reader.next_entry()? {
            let Some(path) = self.key_for(&zip_entry.path) else {
                trace.on_ignored(&zip_entry.path, depth, IgnoreReason::Flattened);
                continue;
            };

            if path.is_nested_archive() {
                debug!("descending into {path} (depth {})", depth + 1);
                trace.on_archive(&path, depth);
                let nested = self.walk_level(&zip_entry.data, depth + 1, trace)?;
                absorb(&mut store, nested, trace);
            } else if path.is_manifest() {
                trace.on_ignored(&path, depth, IgnoreReason::Manifest);
            } else if path.is_signature_file() {
                debug!("dropping signature file {path}");
                trace.on_ignored(&path, depth, IgnoreReason::Signature);
            } else {
                let entry = Entry::new(path, zip_entry.data, zip_entry.modified);
                insert(&mut store, entry, trace);
            }
        }
        Ok(store)
    }

    fn key_for(&self, path: &EntryPath) -> Option<EntryPath> {
        if self.container_mode {
            path.strip_container_prefix()
        } else {
            Some(path.clone())
        }
    }
}

/// Moves every entry of a nested level into its parent, in order.
fn absorb(parent: &mut EntryStore, nested: EntryStore, trace: &mut dyn Trace) {
    for entry in nested {
        insert(parent, entry, trace);
    }
}

/// Inserts an entry, resolving an existing path through the merge rules.
fn insert(store: &mut EntryStore, entry: Entry, trace: &mut dyn Trace) {
    let Some(existing) = store.get_mut(&entry.path) else {
        store.insert(entry);
        return;
    };

    // Directories carry no data; the first one seen wins.
    if entry.path.is_directory() {
        return;
    }

    let merged = merge::merge(&entry.path, &existing.data, &entry.data);
    trace.on_merged(&entry.path, merged.policy);
    existing.data = merged.data;
    if merged.policy == MergePolicy::Replace {
        existing.modified = entry.modified;
    }
}
