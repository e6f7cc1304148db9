//! Flatten, transform, materialize, write.

use std::fs;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use log::{debug, info};
use tempfile::TempDir;

use super::Protector;
use crate::manifest::{MAIN_CLASS, Manifest};
use crate::store::{Entry, EntryStore};
use crate::timestamp::DosDateTime;
use crate::trace::Trace;
use crate::walker::ArchiveWalker;
use crate::write::ArchiveWriter;
use crate::{EntryPath, Error, Result};

pub(super) fn run(protector: &Protector<'_>, input: &[u8], trace: &mut dyn Trace) -> Result<Vec<u8>> {
    let policy = protector.policy();
    let manifest = Manifest::find(input)?.ok_or(Error::MissingManifestAttribute {
        attribute: MAIN_CLASS,
    })?;
    let manifest_info = manifest.info()?;
    info!("Main-Class: {}", manifest_info.main_class);
    if let Some(start) = &manifest_info.start_class {
        info!("Start-Class: {start}");
    }
    let container = manifest_info.is_container();
    if container {
        info!("application container archive, flattening class and library directories");
    }

    let mut store = ArchiveWalker::new(policy, container).walk(input, trace)?;
    transform_store(protector, &mut store, trace)?;

    let scratch = scratch_dir(policy.scratch_dir())?;
    debug!("materializing into {}", scratch.path().display());
    let layout = materialize(store, scratch.path())?;
    let output = write_from(&layout, scratch.path(), &manifest, policy.level())?;
    scratch.close()?;
    Ok(output)
}

fn transform_store(
    protector: &Protector<'_>,
    store: &mut EntryStore,
    trace: &mut dyn Trace,
) -> Result<()> {
    let transformer = protector.transformer();
    let mut injected = false;

    for entry in store.iter_mut() {
        if entry.path.is_directory() {
            continue;
        }
        if !entry.path.is_class() {
            trace.on_resource(&entry.path, 0);
            continue;
        }
        let data = std::mem::take(&mut entry.data);
        let out = transformer.transform(&entry.path, data)?;
        trace.on_class(&entry.path, 0, out.action, out.injected);
        injected |= out.injected;
        entry.data = out.data;
    }

    if !injected {
        return Ok(());
    }
    if let Some(helper) = protector.helper_entry()? {
        if !store.contains(&helper) {
            let bytes = protector.helper_bytes(&helper)?;
            trace.on_helper_added(&helper, 0);
            store.insert(Entry::new(helper, bytes.to_vec(), DosDateTime::now()));
        }
    }
    Ok(())
}

fn scratch_dir(root: Option<&Path>) -> Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("jarcloak-");
    Ok(match root {
        Some(root) => builder.tempdir_in(root)?,
        None => builder.tempdir()?,
    })
}

/// Writes every entry under `root`, returning the entry paths in order.
fn materialize(store: EntryStore, root: &Path) -> Result<Vec<EntryPath>> {
    let mut layout = Vec::with_capacity(store.len());
    let mut dir_times = Vec::new();

    for entry in store {
        let dest = disk_path(root, &entry.path);
        let mtime = FileTime::from_system_time(entry.modified.as_system_time());
        if entry.path.is_directory() {
            fs::create_dir_all(&dest)?;
            dir_times.push((dest, mtime));
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&dest, &entry.data)?;
            filetime::set_file_mtime(&dest, mtime)?;
        }
        layout.push(entry.path);
    }
    // Writing files touches their directories, so directory times go last.
    for (dir, mtime) in dir_times.into_iter().rev() {
        filetime::set_file_mtime(&dir, mtime)?;
    }
    Ok(layout)
}

fn write_from(layout: &[EntryPath], root: &Path, manifest: &Manifest, level: u32) -> Result<Vec<u8>> {
    let mut writer = ArchiveWriter::new(Vec::new(), level).with_parent_dirs(true);
    writer.write_manifest(manifest.as_bytes(), DosDateTime::now())?;

    for path in layout {
        let source = disk_path(root, path);
        let modified = DosDateTime::from_system_time(fs::metadata(&source)?.modified()?);
        if path.is_directory() {
            writer.write_directory(path, modified)?;
        } else {
            let data = fs::read(&source)?;
            writer.write_entry(path, &data, modified)?;
        }
    }
    let (bytes, summary) = writer.finish()?;
    debug!("wrote {} entries, {} bytes", summary.entries, summary.bytes);
    Ok(bytes)
}

fn disk_path(root: &Path, path: &EntryPath) -> PathBuf {
    let mut dest = root.to_path_buf();
    dest.extend(path.as_str().split('/').filter(|s| !s.is_empty()));
    dest
}
