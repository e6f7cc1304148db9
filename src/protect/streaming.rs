//! Level-by-level rewriting that keeps nested archives nested.

use log::debug;

use super::Protector;
use crate::entry_path::MANIFEST_PATH;
use crate::timestamp::DosDateTime;
use crate::trace::{IgnoreReason, Trace};
use crate::write::ArchiveWriter;
use crate::zip::{ZipEntry, ZipReader};
use crate::Result;

pub(super) fn run(protector: &Protector<'_>, input: &[u8], trace: &mut dyn Trace) -> Result<Vec<u8>> {
    rewrite_level(protector, input, 0, trace)
}

fn is_level_manifest(entry: &ZipEntry) -> bool {
    entry.path.as_str().eq_ignore_ascii_case(MANIFEST_PATH)
}

fn rewrite_level(
    protector: &Protector<'_>,
    archive: &[u8],
    depth: usize,
    trace: &mut dyn Trace,
) -> Result<Vec<u8>> {
    let transformer = protector.transformer();
    // Each level is inflated once; the manifest must lead the output.
    let entries = ZipReader::new(archive)?.collect::<Result<Vec<_>>>()?;
    let mut writer =
        ArchiveWriter::new(Vec::new(), protector.policy().level()).with_parent_dirs(true);
    if let Some(manifest) = entries.iter().find(|e| is_level_manifest(e)) {
        writer.write_manifest(&manifest.data, manifest.modified)?;
    }

    let mut injected = false;
    for entry in entries {
        if is_level_manifest(&entry) {
            continue;
        }
        let path = entry.path;
        if path.is_signature_file() {
            trace.on_ignored(&path, depth, IgnoreReason::Signature);
            continue;
        }

        if path.is_directory() {
            writer.write_directory(&path, entry.modified)?;
        } else if path.is_nested_archive() {
            trace.on_archive(&path, depth);
            let nested = rewrite_level(protector, &entry.data, depth + 1, trace)?;
            writer.write_entry(&path, &nested, entry.modified)?;
        } else if path.is_class() {
            let out = transformer.transform(&path, entry.data)?;
            trace.on_class(&path, depth, out.action, out.injected);
            injected |= out.injected;
            writer.write_entry(&path, &out.data, entry.modified)?;
        } else {
            trace.on_resource(&path, depth);
            writer.write_entry(&path, &entry.data, entry.modified)?;
        }
    }

    let helper = if injected { protector.helper_entry()? } else { None };
    if let Some(helper) = helper {
        if !writer.contains(&helper) {
            let bytes = protector.helper_bytes(&helper)?;
            trace.on_helper_added(&helper, depth);
            writer.write_entry(&helper, bytes, DosDateTime::now())?;
        }
    }

    let (bytes, summary) = writer.finish()?;
    debug!(
        "rewrote archive level {depth}: {} entries, {} bytes",
        summary.entries, summary.bytes
    );
    Ok(bytes)
}
