//! Merging of metadata files contributed by more than one nested archive.
//!
//! When un-nesting library archives into one namespace, several archives
//! usually ship the same registration files. Three kinds are merged; any
//! other duplicate keeps the last contribution.
//!
//! | Path | Policy |
//! |------|--------|
//! | `META-INF/spring.factories` | [`MergePolicy::PropertyUnion`] |
//! | `META-INF/spring.handlers`, `META-INF/spring.schemas` | [`MergePolicy::Concatenate`] |
//! | anything under `META-INF/services` | [`MergePolicy::ConcatenateIfPresent`] |
//! | everything else | [`MergePolicy::Replace`] |

use std::fmt;

use log::{debug, warn};

use crate::EntryPath;
use crate::properties::Properties;

/// Comment written at the top of a merged property file.
pub const MERGED_COMMENT: &str = "Merged by jarcloak";

const FACTORIES_SUFFIX: &str = "META-INF/spring.factories";
const CONCAT_SUFFIXES: [&str; 2] = ["META-INF/spring.handlers", "META-INF/spring.schemas"];
const SERVICES_DIR: &str = "META-INF/services";

/// How a duplicate path is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergePolicy {
    /// Parse both blobs as properties; values of shared keys are joined with
    /// a comma and new keys are added.
    PropertyUnion,
    /// `existing + "\n" + incoming`, verbatim.
    Concatenate,
    /// Like [`Concatenate`](Self::Concatenate) when the existing blob is
    /// non-empty, otherwise the incoming blob.
    ConcatenateIfPresent,
    /// The incoming blob replaces the existing one.
    Replace,
}

impl MergePolicy {
    /// Selects the policy for a path.
    pub fn for_path(path: &EntryPath) -> Self {
        let s = path.as_str();
        if s.ends_with(FACTORIES_SUFFIX) {
            Self::PropertyUnion
        } else if CONCAT_SUFFIXES.iter().any(|suffix| s.ends_with(suffix)) {
            Self::Concatenate
        } else if s.contains(SERVICES_DIR) {
            Self::ConcatenateIfPresent
        } else {
            Self::Replace
        }
    }

    /// Returns `true` for the policies that combine both contributions.
    pub fn is_merge(self) -> bool {
        self != Self::Replace
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PropertyUnion => "property-union",
            Self::Concatenate => "concatenate",
            Self::ConcatenateIfPresent => "concatenate-if-present",
            Self::Replace => "replace",
        };
        f.write_str(s)
    }
}

/// The result of resolving a duplicate path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    /// The bytes to keep.
    pub data: Vec<u8>,
    /// The policy that produced them.
    pub policy: MergePolicy,
}

/// Resolves a duplicate contribution to `path`.
///
/// # Example
///
/// ```
/// use jarcloak::EntryPath;
/// use jarcloak::merge::{merge, MergePolicy};
///
/// let path = EntryPath::new("META-INF/services/com.acme.Plugin").unwrap();
/// let merged = merge(&path, b"A", b"B");
/// assert_eq!(merged.data, b"A\nB");
/// assert_eq!(merged.policy, MergePolicy::ConcatenateIfPresent);
/// ```
pub fn merge(path: &EntryPath, existing: &[u8], incoming: &[u8]) -> Merged {
    let policy = MergePolicy::for_path(path);
    let data = match policy {
        MergePolicy::PropertyUnion => property_union(existing, incoming),
        MergePolicy::Concatenate => concatenate(existing, incoming),
        MergePolicy::ConcatenateIfPresent if !existing.is_empty() => concatenate(existing, incoming),
        MergePolicy::ConcatenateIfPresent => incoming.to_vec(),
        MergePolicy::Replace => {
            warn!("duplicate entry {path}: keeping the last contribution");
            incoming.to_vec()
        }
    };
    debug!("merged {path} ({policy}, {} bytes)", data.len());
    Merged { data, policy }
}

fn concatenate(existing: &[u8], incoming: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(existing.len() + 1 + incoming.len());
    data.extend_from_slice(existing);
    data.push(b'\n');
    data.extend_from_slice(incoming);
    data
}

fn property_union(existing: &[u8], incoming: &[u8]) -> Vec<u8> {
    let mut merged = Properties::parse(existing);
    for (key, value) in Properties::parse(incoming).iter() {
        let joined = match merged.get(key) {
            Some(prior) => format!("{prior},{value}"),
            None => value.to_string(),
        };
        merged.insert(key.to_string(), joined);
    }
    merged.to_bytes(Some(MERGED_COMMENT))
}
