//! Normalized entry paths and their classification.
//!
//! Every entry read from an archive is keyed by an [`EntryPath`]: forward
//! slashes, no leading `/`, a trailing `/` only for directories. The type also
//! answers the classification questions the pipeline asks of a path (class,
//! nested archive, manifest, signature file, library directory).

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, Result};

/// Maximum length for entry paths (in bytes).
const MAX_PATH_LENGTH: usize = 32768;

/// Suffix of the JAR manifest, matched case-insensitively at any depth.
pub const MANIFEST_SUFFIX: &str = "META-INF/MANIFEST.MF";

/// Canonical manifest path written at the top of every archive level.
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Library directories whose nested archives are written uncompressed.
pub const LIBRARY_DIRS: [&str; 2] = ["BOOT-INF/lib/", "WEB-INF/lib/"];

/// Prefixes flattened into the archive root in container mode.
pub const CONTAINER_FLATTEN_DIRS: [&str; 2] = ["BOOT-INF/classes/", "BOOT-INF/lib/"];

/// Signature and security descriptor files that stop validating once
/// classes are transformed.
static SIGNATURE_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*)?META-INF/.*\.(?i:SF|DSA|RSA|EC)$").expect("Invalid signature file regex")
});

/// What an entry is, as far as the pipeline is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// A `.class` file.
    Class,
    /// A `.jar` or `.war` archive embedded in the archive.
    NestedArchive,
    /// Any other file.
    Resource,
    /// A directory entry (trailing `/`).
    Directory,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Class => "class",
            Self::NestedArchive => "archive",
            Self::Resource => "resource",
            Self::Directory => "directory",
        };
        f.write_str(s)
    }
}

/// A validated, normalized entry path.
///
/// # Examples
///
/// ```
/// use jarcloak::{EntryKind, EntryPath};
///
/// let path = EntryPath::new("/BOOT-INF\\lib\\x.jar").unwrap();
/// assert_eq!(path.as_str(), "BOOT-INF/lib/x.jar");
/// assert_eq!(path.kind(), EntryKind::NestedArchive);
/// assert!(path.is_under_library_dir());
///
/// assert!(EntryPath::new("../escape.class").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryPath(String);

impl EntryPath {
    /// Normalizes and validates a raw entry name.
    ///
    /// Backslashes become `/` and leading slashes are stripped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEntryPath`] if the name is empty after
    /// normalization, contains a NUL byte, exceeds the length limit, or has
    /// an empty, `.` or `..` segment.
    pub fn new(raw: &str) -> Result<Self> {
        let normalized = raw.replace('\\', "/");
        let trimmed = normalized.trim_start_matches('/');
        Self::validate(trimmed)?;
        Ok(Self(trimmed.to_string()))
    }

    fn validate(s: &str) -> Result<()> {
        if s.is_empty() {
            return Err(Error::InvalidEntryPath("empty path".into()));
        }
        if s.contains('\0') {
            return Err(Error::InvalidEntryPath(format!("{s:?} contains NUL byte")));
        }
        if s.len() > MAX_PATH_LENGTH {
            return Err(Error::InvalidEntryPath(format!(
                "path exceeds maximum length of {} bytes",
                MAX_PATH_LENGTH
            )));
        }
        let body = s.strip_suffix('/').unwrap_or(s);
        for segment in body.split('/') {
            match segment {
                "" => {
                    return Err(Error::InvalidEntryPath(format!(
                        "{s}: empty segment (consecutive slashes)"
                    )));
                }
                "." | ".." => {
                    return Err(Error::InvalidEntryPath(format!(
                        "{s}: '{segment}' segment not allowed"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns the path as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the file name (last segment, without a trailing `/`).
    pub fn file_name(&self) -> &str {
        let body = self.0.strip_suffix('/').unwrap_or(&self.0);
        body.rsplit('/').next().unwrap_or(body)
    }

    /// Classifies the entry.
    pub fn kind(&self) -> EntryKind {
        if self.is_directory() {
            EntryKind::Directory
        } else if self.is_nested_archive() {
            EntryKind::NestedArchive
        } else if self.is_class() {
            EntryKind::Class
        } else {
            EntryKind::Resource
        }
    }

    /// Returns `true` for directory entries.
    #[inline]
    pub fn is_directory(&self) -> bool {
        self.0.ends_with('/')
    }

    /// Returns `true` for `.class` entries.
    pub fn is_class(&self) -> bool {
        !self.is_directory() && self.0.ends_with(".class")
    }

    /// Returns `true` for `.jar` / `.war` entries (ASCII case-insensitive).
    pub fn is_nested_archive(&self) -> bool {
        if self.is_directory() {
            return false;
        }
        let lower = self.0.to_ascii_lowercase();
        lower.ends_with(".jar") || lower.ends_with(".war")
    }

    /// Returns `true` for a JAR manifest at any depth.
    pub fn is_manifest(&self) -> bool {
        self.0.len() >= MANIFEST_SUFFIX.len()
            && self.0.is_char_boundary(self.0.len() - MANIFEST_SUFFIX.len())
            && self.0[self.0.len() - MANIFEST_SUFFIX.len()..].eq_ignore_ascii_case(MANIFEST_SUFFIX)
    }

    /// Returns `true` for signature / security descriptor files under a
    /// metadata directory.
    pub fn is_signature_file(&self) -> bool {
        SIGNATURE_FILE.is_match(&self.0)
    }

    /// Returns `true` if the entry sits under one of [`LIBRARY_DIRS`].
    pub fn is_under_library_dir(&self) -> bool {
        LIBRARY_DIRS.iter().any(|dir| self.0.starts_with(dir))
    }

    /// Strips a leading container directory ([`CONTAINER_FLATTEN_DIRS`]).
    ///
    /// Returns `None` when nothing remains (the container directory entry
    /// itself).
    pub fn strip_container_prefix(&self) -> Option<Self> {
        let mut rest = self.0.as_str();
        for prefix in CONTAINER_FLATTEN_DIRS {
            if let Some(stripped) = rest.strip_prefix(prefix) {
                rest = stripped;
            }
        }
        if rest.is_empty() {
            None
        } else {
            // A suffix of a valid path is valid.
            Some(Self(rest.to_string()))
        }
    }

    /// Returns the directory entries that must precede this entry, outermost
    /// first (`a/b/c.txt` yields `a/` and `a/b/`).
    pub fn parent_dirs(&self) -> Vec<EntryPath> {
        let body = self.0.strip_suffix('/').unwrap_or(&self.0);
        body.match_indices('/')
            .map(|(idx, _)| Self(body[..=idx].to_string()))
            .collect()
    }

    /// Returns `true` if the path contains `needle` anywhere.
    #[inline]
    pub fn contains(&self, needle: &str) -> bool {
        self.0.contains(needle)
    }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntryPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for EntryPath {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> EntryPath {
        EntryPath::new(s).unwrap()
    }

    #[test]
    fn test_normalization() {
        assert_eq!(path("/a/b.class").as_str(), "a/b.class");
        assert_eq!(path("a\\b\\c.txt").as_str(), "a/b/c.txt");
        assert_eq!(path("dir/").as_str(), "dir/");
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(EntryPath::new("").is_err());
        assert!(EntryPath::new("/").is_err());
        assert!(EntryPath::new("a//b").is_err());
        assert!(EntryPath::new("a/../b").is_err());
        assert!(EntryPath::new("./a").is_err());
        assert!(EntryPath::new("a\0b").is_err());
    }

    #[test]
    fn test_kind() {
        assert_eq!(path("com/acme/A.class").kind(), EntryKind::Class);
        assert_eq!(path("lib/x.JAR").kind(), EntryKind::NestedArchive);
        assert_eq!(path("web.war").kind(), EntryKind::NestedArchive);
        assert_eq!(path("META-INF/services/x").kind(), EntryKind::Resource);
        assert_eq!(path("com/").kind(), EntryKind::Directory);
        assert_eq!(path("odd.jar/").kind(), EntryKind::Directory);
    }

    #[test]
    fn test_manifest_detection() {
        assert!(path("META-INF/MANIFEST.MF").is_manifest());
        assert!(path("meta-inf/manifest.mf").is_manifest());
        assert!(path("BOOT-INF/classes/META-INF/MANIFEST.MF").is_manifest());
        assert!(!path("META-INF/MANIFEST.MF.bak").is_manifest());
        assert!(!path("MF").is_manifest());
    }

    #[test]
    fn test_signature_files() {
        assert!(path("META-INF/CERT.SF").is_signature_file());
        assert!(path("META-INF/cert.rsa").is_signature_file());
        assert!(path("META-INF/KEY.DSA").is_signature_file());
        assert!(path("lib/META-INF/SIGN.EC").is_signature_file());
        assert!(!path("META-INF/services/x.SFX").is_signature_file());
        assert!(!path("CERT.SF").is_signature_file());
        // Only the extension ignores case; the directory name does not.
        assert!(path("META-INF/cert.Ec").is_signature_file());
        assert!(!path("meta-inf/CERT.SF").is_signature_file());
        assert!(!path("Meta-Inf/CERT.RSA").is_signature_file());
    }

    #[test]
    fn test_library_dirs() {
        assert!(path("BOOT-INF/lib/a.jar").is_under_library_dir());
        assert!(path("WEB-INF/lib/a.jar").is_under_library_dir());
        assert!(!path("lib/a.jar").is_under_library_dir());
        assert!(!path("x/BOOT-INF/lib/a.jar").is_under_library_dir());
    }

    #[test]
    fn test_strip_container_prefix() {
        assert_eq!(
            path("BOOT-INF/classes/com/A.class").strip_container_prefix(),
            Some(path("com/A.class"))
        );
        assert_eq!(
            path("BOOT-INF/lib/x.jar").strip_container_prefix(),
            Some(path("x.jar"))
        );
        assert_eq!(path("BOOT-INF/classes/").strip_container_prefix(), None);
        assert_eq!(
            path("META-INF/x").strip_container_prefix(),
            Some(path("META-INF/x"))
        );
    }

    #[test]
    fn test_parent_dirs() {
        let dirs: Vec<String> = path("a/b/c.txt")
            .parent_dirs()
            .into_iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(dirs, ["a/", "a/b/"]);
        assert!(path("top.txt").parent_dirs().is_empty());
        let dirs: Vec<String> = path("a/b/")
            .parent_dirs()
            .into_iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(dirs, ["a/"]);
    }

    #[test]
    fn test_file_name() {
        assert_eq!(path("a/b/c.txt").file_name(), "c.txt");
        assert_eq!(path("a/b/").file_name(), "b");
        assert_eq!(path("top").file_name(), "top");
    }
}
