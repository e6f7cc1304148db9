//! JAR manifest reading.
//!
//! Only the main section is interpreted; per-entry sections are kept in the
//! raw bytes, which are re-emitted unchanged.

use log::warn;

use crate::entry_path::MANIFEST_PATH;
use crate::zip::ZipReader;
use crate::{Error, Result};

/// Main-class package that marks an application-container archive.
pub const CONTAINER_MAIN_PACKAGE: &str = "org.springframework.boot";

/// Name of the main class attribute.
pub const MAIN_CLASS: &str = "Main-Class";

/// Name of the application start class attribute.
pub const START_CLASS: &str = "Start-Class";

/// A parsed manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    raw: Vec<u8>,
    main: Vec<(String, String)>,
}

impl Manifest {
    /// Parses manifest bytes.
    ///
    /// Parsing is lenient: malformed lines are skipped with a warning, since
    /// the manifest is copied to the output verbatim either way.
    pub fn parse(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let mut main: Vec<(String, String)> = Vec::new();

        for line in text.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                break;
            }
            if let Some(continuation) = line.strip_prefix(' ') {
                match main.last_mut() {
                    Some((_, value)) => value.push_str(continuation),
                    None => warn!("manifest continuation line without an attribute"),
                }
                continue;
            }
            match line.split_once(':') {
                Some((name, value)) if !name.is_empty() => {
                    let value = value.strip_prefix(' ').unwrap_or(value);
                    main.push((name.to_string(), value.to_string()));
                }
                _ => warn!("skipping malformed manifest line {line:?}"),
            }
        }

        Self {
            raw: bytes.to_vec(),
            main,
        }
    }

    /// Finds and parses the top-level manifest of an archive.
    ///
    /// Returns `Ok(None)` if the archive has no manifest.
    ///
    /// # Errors
    ///
    /// Propagates archive read errors for entries preceding the manifest.
    pub fn find(archive: &[u8]) -> Result<Option<Self>> {
        let mut reader = ZipReader::new(archive)?;
        while let Some(entry) = reader.next_entry()? {
            if entry.path.as_str().eq_ignore_ascii_case(MANIFEST_PATH) {
                return Ok(Some(Self::parse(&entry.data)));
            }
        }
        Ok(None)
    }

    /// Looks up a main-section attribute (names are case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.main
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the main-section attributes in file order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.main.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the manifest bytes as read.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Extracts the attributes a protection run depends on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingManifestAttribute`] if `Main-Class` is absent
    /// or empty.
    pub fn info(&self) -> Result<ManifestInfo> {
        let main_class = self
            .get(MAIN_CLASS)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(Error::MissingManifestAttribute {
                attribute: MAIN_CLASS,
            })?;
        let start_class = self
            .get(START_CLASS)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Ok(ManifestInfo {
            main_class: main_class.to_string(),
            start_class,
        })
    }
}

/// Manifest attributes read once per top-level archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestInfo {
    /// The `Main-Class` attribute.
    pub main_class: String,
    /// The `Start-Class` attribute, if any.
    pub start_class: Option<String>,
}

impl ManifestInfo {
    /// Returns `true` if the archive is an application-container archive
    /// whose class and library directories are flattened into the root.
    pub fn is_container(&self) -> bool {
        self.main_class.starts_with(CONTAINER_MAIN_PACKAGE)
    }
}
