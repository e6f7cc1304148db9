//! Property-based tests using proptest.
//!
//! These tests verify invariants of entry paths, timestamps, metadata
//! merging and the archive container using randomly generated inputs.

mod common;

use proptest::prelude::*;

use jarcloak::merge::{MergePolicy, merge};
use jarcloak::properties::Properties;
use jarcloak::zip::{CompressionMethod, ZipReader, ZipWriter};
use jarcloak::{DosDateTime, EntryKind, EntryPath};

/// Strategy for generating valid entry path strings.
///
/// - 1-4 path components separated by '/'
/// - Each component is 1-10 alphanumeric characters with optional underscores/dots/dashes
/// - Excludes "." and ".." segments (path traversal)
fn valid_path_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-zA-Z0-9][a-zA-Z0-9_.$-]{0,9}", 1..4)
        .prop_map(|parts| parts.join("/"))
        .prop_filter("must not contain invalid segments", |s| {
            !s.split('/').any(|seg| seg == "." || seg == "..")
        })
}

/// Strategy for property keys that need no escaping beyond what the
/// writer does.
fn property_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9._]{0,15}"
}

proptest! {
    /// Valid paths should always parse, and keep their text.
    #[test]
    fn valid_paths_parse_successfully(path in valid_path_strategy()) {
        let parsed = EntryPath::new(&path);
        prop_assert!(parsed.is_ok(), "Valid path '{}' failed to parse: {:?}", path, parsed);
        let parsed = parsed.unwrap();
        prop_assert_eq!(parsed.as_str(), path.as_str());
    }

    /// A leading slash is dropped, never kept as an absolute path.
    #[test]
    fn leading_slash_stripped(path in valid_path_strategy()) {
        let parsed = EntryPath::new(&format!("/{path}")).unwrap();
        prop_assert_eq!(parsed.as_str(), path.as_str());
    }

    /// Paths with NUL bytes should always be rejected.
    #[test]
    fn nul_bytes_rejected(
        prefix in "[a-zA-Z0-9]{0,5}",
        suffix in "[a-zA-Z0-9]{0,5}"
    ) {
        let path = format!("{}\0{}", prefix, suffix);
        prop_assert!(EntryPath::new(&path).is_err());
    }

    /// Paths with ".." as a complete segment should always be rejected.
    #[test]
    fn traversal_paths_rejected(
        prefix in "[a-zA-Z0-9]{1,5}",
        suffix in "[a-zA-Z0-9]{1,5}"
    ) {
        let path = format!("{}/../{}", prefix, suffix);
        prop_assert!(EntryPath::new(&path).is_err(), "Traversal path '{}' should be rejected", path);
    }

    /// Classification depends only on the suffix.
    #[test]
    fn classification_by_suffix(path in valid_path_strategy()) {
        let class = EntryPath::new(&format!("{path}.class")).unwrap();
        prop_assert_eq!(class.kind(), EntryKind::Class);
        let nested = EntryPath::new(&format!("{path}.JAR")).unwrap();
        prop_assert_eq!(nested.kind(), EntryKind::NestedArchive);
        let dir = EntryPath::new(&format!("{path}/")).unwrap();
        prop_assert_eq!(dir.kind(), EntryKind::Directory);
    }

    /// DOS timestamps survive a trip through Unix seconds at two-second
    /// resolution.
    #[test]
    fn dos_time_roundtrip(secs in 315_532_800i64..4_354_819_198i64) {
        let even = secs - secs.rem_euclid(2);
        let dos = DosDateTime::from_unix_secs(even);
        prop_assert_eq!(dos.as_unix_secs(), even);
        prop_assert_eq!(DosDateTime::from_system_time(dos.as_system_time()), dos);
    }

    /// Service files from any number of archives concatenate in order.
    #[test]
    fn service_files_concatenate(parts in proptest::collection::vec("[a-zA-Z.]{1,12}", 1..6)) {
        let path = EntryPath::new("META-INF/services/com.acme.Plugin").unwrap();
        let mut acc: Vec<u8> = Vec::new();
        for part in &parts {
            let merged = merge(&path, &acc, part.as_bytes());
            prop_assert_eq!(merged.policy, MergePolicy::ConcatenateIfPresent);
            acc = merged.data;
        }
        prop_assert_eq!(String::from_utf8(acc).unwrap(), parts.join("\n"));
    }

    /// Property union keeps every key, and shared keys list both values.
    #[test]
    fn property_union_keeps_all_keys(
        left in proptest::collection::btree_map(property_key_strategy(), "[a-zA-Z0-9.]{1,10}", 0..6),
        right in proptest::collection::btree_map(property_key_strategy(), "[a-zA-Z0-9.]{1,10}", 0..6),
    ) {
        let to_bytes = |map: &std::collections::BTreeMap<String, String>| {
            let mut props = Properties::new();
            for (k, v) in map {
                props.insert(k.clone(), v.clone());
            }
            props.to_bytes(None)
        };
        let path = EntryPath::new("META-INF/spring.factories").unwrap();
        let merged = merge(&path, &to_bytes(&left), &to_bytes(&right));
        let result = Properties::parse(&merged.data);

        for (key, value) in &left {
            let joined = match right.get(key) {
                Some(other) => format!("{value},{other}"),
                None => value.clone(),
            };
            prop_assert_eq!(result.get(key), Some(joined.as_str()));
        }
        for (key, value) in &right {
            if !left.contains_key(key) {
                prop_assert_eq!(result.get(key), Some(value.as_str()));
            }
        }
    }

    /// Whatever is written can be read back, with either method.
    #[test]
    fn zip_entries_read_back(
        data in proptest::collection::vec(any::<u8>(), 0..4096),
        name in valid_path_strategy(),
        deflate in any::<bool>(),
    ) {
        let method = if deflate { CompressionMethod::Deflated } else { CompressionMethod::Stored };
        let path = EntryPath::new(&name).unwrap();
        let mut writer = ZipWriter::new(Vec::new(), 6);
        let written = writer.add_entry(&path, &data, method, common::fixed_time()).unwrap();
        let (archive, _) = writer.finish().unwrap();

        let entry = ZipReader::new(&archive).unwrap().next_entry().unwrap().unwrap();
        prop_assert_eq!(entry.path, path);
        prop_assert_eq!(entry.crc32, written.crc32);
        prop_assert_eq!(entry.data, data);
    }
}
