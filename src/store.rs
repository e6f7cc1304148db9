//! Insertion-ordered entry storage for one logical archive.

use std::collections::HashMap;

use crate::entry_path::{EntryKind, EntryPath};
use crate::timestamp::DosDateTime;

/// One archive entry held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Normalized path key.
    pub path: EntryPath,
    /// Uncompressed entry data (empty for directories).
    pub data: Vec<u8>,
    /// Modification time.
    pub modified: DosDateTime,
}

impl Entry {
    /// Creates an entry.
    pub fn new(path: EntryPath, data: Vec<u8>, modified: DosDateTime) -> Self {
        Self {
            path,
            data,
            modified,
        }
    }

    /// Classifies the entry by its path.
    #[inline]
    pub fn kind(&self) -> EntryKind {
        self.path.kind()
    }
}

/// An insertion-ordered map from path to [`Entry`].
///
/// Replacing an existing path keeps the position of its first insertion, so
/// the written archive follows the order in which paths were first seen.
///
/// # Example
///
/// ```
/// use jarcloak::store::{Entry, EntryStore};
/// use jarcloak::{DosDateTime, EntryPath};
///
/// let mut store = EntryStore::new();
/// let a = EntryPath::new("a.txt").unwrap();
/// let b = EntryPath::new("b.txt").unwrap();
/// store.insert(Entry::new(a.clone(), b"1".to_vec(), DosDateTime::EPOCH));
/// store.insert(Entry::new(b, b"2".to_vec(), DosDateTime::EPOCH));
/// store.insert(Entry::new(a.clone(), b"3".to_vec(), DosDateTime::EPOCH));
///
/// let order: Vec<_> = store.iter().map(|e| e.path.as_str()).collect();
/// assert_eq!(order, ["a.txt", "b.txt"]);
/// assert_eq!(store.get(&a).unwrap().data, b"3");
/// ```
#[derive(Debug, Clone, Default)]
pub struct EntryStore {
    entries: Vec<Entry>,
    index: HashMap<EntryPath, usize>,
}

impl EntryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if `path` is present.
    pub fn contains(&self, path: &EntryPath) -> bool {
        self.index.contains_key(path)
    }

    /// Looks up an entry.
    pub fn get(&self, path: &EntryPath) -> Option<&Entry> {
        self.index.get(path).map(|&i| &self.entries[i])
    }

    /// Looks up an entry for modification.
    pub fn get_mut(&mut self, path: &EntryPath) -> Option<&mut Entry> {
        match self.index.get(path) {
            Some(&i) => self.entries.get_mut(i),
            None => None,
        }
    }

    /// Inserts an entry, replacing (in place) any entry with the same path.
    ///
    /// Returns the replaced entry.
    pub fn insert(&mut self, entry: Entry) -> Option<Entry> {
        match self.index.get(&entry.path) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i], entry)),
            None => {
                self.index.insert(entry.path.clone(), self.entries.len());
                self.entries.push(entry);
                None
            }
        }
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    /// Iterates mutably over entries in insertion order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entry> {
        self.entries.iter_mut()
    }

    /// Returns the total size of entry data.
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.data.len() as u64).sum()
    }
}

impl IntoIterator for EntryStore {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a EntryStore {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
