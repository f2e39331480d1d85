use crate::store::{EntryId, EntryKind, NameStore, extension_of};
use crate::utils::fold::{Folding, fold, natural_cmp};
use serde::Serialize;
use std::cmp::Ordering;

/// The searchable indices kept over the name store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum IndexKind {
    Name,
    Path,
    Extension,
    Size,
    DateModified,
    DateCreated,
    Kind,
}

impl IndexKind {
    pub const ALL: [IndexKind; 7] = [
        IndexKind::Name,
        IndexKind::Path,
        IndexKind::Extension,
        IndexKind::Size,
        IndexKind::DateModified,
        IndexKind::DateCreated,
        IndexKind::Kind,
    ];

    #[inline]
    pub(crate) fn slot(self) -> usize {
        self as usize
    }
}

/// Folded name with natural-number collation
#[derive(Debug, Clone)]
pub struct NameKey(Box<str>);

impl NameKey {
    pub fn new(name: &str) -> Self {
        Self(fold(name, Folding::SORT).into())
    }

    /// Wrap text that is already folded
    pub fn from_folded(folded: &str) -> Self {
        Self(folded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Folded full path; separators sort before every other character
#[derive(Debug, Clone)]
pub struct PathKey(Box<str>);

const PATH_SEP_KEY: char = '\u{1}';

impl PathKey {
    pub fn new(path: &str, separator: char) -> Self {
        let folded = fold(path, Folding::SORT);
        Self(
            folded
                .chars()
                .map(|c| if c == separator { PATH_SEP_KEY } else { c })
                .collect::<String>()
                .into(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! natural_ord {
    ($t:ty) => {
        impl Ord for $t {
            fn cmp(&self, other: &Self) -> Ordering {
                natural_cmp(&self.0, &other.0)
            }
        }

        impl PartialOrd for $t {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl PartialEq for $t {
            fn eq(&self, other: &Self) -> bool {
                self.cmp(other) == Ordering::Equal
            }
        }

        impl Eq for $t {}
    };
}

natural_ord!(NameKey);
natural_ord!(PathKey);

/// Every index key of one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryKeys {
    pub name: NameKey,
    pub path: PathKey,
    pub ext: Box<str>,
    pub size: Option<u64>,
    pub modified: Option<i64>,
    pub created: Option<i64>,
    pub kind: EntryKind,
}

impl EntryKeys {
    /// Keys of a live entry as the store currently describes it
    pub fn of(store: &NameStore, id: EntryId) -> Option<Self> {
        let entry = store.get(id)?;
        let path = store.path_of(id)?;
        Some(Self {
            name: NameKey::new(&entry.name),
            path: PathKey::new(&path, store.separator()),
            ext: fold_ext(extension_of(&entry.name).unwrap_or("")),
            size: entry.meta.size,
            modified: entry.meta.modified,
            created: entry.meta.created,
            kind: entry.kind,
        })
    }
}

/// Extension bucket key
pub fn fold_ext(ext: &str) -> Box<str> {
    fold(ext, Folding::SORT).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_key_is_case_and_diacritic_insensitive() {
        assert_eq!(NameKey::new("LOG.TXT"), NameKey::new("log.txt"));
        assert_eq!(NameKey::new("Résumé"), NameKey::new("resume"));
        assert!(NameKey::new("file2") < NameKey::new("File10"));
    }

    #[test]
    fn test_path_key_separator_sorts_first() {
        // "a/b" must precede "a b" and "a-b" even though '/' > ' ' in ASCII
        let nested = PathKey::new("/vol/a/b", '/');
        let spaced = PathKey::new("/vol/a b", '/');
        let dashed = PathKey::new("/vol/a-b", '/');
        assert!(nested < spaced);
        assert!(nested < dashed);
    }

    #[test]
    fn test_entry_keys() {
        let mut store = NameStore::with_separator(1024, '/');
        let root = store.intern(None, "/vol", EntryKind::Folder).unwrap();
        let id = store.intern(Some(root), "Notes.TXT", EntryKind::File).unwrap();

        let keys = EntryKeys::of(&store, id).unwrap();
        assert_eq!(keys.name.as_str(), "notes.txt");
        assert_eq!(&*keys.ext, "txt");
        assert_eq!(keys.kind, EntryKind::File);
        assert!(EntryKeys::of(&store, 99).is_none());
    }
}
