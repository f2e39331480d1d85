use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stable entry identifier, allocated monotonically by the name store
pub type EntryId = u32;

/// File or folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Folder,
}

impl EntryKind {
    pub fn is_folder(self) -> bool {
        self == EntryKind::Folder
    }
}

/// Attribute flags of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Attributes(pub u32);

impl Attributes {
    pub const READONLY: u32 = 1 << 0;
    pub const HIDDEN: u32 = 1 << 1;
    pub const SYSTEM: u32 = 1 << 2;
    pub const ARCHIVE: u32 = 1 << 3;
    pub const SYMLINK: u32 = 1 << 4;

    const LETTERS: [(char, u32); 5] = [
        ('R', Self::READONLY),
        ('H', Self::HIDDEN),
        ('S', Self::SYSTEM),
        ('A', Self::ARCHIVE),
        ('L', Self::SYMLINK),
    ];

    pub fn empty() -> Self {
        Self(0)
    }

    #[inline]
    pub fn contains(&self, flags: u32) -> bool {
        self.0 & flags == flags
    }

    #[inline]
    pub fn set(&mut self, flag: u32, on: bool) {
        if on {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    /// Parse attribute letters such as `RH` (case-insensitive)
    pub fn from_letters(letters: &str) -> Option<Self> {
        let mut bits = 0;
        for c in letters.chars() {
            let upper = c.to_ascii_uppercase();
            let (_, flag) = Self::LETTERS.iter().find(|(l, _)| *l == upper)?;
            bits |= flag;
        }
        Some(Self(bits))
    }

    pub fn letters(&self) -> String {
        Self::LETTERS
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(l, _)| *l)
            .collect()
    }
}

/// Size, timestamps and attributes of an entry.
///
/// Timestamps are Unix seconds (UTC). Missing values sort before any value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntryMeta {
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified: Option<i64>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub attributes: Attributes,
}

/// One file or folder record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: EntryId,
    pub name: Arc<str>,
    pub parent: Option<EntryId>,
    pub kind: EntryKind,
    pub meta: EntryMeta,
}

impl Entry {
    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }

    /// Text after the last `.` of the name; a leading dot does not start an
    /// extension (`.bashrc` has none)
    pub fn extension(&self) -> Option<&str> {
        extension_of(&self.name)
    }
}

pub fn extension_of(name: &str) -> Option<&str> {
    match name.rfind('.') {
        Some(0) | None => None,
        Some(pos) if pos + 1 == name.len() => None,
        Some(pos) => Some(&name[pos + 1..]),
    }
}
