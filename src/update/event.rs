use crate::store::{Attributes, EntryKind, EntryMeta};
use std::mem;
use std::path::{Path, PathBuf};

/// A single changed property of an existing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldChange {
    Size(Option<u64>),
    Modified(Option<i64>),
    Created(Option<i64>),
    Attributes(Attributes),
}

impl FieldChange {
    pub fn apply(self, meta: &mut EntryMeta) {
        match self {
            FieldChange::Size(v) => meta.size = v,
            FieldChange::Modified(v) => meta.modified = v,
            FieldChange::Created(v) => meta.created = v,
            FieldChange::Attributes(v) => meta.attributes = v,
        }
    }

    /// Whether both changes target the same field
    pub fn same_field(&self, other: &FieldChange) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }
}

/// A change to the volume, addressed by absolute path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created {
        path: PathBuf,
        kind: EntryKind,
        meta: EntryMeta,
    },
    Deleted {
        path: PathBuf,
    },
    Renamed {
        old: PathBuf,
        new: PathBuf,
    },
    Modified {
        path: PathBuf,
        change: FieldChange,
    },
}

impl ChangeEvent {
    pub fn created_file(path: impl Into<PathBuf>, meta: EntryMeta) -> Self {
        ChangeEvent::Created {
            path: path.into(),
            kind: EntryKind::File,
            meta,
        }
    }

    pub fn created_folder(path: impl Into<PathBuf>) -> Self {
        ChangeEvent::Created {
            path: path.into(),
            kind: EntryKind::Folder,
            meta: EntryMeta::default(),
        }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        ChangeEvent::Deleted { path: path.into() }
    }

    pub fn renamed(old: impl Into<PathBuf>, new: impl Into<PathBuf>) -> Self {
        ChangeEvent::Renamed {
            old: old.into(),
            new: new.into(),
        }
    }

    pub fn modified(path: impl Into<PathBuf>, change: FieldChange) -> Self {
        ChangeEvent::Modified {
            path: path.into(),
            change,
        }
    }

    /// The entry the event is about (the source of a rename)
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created { path, .. }
            | ChangeEvent::Deleted { path }
            | ChangeEvent::Modified { path, .. } => path,
            ChangeEvent::Renamed { old, .. } => old,
        }
    }

    /// Every path the event touches
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        let second = match self {
            ChangeEvent::Renamed { new, .. } => Some(new.as_path()),
            _ => None,
        };
        std::iter::once(self.path()).chain(second)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChangeEvent::Created { .. } => "create",
            ChangeEvent::Deleted { .. } => "delete",
            ChangeEvent::Renamed { .. } => "rename",
            ChangeEvent::Modified { .. } => "modify",
        }
    }
}
