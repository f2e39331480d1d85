use super::{EnumeratedEntry, VolumeEnumerator, WalkItem};
use crate::store::{Attributes, EntryKind, EntryMeta};
use ignore::WalkBuilder;
use std::fs::{self, Metadata};
use std::io;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Enumerates real directories with the `ignore` walker.
///
/// Everything is indexed: hidden files and ignore files get no special
/// treatment, and symlinks are recorded but not followed.
#[derive(Debug, Clone)]
pub struct FsEnumerator {
    roots: Vec<PathBuf>,
}

impl FsEnumerator {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }
}

impl VolumeEnumerator for FsEnumerator {
    fn roots(&self) -> Vec<PathBuf> {
        self.roots.clone()
    }

    fn walk(&self, root: &Path, visit: &mut dyn FnMut(WalkItem) -> ControlFlow<()>) -> io::Result<()> {
        // Surface a missing root as an error rather than an unreadable item
        fs::symlink_metadata(root)?;

        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(false)
            .build();

        for result in walker {
            let item = match result {
                Ok(entry) => match entry.metadata() {
                    Ok(meta) => WalkItem::Entry(EnumeratedEntry {
                        path: entry.path().to_path_buf(),
                        kind: if meta.is_dir() { EntryKind::Folder } else { EntryKind::File },
                        meta: entry_meta(entry.path(), &meta),
                    }),
                    Err(err) => WalkItem::Unreadable {
                        path: entry.path().to_path_buf(),
                        reason: err.to_string(),
                    },
                },
                Err(err) => WalkItem::Unreadable {
                    path: error_path(&err).unwrap_or_else(|| root.to_path_buf()),
                    reason: err.to_string(),
                },
            };
            if visit(item).is_break() {
                break;
            }
        }
        Ok(())
    }
}

/// Metadata of an entry as the name store records it
pub fn entry_meta(path: &Path, meta: &Metadata) -> EntryMeta {
    let mut attributes = Attributes::empty();
    attributes.set(Attributes::READONLY, meta.permissions().readonly());
    attributes.set(Attributes::SYMLINK, meta.file_type().is_symlink());
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'));
    attributes.set(Attributes::HIDDEN, hidden);

    EntryMeta {
        size: (!meta.is_dir()).then(|| meta.len()),
        modified: meta.modified().ok().and_then(unix_seconds),
        created: meta.created().ok().and_then(unix_seconds),
        attributes,
    }
}

fn unix_seconds(time: SystemTime) -> Option<i64> {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_secs()).ok(),
        Err(e) => i64::try_from(e.duration().as_secs()).ok().map(|s| -s),
    }
}

fn error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => error_path(err),
        ignore::Error::Loop { child, .. } => Some(child.clone()),
        _ => None,
    }
}
