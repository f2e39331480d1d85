use super::catalog::Catalog;
use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::{Error, Result};
use crate::providers::{EnumeratedEntry, VolumeEnumerator, WalkItem};
use crate::store::{EntryId, EntryKind, NameStore};
use crate::utils::CancellationToken;
use crate::utils::progress::BuildProgress;
use globset::{Glob, GlobSet, GlobSetBuilder};
use rustc_hash::{FxHashMap, FxHashSet};
use std::io;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Summary of a full build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub roots: usize,
    pub files: usize,
    pub folders: usize,
    pub excluded: usize,
    pub unreadable: usize,
    pub elapsed: Duration,
}

impl BuildStats {
    pub fn entries(&self) -> usize {
        self.files + self.folders
    }
}

/// A freshly built catalog plus what went wrong along the way
#[derive(Debug)]
pub struct BuildOutcome {
    pub catalog: Catalog,
    pub warnings: Vec<Diagnostic>,
    pub stats: BuildStats,
}

/// Result of reconciling one subtree
#[derive(Debug, Default)]
pub struct ResyncOutcome {
    pub upserted: usize,
    pub removed: usize,
    pub warnings: Vec<Diagnostic>,
}

/// Builds catalogs from a volume enumerator
pub struct IndexBuilder<'a> {
    config: &'a EngineConfig,
    exclude: GlobSet,
    cancel: CancellationToken,
    progress: bool,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(config: &'a EngineConfig) -> Result<Self> {
        let mut globs = GlobSetBuilder::new();
        for pattern in &config.exclude {
            globs.add(Glob::new(pattern)?);
        }
        Ok(Self {
            config,
            exclude: globs.build()?,
            cancel: CancellationToken::new(),
            progress: false,
        })
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn is_excluded(&self, path: &Path) -> bool {
        if self.exclude.is_empty() {
            return false;
        }
        path.file_name().is_some_and(|name| self.exclude.is_match(name)) || self.exclude.is_match(path)
    }

    /// Enumerate every root into a fresh name store and bulk-load the
    /// indices. Unreadable subtrees become warnings; exceeding
    /// `max_entries` fails with `ResourceExhausted`.
    pub fn rebuild(&self, enumerator: &dyn VolumeEnumerator) -> Result<BuildOutcome> {
        let start = Instant::now();
        let progress = BuildProgress::new(self.progress);
        let mut store = NameStore::new(self.config.max_path_len);
        let mut warnings = Vec::new();
        let mut stats = BuildStats::default();

        for root in enumerator.roots() {
            let root_name = root.to_string_lossy().into_owned();
            info!("Enumerating {}", root_name);
            stats.roots += 1;

            let root_id = store.intern(None, &root_name, EntryKind::Folder)?;
            let mut dirs: FxHashMap<PathBuf, EntryId> = FxHashMap::default();
            dirs.insert(root.clone(), root_id);

            let mut skipping: Option<PathBuf> = None;
            let mut failure: Option<Error> = None;
            let mut seen = 0usize;

            let walked = enumerator.walk(&root, &mut |item| {
                if self.cancel.is_cancelled() {
                    failure = Some(Error::Cancelled);
                    return ControlFlow::Break(());
                }
                seen += 1;
                progress.entries(&root_name, seen);

                let entry = match item {
                    WalkItem::Entry(entry) => entry,
                    WalkItem::Unreadable { path, reason } => {
                        stats.unreadable += 1;
                        warnings.push(
                            Diagnostic::new(DiagnosticKind::EnumerationWarning, reason).with_path(&path),
                        );
                        return ControlFlow::Continue(());
                    }
                };

                if entry.path == root {
                    if let Err(e) = store.set_meta(root_id, entry.meta) {
                        failure = Some(e);
                        return ControlFlow::Break(());
                    }
                    return ControlFlow::Continue(());
                }
                if skipping.as_ref().is_some_and(|s| entry.path.starts_with(s)) {
                    return ControlFlow::Continue(());
                }
                if self.is_excluded(&entry.path) {
                    stats.excluded += 1;
                    skipping = entry.is_folder().then(|| entry.path.clone());
                    return ControlFlow::Continue(());
                }

                if store.live_count() >= self.config.max_entries {
                    failure = Some(Error::ResourceExhausted {
                        what: "entries",
                        limit: self.config.max_entries,
                    });
                    return ControlFlow::Break(());
                }

                match intern_entry(&mut store, &dirs, &entry) {
                    Ok(Some(id)) => {
                        if entry.kind.is_folder() {
                            dirs.insert(entry.path, id);
                        }
                    }
                    Ok(None) => {
                        warnings.push(
                            Diagnostic::new(DiagnosticKind::EnumerationWarning, "parent folder was not indexed")
                                .with_path(&entry.path),
                        );
                    }
                    Err(e) => {
                        failure = Some(e);
                        return ControlFlow::Break(());
                    }
                }
                ControlFlow::Continue(())
            });

            if let Some(err) = failure {
                progress.finish("Aborted");
                return Err(err);
            }
            if let Err(err) = walked {
                stats.unreadable += 1;
                warnings.push(
                    Diagnostic::new(DiagnosticKind::EnumerationWarning, err.to_string()).with_path(&root),
                );
            }
        }

        progress.stage("Building indices...");
        for entry in store.iter() {
            if entry.is_folder() {
                stats.folders += 1;
            } else {
                stats.files += 1;
            }
        }
        let catalog = Catalog::new(store);
        stats.elapsed = start.elapsed();
        progress.finish(&format!("Indexed {} entries", stats.entries()));

        info!(
            "Built catalog: {} files, {} folders, {} excluded, {} unreadable in {:.2?}",
            stats.files, stats.folders, stats.excluded, stats.unreadable, stats.elapsed
        );

        Ok(BuildOutcome {
            catalog,
            warnings,
            stats,
        })
    }

    /// Re-enumerate the subtree at `path` and reconcile it in place:
    /// vanished entries are removed, new ones added, metadata refreshed.
    pub fn resync(
        &self,
        catalog: &mut Catalog,
        path: &Path,
        enumerator: &dyn VolumeEnumerator,
    ) -> Result<ResyncOutcome> {
        let mut outcome = ResyncOutcome::default();
        let existing = catalog.store().resolve(path);
        let before: Vec<EntryId> = match existing {
            Some(id) => std::iter::once(id).chain(catalog.store().descendants(id)).collect(),
            None => Vec::new(),
        };

        let mut seen: FxHashSet<EntryId> = FxHashSet::default();
        let mut unreadable: Vec<PathBuf> = Vec::new();
        let mut skipping: Option<PathBuf> = None;
        let mut failure: Option<Error> = None;

        let walked = enumerator.walk(path, &mut |item| {
            if self.cancel.is_cancelled() {
                failure = Some(Error::Cancelled);
                return ControlFlow::Break(());
            }
            let entry = match item {
                WalkItem::Entry(entry) => entry,
                WalkItem::Unreadable { path, reason } => {
                    outcome.warnings.push(
                        Diagnostic::new(DiagnosticKind::EnumerationWarning, reason).with_path(&path),
                    );
                    unreadable.push(path);
                    return ControlFlow::Continue(());
                }
            };
            if skipping.as_ref().is_some_and(|s| entry.path.starts_with(s)) {
                return ControlFlow::Continue(());
            }
            if self.is_excluded(&entry.path) {
                skipping = entry.is_folder().then(|| entry.path.clone());
                return ControlFlow::Continue(());
            }

            let Some((parent, name)) = locate(catalog.store(), &entry.path) else {
                outcome.warnings.push(
                    Diagnostic::new(DiagnosticKind::EnumerationWarning, "parent folder is not indexed")
                        .with_path(&entry.path),
                );
                return ControlFlow::Continue(());
            };
            match catalog.upsert(parent, &name, entry.kind, entry.meta) {
                Ok(interned) => {
                    seen.insert(interned.id());
                    outcome.upserted += 1;
                }
                Err(e) => {
                    failure = Some(e);
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        });

        if let Some(err) = failure {
            return Err(err);
        }
        match walked {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                // The whole subtree is gone
                if let Some(id) = existing {
                    outcome.removed += catalog.remove_tree(id);
                }
                debug!("Resync of {}: path vanished", path.display());
                return Ok(outcome);
            }
            Err(err) => return Err(err.into()),
        }

        for id in before {
            if seen.contains(&id) || !catalog.store().is_live(id) {
                continue;
            }
            let under_unreadable = catalog
                .store()
                .path_of(id)
                .is_some_and(|p| unreadable.iter().any(|u| Path::new(&p).starts_with(u)));
            if !under_unreadable {
                outcome.removed += catalog.remove_tree(id);
            }
        }

        debug!(
            "Resync of {}: {} upserted, {} removed",
            path.display(),
            outcome.upserted,
            outcome.removed
        );
        Ok(outcome)
    }
}

/// Intern one walked entry under its already-interned parent folder.
/// `Ok(None)` when the parent is unknown.
fn intern_entry(
    store: &mut NameStore,
    dirs: &FxHashMap<PathBuf, EntryId>,
    entry: &EnumeratedEntry,
) -> Result<Option<EntryId>> {
    let (Some(parent_path), Some(name)) = (entry.path.parent(), entry.path.file_name()) else {
        return Ok(None);
    };
    let Some(&parent) = dirs.get(parent_path) else {
        return Ok(None);
    };
    let interned = store.intern_with(Some(parent), &name.to_string_lossy(), entry.kind, entry.meta)?;
    Ok(Some(interned.id()))
}

/// Parent id and name for an absolute path. Roots have no parent.
pub(crate) fn locate(store: &NameStore, path: &Path) -> Option<(Option<EntryId>, String)> {
    if let Some(root) = store.resolve(path)
        && store.get(root).is_some_and(|e| e.parent.is_none())
    {
        return Some((None, store.get(root)?.name.to_string()));
    }
    let parent = store.resolve(path.parent()?)?;
    Some((Some(parent), path.file_name()?.to_string_lossy().into_owned()))
}
