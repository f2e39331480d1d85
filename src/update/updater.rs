use super::event::ChangeEvent;
use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::{Error, Result};
use crate::index::Catalog;
use crate::index::build::locate;
use crate::store::NameStore;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What one `apply` call did, including any queued events it unblocked
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ApplyReport {
    pub applied: usize,
    /// Events parked until their parent shows up
    pub queued: usize,
    /// No-ops (deleting an unknown path and the like)
    pub ignored: usize,
    pub dropped: Vec<Diagnostic>,
}

impl ApplyReport {
    fn merge(&mut self, other: ApplyReport) {
        self.applied += other.applied;
        self.queued += other.queued;
        self.ignored += other.ignored;
        self.dropped.extend(other.dropped);
    }
}

enum Outcome {
    Applied,
    Ignored,
    /// A parent (or the rename source) is not in the store yet
    Blocked,
}

struct Pending {
    event: ChangeEvent,
    attempts: u32,
}

/// Applies path-addressed change events to a catalog.
///
/// Events for the same entry are applied in arrival order. An event whose
/// parent folder is unknown is parked and retried after every later event
/// that does apply; one that stays blocked past the retry limit is dropped
/// and the nearest indexed ancestor is queued for a resync.
pub struct LiveUpdater {
    retry_limit: u32,
    max_pending: usize,
    pending: VecDeque<Pending>,
    resync: Vec<PathBuf>,
    /// Events seen while a rebuild is enumerating, with the number of
    /// rebuilds in flight
    journal: Option<(Vec<ChangeEvent>, usize)>,
}

impl LiveUpdater {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            retry_limit: config.pending_retry_limit,
            max_pending: config.max_pending_events.max(1),
            pending: VecDeque::new(),
            resync: Vec::new(),
            journal: None,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Subtrees that need re-enumeration because events were lost
    pub fn take_resync_requests(&mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.resync)
    }

    /// Start recording every event passed to `apply`, until the matching
    /// [`end_journal`](Self::end_journal)
    pub fn begin_journal(&mut self) {
        match &mut self.journal {
            Some((_, builds)) => *builds += 1,
            None => self.journal = Some((Vec::new(), 1)),
        }
    }

    /// Events recorded since the oldest rebuild still in flight began.
    /// Recording stops once every `begin_journal` has been matched.
    pub fn end_journal(&mut self) -> Vec<ChangeEvent> {
        match self.journal.take() {
            Some((events, builds)) if builds > 1 => {
                self.journal = Some((events.clone(), builds - 1));
                events
            }
            Some((events, _)) => events,
            None => Vec::new(),
        }
    }

    pub fn apply(&mut self, catalog: &mut Catalog, event: ChangeEvent) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();
        if let Some((events, _)) = &mut self.journal {
            events.push(event.clone());
        }

        if self.waits_on_pending(&event, self.pending.len()) {
            debug!("Queueing {} {} behind pending events", event.label(), event.path().display());
            self.enqueue(catalog.store(), event, &mut report);
            return Ok(report);
        }

        match self.try_apply(catalog, &event) {
            Ok(Outcome::Applied) => {
                report.applied += 1;
                let retried = self.retry_pending(catalog)?;
                report.merge(retried);
            }
            Ok(Outcome::Ignored) => report.ignored += 1,
            Ok(Outcome::Blocked) => self.enqueue(catalog.store(), event, &mut report),
            Err(e @ (Error::NotAFolder(_) | Error::UnknownEntry(_))) => {
                let diagnostic = self.drop_event(catalog.store(), &event, &e.to_string());
                report.dropped.push(diagnostic);
            }
            Err(e) => return Err(e),
        }
        Ok(report)
    }

    /// Whether one of the first `upto` pending events concerns `event`'s
    /// subject or one of its ancestors
    fn waits_on_pending(&self, event: &ChangeEvent, upto: usize) -> bool {
        self.pending.iter().take(upto).any(|p| {
            p.event
                .paths()
                .any(|queued| event.paths().any(|path| path.starts_with(queued)))
        })
    }

    fn enqueue(&mut self, store: &NameStore, event: ChangeEvent, report: &mut ApplyReport) {
        if self.pending.len() >= self.max_pending
            && let Some(oldest) = self.pending.pop_front()
        {
            let diagnostic = self.drop_event(store, &oldest.event, "pending event queue is full");
            report.dropped.push(diagnostic);
        }
        self.pending.push_back(Pending { event, attempts: 0 });
        report.queued += 1;
    }

    /// Re-run parked events until a full pass makes no progress
    fn retry_pending(&mut self, catalog: &mut Catalog) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();
        loop {
            let mut progressed = false;
            let mut i = 0;
            while i < self.pending.len() {
                if self.waits_on_pending(&self.pending[i].event, i) {
                    i += 1;
                    continue;
                }
                let event = self.pending[i].event.clone();
                match self.try_apply(catalog, &event) {
                    Ok(Outcome::Applied) => {
                        self.pending.remove(i);
                        report.applied += 1;
                        progressed = true;
                    }
                    Ok(Outcome::Ignored) => {
                        self.pending.remove(i);
                        report.ignored += 1;
                        progressed = true;
                    }
                    Ok(Outcome::Blocked) => {
                        self.pending[i].attempts += 1;
                        if self.pending[i].attempts > self.retry_limit {
                            if let Some(p) = self.pending.remove(i) {
                                let diagnostic =
                                    self.drop_event(catalog.store(), &p.event, "parent never appeared");
                                report.dropped.push(diagnostic);
                            }
                            progressed = true;
                        } else {
                            i += 1;
                        }
                    }
                    Err(e @ (Error::NotAFolder(_) | Error::UnknownEntry(_))) => {
                        if let Some(p) = self.pending.remove(i) {
                            let diagnostic = self.drop_event(catalog.store(), &p.event, &e.to_string());
                            report.dropped.push(diagnostic);
                        }
                        progressed = true;
                    }
                    Err(e) => return Err(e),
                }
            }
            if !progressed || self.pending.is_empty() {
                return Ok(report);
            }
        }
    }

    fn try_apply(&mut self, catalog: &mut Catalog, event: &ChangeEvent) -> Result<Outcome> {
        match event {
            ChangeEvent::Created { path, kind, meta } => {
                let Some((parent, name)) = locate(catalog.store(), path) else {
                    return Ok(Outcome::Blocked);
                };
                catalog.upsert(parent, &name, *kind, *meta)?;
                Ok(Outcome::Applied)
            }
            ChangeEvent::Deleted { path } => match catalog.store().resolve(path) {
                Some(id) => {
                    catalog.remove_tree(id);
                    Ok(Outcome::Applied)
                }
                None => Ok(Outcome::Ignored),
            },
            ChangeEvent::Renamed { old, new } => {
                let Some(id) = catalog.store().resolve(old) else {
                    if catalog.store().resolve(new).is_some() {
                        return Ok(Outcome::Ignored);
                    }
                    if locate(catalog.store(), old).is_none() {
                        return Ok(Outcome::Blocked);
                    }
                    // The source was never indexed; pick the target up by walking it
                    self.request_resync(catalog.store(), new);
                    return Ok(Outcome::Ignored);
                };
                let Some((parent, name)) = locate(catalog.store(), new) else {
                    return Ok(Outcome::Blocked);
                };
                catalog.rename(id, parent, &name)?;
                Ok(Outcome::Applied)
            }
            ChangeEvent::Modified { path, change } => {
                let store = catalog.store();
                let Some(entry) = store.resolve(path).and_then(|id| store.get(id)) else {
                    return Ok(if locate(store, path).is_none() {
                        Outcome::Blocked
                    } else {
                        Outcome::Ignored
                    });
                };
                let id = entry.id;
                let mut meta = entry.meta;
                change.apply(&mut meta);
                if meta == entry.meta {
                    return Ok(Outcome::Ignored);
                }
                catalog.update_meta(id, meta)?;
                Ok(Outcome::Applied)
            }
        }
    }

    fn drop_event(&mut self, store: &NameStore, event: &ChangeEvent, reason: &str) -> Diagnostic {
        for path in event.paths() {
            self.request_resync(store, path);
        }
        Diagnostic::new(
            DiagnosticKind::EventDropped,
            format!("dropped {} event: {}", event.label(), reason),
        )
        .with_path(event.path())
    }

    /// Queue the nearest indexed ancestor of `path` (or `path` itself)
    fn request_resync(&mut self, store: &NameStore, path: &Path) {
        let Some(target) = path.ancestors().find(|p| store.resolve(p).is_some()) else {
            return;
        };
        if self.resync.iter().any(|r| target.starts_with(r)) {
            return;
        }
        self.resync.retain(|r| !r.starts_with(target));
        self.resync.push(target.to_path_buf());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexKind;
    use crate::store::{EntryKind, EntryMeta};
    use crate::update::event::FieldChange;

    fn setup() -> (LiveUpdater, Catalog) {
        let config = EngineConfig {
            pending_retry_limit: 2,
            max_pending_events: 4,
            ..EngineConfig::default()
        };
        let mut catalog = Catalog::empty(config.max_path_len);
        catalog.upsert(None, "/vol", EntryKind::Folder, EntryMeta::default()).unwrap();
        (LiveUpdater::new(&config), catalog)
    }

    fn file(path: &str) -> ChangeEvent {
        ChangeEvent::created_file(path, EntryMeta { size: Some(1), ..Default::default() })
    }

    fn exists(catalog: &Catalog, path: &str) -> bool {
        catalog.store().resolve(Path::new(path)).is_some()
    }

    fn assert_consistent(catalog: &Catalog) {
        for kind in IndexKind::ALL {
            assert!(catalog.indices().check(kind, catalog.generation()).is_ok());
            assert_eq!(catalog.indices().len(kind), catalog.store().live_count());
        }
    }

    #[test]
    fn test_journal_records_while_open() {
        let (mut updater, mut catalog) = setup();
        updater.apply(&mut catalog, file("/vol/before.txt")).unwrap();

        updater.begin_journal();
        updater.apply(&mut catalog, file("/vol/a.txt")).unwrap();
        updater.begin_journal();
        updater.apply(&mut catalog, ChangeEvent::deleted("/vol/a.txt")).unwrap();

        assert_eq!(updater.end_journal().len(), 2);
        updater.apply(&mut catalog, file("/vol/b.txt")).unwrap();
        let events = updater.end_journal();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], file("/vol/a.txt"));

        updater.apply(&mut catalog, file("/vol/c.txt")).unwrap();
        assert!(updater.end_journal().is_empty());
    }

    #[test]
    fn test_create_and_delete() {
        let (mut updater, mut catalog) = setup();
        let report = updater.apply(&mut catalog, file("/vol/a.txt")).unwrap();
        assert_eq!(report.applied, 1);
        assert!(exists(&catalog, "/vol/a.txt"));

        updater.apply(&mut catalog, ChangeEvent::deleted("/vol/a.txt")).unwrap();
        assert!(!exists(&catalog, "/vol/a.txt"));
        assert_consistent(&catalog);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (mut updater, mut catalog) = setup();
        updater.apply(&mut catalog, file("/vol/a.txt")).unwrap();
        updater.apply(&mut catalog, ChangeEvent::deleted("/vol/a.txt")).unwrap();
        let before = catalog.store().live_count();

        let report = updater.apply(&mut catalog, ChangeEvent::deleted("/vol/a.txt")).unwrap();
        assert_eq!(report.ignored, 1);
        assert_eq!(catalog.store().live_count(), before);
    }

    #[test]
    fn test_create_existing_refreshes_meta() {
        let (mut updater, mut catalog) = setup();
        updater.apply(&mut catalog, file("/vol/a.txt")).unwrap();
        let event = ChangeEvent::created_file("/vol/a.txt", EntryMeta { size: Some(42), ..Default::default() });
        updater.apply(&mut catalog, event).unwrap();

        let id = catalog.store().resolve(Path::new("/vol/a.txt")).unwrap();
        assert_eq!(catalog.store().get(id).unwrap().meta.size, Some(42));
        assert_eq!(catalog.store().live_count(), 2);
        assert_consistent(&catalog);
    }

    #[test]
    fn test_out_of_order_child_waits_for_parent() {
        let (mut updater, mut catalog) = setup();
        let report = updater.apply(&mut catalog, file("/vol/dir/a.txt")).unwrap();
        assert_eq!(report.queued, 1);
        assert_eq!(updater.pending_len(), 1);

        let report = updater.apply(&mut catalog, ChangeEvent::created_folder("/vol/dir")).unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(updater.pending_len(), 0);
        assert!(exists(&catalog, "/vol/dir/a.txt"));
        assert_consistent(&catalog);
    }

    #[test]
    fn test_events_behind_queued_ancestor_keep_order() {
        let (mut updater, mut catalog) = setup();
        updater.apply(&mut catalog, ChangeEvent::created_folder("/vol/dir/sub")).unwrap();
        updater.apply(&mut catalog, file("/vol/dir/sub/x")).unwrap();
        assert_eq!(updater.pending_len(), 2);

        updater.apply(&mut catalog, ChangeEvent::created_folder("/vol/dir")).unwrap();
        assert!(exists(&catalog, "/vol/dir/sub/x"));
        assert_eq!(updater.pending_len(), 0);
    }

    #[test]
    fn test_blocked_event_dropped_after_retry_limit() {
        let (mut updater, mut catalog) = setup();
        updater.apply(&mut catalog, ChangeEvent::created_folder("/vol/seen")).unwrap();
        updater.apply(&mut catalog, file("/vol/seen/missing/a.txt")).unwrap();

        let mut dropped = Vec::new();
        for i in 0..3 {
            let report = updater.apply(&mut catalog, file(&format!("/vol/f{i}"))).unwrap();
            dropped.extend(report.dropped);
        }

        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].kind, DiagnosticKind::EventDropped);
        assert_eq!(updater.pending_len(), 0);
        assert_eq!(updater.take_resync_requests(), vec![PathBuf::from("/vol/seen")]);
        assert!(updater.take_resync_requests().is_empty());
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let (mut updater, mut catalog) = setup();
        let mut dropped = Vec::new();
        for i in 0..5 {
            let report = updater.apply(&mut catalog, file(&format!("/vol/d{i}/x"))).unwrap();
            dropped.extend(report.dropped);
        }
        assert_eq!(updater.pending_len(), 4);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].path.as_deref(), Some(Path::new("/vol/d0/x")));
    }

    #[test]
    fn test_rename_folder_moves_subtree() {
        let (mut updater, mut catalog) = setup();
        updater.apply(&mut catalog, ChangeEvent::created_folder("/vol/old")).unwrap();
        updater.apply(&mut catalog, file("/vol/old/a.txt")).unwrap();
        updater.apply(&mut catalog, ChangeEvent::renamed("/vol/old", "/vol/new")).unwrap();

        assert!(!exists(&catalog, "/vol/old/a.txt"));
        let id = catalog.store().resolve(Path::new("/vol/new/a.txt")).unwrap();
        assert_eq!(catalog.store().full_path(id).unwrap(), "/vol/new/a.txt");
        assert_consistent(&catalog);
    }

    #[test]
    fn test_rename_of_unknown_source_requests_resync() {
        let (mut updater, mut catalog) = setup();
        let report = updater.apply(&mut catalog, ChangeEvent::renamed("/vol/ghost", "/vol/real")).unwrap();
        assert_eq!(report.ignored, 1);
        assert_eq!(updater.take_resync_requests(), vec![PathBuf::from("/vol")]);
    }

    #[test]
    fn test_modify_updates_one_field() {
        let (mut updater, mut catalog) = setup();
        updater.apply(&mut catalog, file("/vol/a.txt")).unwrap();
        updater
            .apply(&mut catalog, ChangeEvent::modified("/vol/a.txt", FieldChange::Modified(Some(99))))
            .unwrap();

        let id = catalog.store().resolve(Path::new("/vol/a.txt")).unwrap();
        let meta = catalog.store().get(id).unwrap().meta;
        assert_eq!(meta.modified, Some(99));
        assert_eq!(meta.size, Some(1));
        assert_consistent(&catalog);
    }

    #[test]
    fn test_create_under_file_is_dropped() {
        let (mut updater, mut catalog) = setup();
        updater.apply(&mut catalog, file("/vol/a.txt")).unwrap();
        let report = updater.apply(&mut catalog, file("/vol/a.txt/inner")).unwrap();
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(updater.pending_len(), 0);
    }
}
