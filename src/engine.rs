//! The search engine: one catalog snapshot behind a read-write lock, one
//! writer, and the injected capabilities.
//!
//! Queries clone the catalog under a brief read lock and run on that
//! snapshot without holding any lock. All writes (live events, rebuild
//! swaps, index repairs) are serialised by the writer mutex.

use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog};
use crate::error::{Error, Result};
use crate::index::{BuildStats, Catalog, IndexBuilder, IndexKind};
use crate::providers::Capabilities;
use crate::query::{Executor, MatchOptions, ResultList, SearchState, compile};
use crate::store::EntryId;
use crate::update::{ApplyReport, ChangeEvent, EventDebouncer, LiveUpdater};
use crate::utils::CancellationToken;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often the updater thread checks its stop flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// `(epoch, generation, text, options)`
type CountKey = (u64, u64, String, MatchOptions);

/// Point-in-time figures about the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub entries: usize,
    pub files: u64,
    pub folders: u64,
    pub tombstones: usize,
    pub generation: u64,
    pub stale_indices: Vec<IndexKind>,
    pub pending_events: usize,
    pub diagnostics: usize,
    pub diagnostics_overflowed: u64,
}

pub struct Engine {
    config: EngineConfig,
    capabilities: Capabilities,
    catalog: RwLock<Catalog>,
    /// Bumped whenever `catalog` is replaced wholesale
    epoch: AtomicU64,
    /// Serialises every mutation of `catalog`
    writer: Mutex<LiveUpdater>,
    diagnostics: Mutex<DiagnosticLog>,
    count_cache: Option<Mutex<LruCache<CountKey, usize, ahash::RandomState>>>,
    progress: bool,
}

impl Engine {
    pub fn new(config: EngineConfig, capabilities: Capabilities) -> Self {
        let count_cache = NonZeroUsize::new(config.count_cache_size)
            .map(|cap| Mutex::new(LruCache::with_hasher(cap, ahash::RandomState::new())));
        Self {
            catalog: RwLock::new(Catalog::empty(config.max_path_len)),
            epoch: AtomicU64::new(0),
            writer: Mutex::new(LiveUpdater::new(&config)),
            diagnostics: Mutex::new(DiagnosticLog::new(config.diagnostics_capacity)),
            count_cache,
            progress: false,
            config,
            capabilities,
        }
    }

    /// Show a progress bar during rebuilds
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A consistent view of the catalog, unaffected by later writes
    pub fn snapshot(&self) -> Catalog {
        self.catalog.read().clone()
    }

    /// A snapshot with the epoch it belongs to
    fn versioned_snapshot(&self) -> (Catalog, u64) {
        let catalog = self.catalog.read();
        (catalog.clone(), self.epoch.load(Ordering::Acquire))
    }

    pub fn search(&self, state: &SearchState) -> Result<ResultList> {
        self.search_with_cancel(state, &CancellationToken::new())
    }

    /// Compile and execute `state` on the current snapshot. A lagging
    /// index is rebuilt and the query retried once.
    pub fn search_with_cancel(&self, state: &SearchState, cancel: &CancellationToken) -> Result<ResultList> {
        let start = Instant::now();
        let plan = compile(&state.text, &state.options)?;

        let mut repaired = false;
        loop {
            let snapshot = self.snapshot();
            let mut plan = plan.clone();
            plan.optimize(&snapshot);
            match Executor::new(&snapshot, cancel).execute(&plan, state) {
                Err(Error::InternalInconsistency { index, .. }) if !repaired => {
                    self.repair(index);
                    repaired = true;
                }
                Ok(list) => {
                    debug!(
                        "Search {:?}: {} matches in {:.2?}",
                        state.text,
                        list.total_matches,
                        start.elapsed()
                    );
                    return Ok(list);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn count(&self, text: &str) -> Result<usize> {
        self.count_with_options(text, &MatchOptions::default())
    }

    /// Number of matches without resolving any path. Results are memoised
    /// per catalog generation.
    pub fn count_with_options(&self, text: &str, options: &MatchOptions) -> Result<usize> {
        let plan = compile(text, options)?;
        let cancel = CancellationToken::new();

        let mut repaired = false;
        loop {
            let (snapshot, epoch) = self.versioned_snapshot();
            let key = (epoch, snapshot.generation(), text.to_string(), *options);
            if let Some(cache) = &self.count_cache
                && let Some(&n) = cache.lock().get(&key)
            {
                return Ok(n);
            }

            let mut plan = plan.clone();
            plan.optimize(&snapshot);
            match Executor::new(&snapshot, &cancel).count(&plan) {
                Err(Error::InternalInconsistency { index, .. }) if !repaired => {
                    self.repair(index);
                    repaired = true;
                }
                Ok(n) => {
                    if let Some(cache) = &self.count_cache {
                        cache.lock().put(key, n);
                    }
                    return Ok(n);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn full_path(&self, id: EntryId) -> Result<String> {
        self.catalog.read().store().full_path(id)
    }

    pub fn rebuild(&self) -> Result<BuildStats> {
        self.rebuild_with_cancel(&CancellationToken::new())
    }

    /// Re-enumerate every volume into a shadow catalog and swap it in.
    /// Without an enumerator the current entries are compacted and every
    /// index bulk-loaded again. On failure the current catalog stays.
    pub fn rebuild_with_cancel(&self, cancel: &CancellationToken) -> Result<BuildStats> {
        let Some(enumerator) = self.capabilities.enumerator.clone() else {
            return self.compact();
        };

        let builder = IndexBuilder::new(&self.config)?
            .with_cancel(cancel.clone())
            .with_progress(self.progress);

        // Live events keep landing on the current catalog while the walk runs
        self.writer.lock().begin_journal();
        let outcome = match builder.rebuild(enumerator.as_ref()) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.writer.lock().end_journal();
                if matches!(e, Error::ResourceExhausted { .. }) {
                    self.diagnostics
                        .lock()
                        .push(Diagnostic::new(DiagnosticKind::ResourceExhausted, e.to_string()));
                }
                return Err(e);
            }
        };

        self.diagnostics.lock().extend(outcome.warnings);
        self.swap_rebuilt(outcome.catalog);
        info!("Swapped in rebuilt catalog ({} entries)", outcome.stats.entries());
        Ok(outcome.stats)
    }

    /// Replay the events journaled during the build onto `catalog`, then
    /// swap it in
    fn swap_rebuilt(&self, mut catalog: Catalog) {
        let mut updater = self.writer.lock();
        let events = updater.end_journal();

        let mut dropped = Vec::new();
        let mut requests = Vec::new();
        if !events.is_empty() {
            debug!("Replaying {} events onto the rebuilt catalog", events.len());
            let mut replay = LiveUpdater::new(&self.config);
            for event in events {
                match replay.apply(&mut catalog, event) {
                    Ok(report) => dropped.extend(report.dropped),
                    Err(e) => warn!("Replay failed: {}", e),
                }
            }
            requests = replay.take_resync_requests();
        }

        self.replace(catalog);
        self.diagnostics.lock().extend(dropped);
        if !requests.is_empty() {
            self.resync(requests);
        }
    }

    fn compact(&self) -> Result<BuildStats> {
        let start = Instant::now();
        let _writer = self.writer.lock();
        let (store, _) = self.catalog.read().store().compact()?;
        let catalog = Catalog::new(store);
        let kinds = catalog.indices().kinds();
        let stats = BuildStats {
            files: kinds.files().len() as usize,
            folders: kinds.folders().len() as usize,
            elapsed: start.elapsed(),
            ..Default::default()
        };
        self.replace(catalog);
        info!("Compacted catalog to {} entries", stats.entries());
        Ok(stats)
    }

    /// Replace the catalog with the persisted image, if there is one
    pub fn load(&self) -> Result<bool> {
        let Some(persistence) = &self.capabilities.persistence else {
            return Ok(false);
        };
        let Some(image) = persistence.load()? else {
            return Ok(false);
        };
        let catalog = Catalog::from_image(&image, self.config.max_path_len)?;
        info!("Loaded catalog with {} entries", catalog.store().live_count());
        self.swap(catalog);
        Ok(true)
    }

    pub fn save(&self) -> Result<()> {
        let persistence = self
            .capabilities
            .persistence
            .as_ref()
            .ok_or(Error::MissingCapability("persistence"))?;
        let image = self.snapshot().to_image();
        persistence.save(&image)?;
        info!("Saved catalog with {} entries", image.entries.len());
        Ok(())
    }

    /// Apply one live change event, then resync any subtree whose events
    /// had to be dropped
    pub fn apply(&self, event: ChangeEvent) -> Result<ApplyReport> {
        let mut updater = self.writer.lock();
        let report = {
            let mut catalog = self.catalog.write();
            updater.apply(&mut catalog, event)?
        };
        if !report.dropped.is_empty() {
            self.diagnostics.lock().extend(report.dropped.iter().cloned());
        }

        let requests = updater.take_resync_requests();
        if !requests.is_empty() {
            self.resync(requests);
        }
        Ok(report)
    }

    /// Reconcile dropped-event subtrees on a shadow copy, then swap it in.
    /// Callers hold the writer lock.
    fn resync(&self, paths: Vec<PathBuf>) {
        let Some(enumerator) = self.capabilities.enumerator.clone() else {
            debug!("No enumerator; skipping resync of {} subtrees", paths.len());
            return;
        };
        let builder = match IndexBuilder::new(&self.config) {
            Ok(builder) => builder,
            Err(e) => {
                warn!("Cannot resync: {}", e);
                return;
            }
        };

        let mut shadow = self.snapshot();
        let mut warnings = Vec::new();
        for path in paths {
            match builder.resync(&mut shadow, &path, enumerator.as_ref()) {
                Ok(outcome) => warnings.extend(outcome.warnings),
                Err(e) => warnings.push(
                    Diagnostic::new(DiagnosticKind::EnumerationWarning, format!("resync failed: {e}"))
                        .with_path(&path),
                ),
            }
        }
        self.replace(shadow);
        self.diagnostics.lock().extend(warnings);
    }

    /// Start applying events from the change feed on a background thread
    pub fn start_live_updates(self: &Arc<Self>) -> Result<UpdaterHandle> {
        let feed = self
            .capabilities
            .feed
            .as_ref()
            .ok_or(Error::MissingCapability("change feed"))?;
        let events = feed.subscribe();
        let stop = Arc::new(AtomicBool::new(false));

        let engine = Arc::clone(self);
        let flag = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("fnx-updater".into())
            .spawn(move || engine.run_updates(events, &flag))?;

        info!("Live updates started");
        Ok(UpdaterHandle {
            stop,
            thread: Some(thread),
        })
    }

    fn run_updates(&self, events: Receiver<ChangeEvent>, stop: &AtomicBool) {
        let window = self.config.debounce_duration();
        let mut debouncer = (!window.is_zero()).then(|| EventDebouncer::new(window));

        while !stop.load(Ordering::SeqCst) {
            let timeout = debouncer
                .as_ref()
                .and_then(EventDebouncer::time_until_ready)
                .map_or(POLL_INTERVAL, |t| t.min(POLL_INTERVAL));

            match events.recv_timeout(timeout) {
                Ok(event) => match debouncer.as_mut() {
                    Some(d) => d.add_event(event),
                    None => self.apply_logged(event),
                },
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if let Some(d) = debouncer.as_mut()
                && d.is_ready()
                && let Some(batch) = d.flush()
            {
                self.apply_batch(batch);
            }
        }

        // Apply whatever was delivered before stopping
        for event in events.try_iter() {
            match debouncer.as_mut() {
                Some(d) => d.add_event(event),
                None => self.apply_logged(event),
            }
        }
        if let Some(batch) = debouncer.as_mut().and_then(EventDebouncer::flush) {
            self.apply_batch(batch);
        }
        info!("Live updates stopped");
    }

    fn apply_batch(&self, batch: Vec<ChangeEvent>) {
        debug!("Applying {} coalesced events", batch.len());
        for event in batch {
            self.apply_logged(event);
        }
    }

    fn apply_logged(&self, event: ChangeEvent) {
        if let Err(e) = self.apply(event) {
            warn!("Live update failed: {}", e);
        }
    }

    /// Rebuild one lagging index
    fn repair(&self, kind: IndexKind) {
        let _writer = self.writer.lock();
        let mut shadow = self.snapshot();
        if shadow.indices().check(kind, shadow.generation()).is_ok() {
            return;
        }
        shadow.repair(kind);
        self.replace(shadow);
        self.diagnostics.lock().push(Diagnostic::new(
            DiagnosticKind::InternalInconsistency,
            format!("{kind:?} index was out of step and has been rebuilt"),
        ));
    }

    fn swap(&self, catalog: Catalog) {
        let _writer = self.writer.lock();
        self.replace(catalog);
    }

    /// Install `catalog` under a new epoch. Callers hold the writer lock.
    fn replace(&self, catalog: Catalog) {
        {
            let mut current = self.catalog.write();
            *current = catalog;
            self.epoch.fetch_add(1, Ordering::AcqRel);
        }
        self.clear_count_cache();
    }

    fn clear_count_cache(&self) {
        if let Some(cache) = &self.count_cache {
            cache.lock().clear();
        }
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().snapshot()
    }

    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().drain()
    }

    pub fn stats(&self) -> EngineStats {
        let snapshot = self.snapshot();
        let store = snapshot.store();
        let kinds = snapshot.indices().kinds();
        let pending_events = self.writer.lock().pending_len();
        let diagnostics = self.diagnostics.lock();
        EngineStats {
            entries: store.live_count(),
            files: kinds.files().len(),
            folders: kinds.folders().len(),
            tombstones: store.tombstones(),
            generation: snapshot.generation(),
            stale_indices: snapshot.indices().stale(),
            pending_events,
            diagnostics: diagnostics.len(),
            diagnostics_overflowed: diagnostics.overflowed(),
        }
    }
}

/// Handle to the live-update thread; stops and joins it on drop
pub struct UpdaterHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl UpdaterHandle {
    /// Stop after applying the events already delivered
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::SeqCst) && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for UpdaterHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
