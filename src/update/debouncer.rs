//! Event debouncer for live change events
//!
//! Accumulates events within a configurable time window and coalesces
//! bursts for the same path, so a file written many times in quick
//! succession costs one index update. Coalesced events are released in
//! arrival order; renames are ordering barriers.

use super::event::ChangeEvent;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Debouncer that accumulates change events within a time window
pub struct EventDebouncer {
    window: Duration,
    /// Pending events in arrival order; coalesced-away slots are `None`
    slots: Vec<Option<ChangeEvent>>,
    /// Path -> slot that later events for the same path may merge into
    open: FxHashMap<PathBuf, usize>,
    /// Time of the last event (any path)
    last_event: Option<Instant>,
}

impl EventDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            slots: Vec::new(),
            open: FxHashMap::default(),
            last_event: None,
        }
    }

    /// Add an event, merging it into an earlier one for the same path when
    /// the pair collapses
    pub fn add_event(&mut self, event: ChangeEvent) {
        self.last_event = Some(Instant::now());

        match &event {
            ChangeEvent::Renamed { old, new } => {
                // Nothing merges across a rename of the same subtree
                let (old, new) = (old.clone(), new.clone());
                self.seal(&old);
                self.seal(&new);
                self.slots.push(Some(event));
                return;
            }
            ChangeEvent::Deleted { path } => {
                // Anything + Delete = Delete, positioned at the delete
                let path = path.clone();
                if let Some(idx) = self.open.get(&path).copied() {
                    self.slots[idx] = None;
                }
                self.seal(&path);
                self.slots.push(Some(event));
                return;
            }
            _ => {}
        }

        let path = event.path().to_path_buf();
        if let Some(idx) = self.open.get(&path).copied()
            && let Some(prev) = self.slots[idx].take()
        {
            match coalesce(prev, event) {
                Ok(merged) => {
                    self.slots[idx] = Some(merged);
                    return;
                }
                Err((prev, event)) => {
                    self.slots[idx] = Some(prev);
                    self.push_open(path, event);
                    return;
                }
            }
        }
        self.push_open(path, event);
    }

    fn push_open(&mut self, path: PathBuf, event: ChangeEvent) {
        self.open.insert(path, self.slots.len());
        self.slots.push(Some(event));
    }

    /// Stop merging into any open slot at or under `path`
    fn seal(&mut self, path: &Path) {
        self.open.retain(|p, _| !p.starts_with(path));
    }

    /// Check if there are pending events
    pub fn has_pending(&self) -> bool {
        self.slots.iter().any(Option::is_some)
    }

    /// Number of events a flush would release
    pub fn pending_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Check if the debounce window has elapsed since the last event
    pub fn is_ready(&self) -> bool {
        match self.last_event {
            Some(last) => last.elapsed() >= self.window && self.has_pending(),
            None => false,
        }
    }

    /// Time remaining until the batch is ready (for sleeping)
    pub fn time_until_ready(&self) -> Option<Duration> {
        self.last_event
            .map(|last| self.window.saturating_sub(last.elapsed()))
    }

    /// Release the pending events in arrival order and reset
    pub fn flush(&mut self) -> Option<Vec<ChangeEvent>> {
        self.open.clear();
        self.last_event = None;
        let events: Vec<ChangeEvent> = self.slots.drain(..).flatten().collect();
        if events.is_empty() { None } else { Some(events) }
    }
}

/// Merge `next` into `prev`, or hand both back unchanged
fn coalesce(prev: ChangeEvent, next: ChangeEvent) -> Result<ChangeEvent, (ChangeEvent, ChangeEvent)> {
    match (prev, next) {
        // Create + Modify = Create with the change folded in
        (ChangeEvent::Created { path, kind, mut meta }, ChangeEvent::Modified { change, .. }) => {
            change.apply(&mut meta);
            Ok(ChangeEvent::Created { path, kind, meta })
        }
        // Modify + Modify of the same field = the later one
        (ChangeEvent::Modified { path, change: old }, ChangeEvent::Modified { change, .. })
            if old.same_field(&change) =>
        {
            Ok(ChangeEvent::Modified { path, change })
        }
        pair => Err(pair),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntryMeta;
    use crate::update::event::FieldChange;

    fn debouncer() -> EventDebouncer {
        EventDebouncer::new(Duration::from_millis(100))
    }

    fn created(path: &str) -> ChangeEvent {
        ChangeEvent::created_file(path, EntryMeta::default())
    }

    #[test]
    fn test_new_debouncer_is_empty() {
        let d = debouncer();
        assert!(!d.has_pending());
        assert!(!d.is_ready());
        assert!(d.time_until_ready().is_none());
    }

    #[test]
    fn test_create_then_modify_is_create() {
        let mut d = debouncer();
        d.add_event(created("/vol/a"));
        d.add_event(ChangeEvent::modified("/vol/a", FieldChange::Size(Some(9))));

        let events = d.flush().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ChangeEvent::Created { meta, .. } if meta.size == Some(9)));
    }

    #[test]
    fn test_create_then_delete_is_delete() {
        let mut d = debouncer();
        d.add_event(created("/vol/a"));
        d.add_event(ChangeEvent::deleted("/vol/a"));

        assert_eq!(d.flush().unwrap(), vec![ChangeEvent::deleted("/vol/a")]);
    }

    #[test]
    fn test_delete_then_create_keeps_both() {
        let mut d = debouncer();
        d.add_event(ChangeEvent::deleted("/vol/a"));
        d.add_event(created("/vol/a"));
        d.add_event(ChangeEvent::modified("/vol/a", FieldChange::Size(Some(1))));

        let events = d.flush().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ChangeEvent::deleted("/vol/a"));
        assert!(matches!(&events[1], ChangeEvent::Created { meta, .. } if meta.size == Some(1)));
    }

    #[test]
    fn test_delete_moves_after_intervening_events() {
        let mut d = debouncer();
        d.add_event(ChangeEvent::created_folder("/vol/dir"));
        d.add_event(created("/vol/dir/x"));
        d.add_event(ChangeEvent::deleted("/vol/dir"));

        let events = d.flush().unwrap();
        assert_eq!(events, vec![created("/vol/dir/x"), ChangeEvent::deleted("/vol/dir")]);
    }

    #[test]
    fn test_modify_same_field_keeps_latest() {
        let mut d = debouncer();
        d.add_event(ChangeEvent::modified("/vol/a", FieldChange::Size(Some(1))));
        d.add_event(ChangeEvent::modified("/vol/a", FieldChange::Size(Some(2))));
        d.add_event(ChangeEvent::modified("/vol/a", FieldChange::Modified(Some(5))));

        let events = d.flush().unwrap();
        assert_eq!(
            events,
            vec![
                ChangeEvent::modified("/vol/a", FieldChange::Size(Some(2))),
                ChangeEvent::modified("/vol/a", FieldChange::Modified(Some(5))),
            ]
        );
    }

    #[test]
    fn test_rename_is_a_barrier() {
        let mut d = debouncer();
        d.add_event(created("/vol/a"));
        d.add_event(ChangeEvent::renamed("/vol/a", "/vol/b"));
        d.add_event(ChangeEvent::modified("/vol/a", FieldChange::Size(Some(3))));

        let events = d.flush().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], ChangeEvent::renamed("/vol/a", "/vol/b"));
    }

    #[test]
    fn test_flush_resets() {
        let mut d = debouncer();
        d.add_event(created("/vol/a"));
        assert_eq!(d.pending_count(), 1);
        assert!(d.flush().is_some());
        assert!(d.flush().is_none());
        assert!(!d.has_pending());
    }

    #[test]
    fn test_ready_after_window() {
        let mut d = EventDebouncer::new(Duration::from_millis(10));
        d.add_event(created("/vol/a"));
        assert!(!d.is_ready());
        std::thread::sleep(Duration::from_millis(20));
        assert!(d.is_ready());
        assert_eq!(d.time_until_ready(), Some(Duration::ZERO));
    }
}
