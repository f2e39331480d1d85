//! Diagnostics accumulated by builds and live updates.
//!
//! Every diagnostic is also emitted through `tracing` at `warn` level; the
//! log keeps the most recent ones for callers to inspect.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticKind {
    /// A subtree could not be read during enumeration
    EnumerationWarning,
    /// A configured limit stopped a build
    ResourceExhausted,
    /// An index fell out of step with the name store and was rebuilt
    InternalInconsistency,
    /// A live event could not be applied and was discarded
    EventDropped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub path: Option<PathBuf>,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: None,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)?;
        if let Some(path) = &self.path {
            write!(f, " ({})", path.display())?;
        }
        Ok(())
    }
}

/// Bounded ring of recent diagnostics
#[derive(Debug)]
pub struct DiagnosticLog {
    entries: VecDeque<Diagnostic>,
    capacity: usize,
    overflowed: u64,
}

impl DiagnosticLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            overflowed: 0,
        }
    }

    /// Record and log a diagnostic, evicting the oldest when full
    pub fn push(&mut self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.overflowed += 1;
        }
        self.entries.push_back(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for d in diagnostics {
            self.push(d);
        }
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.entries.iter().cloned().collect()
    }

    pub fn drain(&mut self) -> Vec<Diagnostic> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Diagnostics evicted since the log was created
    pub fn overflowed(&self) -> u64 {
        self.overflowed
    }
}
