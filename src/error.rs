use crate::index::IndexKind;
use crate::store::EntryId;

/// A malformed search expression.
///
/// `position` is the 0-based character offset at which the problem was
/// detected, so `(` reports position 1 (the missing `)` at end of input).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("syntax error at {position}: {reason}")]
pub struct SyntaxError {
    pub position: usize,
    pub reason: String,
}

impl SyntaxError {
    pub fn new(position: usize, reason: impl Into<String>) -> Self {
        Self {
            position,
            reason: reason.into(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("Path of entry {id} exceeds {limit} characters")]
    PathTooLong { id: EntryId, limit: usize },
    #[error("Resource limit reached: {what} exceeds {limit}")]
    ResourceExhausted { what: &'static str, limit: usize },
    #[error("{index:?} index is at generation {found}, name store is at {expected}")]
    InternalInconsistency {
        index: IndexKind,
        expected: u64,
        found: u64,
    },
    #[error("Unknown entry {0}")]
    UnknownEntry(EntryId),
    #[error("Entry {0} is not a folder")]
    NotAFolder(EntryId),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("No {0} configured")]
    MissingCapability(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to (de)serialize catalog image: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config file: {0}")]
    Config(#[from] toml::de::Error),
    #[error("Invalid exclude pattern: {0}")]
    Glob(#[from] globset::Error),
}

impl Error {
    /// Errors the caller can fix by changing the query text.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Error::Syntax(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_display() {
        let err = SyntaxError::new(1, "unbalanced parenthesis");
        assert_eq!(err.to_string(), "syntax error at 1: unbalanced parenthesis");
    }

    #[test]
    fn test_syntax_error_is_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(SyntaxError::new(3, "nesting too deep"));
        assert_eq!(err.to_string(), "syntax error at 3: nesting too deep");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_syntax_error_converts() {
        let err: Error = SyntaxError::new(0, "unknown property key 'foo'").into();
        assert!(err.is_user_error());
        assert!(matches!(err, Error::Syntax(ref e) if e.position == 0));
    }

    #[test]
    fn test_path_too_long_is_not_user_error() {
        let err = Error::PathTooLong { id: 7, limit: 1024 };
        assert!(!err.is_user_error());
        assert!(err.to_string().contains("1024"));
    }
}
