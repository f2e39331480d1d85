use crate::index::IndexKind;
use crate::utils::Folding;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Text matching switches. Property modifiers (`case:`, `ww:`, ...) override
/// them for a single term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MatchOptions {
    pub match_case: bool,
    pub match_whole_word: bool,
    pub match_prefix: bool,
    pub match_suffix: bool,
    pub regex: bool,
    pub match_diacritics: bool,
    pub ignore_punctuation: bool,
    pub ignore_whitespace: bool,
    /// Match terms against the full path instead of the name
    pub match_path: bool,
}

impl MatchOptions {
    pub fn folding(&self) -> Folding {
        Folding {
            case: !self.match_case,
            diacritics: !self.match_diacritics,
            punctuation: self.ignore_punctuation,
            whitespace: self.ignore_whitespace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortField {
    #[default]
    Name,
    Path,
    Size,
    DateModified,
    DateCreated,
}

impl SortField {
    /// Index whose order the field follows
    pub fn index(self) -> IndexKind {
        match self {
            SortField::Name => IndexKind::Name,
            SortField::Path => IndexKind::Path,
            SortField::Size => IndexKind::Size,
            SortField::DateModified => IndexKind::DateModified,
            SortField::DateCreated => IndexKind::DateCreated,
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(SortField::Name),
            "path" => Ok(SortField::Path),
            "size" => Ok(SortField::Size),
            "dm" | "modified" | "date-modified" => Ok(SortField::DateModified),
            "dc" | "created" | "date-created" => Ok(SortField::DateCreated),
            other => Err(format!("unknown sort field '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn is_descending(self) -> bool {
        self == SortOrder::Descending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Sort {
    pub field: SortField,
    pub order: SortOrder,
}

/// Where folders go relative to files of equal rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FoldersFirst {
    Never,
    Always,
    /// First when sorting ascending, last when descending
    #[default]
    Ascending,
}

impl FoldersFirst {
    /// Whether folders lead the list under `order`; `None` mixes them in
    pub fn folders_lead(self, order: SortOrder) -> Option<bool> {
        match self {
            FoldersFirst::Never => None,
            FoldersFirst::Always => Some(true),
            FoldersFirst::Ascending => Some(!order.is_descending()),
        }
    }
}

/// One search request: text, match options, ordering and viewport
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchState {
    pub text: String,
    pub options: MatchOptions,
    pub sort: Sort,
    pub folders_first: FoldersFirst,
    pub offset: usize,
    /// Zero means every remaining match
    pub count: usize,
}

impl SearchState {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_options(mut self, options: MatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_sort(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort = Sort { field, order };
        self
    }

    pub fn with_folders_first(mut self, folders_first: FoldersFirst) -> Self {
        self.folders_first = folders_first;
        self
    }

    pub fn with_viewport(mut self, offset: usize, count: usize) -> Self {
        self.offset = offset;
        self.count = count;
        self
    }
}
