//! Per-candidate text predicates.
//!
//! Plain and quoted terms are substring searches with `memchr::memmem` over
//! folded text; wildcard terms become anchored regexes over folded text;
//! regex terms run against the raw text.

use super::parser::{Term, TermKind};
use crate::error::SyntaxError;
use crate::utils::fold::{Folding, fold, is_word_char};
use memchr::memmem::Finder;
use regex::{Regex, RegexBuilder};
use std::borrow::Cow;

/// What a term is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Name,
    Path,
}

#[derive(Debug, Clone)]
enum Pattern {
    Any,
    Substring(Finder<'static>),
    Anchored(Regex),
    Regex(Regex),
}

#[derive(Debug, Clone)]
pub struct TextMatcher {
    subject: Subject,
    folding: Folding,
    pattern: Pattern,
    /// Word-boundary anchoring for substring matches
    start_anchor: bool,
    end_anchor: bool,
}

impl TextMatcher {
    pub fn new(term: &Term) -> Result<Self, SyntaxError> {
        let options = term.options;
        let has_separator = match term.kind {
            TermKind::Regex => term.text.contains('/'),
            _ => term.text.contains(['/', '\\']),
        };
        let subject = if options.match_path || has_separator {
            Subject::Path
        } else {
            Subject::Name
        };
        let folding = options.folding();

        let pattern = match term.kind {
            TermKind::Plain | TermKind::Phrase => {
                let text = normalize_separators(&term.text, subject);
                let needle = fold(&text, folding);
                if needle.is_empty() {
                    Pattern::Any
                } else {
                    Pattern::Substring(Finder::new(needle.as_bytes()).into_owned())
                }
            }
            TermKind::Wildcard => {
                let text = normalize_separators(&term.text, subject);
                Pattern::Anchored(wildcard_regex(&text, folding, term.position)?)
            }
            TermKind::Regex => {
                let mut source = term.text.clone();
                if options.match_whole_word || options.match_prefix {
                    source = format!(r"\b(?:{source})");
                }
                if options.match_whole_word || options.match_suffix {
                    source = format!(r"(?:{source})\b");
                }
                let regex = RegexBuilder::new(&source)
                    .case_insensitive(!options.match_case)
                    .build()
                    .map_err(|e| SyntaxError::new(term.position, format!("invalid regex: {e}")))?;
                Pattern::Regex(regex)
            }
        };

        Ok(Self {
            subject,
            folding,
            pattern,
            start_anchor: options.match_whole_word || options.match_prefix,
            end_anchor: options.match_whole_word || options.match_suffix,
        })
    }

    pub fn subject(&self) -> Subject {
        self.subject
    }

    /// Whether every subject matches (empty phrase)
    pub fn matches_all(&self) -> bool {
        matches!(self.pattern, Pattern::Any)
    }

    pub fn is_match(&self, text: &str) -> bool {
        match &self.pattern {
            Pattern::Any => true,
            Pattern::Regex(regex) => regex.is_match(text),
            Pattern::Anchored(regex) => {
                let text = normalize_separators(text, self.subject);
                regex.is_match(&fold(&text, self.folding))
            }
            Pattern::Substring(finder) => {
                let text = normalize_separators(text, self.subject);
                let hay = fold(&text, self.folding);
                if !self.start_anchor && !self.end_anchor {
                    return finder.find(hay.as_bytes()).is_some();
                }
                // Overlapping hits count
                let len = finder.needle().len();
                let mut from = 0;
                while let Some(found) = finder.find(&hay.as_bytes()[from..]) {
                    let start = from + found;
                    if self.at_boundaries(&hay, start, start + len) {
                        return true;
                    }
                    from = start + 1;
                }
                false
            }
        }
    }

    fn at_boundaries(&self, hay: &str, start: usize, end: usize) -> bool {
        let start_ok = !self.start_anchor || !hay[..start].chars().next_back().is_some_and(is_word_char);
        let end_ok = !self.end_anchor || !hay[end..].chars().next().is_some_and(is_word_char);
        start_ok && end_ok
    }
}

/// Paths compare with `/` whatever the host separator
fn normalize_separators(text: &str, subject: Subject) -> Cow<'_, str> {
    if subject == Subject::Path && text.contains('\\') {
        Cow::Owned(text.replace('\\', "/"))
    } else {
        Cow::Borrowed(text)
    }
}

/// `*` and `?` over folded literal runs, anchored to the whole subject
fn wildcard_regex(text: &str, folding: Folding, position: usize) -> Result<Regex, SyntaxError> {
    let mut source = String::from("(?s)^");
    let mut literal = String::new();
    let flush = |literal: &mut String, source: &mut String| {
        if !literal.is_empty() {
            source.push_str(&regex::escape(&fold(literal, folding)));
            literal.clear();
        }
    };

    for c in text.chars() {
        match c {
            '*' => {
                flush(&mut literal, &mut source);
                source.push_str(".*");
            }
            '?' => {
                flush(&mut literal, &mut source);
                source.push('.');
            }
            c => literal.push(c),
        }
    }
    flush(&mut literal, &mut source);
    source.push('$');

    Regex::new(&source).map_err(|e| SyntaxError::new(position, format!("invalid wildcard: {e}")))
}
