use super::filters::Span;
use super::matcher::{Subject, TextMatcher};
use super::options::MatchOptions;
use super::parser::{QueryNode, Term, TermKind, parse_query};
use crate::error::Result;
use crate::index::{Catalog, IndexKind, NameKey};
use crate::store::{Attributes, EntryKind};
use crate::utils::fold::{Folding, fold};
use chrono::Utc;
use std::path::PathBuf;

/// Range filter over one of the sorted metadata indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeFilter {
    Size(Span<u64>),
    Modified(Span<i64>),
    Created(Span<i64>),
}

impl RangeFilter {
    pub fn index(&self) -> IndexKind {
        match self {
            RangeFilter::Size(_) => IndexKind::Size,
            RangeFilter::Modified(_) => IndexKind::DateModified,
            RangeFilter::Created(_) => IndexKind::DateCreated,
        }
    }
}

/// Predicate tree evaluated by the executor
#[derive(Debug, Clone)]
pub enum PlanNode {
    All,
    /// Extension buckets, verified exactly when `match_case` is set
    Extension { exts: Vec<String>, match_case: bool },
    Range(RangeFilter),
    Kind(EntryKind),
    Parent(PathBuf),
    /// Names in `[lo, hi)` of the name index: a superset for a wildcard
    /// with a literal prefix
    NamePrefix { lo: NameKey, hi: NameKey },
    /// Per-candidate text check
    Text(TextMatcher),
    /// Per-candidate attribute check
    Attrib(Attributes),
    And(Vec<PlanNode>),
    Or(Vec<PlanNode>),
    Not(Box<PlanNode>),
}

impl PlanNode {
    /// The index this node is answered from; `None` for per-candidate
    /// checks, name-store lookups and boolean nodes
    pub fn index(&self) -> Option<IndexKind> {
        match self {
            PlanNode::Extension { .. } => Some(IndexKind::Extension),
            PlanNode::Range(r) => Some(r.index()),
            PlanNode::Kind(_) => Some(IndexKind::Kind),
            PlanNode::NamePrefix { .. } => Some(IndexKind::Name),
            _ => None,
        }
    }

    /// Whether evaluation walks candidates one by one
    pub fn is_scan(&self) -> bool {
        match self {
            PlanNode::Text(m) => !m.matches_all(),
            PlanNode::Attrib(_) => true,
            PlanNode::And(nodes) => nodes.iter().all(PlanNode::is_scan),
            PlanNode::Or(nodes) => nodes.iter().any(PlanNode::is_scan),
            PlanNode::Not(inner) => inner.is_scan(),
            _ => false,
        }
    }

    fn collect_indices(&self, out: &mut Vec<IndexKind>) {
        if let Some(kind) = self.index() {
            out.push(kind);
        }
        match self {
            PlanNode::And(nodes) | PlanNode::Or(nodes) => {
                for node in nodes {
                    node.collect_indices(out);
                }
            }
            PlanNode::Not(inner) => inner.collect_indices(out),
            _ => {}
        }
    }

    /// Rough number of ids the node yields on `catalog`
    fn estimate(&self, catalog: &Catalog) -> u64 {
        let indices = catalog.indices();
        let n = indices.kinds().len();
        match self {
            PlanNode::All | PlanNode::Text(_) | PlanNode::Attrib(_) | PlanNode::Not(_) => n,
            PlanNode::Extension { exts, .. } => exts
                .iter()
                .filter_map(|e| indices.extension(e))
                .map(|b| b.len())
                .sum(),
            PlanNode::Range(_) => n / 3,
            PlanNode::Kind(EntryKind::File) => indices.kinds().files().len(),
            PlanNode::Kind(EntryKind::Folder) => indices.kinds().folders().len(),
            PlanNode::Parent(path) => {
                let store = catalog.store();
                store.resolve(path).map_or(0, |id| store.children(Some(id)).len() as u64)
            }
            PlanNode::NamePrefix { .. } => n / 10,
            PlanNode::And(nodes) => nodes.iter().map(|c| c.estimate(catalog)).min().unwrap_or(n),
            PlanNode::Or(nodes) => nodes.iter().map(|c| c.estimate(catalog)).sum::<u64>().min(n),
        }
    }

    /// Order AND children so index-backed, selective filters run first
    fn optimize(&mut self, catalog: &Catalog) {
        match self {
            PlanNode::And(nodes) => {
                for node in nodes.iter_mut() {
                    node.optimize(catalog);
                }
                nodes.sort_by_cached_key(|node| (node.is_scan(), node.estimate(catalog)));
            }
            PlanNode::Or(nodes) => {
                for node in nodes.iter_mut() {
                    node.optimize(catalog);
                }
            }
            PlanNode::Not(inner) => inner.optimize(catalog),
            _ => {}
        }
    }
}

/// A compiled query
#[derive(Debug, Clone)]
pub struct Plan {
    root: PlanNode,
}

impl Plan {
    pub fn root(&self) -> &PlanNode {
        &self.root
    }

    /// Every index evaluation reads, deduplicated
    pub fn indices(&self) -> Vec<IndexKind> {
        let mut out = Vec::new();
        self.root.collect_indices(&mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Reorder for the snapshot about to be queried
    pub fn optimize(&mut self, catalog: &Catalog) {
        self.root.optimize(catalog);
    }
}

/// Compile a search string into a plan
pub fn compile(text: &str, options: &MatchOptions) -> Result<Plan> {
    compile_at(text, options, Utc::now().timestamp())
}

/// Compile with relative dates anchored at `now` (Unix seconds)
pub fn compile_at(text: &str, options: &MatchOptions, now: i64) -> Result<Plan> {
    let ast = parse_query(text, options, now)?;
    Ok(Plan { root: lower(ast)? })
}

fn lower(node: QueryNode) -> Result<PlanNode> {
    Ok(match node {
        QueryNode::All => PlanNode::All,
        QueryNode::Term(term) => lower_term(&term)?,
        QueryNode::Extension { exts, match_case } => PlanNode::Extension { exts, match_case },
        QueryNode::Size(span) => PlanNode::Range(RangeFilter::Size(span)),
        QueryNode::Modified(span) => PlanNode::Range(RangeFilter::Modified(span)),
        QueryNode::Created(span) => PlanNode::Range(RangeFilter::Created(span)),
        QueryNode::Kind(kind) => PlanNode::Kind(kind),
        QueryNode::Parent(path) => PlanNode::Parent(PathBuf::from(path)),
        QueryNode::Attrib(attributes) => PlanNode::Attrib(attributes),
        QueryNode::And(nodes) => {
            let mut children = Vec::with_capacity(nodes.len());
            for node in nodes {
                match lower(node)? {
                    PlanNode::All => {}
                    PlanNode::And(inner) => children.extend(inner),
                    other => children.push(other),
                }
            }
            match children.len() {
                0 => PlanNode::All,
                1 => children.remove(0),
                _ => PlanNode::And(children),
            }
        }
        QueryNode::Or(nodes) => {
            let mut children = Vec::with_capacity(nodes.len());
            for node in nodes {
                match lower(node)? {
                    PlanNode::All => return Ok(PlanNode::All),
                    PlanNode::Or(inner) => children.extend(inner),
                    other => children.push(other),
                }
            }
            PlanNode::Or(children)
        }
        QueryNode::Not(inner) => PlanNode::Not(Box::new(lower(*inner)?)),
    })
}

fn lower_term(term: &Term) -> Result<PlanNode> {
    if term.kind == TermKind::Wildcard && term.text.chars().all(|c| c == '*') {
        return Ok(PlanNode::All);
    }

    let matcher = TextMatcher::new(term)?;
    if matcher.matches_all() {
        return Ok(PlanNode::All);
    }
    if term.kind == TermKind::Wildcard
        && matcher.subject() == Subject::Name
        && let Some((lo, hi)) = name_prefix_bounds(&term.text, &term.options)
    {
        return Ok(PlanNode::And(vec![PlanNode::NamePrefix { lo, hi }, PlanNode::Text(matcher)]));
    }
    Ok(PlanNode::Text(matcher))
}

/// Name-index bounds covering every name that starts with the literal
/// prefix of a wildcard. Digit runs collate numerically, so a prefix
/// containing digits is not a contiguous range.
fn name_prefix_bounds(text: &str, options: &MatchOptions) -> Option<(NameKey, NameKey)> {
    if options.ignore_punctuation || options.ignore_whitespace {
        return None;
    }
    let end = text.find(['*', '?'])?;
    let prefix = &text[..end];
    if prefix.is_empty() || prefix.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let folded = fold(prefix, Folding::SORT);
    let hi = format!("{folded}\u{10FFFF}");
    Some((NameKey::from_folded(&folded), NameKey::from_folded(&hi)))
}
