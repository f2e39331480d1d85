use super::filters::Span;
use super::matcher::Subject;
use super::options::{SearchState, SortField};
use super::planner::{Plan, PlanNode, RangeFilter};
use crate::error::{Error, Result};
use crate::index::{Catalog, IndexKind, NameKey, PathKey};
use crate::store::{Attributes, Entry, EntryId, EntryKind};
use crate::utils::CancellationToken;
use rayon::prelude::*;
use roaring::RoaringBitmap;
use std::ops::Bound;
use tracing::debug;

/// Candidates between cancellation checks inside scans
const CANCEL_CHECK_INTERVAL: usize = 4096;

/// Scans over more candidates than this run on the rayon pool
const PARALLEL_SCAN_THRESHOLD: u64 = 32 * 1024;

/// Result sets sorted in parallel past this size
const PARALLEL_SORT_THRESHOLD: usize = 16 * 1024;

/// A materialised match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultItem {
    pub id: EntryId,
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
    pub modified: Option<i64>,
    pub created: Option<i64>,
    pub attributes: Attributes,
}

/// An entry in the window whose path could not be produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveFailure {
    pub id: EntryId,
    /// Path length limit the entry exceeded
    pub limit: usize,
}

/// One page of results for one execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultList {
    pub items: Vec<ResultItem>,
    pub total_matches: usize,
    /// Requested viewport
    pub offset: usize,
    pub count: usize,
    /// Window entries left out of `items` because their path was too long
    pub errors: Vec<ResolveFailure>,
}

impl ResultList {
    pub fn ids(&self) -> Vec<EntryId> {
        self.items.iter().map(|item| item.id).collect()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.path.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Evaluates plans against one catalog snapshot
pub struct Executor<'a> {
    catalog: &'a Catalog,
    cancel: &'a CancellationToken,
}

impl<'a> Executor<'a> {
    pub fn new(catalog: &'a Catalog, cancel: &'a CancellationToken) -> Self {
        Self { catalog, cancel }
    }

    /// Fail with `InternalInconsistency` if an index the plan or the sort
    /// reads lags behind the name store
    pub fn check_indices(&self, plan: &Plan, sort: Option<SortField>) -> Result<()> {
        let generation = self.catalog.generation();
        let indices = self.catalog.indices();
        indices.check(IndexKind::Kind, generation)?;
        for kind in plan.indices() {
            indices.check(kind, generation)?;
        }
        if let Some(field) = sort {
            indices.check(field.index(), generation)?;
        }
        Ok(())
    }

    /// Every matching id
    pub fn matches(&self, plan: &Plan) -> Result<RoaringBitmap> {
        let universe = self.catalog.indices().kinds().all();
        self.eval(plan.root(), &universe)
    }

    pub fn count(&self, plan: &Plan) -> Result<usize> {
        self.check_indices(plan, None)?;
        Ok(self.matches(plan)?.len() as usize)
    }

    /// Evaluate, order and cut the requested window
    pub fn execute(&self, plan: &Plan, state: &SearchState) -> Result<ResultList> {
        self.check_indices(plan, Some(state.sort.field))?;
        let matches = self.matches(plan)?;
        let total = matches.len() as usize;

        let mut list = ResultList {
            total_matches: total,
            offset: state.offset,
            count: state.count,
            ..Default::default()
        };
        if state.offset >= total {
            return Ok(list);
        }
        let wanted = match state.count {
            0 => total - state.offset,
            n => n.min(total - state.offset),
        };

        let ordered = self.order(&matches, state, state.offset + wanted)?;
        let store = self.catalog.store();
        for &id in ordered.iter().skip(state.offset).take(wanted) {
            let Some(entry) = store.get(id) else {
                continue;
            };
            match store.full_path(id) {
                Ok(path) => list.items.push(ResultItem {
                    id,
                    name: entry.name.to_string(),
                    path,
                    kind: entry.kind,
                    size: entry.meta.size,
                    modified: entry.meta.modified,
                    created: entry.meta.created,
                    attributes: entry.meta.attributes,
                }),
                Err(Error::PathTooLong { id, limit }) => list.errors.push(ResolveFailure { id, limit }),
                Err(e) => return Err(e),
            }
        }

        debug!(
            "Query matched {} entries, returning {} from offset {}",
            total,
            list.items.len(),
            state.offset
        );
        Ok(list)
    }

    fn eval(&self, node: &PlanNode, candidates: &RoaringBitmap) -> Result<RoaringBitmap> {
        self.cancel.check()?;
        if candidates.is_empty() {
            return Ok(RoaringBitmap::new());
        }
        let indices = self.catalog.indices();
        let store = self.catalog.store();

        let hits = match node {
            PlanNode::All => candidates.clone(),
            PlanNode::Extension { exts, match_case } => {
                let mut hits = RoaringBitmap::new();
                for ext in exts {
                    if let Some(bucket) = indices.extension(ext) {
                        hits |= bucket;
                    }
                }
                hits &= candidates;
                if *match_case {
                    hits = self.scan(&hits, |entry| {
                        let ext = entry.extension().unwrap_or("");
                        exts.iter().any(|wanted| wanted == ext)
                    })?;
                }
                hits
            }
            PlanNode::Range(filter) => {
                let hits = match filter {
                    RangeFilter::Size(span) => {
                        let (lo, hi) = key_bounds(span);
                        indices.size().range(lo.as_ref(), hi.as_ref())
                    }
                    RangeFilter::Modified(span) => {
                        let (lo, hi) = key_bounds(span);
                        indices.modified().range(lo.as_ref(), hi.as_ref())
                    }
                    RangeFilter::Created(span) => {
                        let (lo, hi) = key_bounds(span);
                        indices.created().range(lo.as_ref(), hi.as_ref())
                    }
                };
                hits & candidates
            }
            PlanNode::Kind(EntryKind::File) => indices.kinds().files() & candidates,
            PlanNode::Kind(EntryKind::Folder) => indices.kinds().folders() & candidates,
            PlanNode::Parent(path) => match store.resolve(path) {
                Some(parent) => {
                    let children: RoaringBitmap = store.children(Some(parent)).into_iter().collect();
                    children & candidates
                }
                None => RoaringBitmap::new(),
            },
            PlanNode::NamePrefix { lo, hi } => {
                indices.name().range(Bound::Included(lo), Bound::Excluded(hi)) & candidates
            }
            PlanNode::Text(matcher) => match matcher.subject() {
                Subject::Name => self.scan(candidates, |entry| matcher.is_match(&entry.name))?,
                Subject::Path => self.scan(candidates, |entry| {
                    store.path_of(entry.id).is_some_and(|path| matcher.is_match(&path))
                })?,
            },
            PlanNode::Attrib(attributes) => {
                self.scan(candidates, |entry| entry.meta.attributes.contains(attributes.0))?
            }
            PlanNode::And(nodes) => {
                let mut current = candidates.clone();
                for child in nodes {
                    current = self.eval(child, &current)?;
                    if current.is_empty() {
                        break;
                    }
                }
                current
            }
            PlanNode::Or(nodes) => {
                let mut acc = RoaringBitmap::new();
                for child in nodes {
                    let rest = candidates - &acc;
                    if rest.is_empty() {
                        break;
                    }
                    acc |= self.eval(child, &rest)?;
                }
                acc
            }
            PlanNode::Not(inner) => candidates - self.eval(inner, candidates)?,
        };
        Ok(hits)
    }

    /// Keep the candidates whose entry satisfies `pred`
    fn scan(&self, candidates: &RoaringBitmap, pred: impl Fn(&Entry) -> bool + Sync) -> Result<RoaringBitmap> {
        let store = self.catalog.store();

        if candidates.len() < PARALLEL_SCAN_THRESHOLD {
            let mut out = RoaringBitmap::new();
            for (i, id) in candidates.iter().enumerate() {
                if i % CANCEL_CHECK_INTERVAL == 0 {
                    self.cancel.check()?;
                }
                if store.get(id).is_some_and(&pred) {
                    out.insert(id);
                }
            }
            return Ok(out);
        }

        let ids: Vec<EntryId> = candidates.iter().collect();
        let chunks: Vec<Vec<EntryId>> = ids
            .par_chunks(CANCEL_CHECK_INTERVAL)
            .map(|chunk| -> Result<Vec<EntryId>> {
                self.cancel.check()?;
                Ok(chunk
                    .iter()
                    .copied()
                    .filter(|&id| store.get(id).is_some_and(&pred))
                    .collect())
            })
            .collect::<Result<_>>()?;

        Ok(chunks.into_iter().flatten().collect())
    }

    /// Matches in result order, at least the first `needed` of them
    fn order(&self, matches: &RoaringBitmap, state: &SearchState, needed: usize) -> Result<Vec<EntryId>> {
        let indices = self.catalog.indices();
        let descending = state.sort.order.is_descending();

        let groups: Vec<RoaringBitmap> = match state.folders_first.folders_lead(state.sort.order) {
            None => vec![matches.clone()],
            Some(lead) => {
                let folders = indices.kinds().folders() & matches;
                let files = matches - &folders;
                if lead { vec![folders, files] } else { vec![files, folders] }
            }
        };

        // Dense results: walk the sort index instead of sorting
        let live = indices.kinds().len();
        let dense = matches.len() > live / 16;

        let mut out = Vec::with_capacity(needed.min(matches.len() as usize));
        for group in &groups {
            if out.len() >= needed {
                break;
            }
            let remaining = needed - out.len();
            if dense {
                self.walk_index(group, state.sort.field, descending, remaining, &mut out)?;
            } else {
                out.extend(self.sort_group(group, state.sort.field, descending)?.into_iter().take(remaining));
            }
        }
        Ok(out)
    }

    fn walk_index(
        &self,
        group: &RoaringBitmap,
        field: SortField,
        descending: bool,
        limit: usize,
        out: &mut Vec<EntryId>,
    ) -> Result<()> {
        if group.is_empty() {
            return Ok(());
        }
        let indices = self.catalog.indices();
        let ids: Box<dyn Iterator<Item = EntryId> + '_> = match field {
            SortField::Name => Box::new(indices.name().iter_ordered(descending).map(|(_, id)| *id)),
            SortField::Path => Box::new(indices.path().iter_ordered(descending).map(|(_, id)| *id)),
            SortField::Size => Box::new(indices.size().iter_ordered(descending).map(|(_, id)| *id)),
            SortField::DateModified => {
                Box::new(indices.modified().iter_ordered(descending).map(|(_, id)| *id))
            }
            SortField::DateCreated => Box::new(indices.created().iter_ordered(descending).map(|(_, id)| *id)),
        };

        let mut taken = 0;
        for (i, id) in ids.enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 {
                self.cancel.check()?;
            }
            if group.contains(id) {
                out.push(id);
                taken += 1;
                if taken == limit || taken as u64 == group.len() {
                    break;
                }
            }
        }
        Ok(())
    }

    fn sort_group(&self, group: &RoaringBitmap, field: SortField, descending: bool) -> Result<Vec<EntryId>> {
        self.cancel.check()?;
        let store = self.catalog.store();
        let ids: Vec<EntryId> = group.iter().collect();
        let sorted = match field {
            SortField::Name => sorted_by(ids, descending, |id| {
                store.get(id).map(|e| NameKey::new(&e.name))
            }),
            SortField::Path => sorted_by(ids, descending, |id| {
                store.path_of(id).map(|p| PathKey::new(&p, store.separator()))
            }),
            SortField::Size => sorted_by(ids, descending, |id| store.get(id).and_then(|e| e.meta.size)),
            SortField::DateModified => {
                sorted_by(ids, descending, |id| store.get(id).and_then(|e| e.meta.modified))
            }
            SortField::DateCreated => {
                sorted_by(ids, descending, |id| store.get(id).and_then(|e| e.meta.created))
            }
        };
        Ok(sorted)
    }
}

/// Sort by `(key, id)`; descending is the exact reverse
fn sorted_by<K, F>(ids: Vec<EntryId>, descending: bool, key: F) -> Vec<EntryId>
where
    K: Ord + Send,
    F: Fn(EntryId) -> K + Sync,
{
    let mut keyed: Vec<(K, EntryId)> = if ids.len() > PARALLEL_SORT_THRESHOLD {
        ids.into_par_iter().map(|id| (key(id), id)).collect()
    } else {
        ids.into_iter().map(|id| (key(id), id)).collect()
    };
    if keyed.len() > PARALLEL_SORT_THRESHOLD {
        keyed.par_sort_unstable();
    } else {
        keyed.sort_unstable();
    }
    if descending {
        keyed.reverse();
    }
    keyed.into_iter().map(|(_, id)| id).collect()
}

/// Index key bounds for a value span. Entries without a value never match.
fn key_bounds<T: Copy>(span: &Span<T>) -> (Bound<Option<T>>, Bound<Option<T>>) {
    let lo = match span.0 {
        Bound::Included(v) => Bound::Included(Some(v)),
        Bound::Excluded(v) => Bound::Excluded(Some(v)),
        Bound::Unbounded => Bound::Excluded(None),
    };
    let hi = match span.1 {
        Bound::Included(v) => Bound::Included(Some(v)),
        Bound::Excluded(v) => Bound::Excluded(Some(v)),
        Bound::Unbounded => Bound::Unbounded,
    };
    (lo, hi)
}

/// Run `plan` for `state` on `catalog`
pub fn execute(catalog: &Catalog, plan: &Plan, state: &SearchState, cancel: &CancellationToken) -> Result<ResultList> {
    Executor::new(catalog, cancel).execute(plan, state)
}
