//! Search strings in, ordered result windows out.
//!
//! [`compile`] parses the text into a [`QueryNode`] tree and lowers it to a
//! [`Plan`] of index probes and per-candidate checks; [`Executor`] evaluates
//! a plan against one catalog snapshot.

pub mod executor;
pub mod filters;
pub mod matcher;
pub mod options;
pub mod parser;
pub mod planner;

pub use executor::{Executor, ResolveFailure, ResultItem, ResultList, execute};
pub use matcher::{Subject, TextMatcher};
pub use options::{FoldersFirst, MatchOptions, SearchState, Sort, SortField, SortOrder};
pub use parser::{QueryNode, Term, TermKind, parse_query};
pub use planner::{Plan, PlanNode, RangeFilter, compile, compile_at};
