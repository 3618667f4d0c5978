//! Error types for query compilation.
//!
//! Only `LiftError` crosses the public `solve_*` boundary. The other
//! conditions listed in this crate are recoverable and surface as explicit
//! values instead:
//!
//! - `NotEasilyShatterable`: the normalizer logs it and keeps the unshattered
//!   query.
//! - Fast-path rejections: `FastPathOutcome::{NotHierarchical, UnsupportedShape}`
//!   (see `hierarchical`).
//! - Sub-formulas no strategy can handle: `Plan::NonLiftable`.

use liftql_logic::FormulaError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiftError {
    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("predicate `{predicate}` is not declared in the symbol table")]
    UnknownPredicate { predicate: String },

    #[error("query `{query}` is not liftable ({} offending sub-formula(s))", .offending.len())]
    QueryNotLiftable {
        query: String,
        /// Rendered `NonLiftable` sub-formulas of the attempted plan.
        offending: Vec<String>,
    },
}

impl From<FormulaError> for LiftError {
    fn from(err: FormulaError) -> Self {
        LiftError::MalformedQuery(err.to_string())
    }
}

/// Shattering cannot be applied without a case split on constants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("predicate `{predicate}` is not easily shatterable: {reason}")]
pub struct NotEasilyShatterable {
    pub predicate: String,
    pub reason: String,
}
