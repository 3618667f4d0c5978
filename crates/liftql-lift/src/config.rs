//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Knobs for normalisation and lifting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiftConfig {
    /// Rewrite probabilistic-fact atoms with constant arguments into fresh
    /// constant-free relations before lifting.
    pub shatter_probabilistic_facts: bool,
    /// Largest CNF (number of clauses) handed to inclusion–exclusion. `None`
    /// means unbounded; the powerset is exponential in this number.
    pub max_inclusion_exclusion_terms: Option<usize>,
    /// Nesting limit for recursive `lift` calls.
    pub max_recursion_depth: usize,
}

impl Default for LiftConfig {
    fn default() -> Self {
        Self {
            shatter_probabilistic_facts: true,
            max_inclusion_exclusion_terms: None,
            max_recursion_depth: 128,
        }
    }
}
