//! Hierarchical, self-join-free conjunctive queries.
//!
//! Write `at(x)` for the set of atoms containing variable `x`. A query is
//! hierarchical when for any two variables `at(x)` and `at(y)` are nested or
//! disjoint. Without self-joins such a query is computed exactly by joining
//! its atoms and projecting on the head, so it can skip the general engine.

use crate::containment::ContainmentOracle;
use crate::engine::LiftingEngine;
use crate::error::LiftError;
use crate::normalize::{normalize, NormalizedQuery, NormalizedUcq};
use crate::plan::Plan;
use crate::solve::check_declared;
use crate::transforms::{make_existentials_implicit, remove_trivial_operations};
use liftql_logic::{Atom, Formula, SymbolTable, Variable};
use std::collections::{BTreeMap, BTreeSet};

/// Result of the fast path. Only `Hierarchical` carries a plan; the other
/// variants tell the caller to fall back to the general engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastPathOutcome {
    Hierarchical(Plan),
    NotHierarchical { reason: String },
    UnsupportedShape { reason: String },
}

pub fn is_hierarchical_without_self_joins(query: &Formula) -> bool {
    let mut atoms: Vec<&Atom> = query.atoms();
    atoms.sort();
    atoms.dedup();

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut at: BTreeMap<&Variable, BTreeSet<&str>> = BTreeMap::new();
    for atom in atoms {
        if !seen.insert(atom.predicate.as_str()) {
            tracing::info!(predicate = %atom.predicate, "not hierarchical: self-join");
            return false;
        }
        for v in atom.variables() {
            at.entry(v).or_default().insert(atom.predicate.as_str());
        }
    }

    let sets: Vec<(&Variable, &BTreeSet<&str>)> = at.iter().map(|(v, s)| (*v, s)).collect();
    for (i, (x, at_x)) in sets.iter().enumerate() {
        for (y, at_y) in &sets[i + 1..] {
            let nested = at_x.is_subset(at_y) || at_y.is_subset(at_x);
            if !nested && !at_x.is_disjoint(at_y) {
                tracing::info!(x = %x, y = %y, "not hierarchical on variables");
                return false;
            }
        }
    }
    true
}

/// Literals of a conjunctive matrix with the atom they test.
fn literal_atoms(matrix: &Formula) -> impl Iterator<Item = &Atom> + '_ {
    matrix.conjuncts().iter().filter_map(|c| match c {
        Formula::Atom(a) => Some(a),
        Formula::Negation(inner) => inner.as_atom(),
        _ => None,
    })
}

fn existentials_in(
    matrix: &Formula,
    head: &BTreeSet<Variable>,
    keep: impl Fn(&Atom) -> bool,
) -> BTreeSet<Variable> {
    literal_atoms(matrix)
        .filter(|a| keep(a))
        .flat_map(|a| a.variables().cloned())
        .filter(|v| !head.contains(v))
        .collect()
}

fn fast_path(ucq: &NormalizedUcq) -> FastPathOutcome {
    let head: BTreeSet<Variable> = ucq.head_variables().into_iter().collect();
    let matrix = remove_trivial_operations(&make_existentials_implicit(&ucq.body));
    let symbols = &ucq.symbols;

    if matches!(matrix, Formula::Disjunction(_))
        || matrix.conjuncts().iter().any(|c| matches!(c, Formula::Disjunction(_)))
    {
        return FastPathOutcome::UnsupportedShape {
            reason: "disjunctive body".to_string(),
        };
    }

    let has_choices = literal_atoms(&matrix).any(|a| symbols.is_probabilistic_choice(a));
    if has_choices {
        let fact_vars = existentials_in(&matrix, &head, |a| symbols.is_probabilistic_fact(a));
        let choice_vars = existentials_in(&matrix, &head, |a| symbols.is_probabilistic_choice(a));
        if let Some(v) = fact_vars.difference(&choice_vars).next() {
            return FastPathOutcome::UnsupportedShape {
                reason: format!(
                    "existential `{v}` of a probabilistic fact is not in a probabilistic choice"
                ),
            };
        }
    }

    // Deterministic atoms still correlate the probabilistic ones they link.
    if !is_hierarchical_without_self_joins(&matrix) {
        return FastPathOutcome::NotHierarchical {
            reason: format!("`{matrix}` is not hierarchical without self-joins"),
        };
    }

    let free = matrix.free_variables();
    let attributes: Vec<Variable> = ucq
        .head_variables()
        .into_iter()
        .filter(|v| free.contains(v))
        .collect();
    let plan = Plan::projection(Plan::translate(matrix), attributes);
    FastPathOutcome::Hierarchical(ucq.restore(&plan))
}

impl<O: ContainmentOracle> LiftingEngine<O> {
    /// Compile `query` only if it is hierarchical and self-join-free.
    pub fn solve_succ_hierarchical(
        &self,
        query: &Formula,
        symbols: &SymbolTable,
    ) -> Result<FastPathOutcome, LiftError> {
        check_declared(query, symbols)?;
        let outcome = match normalize(query, symbols, self.config())? {
            NormalizedQuery::Empty { head } => FastPathOutcome::Hierarchical(Plan::Empty {
                attributes: crate::normalize::head_variables(&head),
            }),
            NormalizedQuery::Ucq(ucq) => fast_path(&ucq),
        };
        match &outcome {
            FastPathOutcome::Hierarchical(_) => {
                tracing::debug!(query = %query, "hierarchical fast path")
            }
            FastPathOutcome::NotHierarchical { reason }
            | FastPathOutcome::UnsupportedShape { reason } => {
                tracing::info!(query = %query, reason = %reason, "fast path rejected query")
            }
        }
        Ok(outcome)
    }

    /// Fast path first; fall back to the general engine when it rejects the
    /// query.
    pub fn solve_succ_with_fast_path(
        &self,
        query: &Formula,
        symbols: &SymbolTable,
    ) -> Result<Plan, LiftError> {
        match self.solve_succ_hierarchical(query, symbols)? {
            FastPathOutcome::Hierarchical(plan) => Ok(plan),
            FastPathOutcome::NotHierarchical { .. } | FastPathOutcome::UnsupportedShape { .. } => {
                self.solve_succ(query, symbols)
            }
        }
    }
}

pub fn solve_succ_hierarchical(
    query: &Formula,
    symbols: &SymbolTable,
) -> Result<FastPathOutcome, LiftError> {
    LiftingEngine::new().solve_succ_hierarchical(query, symbols)
}

pub fn solve_succ_with_fast_path(
    query: &Formula,
    symbols: &SymbolTable,
) -> Result<Plan, LiftError> {
    LiftingEngine::new().solve_succ_with_fast_path(query, symbols)
}
