//! Inclusion–exclusion over the clauses of a CNF.
//!
//! For clauses `c₁ … c_k`, every non-empty subset `S` contributes the
//! disjunction `∨S`. Elements that are equivalent under the containment
//! oracle collapse into one lattice element, and the weight of each element
//! is its Möbius value
//!
//! ```text
//! w(u) = 1 − Σ { w(v) : v strictly implies u }
//! ```
//!
//! so that `P(c₁ ∧ … ∧ c_k) = Σ w(u)·P(u)`. Elements whose weight cancels to
//! zero are not lifted, which is how the rule sidesteps hard sub-queries. The
//! one exception is a zero-weight element that is the only one mentioning
//! some free variable: it joins in with weight 0 to keep the attributes.

use crate::containment::ContainmentOracle;
use crate::engine::{LiftContext, LiftingEngine};
use crate::plan::Plan;
use crate::transforms::remove_trivial_operations;
use ahash::AHashMap;
use liftql_logic::{Formula, SymbolTable, Variable};
use std::collections::BTreeSet;

/// Flatten, sort and dedupe the operands of n-ary operators so syntactic
/// variants of the same disjunction share one key.
fn canonical(formula: &Formula) -> Formula {
    fn canonical_operands(fs: &[Formula]) -> Vec<Formula> {
        let mut out: Vec<Formula> = fs.iter().map(canonical).collect();
        out.sort();
        out.dedup();
        out
    }
    match remove_trivial_operations(formula) {
        Formula::Conjunction(fs) => Formula::Conjunction(canonical_operands(&fs)),
        Formula::Disjunction(fs) => Formula::Disjunction(canonical_operands(&fs)),
        other => other,
    }
}

/// Index subsets of `0..k` by size, then lexicographically.
fn non_empty_subsets(k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    for size in 1..=k {
        let mut combo: Vec<usize> = (0..size).collect();
        loop {
            out.push(combo.clone());
            // Advance to the next combination; stop after the last one.
            let Some(i) = (0..size).rev().find(|&i| combo[i] != i + k - size) else {
                break;
            };
            combo[i] += 1;
            for j in (i + 1)..size {
                combo[j] = combo[j - 1] + 1;
            }
        }
    }
    out
}

/// Möbius weight of element `u`, memoised in `memo`. `None` when the
/// containment relation among the elements is cyclic.
fn mobius(
    u: usize,
    below: &[Vec<usize>],
    memo: &mut [Option<i64>],
    visiting: &mut [bool],
) -> Option<i64> {
    if let Some(w) = memo[u] {
        return Some(w);
    }
    if visiting[u] {
        return None;
    }
    visiting[u] = true;
    let mut lower = 0;
    for &v in &below[u] {
        lower += mobius(v, below, memo, visiting)?;
    }
    visiting[u] = false;
    memo[u] = Some(1 - lower);
    memo[u]
}

/// Every lattice element with its Möbius weight, zero weights included, in
/// order of first appearance.
fn lattice(clauses: &[Formula], oracle: &impl ContainmentOracle) -> Option<Vec<(Formula, i64)>> {
    let mut elements: Vec<Formula> = Vec::new();
    let mut index_of: AHashMap<Formula, usize> = AHashMap::new();

    for subset in non_empty_subsets(clauses.len()) {
        let formula = match subset.as_slice() {
            [single] => clauses[*single].clone(),
            _ => Formula::Disjunction(subset.iter().map(|&i| clauses[i].clone()).collect()),
        };
        let key = canonical(&formula);
        if index_of.contains_key(&key) {
            continue;
        }
        let existing = elements.iter().position(|e| oracle.is_equivalent(e, &formula));
        match existing {
            Some(i) => {
                index_of.insert(key, i);
            }
            None => {
                index_of.insert(key, elements.len());
                elements.push(formula);
            }
        }
    }

    let below: Vec<Vec<usize>> = elements
        .iter()
        .enumerate()
        .map(|(u, upper)| {
            (0..elements.len())
                .filter(|&v| v != u && oracle.is_contained(&elements[v], upper))
                .collect()
        })
        .collect();

    let mut memo = vec![None; elements.len()];
    let mut visiting = vec![false; elements.len()];
    let mut weights = Vec::with_capacity(elements.len());
    for u in 0..elements.len() {
        weights.push(mobius(u, &below, &mut memo, &mut visiting)?);
    }
    Some(elements.into_iter().zip(weights).collect())
}

/// Lattice elements with non-zero Möbius weight, in order of first
/// appearance. `None` when `oracle` reports a containment cycle between
/// inequivalent elements, which no preorder does.
pub fn inclusion_exclusion_terms(
    clauses: &[Formula],
    oracle: &impl ContainmentOracle,
) -> Option<Vec<(Formula, i64)>> {
    let terms = lattice(clauses, oracle)?;
    Some(terms.into_iter().filter(|(_, w)| *w != 0).collect())
}

pub(crate) fn inclusion_exclusion_plan<O: ContainmentOracle>(
    engine: &LiftingEngine<O>,
    cnf: &Formula,
    symbols: &SymbolTable,
    ctx: &mut LiftContext,
) -> Plan {
    let clauses = cnf.conjuncts();
    if let Some(limit) = engine.config().max_inclusion_exclusion_terms {
        if clauses.len() > limit {
            tracing::warn!(
                clauses = clauses.len(),
                limit,
                formula = %cnf,
                "inclusion-exclusion bound exceeded"
            );
            return Plan::non_liftable(cnf.clone());
        }
    }

    let Some(elements) = lattice(clauses, engine.oracle()) else {
        tracing::warn!(formula = %cnf, "containment oracle is cyclic on the clause lattice");
        return Plan::non_liftable(cnf.clone());
    };

    // A zero-weight element stays when it alone carries some answer variable.
    let mut covered: BTreeSet<Variable> = elements
        .iter()
        .filter(|(_, w)| *w != 0)
        .flat_map(|(f, _)| f.free_variables())
        .collect();
    let mut terms = Vec::with_capacity(elements.len());
    for (formula, weight) in elements {
        if weight == 0 {
            let free = formula.free_variables();
            if free.is_subset(&covered) {
                continue;
            }
            tracing::debug!(term = %formula, "zero-weight term kept for its attributes");
            covered.extend(free);
        }
        terms.push((formula, weight));
    }
    tracing::debug!(clauses = clauses.len(), terms = terms.len(), "mobius weights computed");

    let mut weighted = Vec::with_capacity(terms.len());
    for (formula, weight) in terms {
        let plan = engine.lift_in(&formula, symbols, ctx);
        if !plan.is_pure_lifted() {
            tracing::info!(
                term = %formula,
                formula = %cnf,
                "inclusion-exclusion term not liftable"
            );
            return Plan::non_liftable(cnf.clone());
        }
        weighted.push((plan, weight));
    }
    Plan::weighted_natural_join(weighted)
}
