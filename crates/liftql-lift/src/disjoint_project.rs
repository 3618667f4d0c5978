//! Disjoint projection for probabilistic-choice relations.
//!
//! A probabilistic-choice relation has no key attribute: its tuples are
//! mutually exclusive alternatives. An atom over such a relation therefore
//! has "constants in all key positions" trivially, and so does a
//! tuple-independent atom whose arguments are all constants.
//!
//! - Conjunctive query: the choice atoms are re-declared (locally) as
//!   tuple-independent facts, their variables are kept free, the result is
//!   lifted and the extra variables are summed out with a disjoint
//!   projection.
//! - Disjunctive query `Q₁ ∨ Q'` with `Q₁` a matching disjunct:
//!   `P(Q) = P(Q₁) + P(Q') − P(Q₁ ∧ Q')`. Only splits of one matching
//!   disjunct against the remainder are tried.

use crate::containment::ContainmentOracle;
use crate::engine::{LiftContext, LiftingEngine};
use crate::plan::Plan;
use crate::transforms::{
    add_existentials_except, make_existentials_implicit, remove_trivial_operations,
};
use liftql_logic::{Atom, Formula, RelationKind, SymbolTable, Variable};
use std::collections::BTreeSet;

/// Choice atom, or tuple-independent atom with only constant arguments.
pub fn has_constants_in_all_key_positions(atom: &Atom, symbols: &SymbolTable) -> bool {
    symbols.is_probabilistic_choice(atom)
        || (symbols.is_probabilistic_fact(atom) && atom.is_ground())
}

/// Positive top-level atoms of the matrix of `formula`.
fn top_level_atoms(matrix: &Formula) -> Vec<&Atom> {
    matrix.conjuncts().iter().filter_map(Formula::as_atom).collect()
}

fn matches(disjunct: &Formula, symbols: &SymbolTable) -> bool {
    let matrix = remove_trivial_operations(&make_existentials_implicit(disjunct));
    top_level_atoms(&matrix)
        .into_iter()
        .any(|a| has_constants_in_all_key_positions(a, symbols))
}

pub(crate) fn disjoint_project<O: ContainmentOracle>(
    engine: &LiftingEngine<O>,
    dnf: &Formula,
    symbols: &SymbolTable,
    ctx: &mut LiftContext,
) -> Option<Plan> {
    match dnf.disjuncts() {
        [single] => disjoint_project_conjunctive(engine, single, symbols, ctx),
        disjuncts => disjoint_project_disjunctive(engine, dnf, disjuncts, symbols, ctx),
    }
}

fn disjoint_project_conjunctive<O: ContainmentOracle>(
    engine: &LiftingEngine<O>,
    query: &Formula,
    symbols: &SymbolTable,
    ctx: &mut LiftContext,
) -> Option<Plan> {
    let free = query.free_variables();
    let matrix = remove_trivial_operations(&make_existentials_implicit(query));
    let choices: Vec<&Atom> = top_level_atoms(&matrix)
        .into_iter()
        .filter(|a| symbols.is_probabilistic_choice(a))
        .collect();
    if choices.is_empty() {
        return None;
    }

    let mut keep: BTreeSet<Variable> = free.clone();
    let mut local = symbols.clone();
    for atom in &choices {
        keep.extend(atom.variables().cloned());
        if let Some(column) = local.kind_of(atom).and_then(RelationKind::probability_column) {
            local.insert(
                atom.predicate.clone(),
                RelationKind::ProbabilisticFact {
                    probability_column: column,
                },
            );
        }
    }
    tracing::debug!(
        rule = "disjoint_projection",
        choices = choices.len(),
        formula = %query
    );

    let inner = add_existentials_except(&matrix, &keep);
    let plan = engine.lift_in(&inner, &local, ctx);
    Some(Plan::disjoint_projection(plan, free))
}

fn disjoint_project_disjunctive<O: ContainmentOracle>(
    engine: &LiftingEngine<O>,
    dnf: &Formula,
    disjuncts: &[Formula],
    symbols: &SymbolTable,
    ctx: &mut LiftContext,
) -> Option<Plan> {
    let free = dnf.free_variables();
    for (i, candidate) in disjuncts.iter().enumerate() {
        if !matches(candidate, symbols) {
            continue;
        }
        let remainder: Vec<Formula> = disjuncts
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, d)| d.clone())
            .collect();
        let head = add_existentials_except(candidate, &free);
        let tail = add_existentials_except(&Formula::Disjunction(remainder), &free);
        let both = Formula::and([head.clone(), tail.clone()]);

        let mut plans = Vec::with_capacity(3);
        for part in [&head, &tail, &both] {
            let plan = engine.lift_in(part, symbols, ctx);
            if !plan.is_pure_lifted() {
                break;
            }
            plans.push(plan);
        }
        if plans.len() < 3 {
            tracing::debug!(candidate = %candidate, "disjoint projection split not liftable");
            continue;
        }
        tracing::debug!(rule = "disjoint_projection_union", candidate = %candidate, formula = %dnf);
        return Some(Plan::weighted_natural_join(plans.into_iter().zip([1, 1, -1])));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use liftql_logic::Term;

    #[test]
    fn key_positions() {
        let symbols: SymbolTable = [
            ("C", RelationKind::ProbabilisticChoice { probability_column: 1 }),
            ("F", RelationKind::ProbabilisticFact { probability_column: 1 }),
            ("D", RelationKind::Deterministic),
        ]
        .into_iter()
        .collect();
        assert!(has_constants_in_all_key_positions(
            &Atom::new("C", [Term::var("x")]),
            &symbols
        ));
        assert!(has_constants_in_all_key_positions(
            &Atom::new("F", [Term::str("a")]),
            &symbols
        ));
        assert!(!has_constants_in_all_key_positions(
            &Atom::new("F", [Term::var("x")]),
            &symbols
        ));
        assert!(!has_constants_in_all_key_positions(
            &Atom::new("D", [Term::str("a")]),
            &symbols
        ));
    }
}
