//! Separator variables.
//!
//! In a DNF `Q = Q₁ ∨ … ∨ Q_m` whose disjuncts are existentially closed, a
//! separator is a choice of one bound variable `zᵢ` per disjunct such that
//!
//! - each `zᵢ` is a root variable of `Qᵢ`: it occurs in every probabilistic
//!   atom of `Qᵢ` and in no probabilistic-choice atom;
//! - for every probabilistic predicate `R`, the chosen variables occupy a
//!   common position in all occurrences of `R` across all disjuncts.
//!
//! Renaming every `zᵢ` to one variable `z` gives `Q ≡ ∃z.Q'` where the events
//! `Q'[z := a]` are independent for distinct constants `a`, so
//! `P(Q) = 1 − Π_a (1 − P(Q'[z := a]))`: an independent projection.

use crate::containment::ContainmentOracle;
use crate::engine::{LiftContext, LiftingEngine};
use crate::plan::Plan;
use crate::transforms::make_existentials_implicit_avoiding;
use liftql_logic::{fresh_variable, Atom, Formula, SymbolTable, Variable};
use std::collections::{BTreeMap, BTreeSet};

struct Disjunct {
    matrix: Formula,
    probabilistic: Vec<Atom>,
    candidates: Vec<Variable>,
}

fn probabilistic_atoms(formula: &Formula, symbols: &SymbolTable) -> Vec<Atom> {
    formula
        .atoms()
        .into_iter()
        .filter(|a| !symbols.is_deterministic(a))
        .cloned()
        .collect()
}

/// Bound variables occurring in every probabilistic atom and in no
/// probabilistic-choice atom, sorted.
pub fn root_variables(
    matrix: &Formula,
    bound: &BTreeSet<Variable>,
    symbols: &SymbolTable,
) -> BTreeSet<Variable> {
    let atoms = probabilistic_atoms(matrix, symbols);
    let Some((first, rest)) = atoms.split_first() else {
        return BTreeSet::new();
    };
    let mut roots: BTreeSet<Variable> = first.variable_set();
    for atom in rest {
        let vars = atom.variable_set();
        roots.retain(|v| vars.contains(v));
    }
    for atom in atoms.iter().filter(|a| symbols.is_probabilistic_choice(a)) {
        for v in atom.variables() {
            roots.remove(v);
        }
    }
    roots.retain(|v| bound.contains(v));
    roots
}

/// Per-predicate intersection of the positions the chosen variables occupy.
type Positions = BTreeMap<String, BTreeSet<usize>>;

fn constrain(positions: &Positions, disjunct: &Disjunct, var: &Variable) -> Option<Positions> {
    let mut next = positions.clone();
    for atom in &disjunct.probabilistic {
        let at = atom.positions_of(var);
        let entry = next.entry(atom.predicate.clone()).or_insert_with(|| at.clone());
        entry.retain(|p| at.contains(p));
        if entry.is_empty() {
            return None;
        }
    }
    Some(next)
}

fn align(
    disjuncts: &[Disjunct],
    index: usize,
    positions: &Positions,
    chosen: &mut Vec<Variable>,
) -> bool {
    let Some(disjunct) = disjuncts.get(index) else {
        return true;
    };
    for var in &disjunct.candidates {
        if let Some(next) = constrain(positions, disjunct, var) {
            chosen.push(var.clone());
            if align(disjuncts, index + 1, &next, chosen) {
                return true;
            }
            chosen.pop();
        }
    }
    false
}

/// Find a separator for `dnf`. On success returns the rewritten disjunction
/// (bound variables released, separator renamed to a common variable) and
/// that variable.
pub fn find_separator(dnf: &Formula, symbols: &SymbolTable) -> Option<(Formula, Variable)> {
    let free = dnf.free_variables();
    let mut disjuncts = Vec::new();
    let mut passive = Vec::new();
    for d in dnf.disjuncts() {
        let matrix = make_existentials_implicit_avoiding(d, &free);
        let probabilistic = probabilistic_atoms(&matrix, symbols);
        if probabilistic.is_empty() {
            passive.push(matrix);
            continue;
        }
        let bound: BTreeSet<Variable> =
            matrix.free_variables().difference(&free).cloned().collect();
        let candidates: Vec<Variable> =
            root_variables(&matrix, &bound, symbols).into_iter().collect();
        if candidates.is_empty() {
            return None;
        }
        disjuncts.push(Disjunct {
            matrix,
            probabilistic,
            candidates,
        });
    }
    if disjuncts.is_empty() {
        return None;
    }

    let mut chosen = Vec::with_capacity(disjuncts.len());
    if !align(&disjuncts, 0, &Positions::new(), &mut chosen) {
        return None;
    }

    let shared = match chosen.split_first() {
        Some((first, rest)) if rest.iter().all(|v| v == first) => first.clone(),
        _ => {
            let mut avoid = free.clone();
            for d in &disjuncts {
                avoid.extend(d.matrix.variables());
            }
            for m in &passive {
                avoid.extend(m.variables());
            }
            fresh_variable(&chosen[0], &avoid)
        }
    };

    let mut rewritten: Vec<Formula> = disjuncts
        .iter()
        .zip(&chosen)
        .map(|(d, var)| d.matrix.rename_variable(var, &shared))
        .collect();
    rewritten.extend(passive);
    let body = if rewritten.len() == 1 {
        rewritten.pop().unwrap_or(Formula::False)
    } else {
        Formula::Disjunction(rewritten)
    };
    Some((body, shared))
}

pub(crate) fn separator_variable_plan<O: ContainmentOracle>(
    engine: &LiftingEngine<O>,
    dnf: &Formula,
    symbols: &SymbolTable,
    ctx: &mut LiftContext,
) -> Option<Plan> {
    let (body, separator) = find_separator(dnf, symbols)?;
    let free = dnf.free_variables();
    tracing::debug!(rule = "separator", separator = %separator, formula = %dnf);

    let rebind: Vec<Variable> = body
        .free_variables()
        .into_iter()
        .filter(|v| !free.contains(v) && v != &separator)
        .collect();
    let inner = Formula::exists_all(rebind, body);
    let plan = engine.lift_in(&inner, symbols, ctx);
    Some(Plan::independent_projection(plan, free))
}
