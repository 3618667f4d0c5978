//! CNF / DNF of UCQs over connected conjunctive queries.
//!
//! The "letters" of these normal forms are not literals but connected
//! conjunctive queries (CCQs): the existential matrix of the query is put in
//! disjunctive normal form over literals, each conjunction is split into
//! groups connected through shared bound variables, and each group is
//! existentially closed on its own. A letter therefore shares only free
//! (answer) variables with its siblings, which is what the independence rules
//! of the lifting engine rely on.
//!
//! Output shapes:
//!
//! - CNF: always `Conjunction(clauses)`; a clause is a letter or a
//!   `Disjunction` of letters.
//! - DNF: always `Disjunction(disjuncts)`; a disjunct is a letter or a
//!   `Conjunction` of letters.
//!
//! Both forms are minimised under the containment oracle: redundant letters,
//! clauses and disjuncts are dropped, keeping the earliest of equivalent ones.
//! An item is only ever dropped in favour of one that mentions all of its
//! free variables, so minimisation never shrinks the answer attributes.

use crate::containment::ContainmentOracle;
use crate::graph::{co_occurrence_graph, connected_components};
use crate::transforms::{
    add_existentials_except, make_existentials_implicit, remove_trivial_operations,
};
use liftql_logic::{Formula, Variable};
use std::collections::BTreeSet;

/// Distribute a quantifier-free matrix into a list of conjunctions of
/// literals. Anything that is not a conjunction or disjunction is a literal.
pub(crate) fn dnf_terms(matrix: &Formula) -> Vec<Vec<Formula>> {
    match matrix {
        Formula::True => vec![Vec::new()],
        Formula::False => Vec::new(),
        Formula::Disjunction(fs) => fs.iter().flat_map(dnf_terms).collect(),
        Formula::Conjunction(fs) => fs.iter().fold(vec![Vec::new()], |acc, f| {
            let rhs = dnf_terms(f);
            let mut out = Vec::with_capacity(acc.len() * rhs.len());
            for left in &acc {
                for right in &rhs {
                    let mut term = left.clone();
                    term.extend(right.iter().cloned());
                    out.push(term);
                }
            }
            out
        }),
        literal => vec![vec![literal.clone()]],
    }
}

fn push_unique(items: &mut Vec<Formula>, item: Formula) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// Split a conjunction of literals into CCQ letters.
fn letters_of_term(term: &[Formula], protected: &BTreeSet<Variable>) -> Vec<Formula> {
    let adjacency = co_occurrence_graph(term, |literal| {
        literal
            .free_variables()
            .into_iter()
            .filter(|v| !protected.contains(v))
            .collect()
    });
    let mut letters = Vec::new();
    for component in connected_components(&adjacency) {
        let mut members: Vec<Formula> = Vec::with_capacity(component.len());
        for i in component {
            push_unique(&mut members, term[i].clone());
        }
        let body = if members.len() == 1 {
            members.pop().unwrap_or(Formula::True)
        } else {
            Formula::Conjunction(members)
        };
        push_unique(&mut letters, add_existentials_except(&body, protected));
    }
    letters
}

/// The query as a list of disjuncts, each a list of CCQ letters.
pub fn ucq_letters(formula: &Formula) -> Vec<Vec<Formula>> {
    let formula = remove_trivial_operations(formula);
    let protected = formula.free_variables();
    let matrix = make_existentials_implicit(&formula);
    let mut disjuncts: Vec<Vec<Formula>> = Vec::new();
    for term in dnf_terms(&remove_trivial_operations(&matrix)) {
        let letters = letters_of_term(&term, &protected);
        if !disjuncts.contains(&letters) {
            disjuncts.push(letters);
        }
    }
    disjuncts
}

/// Keep a minimal subset of `items`: a candidate is dropped when a kept item
/// makes it redundant, and kept items made redundant by it are evicted.
/// `redundant(a, b)` reads "`a` is redundant in the presence of `b`"; it is
/// only consulted when `b` mentions every free variable of `a`.
fn minimise(items: Vec<Formula>, redundant: impl Fn(&Formula, &Formula) -> bool) -> Vec<Formula> {
    let items: Vec<(BTreeSet<Variable>, Formula)> =
        items.into_iter().map(|f| (f.free_variables(), f)).collect();
    let drops = |(a_free, a): &(BTreeSet<Variable>, Formula),
                 (b_free, b): &(BTreeSet<Variable>, Formula)| {
        a_free.is_subset(b_free) && redundant(a, b)
    };
    let mut kept: Vec<(BTreeSet<Variable>, Formula)> = Vec::with_capacity(items.len());
    for item in items {
        if kept.iter().any(|k| k.1 == item.1 || drops(&item, k)) {
            continue;
        }
        kept.retain(|k| !drops(k, &item));
        kept.push(item);
    }
    kept.into_iter().map(|(_, f)| f).collect()
}

/// Drop repeated clauses and clauses whose letters include all letters of
/// another clause with the same free variables.
fn absorb(clauses: Vec<Vec<Formula>>) -> Vec<Vec<Formula>> {
    let sets: Vec<BTreeSet<&Formula>> = clauses.iter().map(|c| c.iter().collect()).collect();
    let free: Vec<BTreeSet<Variable>> = clauses
        .iter()
        .map(|c| c.iter().flat_map(Formula::free_variables).collect())
        .collect();
    let mut keep = vec![true; clauses.len()];
    for i in 0..sets.len() {
        for j in 0..sets.len() {
            if i == j || !keep[j] || free[i] != free[j] {
                continue;
            }
            // j absorbs i if j ⊂ i, or j = i and j comes first.
            if sets[j].is_subset(&sets[i]) && (sets[j].len() < sets[i].len() || j < i) {
                keep[i] = false;
                break;
            }
        }
    }
    clauses
        .into_iter()
        .zip(keep)
        .filter_map(|(c, k)| k.then_some(c))
        .collect()
}

fn conjoin(mut letters: Vec<Formula>) -> Formula {
    if letters.len() == 1 {
        letters.pop().unwrap_or(Formula::True)
    } else {
        Formula::Conjunction(letters)
    }
}

fn disjoin(mut letters: Vec<Formula>) -> Formula {
    if letters.len() == 1 {
        letters.pop().unwrap_or(Formula::False)
    } else {
        Formula::Disjunction(letters)
    }
}

/// Minimal DNF over CCQ letters.
pub fn minimize_ucq_in_dnf(formula: &Formula, oracle: &impl ContainmentOracle) -> Formula {
    let disjuncts: Vec<Formula> = ucq_letters(formula)
        .into_iter()
        .map(|letters| {
            // In a conjunction, a letter implied by a sibling adds nothing.
            conjoin(minimise(letters, |a, b| oracle.is_contained(b, a)))
        })
        .collect();
    // In a disjunction, a disjunct implying a sibling adds nothing.
    Formula::Disjunction(minimise(disjuncts, |a, b| oracle.is_contained(a, b)))
}

/// Minimal CNF over CCQ letters.
pub fn minimize_ucq_in_cnf(formula: &Formula, oracle: &impl ContainmentOracle) -> Formula {
    let disjuncts = ucq_letters(formula);
    let mut clauses: Vec<Vec<Formula>> = vec![Vec::new()];
    if disjuncts.is_empty() {
        clauses = vec![vec![Formula::False]];
    }
    for letters in &disjuncts {
        let mut next: Vec<Vec<Formula>> = Vec::with_capacity(clauses.len() * letters.len());
        for clause in &clauses {
            for letter in letters {
                let mut extended = clause.clone();
                push_unique(&mut extended, letter.clone());
                next.push(extended);
            }
        }
        clauses = absorb(next);
    }
    let clauses: Vec<Formula> = clauses
        .into_iter()
        .map(|letters| disjoin(minimise(letters, |a, b| oracle.is_contained(a, b))))
        .collect();
    // In a conjunction, a clause implied by a sibling adds nothing.
    Formula::Conjunction(minimise(clauses, |a, b| oracle.is_contained(b, a)))
}
