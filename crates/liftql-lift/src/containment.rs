//! Query containment.
//!
//! `is_contained(a, b)` holds when every answer of `a` is an answer of `b`
//! (logically, `a ⇒ b`). Free variables of both sides are the distinguished
//! (answer) variables.
//!
//! The default oracle decides containment of unions of conjunctive queries by
//! the Sagiv–Yannakakis criterion: `a ⊆ b` iff every conjunctive query of `a`
//! receives a homomorphism from some conjunctive query of `b`. For queries
//! with negated atoms and equalities the homomorphism must also map negated
//! atoms onto negated atoms and equalities onto equalities; this is sound but
//! not complete. Negations of anything other than an atom are never reported
//! as contained.

use crate::normal_forms::dnf_terms;
use crate::transforms::{make_existentials_implicit_avoiding, remove_trivial_operations};
use liftql_logic::{Atom, Formula, Term, Variable};
use std::collections::{BTreeMap, BTreeSet};

pub trait ContainmentOracle {
    /// `true` only if `contained ⇒ container`.
    fn is_contained(&self, contained: &Formula, container: &Formula) -> bool;

    fn is_equivalent(&self, a: &Formula, b: &Formula) -> bool {
        a == b || (self.is_contained(a, b) && self.is_contained(b, a))
    }
}

impl<T: ContainmentOracle + ?Sized> ContainmentOracle for &T {
    fn is_contained(&self, contained: &Formula, container: &Formula) -> bool {
        (**self).is_contained(contained, container)
    }
}

/// Homomorphism-based containment for UCQs.
#[derive(Debug, Clone, Copy, Default)]
pub struct HomomorphismContainment;

impl ContainmentOracle for HomomorphismContainment {
    fn is_contained(&self, contained: &Formula, container: &Formula) -> bool {
        if contained == container {
            return true;
        }
        let mut distinguished = contained.free_variables();
        distinguished.extend(container.free_variables());

        let Some(lhs) = conjunctive_queries(contained, &distinguished) else {
            return false;
        };
        let Some(rhs) = conjunctive_queries(container, &distinguished) else {
            return false;
        };
        lhs.iter().all(|target| {
            rhs.iter()
                .any(|pattern| has_homomorphism(pattern, target, &distinguished))
        })
    }
}

#[derive(Debug, Default)]
struct ConjunctiveQuery {
    positives: Vec<Atom>,
    negatives: Vec<Atom>,
    equalities: Vec<(Term, Term)>,
}

/// Disjuncts of `formula` as conjunctive queries whose existential variables
/// are disjoint from `distinguished`. `None` if a literal falls outside
/// atoms, negated atoms and equalities.
fn conjunctive_queries(
    formula: &Formula,
    distinguished: &BTreeSet<Variable>,
) -> Option<Vec<ConjunctiveQuery>> {
    let simplified = remove_trivial_operations(formula);
    let matrix = make_existentials_implicit_avoiding(&simplified, distinguished);
    dnf_terms(&matrix)
        .into_iter()
        .map(|term| {
            let mut cq = ConjunctiveQuery::default();
            for literal in term {
                match literal {
                    Formula::Atom(a) => cq.positives.push(a),
                    Formula::Negation(inner) => match *inner {
                        Formula::Atom(a) => cq.negatives.push(a),
                        _ => return None,
                    },
                    Formula::Equality(l, r) => cq.equalities.push((l, r)),
                    Formula::True => {}
                    _ => return None,
                }
            }
            Some(cq)
        })
        .collect()
}

type Mapping = BTreeMap<Variable, Term>;

fn image(term: &Term, mapping: &Mapping, fixed: &BTreeSet<Variable>) -> Option<Term> {
    match term {
        Term::Constant(_) => Some(term.clone()),
        Term::Variable(v) if fixed.contains(v) => Some(term.clone()),
        Term::Variable(v) => mapping.get(v).cloned(),
    }
}

/// Extend `mapping` so that `pattern` maps onto `target`; returns the
/// variables newly bound, or `None` (with `mapping` unchanged) on a clash.
fn unify_atom(
    pattern: &Atom,
    target: &Atom,
    mapping: &mut Mapping,
    fixed: &BTreeSet<Variable>,
) -> Option<Vec<Variable>> {
    if pattern.predicate != target.predicate || pattern.arity() != target.arity() {
        return None;
    }
    let mut bound = Vec::new();
    for (p, t) in pattern.args.iter().zip(&target.args) {
        match image(p, mapping, fixed) {
            Some(img) if &img == t => {}
            Some(_) => {
                bound.iter().for_each(|v| {
                    mapping.remove(v);
                });
                return None;
            }
            None => {
                // Only unbound existential variables reach this arm.
                if let Term::Variable(v) = p {
                    mapping.insert(v.clone(), t.clone());
                    bound.push(v.clone());
                }
            }
        }
    }
    Some(bound)
}

fn has_homomorphism(
    pattern: &ConjunctiveQuery,
    target: &ConjunctiveQuery,
    fixed: &BTreeSet<Variable>,
) -> bool {
    let goals: Vec<(&Atom, &[Atom])> = pattern
        .positives
        .iter()
        .map(|a| (a, target.positives.as_slice()))
        .chain(pattern.negatives.iter().map(|a| (a, target.negatives.as_slice())))
        .collect();
    let mut mapping = Mapping::new();
    search(&goals, 0, &mut mapping, fixed, &|mapping| {
        equalities_hold(&pattern.equalities, &target.equalities, mapping, fixed)
    })
}

fn search(
    goals: &[(&Atom, &[Atom])],
    index: usize,
    mapping: &mut Mapping,
    fixed: &BTreeSet<Variable>,
    finish: &dyn Fn(&Mapping) -> bool,
) -> bool {
    let Some((pattern, candidates)) = goals.get(index) else {
        return finish(mapping);
    };
    for candidate in candidates.iter() {
        if let Some(bound) = unify_atom(pattern, candidate, mapping, fixed) {
            if search(goals, index + 1, mapping, fixed, finish) {
                return true;
            }
            for v in bound {
                mapping.remove(&v);
            }
        }
    }
    false
}

fn equalities_hold(
    pattern: &[(Term, Term)],
    target: &[(Term, Term)],
    mapping: &Mapping,
    fixed: &BTreeSet<Variable>,
) -> bool {
    let mut mapping = mapping.clone();
    pattern.iter().all(|(l, r)| {
        let (l_img, r_img) = match (image(l, &mapping, fixed), image(r, &mapping, fixed)) {
            (Some(a), Some(b)) => (a, b),
            (Some(a), None) => {
                if let Term::Variable(v) = r {
                    mapping.insert(v.clone(), a.clone());
                }
                (a.clone(), a)
            }
            (None, Some(b)) => {
                if let Term::Variable(v) = l {
                    mapping.insert(v.clone(), b.clone());
                }
                (b.clone(), b)
            }
            (None, None) => return true,
        };
        l_img == r_img
            || target
                .iter()
                .any(|(a, b)| (a == &l_img && b == &r_img) || (a == &r_img && b == &l_img))
    })
}
