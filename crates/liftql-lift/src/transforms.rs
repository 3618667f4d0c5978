//! Structural rewrites shared by the normalizer and the lifting rules.
//!
//! All functions are pure and deterministic: the same input always yields the
//! same output tree, including the names chosen for renamed variables.

use liftql_logic::{fresh_variable, Formula, Term, Variable};
use std::collections::BTreeSet;

/// Simplify away trivial structure:
///
/// - flatten nested conjunctions / disjunctions, drop singleton operators;
/// - absorb `⊤` / `⊥` units and annihilators;
/// - `¬¬φ → φ`, `¬⊤ → ⊥`, `¬⊥ → ⊤`;
/// - drop vacuous quantifiers;
/// - `t = t → ⊤`, and distinct constants compare to `⊥`.
pub fn remove_trivial_operations(formula: &Formula) -> Formula {
    match formula {
        Formula::True | Formula::False | Formula::Atom(_) => formula.clone(),
        Formula::Equality(l, r) => match (l, r) {
            _ if l == r => Formula::True,
            (Term::Constant(_), Term::Constant(_)) => Formula::False,
            _ => formula.clone(),
        },
        Formula::Conjunction(fs) => {
            let mut out = Vec::with_capacity(fs.len());
            for f in fs {
                match remove_trivial_operations(f) {
                    Formula::True => {}
                    Formula::False => return Formula::False,
                    Formula::Conjunction(inner) => out.extend(inner),
                    other => out.push(other),
                }
            }
            match out.len() {
                0 => Formula::True,
                1 => out.pop().unwrap_or(Formula::True),
                _ => Formula::Conjunction(out),
            }
        }
        Formula::Disjunction(fs) => {
            let mut out = Vec::with_capacity(fs.len());
            for f in fs {
                match remove_trivial_operations(f) {
                    Formula::False => {}
                    Formula::True => return Formula::True,
                    Formula::Disjunction(inner) => out.extend(inner),
                    other => out.push(other),
                }
            }
            match out.len() {
                0 => Formula::False,
                1 => out.pop().unwrap_or(Formula::False),
                _ => Formula::Disjunction(out),
            }
        }
        Formula::Negation(inner) => match remove_trivial_operations(inner) {
            Formula::True => Formula::False,
            Formula::False => Formula::True,
            Formula::Negation(double) => *double,
            other => Formula::not(other),
        },
        Formula::Exists(v, body) => {
            let body = remove_trivial_operations(body);
            if body.free_variables().contains(v) {
                Formula::exists(v.clone(), body)
            } else {
                body
            }
        }
        Formula::Implication(head, body) => Formula::implies(
            remove_trivial_operations(head),
            remove_trivial_operations(body),
        ),
    }
}

/// Rename bound variables so that every binder introduces a distinct name that
/// is also distinct from every free variable.
pub fn standardize_apart(formula: &Formula) -> Formula {
    standardize_apart_avoiding(formula, &BTreeSet::new())
}

/// As [`standardize_apart`], additionally keeping bound names out of `avoid`.
pub fn standardize_apart_avoiding(formula: &Formula, avoid: &BTreeSet<Variable>) -> Formula {
    let mut taken = formula.variables();
    taken.extend(avoid.iter().cloned());
    let mut claimed = formula.free_variables();
    claimed.extend(avoid.iter().cloned());
    standardize(formula, &mut taken, &mut claimed)
}

fn standardize(
    formula: &Formula,
    taken: &mut BTreeSet<Variable>,
    claimed: &mut BTreeSet<Variable>,
) -> Formula {
    match formula {
        Formula::True | Formula::False | Formula::Atom(_) | Formula::Equality(..) => {
            formula.clone()
        }
        Formula::Conjunction(fs) => {
            Formula::Conjunction(fs.iter().map(|f| standardize(f, taken, claimed)).collect())
        }
        Formula::Disjunction(fs) => {
            Formula::Disjunction(fs.iter().map(|f| standardize(f, taken, claimed)).collect())
        }
        Formula::Negation(f) => Formula::not(standardize(f, taken, claimed)),
        Formula::Implication(h, b) => {
            let h = standardize(h, taken, claimed);
            Formula::implies(h, standardize(b, taken, claimed))
        }
        Formula::Exists(v, body) => {
            let (var, body) = if claimed.contains(v) {
                let fresh = fresh_variable(v, taken);
                taken.insert(fresh.clone());
                let renamed = body.rename_variable(v, &fresh);
                (fresh, renamed)
            } else {
                (v.clone(), body.as_ref().clone())
            };
            claimed.insert(var.clone());
            Formula::exists(var, standardize(&body, taken, claimed))
        }
    }
}

/// Drop existential quantifiers, turning their variables free. Binders under a
/// negation are kept. The formula is standardized apart first so distinct
/// binders never merge.
pub fn make_existentials_implicit(formula: &Formula) -> Formula {
    strip_existentials(&standardize_apart(formula))
}

/// As [`make_existentials_implicit`]; the released variables never collide
/// with `avoid`.
pub fn make_existentials_implicit_avoiding(
    formula: &Formula,
    avoid: &BTreeSet<Variable>,
) -> Formula {
    strip_existentials(&standardize_apart_avoiding(formula, avoid))
}

fn strip_existentials(formula: &Formula) -> Formula {
    match formula {
        Formula::Exists(_, body) => strip_existentials(body),
        Formula::Conjunction(fs) => {
            Formula::Conjunction(fs.iter().map(strip_existentials).collect())
        }
        Formula::Disjunction(fs) => {
            Formula::Disjunction(fs.iter().map(strip_existentials).collect())
        }
        _ => formula.clone(),
    }
}

/// Existentially close every free variable of `formula` not in `keep`.
pub fn add_existentials_except(formula: &Formula, keep: &BTreeSet<Variable>) -> Formula {
    let to_bind: Vec<Variable> = formula
        .free_variables()
        .into_iter()
        .filter(|v| !keep.contains(v))
        .collect();
    Formula::exists_all(to_bind, formula.clone())
}

/// Rewrite `head ← body` into a UCQ whose free variables are exactly the head
/// variables occurring in the body. Nested implications become `h ∨ ¬b`.
pub fn convert_rule_to_ucq(formula: &Formula) -> Formula {
    match formula {
        Formula::Implication(head, body) => {
            let head_vars = head.free_variables();
            add_existentials_except(&eliminate_implications(body), &head_vars)
        }
        other => eliminate_implications(other),
    }
}

fn eliminate_implications(formula: &Formula) -> Formula {
    match formula {
        Formula::Implication(h, b) => Formula::or([
            eliminate_implications(h),
            Formula::not(eliminate_implications(b)),
        ]),
        Formula::True | Formula::False | Formula::Atom(_) | Formula::Equality(..) => {
            formula.clone()
        }
        Formula::Conjunction(fs) => {
            Formula::Conjunction(fs.iter().map(eliminate_implications).collect())
        }
        Formula::Disjunction(fs) => {
            Formula::Disjunction(fs.iter().map(eliminate_implications).collect())
        }
        Formula::Negation(f) => Formula::not(eliminate_implications(f)),
        Formula::Exists(v, f) => Formula::exists(v.clone(), eliminate_implications(f)),
    }
}

/// Remove syntactically repeated operands of conjunctions and disjunctions,
/// keeping the first occurrence.
pub fn remove_duplicate_conjuncts(formula: &Formula) -> Formula {
    fn dedup(fs: &[Formula]) -> Vec<Formula> {
        let mut out: Vec<Formula> = Vec::with_capacity(fs.len());
        for f in fs.iter().map(remove_duplicate_conjuncts) {
            if !out.contains(&f) {
                out.push(f);
            }
        }
        out
    }
    match formula {
        Formula::Conjunction(fs) => Formula::Conjunction(dedup(fs)),
        Formula::Disjunction(fs) => Formula::Disjunction(dedup(fs)),
        Formula::Negation(f) => Formula::not(remove_duplicate_conjuncts(f)),
        Formula::Exists(v, f) => Formula::exists(v.clone(), remove_duplicate_conjuncts(f)),
        Formula::Implication(h, b) => {
            Formula::implies(remove_duplicate_conjuncts(h), remove_duplicate_conjuncts(b))
        }
        _ => formula.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(p: &str, vars: &[&str]) -> Formula {
        Formula::atom(p, vars.iter().map(|v| Term::var(*v)))
    }

    fn v(name: &str) -> Variable {
        Variable::new(name)
    }

    #[test]
    fn trivial_operations_collapse() {
        let f = Formula::and([
            Formula::True,
            Formula::and([atom("R", &["x"]), Formula::not(Formula::not(atom("S", &["x"])))]),
            Formula::exists(v("z"), atom("T", &["x"])),
            Formula::or([Formula::False, Formula::equals(Term::var("x"), Term::var("x"))]),
        ]);
        assert_eq!(
            remove_trivial_operations(&f),
            Formula::and([atom("R", &["x"]), atom("S", &["x"]), atom("T", &["x"])])
        );
    }

    #[test]
    fn false_conjunct_annihilates() {
        let f = Formula::and([
            atom("R", &["x"]),
            Formula::equals(Term::str("a"), Term::str("b")),
        ]);
        assert_eq!(remove_trivial_operations(&f), Formula::False);
    }

    #[test]
    fn implicit_existentials_keep_distinct_binders_apart() {
        // ∃y.R(x, y) ∧ ∃y.S(y): the two `y` are different variables.
        let f = Formula::and([
            Formula::exists(v("y"), atom("R", &["x", "y"])),
            Formula::exists(v("y"), atom("S", &["y"])),
        ]);
        let matrix = make_existentials_implicit(&f);
        assert_eq!(matrix, Formula::and([atom("R", &["x", "y"]), atom("S", &["y_1"])]));
    }

    #[test]
    fn negated_existentials_stay_bound() {
        let f = Formula::and([
            atom("R", &["x"]),
            Formula::not(Formula::exists(v("y"), atom("S", &["x", "y"]))),
        ]);
        assert_eq!(make_existentials_implicit(&f), f);
    }

    #[test]
    fn rule_becomes_closed_body() {
        let rule = Formula::implies(
            atom("ans", &["x"]),
            Formula::and([atom("R", &["x", "y"]), atom("S", &["y", "z"])]),
        );
        let ucq = convert_rule_to_ucq(&rule);
        assert_eq!(ucq.free_variables(), BTreeSet::from([v("x")]));
        assert_eq!(
            ucq,
            Formula::exists_all(
                [v("y"), v("z")],
                Formula::and([atom("R", &["x", "y"]), atom("S", &["y", "z"])])
            )
        );
    }

    #[test]
    fn duplicates_are_removed_in_order() {
        let f = Formula::and([atom("R", &["x"]), atom("S", &["x"]), atom("R", &["x"])]);
        assert_eq!(
            remove_duplicate_conjuncts(&f),
            Formula::and([atom("R", &["x"]), atom("S", &["x"])])
        );
    }
}
