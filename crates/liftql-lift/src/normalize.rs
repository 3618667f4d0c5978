//! Query normalisation: from a rule `ans(x…) ← body` to the UCQ handed to
//! the lifting engine.
//!
//! Steps, in order:
//!
//! 1. rewrite the rule into a body whose only free variables are the head
//!    variables;
//! 2. remove trivially true / false structure;
//! 3. unify equalities on existential variables (`∃y.(y = t ∧ φ) → φ[t/y]`);
//! 4. shatter tuple-independent atoms with constants (when enabled; a query
//!    that is not easily shatterable is kept as is);
//! 5. drop repeated conjuncts.
//!
//! A body that simplifies to `⊥` yields [`NormalizedQuery::Empty`].

use crate::config::LiftConfig;
use crate::error::LiftError;
use crate::plan::Plan;
use crate::shattering::{shatter, ShatteredRelation};
use crate::transforms::{convert_rule_to_ucq, remove_duplicate_conjuncts, remove_trivial_operations};
use liftql_logic::{Atom, Formula, Name, SymbolTable, Term, Variable};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUcq {
    pub head: Atom,
    pub body: Formula,
    /// The caller's table, extended with shattered relations.
    pub symbols: SymbolTable,
    pub shattered: BTreeMap<Name, ShatteredRelation>,
}

impl NormalizedUcq {
    pub fn head_variables(&self) -> Vec<Variable> {
        head_variables(&self.head)
    }

    /// Map shattered relations in `plan` back to the declared ones.
    pub fn restore(&self, plan: &Plan) -> Plan {
        if self.shattered.is_empty() {
            return plan.clone();
        }
        plan.map_formulas(&mut |formula| {
            formula.map_atoms(&mut |atom| match self.shattered.get(&atom.predicate) {
                Some(relation) => Formula::Atom(relation.restore(atom)),
                None => Formula::Atom(atom.clone()),
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedQuery {
    /// The body is unsatisfiable.
    Empty { head: Atom },
    Ucq(NormalizedUcq),
}

/// Distinct head variables in argument order. Constants in the head are not
/// attributes.
pub fn head_variables(head: &Atom) -> Vec<Variable> {
    let mut out: Vec<Variable> = Vec::with_capacity(head.arity());
    for v in head.variables() {
        if !out.contains(v) {
            out.push(v.clone());
        }
    }
    out
}

pub fn normalize(
    query: &Formula,
    symbols: &SymbolTable,
    config: &LiftConfig,
) -> Result<NormalizedQuery, LiftError> {
    let (head, _) = query.as_implication()?;
    let head = head.clone();

    let body = remove_trivial_operations(&convert_rule_to_ucq(query));
    let body_free = body.free_variables();
    if let Some(missing) = head.variables().find(|v| !body_free.contains(*v)) {
        if body != Formula::False {
            return Err(LiftError::MalformedQuery(format!(
                "head variable `{missing}` does not occur in the body of `{query}`"
            )));
        }
    }

    let body = remove_trivial_operations(&unify_equalities(&body));
    if body == Formula::False {
        tracing::debug!(head = %head, "query body is unsatisfiable");
        return Ok(NormalizedQuery::Empty { head });
    }

    let (body, symbols, shattered) = if config.shatter_probabilistic_facts {
        match shatter(&body, symbols) {
            Ok(s) => (s.formula, s.symbols, s.relations),
            Err(err) => {
                tracing::warn!(
                    predicate = %err.predicate,
                    reason = %err.reason,
                    "shattering skipped"
                );
                (body, symbols.clone(), BTreeMap::new())
            }
        }
    } else {
        (body, symbols.clone(), BTreeMap::new())
    };

    Ok(NormalizedQuery::Ucq(NormalizedUcq {
        head,
        body: remove_duplicate_conjuncts(&body),
        symbols,
        shattered,
    }))
}

/// Eliminate existential variables bound by an equality in their scope.
/// Equalities between free variables, or between a free variable and a
/// constant, are kept.
pub fn unify_equalities(formula: &Formula) -> Formula {
    match formula {
        Formula::Exists(v, body) => {
            let body = remove_trivial_operations(&unify_equalities(body));
            eliminate_bound_equality(v, body)
        }
        Formula::Conjunction(fs) => Formula::Conjunction(fs.iter().map(unify_equalities).collect()),
        Formula::Disjunction(fs) => Formula::Disjunction(fs.iter().map(unify_equalities).collect()),
        Formula::Negation(f) => Formula::not(unify_equalities(f)),
        Formula::Implication(h, b) => Formula::implies(unify_equalities(h), unify_equalities(b)),
        Formula::True | Formula::False | Formula::Atom(_) | Formula::Equality(..) => {
            formula.clone()
        }
    }
}

fn binding_for<'a>(var: &Variable, literal: &'a Formula) -> Option<&'a Term> {
    let Formula::Equality(l, r) = literal else {
        return None;
    };
    match (l, r) {
        (Term::Variable(a), other) | (other, Term::Variable(a)) if a == var => {
            (other.as_variable() != Some(var)).then_some(other)
        }
        _ => None,
    }
}

fn eliminate_bound_equality(var: &Variable, body: Formula) -> Formula {
    if let Formula::Disjunction(fs) = &body {
        // ∃ distributes over ∨.
        return Formula::Disjunction(
            fs.iter()
                .map(|d| {
                    if d.free_variables().contains(var) {
                        eliminate_bound_equality(var, d.clone())
                    } else {
                        d.clone()
                    }
                })
                .collect(),
        );
    }

    let conjuncts = body.conjuncts();
    let found = conjuncts
        .iter()
        .enumerate()
        .find_map(|(i, c)| binding_for(var, c).map(|t| (i, t.clone())));
    match found {
        Some((index, term)) => {
            let rest: Vec<Formula> = conjuncts
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != index)
                .map(|(_, c)| c.clone())
                .collect();
            let substituted = Formula::and(rest).substitute(&BTreeMap::from([(var.clone(), term)]));
            remove_trivial_operations(&substituted)
        }
        None => Formula::exists(var.clone(), body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liftql_logic::RelationKind;

    fn v(name: &str) -> Variable {
        Variable::new(name)
    }

    fn symbols() -> SymbolTable {
        [
            ("R", RelationKind::ProbabilisticFact { probability_column: 2 }),
            ("S", RelationKind::ProbabilisticFact { probability_column: 1 }),
        ]
        .into_iter()
        .collect()
    }

    fn rule(head: &[&str], body: Formula) -> Formula {
        Formula::implies(Formula::atom("ans", head.iter().map(|v| Term::var(*v))), body)
    }

    #[test]
    fn equalities_on_existentials_are_substituted() {
        // ans(x) ← R(x, y) ∧ y = z ∧ S(z)
        let query = rule(
            &["x"],
            Formula::and([
                Formula::atom("R", [Term::var("x"), Term::var("y")]),
                Formula::equals(Term::var("y"), Term::var("z")),
                Formula::atom("S", [Term::var("z")]),
            ]),
        );
        let NormalizedQuery::Ucq(ucq) = normalize(&query, &symbols(), &LiftConfig::default())
            .expect("normalizes")
        else {
            panic!("expected a UCQ");
        };
        assert!(ucq.body.to_string().contains('S'));
        assert!(!ucq.body.to_string().contains('='));
        assert_eq!(ucq.body.free_variables(), [v("x")].into());
    }

    #[test]
    fn equalities_with_head_variables_are_kept() {
        let f = Formula::and([
            Formula::atom("R", [Term::var("x"), Term::var("x")]),
            Formula::equals(Term::var("x"), Term::str("a")),
        ]);
        assert_eq!(unify_equalities(&f), f);
    }

    #[test]
    fn contradictory_constants_give_an_empty_query() {
        // ans(x) ← R(x, y) ∧ y = 'a' ∧ y = 'b'
        let query = rule(
            &["x"],
            Formula::and([
                Formula::atom("R", [Term::var("x"), Term::var("y")]),
                Formula::equals(Term::var("y"), Term::str("a")),
                Formula::equals(Term::var("y"), Term::str("b")),
            ]),
        );
        let normalized = normalize(&query, &symbols(), &LiftConfig::default()).expect("normalizes");
        assert!(matches!(normalized, NormalizedQuery::Empty { .. }));
    }

    #[test]
    fn unsafe_heads_are_rejected() {
        let query = rule(&["x"], Formula::atom("R", [Term::var("y"), Term::var("y")]));
        let err = normalize(&query, &symbols(), &LiftConfig::default()).expect_err("unsafe head");
        assert!(matches!(err, LiftError::MalformedQuery(_)));
    }

    #[test]
    fn not_a_rule_is_malformed() {
        let err = normalize(&Formula::atom("R", []), &symbols(), &LiftConfig::default())
            .expect_err("not a rule");
        assert!(matches!(err, LiftError::MalformedQuery(_)));
    }

    #[test]
    fn shattering_can_be_disabled() {
        let query = rule(&["x"], Formula::atom("R", [Term::var("x"), Term::str("a")]));
        let config = LiftConfig {
            shatter_probabilistic_facts: false,
            ..LiftConfig::default()
        };
        let NormalizedQuery::Ucq(ucq) = normalize(&query, &symbols(), &config).expect("normalizes")
        else {
            panic!("expected a UCQ");
        };
        assert!(ucq.shattered.is_empty());
        assert_eq!(ucq.body, Formula::atom("R", [Term::var("x"), Term::str("a")]));
    }

    #[test]
    fn shattered_plans_are_restored() {
        let query = rule(&["x"], Formula::atom("R", [Term::var("x"), Term::str("a")]));
        let NormalizedQuery::Ucq(ucq) =
            normalize(&query, &symbols(), &LiftConfig::default()).expect("normalizes")
        else {
            panic!("expected a UCQ");
        };
        assert_eq!(ucq.body, Formula::atom("R_1", [Term::var("x")]));
        let restored = ucq.restore(&Plan::translate(ucq.body.clone()));
        assert_eq!(
            restored,
            Plan::translate(Formula::atom("R", [Term::var("x"), Term::str("a")]))
        );
    }
}
