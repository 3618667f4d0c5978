//! Top-level entry points: success probability (`solve_succ`) and marginal
//! (conditional) probability (`solve_marg`) queries.

use crate::containment::ContainmentOracle;
use crate::engine::LiftingEngine;
use crate::error::LiftError;
use crate::normalize::{head_variables, normalize, NormalizedQuery};
use crate::plan::Plan;
use liftql_logic::{Atom, Formula, SymbolTable, Term};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// `P(conditioned | conditioning)` for every answer tuple of `head`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginalQuery {
    pub head: Atom,
    pub conditioned: Formula,
    pub conditioning: Formula,
}

impl MarginalQuery {
    /// `head ← conditioned ∧ conditioning`.
    pub fn joint_rule(&self) -> Formula {
        Formula::implies(
            Formula::Atom(self.head.clone()),
            Formula::and([self.conditioned.clone(), self.conditioning.clone()]),
        )
    }

    /// The conditioning query over the head variables it mentions.
    pub fn evidence_rule(&self) -> Formula {
        let free = self.conditioning.free_variables();
        let args = head_variables(&self.head)
            .into_iter()
            .filter(|v| free.contains(v))
            .map(Term::Variable);
        Formula::implies(
            Formula::atom(format!("{}_evidence", self.head.predicate), args),
            self.conditioning.clone(),
        )
    }
}

/// Every body predicate must be declared.
pub(crate) fn check_declared(query: &Formula, symbols: &SymbolTable) -> Result<(), LiftError> {
    let (_, body) = query.as_implication()?;
    let predicates: BTreeSet<&str> = body.predicates();
    match predicates.into_iter().find(|p| !symbols.contains(p)) {
        Some(predicate) => Err(LiftError::UnknownPredicate {
            predicate: predicate.to_string(),
        }),
        None => Ok(()),
    }
}

impl<O: ContainmentOracle> LiftingEngine<O> {
    /// Normalise, lift and validate a rule `ans(x…) ← body`.
    ///
    /// Fails with `QueryNotLiftable` if any part of the plan is
    /// `NonLiftable`. Relations introduced by shattering never appear in the
    /// returned plan.
    pub fn solve_succ(&self, query: &Formula, symbols: &SymbolTable) -> Result<Plan, LiftError> {
        check_declared(query, symbols)?;
        let ucq = match normalize(query, symbols, self.config())? {
            NormalizedQuery::Empty { head } => {
                return Ok(Plan::Empty {
                    attributes: head_variables(&head),
                })
            }
            NormalizedQuery::Ucq(ucq) => ucq,
        };

        let plan = self.lift(&ucq.body, &ucq.symbols);
        if !plan.is_pure_lifted() {
            let offending: Vec<String> = plan
                .non_liftable_formulas()
                .into_iter()
                .map(|f| ucq.restore(&Plan::translate(f.clone())).to_string())
                .collect();
            tracing::info!(query = %query, offending = offending.len(), "query not liftable");
            return Err(LiftError::QueryNotLiftable {
                query: query.to_string(),
                offending,
            });
        }
        Ok(ucq.restore(&plan))
    }

    /// Plans for the joint and the conditioning query, combined as a ratio.
    pub fn solve_marg(
        &self,
        query: &MarginalQuery,
        symbols: &SymbolTable,
    ) -> Result<Plan, LiftError> {
        let joint = self.solve_succ(&query.joint_rule(), symbols)?;
        let evidence = self.solve_succ(&query.evidence_rule(), symbols)?;
        Ok(Plan::conditional_probability(joint, evidence))
    }
}

pub fn solve_succ(query: &Formula, symbols: &SymbolTable) -> Result<Plan, LiftError> {
    LiftingEngine::new().solve_succ(query, symbols)
}

pub fn solve_marg(query: &MarginalQuery, symbols: &SymbolTable) -> Result<Plan, LiftError> {
    LiftingEngine::new().solve_marg(query, symbols)
}
