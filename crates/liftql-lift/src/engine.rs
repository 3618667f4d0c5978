//! The recursive lifting procedure.
//!
//! `lift` tries the following rules strictly in order and returns the plan of
//! the first that applies:
//!
//! 1. a single atom translates to a base relation;
//! 2. a query over deterministic relations only is translated as is and
//!    projected on its free variables;
//! 3. a CNF with several symbol-connected components becomes a natural join
//!    of the lifted components;
//! 4. a CNF with several clauses goes through inclusion–exclusion;
//! 5. a DNF with several symbol-connected components becomes a union of the
//!    lifted components;
//! 6. a separator variable yields an independent projection;
//! 7. the disjoint-projection rule for probabilistic-choice atoms;
//!
//! and otherwise returns `Plan::NonLiftable` for the formula. Every rule
//! preserves the free variables of its input as the plan's attributes; a
//! plan that would not is replaced by `Plan::NonLiftable`.

use crate::config::LiftConfig;
use crate::containment::{ContainmentOracle, HomomorphismContainment};
use crate::disjoint_project::disjoint_project;
use crate::graph::symbol_connected_components;
use crate::inclusion_exclusion::inclusion_exclusion_plan;
use crate::normal_forms::{minimize_ucq_in_cnf, minimize_ucq_in_dnf};
use crate::plan::Plan;
use crate::separator::separator_variable_plan;
use crate::transforms::{
    convert_rule_to_ucq, make_existentials_implicit, remove_trivial_operations,
};
use liftql_logic::{Formula, SymbolTable};

/// Recursion state of one top-level `lift` call.
#[derive(Debug, Default)]
pub(crate) struct LiftContext {
    depth: usize,
    in_progress: Vec<Formula>,
}

#[derive(Debug, Clone, Default)]
pub struct LiftingEngine<O = HomomorphismContainment> {
    config: LiftConfig,
    oracle: O,
}

impl LiftingEngine<HomomorphismContainment> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LiftConfig) -> Self {
        Self {
            config,
            oracle: HomomorphismContainment,
        }
    }
}

impl<O: ContainmentOracle> LiftingEngine<O> {
    pub fn with_oracle(config: LiftConfig, oracle: O) -> Self {
        Self { config, oracle }
    }

    pub fn config(&self) -> &LiftConfig {
        &self.config
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Compile `formula` into a plan. Sub-formulas no rule can handle appear
    /// as `Plan::NonLiftable` nodes; see [`crate::is_pure_lifted_plan`].
    ///
    /// Predicates missing from `symbols` are treated as probabilistic.
    pub fn lift(&self, formula: &Formula, symbols: &SymbolTable) -> Plan {
        self.lift_in(formula, symbols, &mut LiftContext::default())
    }

    pub(crate) fn lift_in(
        &self,
        formula: &Formula,
        symbols: &SymbolTable,
        ctx: &mut LiftContext,
    ) -> Plan {
        let formula = match formula {
            Formula::Implication(..) => convert_rule_to_ucq(formula),
            other => other.clone(),
        };
        let formula = remove_trivial_operations(&formula);

        if ctx.depth >= self.config.max_recursion_depth {
            tracing::warn!(
                depth = ctx.depth,
                limit = self.config.max_recursion_depth,
                formula = %formula,
                "lifting recursion limit exceeded"
            );
            return Plan::non_liftable(formula);
        }
        if ctx.in_progress.contains(&formula) {
            tracing::debug!(formula = %formula, "formula re-entered while being lifted");
            return Plan::non_liftable(formula);
        }

        ctx.depth += 1;
        ctx.in_progress.push(formula.clone());
        let plan = self.dispatch(&formula, symbols, ctx);
        ctx.in_progress.pop();
        ctx.depth -= 1;

        let free = formula.free_variables();
        if plan.is_pure_lifted() && plan.attributes() != free {
            tracing::warn!(
                formula = %formula,
                plan = %plan,
                "lifted plan does not produce the free variables"
            );
            return Plan::non_liftable(formula);
        }
        plan
    }

    fn dispatch(&self, formula: &Formula, symbols: &SymbolTable, ctx: &mut LiftContext) -> Plan {
        if let Formula::Atom(_) = formula {
            tracing::debug!(rule = "translate", formula = %formula);
            return Plan::translate(formula.clone());
        }

        if formula.atoms().into_iter().all(|a| symbols.is_deterministic(a)) {
            tracing::debug!(rule = "deterministic", formula = %formula);
            let free = formula.free_variables();
            let matrix = make_existentials_implicit(formula);
            return Plan::projection(Plan::translate(matrix), free);
        }

        let cnf = minimize_ucq_in_cnf(formula, &self.oracle);
        if let [atom @ Formula::Atom(_)] = cnf.conjuncts() {
            tracing::debug!(rule = "translate", formula = %formula, minimized = %atom);
            return Plan::translate(atom.clone());
        }
        let components = symbol_connected_components(&cnf);
        if components.len() > 1 {
            tracing::debug!(
                rule = "natural_join",
                components = components.len(),
                formula = %formula
            );
            return self.components_plan(&components, symbols, ctx, Plan::natural_join);
        }
        if cnf.conjuncts().len() > 1 {
            tracing::debug!(
                rule = "inclusion_exclusion",
                clauses = cnf.conjuncts().len(),
                formula = %formula
            );
            return inclusion_exclusion_plan(self, &cnf, symbols, ctx);
        }

        let dnf = minimize_ucq_in_dnf(formula, &self.oracle);
        let components = symbol_connected_components(&dnf);
        if components.len() > 1 {
            tracing::debug!(rule = "union", components = components.len(), formula = %formula);
            return self.components_plan(&components, symbols, ctx, Plan::union);
        }

        if let Some(plan) = separator_variable_plan(self, &dnf, symbols, ctx) {
            return plan;
        }
        if let Some(plan) = disjoint_project(self, &dnf, symbols, ctx) {
            return plan;
        }

        tracing::info!(formula = %formula, "no lifting rule applies");
        Plan::non_liftable(formula.clone())
    }

    fn components_plan(
        &self,
        components: &[Formula],
        symbols: &SymbolTable,
        ctx: &mut LiftContext,
        combine: fn(Plan, Plan) -> Plan,
    ) -> Plan {
        let mut plans = components.iter().map(|c| self.lift_in(c, symbols, ctx));
        let first = plans.next();
        let rest: Vec<Plan> = plans.collect();
        match first {
            Some(first) => rest.into_iter().fold(first, combine),
            None => Plan::translate(Formula::True),
        }
    }
}

/// Lift with the default engine.
pub fn lift(formula: &Formula, symbols: &SymbolTable) -> Plan {
    LiftingEngine::new().lift(formula, symbols)
}
