//! Relational-algebra plans produced by the lifting engine.
//!
//! A plan is a tree built bottom-up and never mutated afterwards. Every node
//! has a well-defined attribute set (see [`Plan::attributes`]); the engine
//! guarantees that the attributes of a plan equal the free variables of the
//! formula it was compiled from.
//!
//! Operator semantics as expected from the executor (probabilities per tuple):
//!
//! - `NaturalJoin`: independent conjunction, `p·q`.
//! - `Union`: independent disjunction, `1 − (1 − p)(1 − q)`.
//! - `WeightedNaturalJoin`: `Σ wᵢ·pᵢ` over the joined inputs.
//! - `IndependentProjection`: `1 − Π(1 − pᵢ)` over each projected group.
//! - `DisjointProjection`: `Σ pᵢ` over each projected group.
//! - `ConditionalProbability`: `joint / evidence`, matched on shared attributes.
//!
//! `NonLiftable` is a sentinel leaf; a plan that contains one anywhere is not
//! executable.

use liftql_logic::{Formula, Variable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Plan {
    /// Direct translation of a formula whose probability needs no further
    /// decomposition (a base relation, or a deterministic query).
    Translate { formula: Formula },
    Projection {
        input: Box<Plan>,
        attributes: Vec<Variable>,
    },
    NaturalJoin { left: Box<Plan>, right: Box<Plan> },
    Union { left: Box<Plan>, right: Box<Plan> },
    WeightedNaturalJoin { inputs: Vec<Plan>, weights: Vec<i64> },
    DisjointProjection {
        input: Box<Plan>,
        attributes: Vec<Variable>,
    },
    IndependentProjection {
        input: Box<Plan>,
        attributes: Vec<Variable>,
    },
    ConditionalProbability {
        joint: Box<Plan>,
        evidence: Box<Plan>,
    },
    /// The query is unsatisfiable; an empty relation over `attributes`.
    Empty { attributes: Vec<Variable> },
    NonLiftable { formula: Formula },
}

impl Plan {
    pub fn translate(formula: Formula) -> Self {
        Plan::Translate { formula }
    }

    pub fn projection(input: Plan, attributes: impl IntoIterator<Item = Variable>) -> Self {
        Plan::Projection {
            input: Box::new(input),
            attributes: attributes.into_iter().collect(),
        }
    }

    pub fn natural_join(left: Plan, right: Plan) -> Self {
        Plan::NaturalJoin {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn union(left: Plan, right: Plan) -> Self {
        Plan::Union {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn weighted_natural_join(terms: impl IntoIterator<Item = (Plan, i64)>) -> Self {
        let (inputs, weights) = terms.into_iter().unzip();
        Plan::WeightedNaturalJoin { inputs, weights }
    }

    pub fn disjoint_projection(
        input: Plan,
        attributes: impl IntoIterator<Item = Variable>,
    ) -> Self {
        Plan::DisjointProjection {
            input: Box::new(input),
            attributes: attributes.into_iter().collect(),
        }
    }

    pub fn independent_projection(
        input: Plan,
        attributes: impl IntoIterator<Item = Variable>,
    ) -> Self {
        Plan::IndependentProjection {
            input: Box::new(input),
            attributes: attributes.into_iter().collect(),
        }
    }

    pub fn conditional_probability(joint: Plan, evidence: Plan) -> Self {
        Plan::ConditionalProbability {
            joint: Box::new(joint),
            evidence: Box::new(evidence),
        }
    }

    pub fn non_liftable(formula: Formula) -> Self {
        Plan::NonLiftable { formula }
    }

    pub fn is_non_liftable(&self) -> bool {
        matches!(self, Plan::NonLiftable { .. })
    }

    pub fn children(&self) -> Vec<&Plan> {
        match self {
            Plan::Translate { .. } | Plan::Empty { .. } | Plan::NonLiftable { .. } => Vec::new(),
            Plan::Projection { input, .. }
            | Plan::DisjointProjection { input, .. }
            | Plan::IndependentProjection { input, .. } => vec![&**input],
            Plan::NaturalJoin { left, right } | Plan::Union { left, right } => {
                vec![&**left, &**right]
            }
            Plan::WeightedNaturalJoin { inputs, .. } => inputs.iter().collect(),
            Plan::ConditionalProbability { joint, evidence } => vec![&**joint, &**evidence],
        }
    }

    /// Output attributes of this node.
    pub fn attributes(&self) -> BTreeSet<Variable> {
        match self {
            Plan::Translate { formula } | Plan::NonLiftable { formula } => {
                formula.free_variables()
            }
            Plan::Projection { attributes, .. }
            | Plan::DisjointProjection { attributes, .. }
            | Plan::IndependentProjection { attributes, .. }
            | Plan::Empty { attributes } => attributes.iter().cloned().collect(),
            Plan::NaturalJoin { left, right } | Plan::Union { left, right } => {
                let mut out = left.attributes();
                out.extend(right.attributes());
                out
            }
            Plan::WeightedNaturalJoin { inputs, .. } => {
                inputs.iter().flat_map(Plan::attributes).collect()
            }
            Plan::ConditionalProbability { joint, .. } => joint.attributes(),
        }
    }

    /// `true` iff no `NonLiftable` node occurs anywhere in the tree.
    pub fn is_pure_lifted(&self) -> bool {
        match self {
            Plan::NonLiftable { .. } => false,
            _ => self.children().into_iter().all(Plan::is_pure_lifted),
        }
    }

    /// Formulas wrapped by `NonLiftable` nodes, in pre-order.
    pub fn non_liftable_formulas(&self) -> Vec<&Formula> {
        let mut out = Vec::new();
        self.collect_non_liftable(&mut out);
        out
    }

    fn collect_non_liftable<'a>(&'a self, out: &mut Vec<&'a Formula>) {
        match self {
            Plan::NonLiftable { formula } => out.push(formula),
            _ => self
                .children()
                .into_iter()
                .for_each(|child| child.collect_non_liftable(out)),
        }
    }

    /// Rebuild the plan with every embedded formula rewritten by `f`.
    pub fn map_formulas(&self, f: &mut impl FnMut(&Formula) -> Formula) -> Plan {
        match self {
            Plan::Translate { formula } => Plan::translate(f(formula)),
            Plan::NonLiftable { formula } => Plan::non_liftable(f(formula)),
            Plan::Empty { .. } => self.clone(),
            Plan::Projection { input, attributes } => {
                Plan::projection(input.map_formulas(f), attributes.iter().cloned())
            }
            Plan::DisjointProjection { input, attributes } => {
                Plan::disjoint_projection(input.map_formulas(f), attributes.iter().cloned())
            }
            Plan::IndependentProjection { input, attributes } => {
                Plan::independent_projection(input.map_formulas(f), attributes.iter().cloned())
            }
            Plan::NaturalJoin { left, right } => {
                Plan::natural_join(left.map_formulas(f), right.map_formulas(f))
            }
            Plan::Union { left, right } => Plan::union(left.map_formulas(f), right.map_formulas(f)),
            Plan::WeightedNaturalJoin { inputs, weights } => Plan::WeightedNaturalJoin {
                inputs: inputs.iter().map(|p| p.map_formulas(f)).collect(),
                weights: weights.clone(),
            },
            Plan::ConditionalProbability { joint, evidence } => {
                Plan::conditional_probability(joint.map_formulas(f), evidence.map_formulas(f))
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// `true` iff `plan` contains no `NonLiftable` node.
pub fn is_pure_lifted_plan(plan: &Plan) -> bool {
    plan.is_pure_lifted()
}

fn write_attributes(f: &mut fmt::Formatter<'_>, attributes: &[Variable]) -> fmt::Result {
    f.write_str("[")?;
    for (i, a) in attributes.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{a}")?;
    }
    f.write_str("]")
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plan::Translate { formula } => write!(f, "{formula}"),
            Plan::NonLiftable { formula } => write!(f, "NonLiftable({formula})"),
            Plan::Empty { attributes } => {
                f.write_str("∅")?;
                write_attributes(f, attributes)
            }
            Plan::Projection { input, attributes } => {
                f.write_str("π")?;
                write_attributes(f, attributes)?;
                write!(f, "({input})")
            }
            Plan::DisjointProjection { input, attributes } => {
                f.write_str("πᴰ")?;
                write_attributes(f, attributes)?;
                write!(f, "({input})")
            }
            Plan::IndependentProjection { input, attributes } => {
                f.write_str("πᴵ")?;
                write_attributes(f, attributes)?;
                write!(f, "({input})")
            }
            Plan::NaturalJoin { left, right } => write!(f, "({left} ⋈ {right})"),
            Plan::Union { left, right } => write!(f, "({left} ∪ {right})"),
            Plan::WeightedNaturalJoin { inputs, weights } => {
                f.write_str("Σ(")?;
                for (i, (input, w)) in inputs.iter().zip(weights).enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{w:+}·{input}")?;
                }
                f.write_str(")")
            }
            Plan::ConditionalProbability { joint, evidence } => {
                write!(f, "({joint} | {evidence})")
            }
        }
    }
}
