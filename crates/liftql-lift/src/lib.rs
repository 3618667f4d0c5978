//! liftql lifting engine
//!
//! Compiles probabilistic unions of conjunctive queries over
//! tuple-independent, probabilistic-choice and deterministic relations into
//! safe relational-algebra plans, following the Dalvi–Suciu dichotomy: a
//! query either has a plan computable in time polynomial in the data, or the
//! engine reports it as not liftable.
//!
//! ## Pipeline
//!
//! ```text
//! rule ──► normalize ──► lift ──► Plan ──► (external executor)
//!             │            │
//!             │            ├─ normal forms (CNF / DNF over connected CQs)
//!             │            ├─ symbol-connected components → ⋈ / ∪
//!             │            ├─ inclusion–exclusion (Möbius weights)
//!             │            ├─ separator variables → independent projection
//!             │            └─ probabilistic choices → disjoint projection
//!             └─ equality unification, shattering
//! ```
//!
//! Entry points: [`solve_succ`], [`solve_marg`], the hierarchical fast path
//! [`solve_succ_hierarchical`] / [`solve_succ_with_fast_path`], and the raw
//! [`lift`]. A configured [`LiftingEngine`] exposes the same operations.
//!
//! ## Known incompleteness
//!
//! A disjunction of a probabilistic-choice query with a query sharing one of
//! its fact relations, such as `(∃x.C(x) ∧ R(x)) ∨ ∃y.(R(y) ∧ T(y))` with `C`
//! a choice relation, is reported as not liftable: the disjunctive
//! disjoint-projection rule and inclusion–exclusion hand it back and forth
//! until the cycle guard stops them.

pub mod config;
pub mod containment;
pub mod disjoint_project;
pub mod engine;
pub mod error;
pub mod graph;
pub mod hierarchical;
pub mod inclusion_exclusion;
pub mod normal_forms;
pub mod normalize;
pub mod plan;
pub mod separator;
pub mod shattering;
pub mod solve;
pub mod transforms;

pub use config::LiftConfig;
pub use containment::{ContainmentOracle, HomomorphismContainment};
pub use engine::{lift, LiftingEngine};
pub use error::{LiftError, NotEasilyShatterable};
pub use graph::{
    connected_components, symbol_co_occurrence_graph, symbol_connected_components,
    variable_co_occurrence_graph, AdjacencyMatrix,
};
pub use hierarchical::{
    is_hierarchical_without_self_joins, solve_succ_hierarchical, solve_succ_with_fast_path,
    FastPathOutcome,
};
pub use inclusion_exclusion::inclusion_exclusion_terms;
pub use normal_forms::{minimize_ucq_in_cnf, minimize_ucq_in_dnf};
pub use normalize::{normalize, NormalizedQuery, NormalizedUcq};
pub use plan::{is_pure_lifted_plan, Plan};
pub use solve::{solve_marg, solve_succ, MarginalQuery};
