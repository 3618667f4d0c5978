//! Integration tests for the complete liftql pipeline
//!
//! These tests drive the public entry points end to end:
//! - rule → normalisation → lifting → validated plan (`solve_succ`)
//! - marginal queries → conditional plans (`solve_marg`)
//! - hierarchical fast path with fallback to the general engine
//! - plan / config / symbol-table JSON interchange
//!
//! Run with: cargo test --test integration_tests

use anyhow::{anyhow, Result};
use liftql_lift::{
    solve_marg, solve_succ, solve_succ_hierarchical, solve_succ_with_fast_path, FastPathOutcome,
    LiftConfig, LiftError, LiftingEngine, MarginalQuery, Plan,
};
use liftql_logic::{Atom, Formula, RelationKind, SymbolTable, Term, Variable};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}

fn atom(p: &str, args: &[Term]) -> Formula {
    Formula::atom(p, args.iter().cloned())
}

fn x() -> Term {
    Term::var("x")
}

fn y() -> Term {
    Term::var("y")
}

fn rule(head: &[Term], body: Formula) -> Formula {
    Formula::implies(atom("ans", head), body)
}

/// A small university schema: students, courses, enrolment.
fn university() -> SymbolTable {
    SymbolTable::new()
        .with_relation("Student", RelationKind::Deterministic)
        .with_relation("Takes", RelationKind::ProbabilisticFact { probability_column: 2 })
        .with_relation("Hard", RelationKind::ProbabilisticFact { probability_column: 1 })
        .with_relation("Grade", RelationKind::ProbabilisticChoice { probability_column: 2 })
}

// ============================================================================
// solve_succ
// ============================================================================

#[test]
fn test_solve_succ_join_then_project() -> Result<()> {
    init_tracing();
    // ans(x) ← Student(x) ∧ Takes(x, y) ∧ Hard(y)
    let query = rule(
        &[x()],
        Formula::and([
            atom("Student", &[x()]),
            atom("Takes", &[x(), y()]),
            atom("Hard", &[y()]),
        ]),
    );
    let plan = solve_succ(&query, &university())?;
    assert!(plan.is_pure_lifted());
    assert_eq!(plan.attributes(), [Variable::new("x")].into());
    Ok(())
}

#[test]
fn test_solve_succ_rejects_h0() -> Result<()> {
    init_tracing();
    let symbols: SymbolTable = ["R", "S", "T"]
        .into_iter()
        .map(|p| (p, RelationKind::ProbabilisticFact { probability_column: 0 }))
        .collect();
    let query = rule(
        &[],
        Formula::and([atom("R", &[x()]), atom("S", &[x(), y()]), atom("T", &[y()])]),
    );
    match solve_succ(&query, &symbols) {
        Err(LiftError::QueryNotLiftable { query: rendered, offending }) => {
            assert!(rendered.contains("ans"));
            assert!(!offending.is_empty());
        }
        other => return Err(anyhow!("expected QueryNotLiftable, got {other:?}")),
    }
    Ok(())
}

#[test]
fn test_solve_succ_unknown_predicate() {
    let query = rule(&[x()], atom("Teaches", &[x()]));
    let err = solve_succ(&query, &university()).unwrap_err();
    assert_eq!(
        err,
        LiftError::UnknownPredicate {
            predicate: "Teaches".to_string()
        }
    );
    assert!(err.to_string().contains("Teaches"));
}

#[test]
fn test_solve_succ_choice_uses_disjoint_projection() -> Result<()> {
    init_tracing();
    // ans(x) ← Grade(x, 'A') ∧ Student(x)
    let query = rule(
        &[x()],
        Formula::and([atom("Grade", &[x(), Term::str("A")]), atom("Student", &[x()])]),
    );
    let plan = solve_succ(&query, &university())?;
    assert!(plan.is_pure_lifted());
    assert_eq!(plan.attributes(), [Variable::new("x")].into());

    // ans() ← Grade(x, g) ∧ Hard(g): the grade is one of several exclusive
    // alternatives per student.
    let query = rule(
        &[],
        Formula::and([
            atom("Grade", &[x(), Term::var("g")]),
            atom("Hard", &[Term::var("g")]),
        ]),
    );
    let plan = solve_succ(&query, &university())?;
    assert!(matches!(plan, Plan::DisjointProjection { .. }), "got {plan}");
    Ok(())
}

#[test]
fn test_solve_succ_restores_shattered_relations() -> Result<()> {
    init_tracing();
    // ans(y) ← Takes('alice', y) ∧ Hard(y)
    let query = rule(
        &[y()],
        Formula::and([atom("Takes", &[Term::str("alice"), y()]), atom("Hard", &[y()])]),
    );
    let plan = solve_succ(&query, &university())?;
    assert_eq!(
        plan,
        Plan::natural_join(
            Plan::translate(atom("Takes", &[Term::str("alice"), y()])),
            Plan::translate(atom("Hard", &[y()])),
        )
    );

    // Same query without shattering keeps the original atoms throughout.
    let engine = LiftingEngine::with_config(LiftConfig {
        shatter_probabilistic_facts: false,
        ..LiftConfig::default()
    });
    assert_eq!(engine.solve_succ(&query, &university())?, plan);
    Ok(())
}

#[test]
fn test_solve_succ_falls_back_when_not_easily_shatterable() {
    init_tracing();
    // Takes has a constant in position 0 in one occurrence and a variable
    // there in the other; `x = 'alice'` would need a case split.
    let query = rule(
        &[x()],
        Formula::and([
            atom("Takes", &[Term::str("alice"), y()]),
            atom("Takes", &[x(), y()]),
            atom("Student", &[x()]),
        ]),
    );
    let result = solve_succ(&query, &university());
    let Err(LiftError::QueryNotLiftable { offending, .. }) = result else {
        panic!("expected QueryNotLiftable");
    };
    assert!(!offending.is_empty());
    for rendered in &offending {
        assert!(rendered.contains("Takes"));
        assert!(!rendered.contains("Takes_"));
    }
}

#[test]
fn test_solve_succ_empty_query() -> Result<()> {
    let query = rule(
        &[x()],
        Formula::and([
            atom("Student", &[x()]),
            Formula::equals(Term::str("a"), Term::str("b")),
        ]),
    );
    let plan = solve_succ(&query, &university())?;
    assert_eq!(
        plan,
        Plan::Empty {
            attributes: vec![Variable::new("x")]
        }
    );
    Ok(())
}

// ============================================================================
// solve_marg
// ============================================================================

#[test]
fn test_solve_marg_builds_conditional_plan() -> Result<()> {
    init_tracing();
    // P(Hard(y) | Takes(x, y)) per (x, y)
    let query = MarginalQuery {
        head: Atom::new("ans", [x(), y()]),
        conditioned: atom("Hard", &[y()]),
        conditioning: atom("Takes", &[x(), y()]),
    };
    let plan = solve_marg(&query, &university())?;
    let Plan::ConditionalProbability { joint, evidence } = &plan else {
        return Err(anyhow!("expected a conditional plan, got {plan}"));
    };
    assert_eq!(joint.attributes(), [Variable::new("x"), Variable::new("y")].into());
    assert_eq!(**evidence, Plan::translate(atom("Takes", &[x(), y()])));
    assert!(plan.is_pure_lifted());
    Ok(())
}

#[test]
fn test_solve_marg_propagates_non_liftable_parts() {
    let symbols: SymbolTable = ["R", "S", "T"]
        .into_iter()
        .map(|p| (p, RelationKind::ProbabilisticFact { probability_column: 0 }))
        .collect();
    let query = MarginalQuery {
        head: Atom::new("ans", []),
        conditioned: Formula::exists(Variable::new("z"), atom("R", &[Term::var("z")])),
        conditioning: Formula::exists_all(
            [Variable::new("x"), Variable::new("y")],
            Formula::and([atom("R", &[x()]), atom("S", &[x(), y()]), atom("T", &[y()])]),
        ),
    };
    assert!(matches!(
        solve_marg(&query, &symbols),
        Err(LiftError::QueryNotLiftable { .. })
    ));
}

// ============================================================================
// Hierarchical fast path
// ============================================================================

#[test]
fn test_fast_path_accepts_hierarchical_queries() -> Result<()> {
    init_tracing();
    // ans(x) ← Takes(x, y) ∧ Student(x)
    let query = rule(
        &[x()],
        Formula::and([atom("Takes", &[x(), y()]), atom("Student", &[x()])]),
    );
    let FastPathOutcome::Hierarchical(plan) = solve_succ_hierarchical(&query, &university())? else {
        return Err(anyhow!("fast path rejected a hierarchical query"));
    };
    let Plan::Projection { attributes, .. } = &plan else {
        return Err(anyhow!("expected a projection, got {plan}"));
    };
    assert_eq!(attributes, &vec![Variable::new("x")]);
    Ok(())
}

#[test]
fn test_fast_path_falls_back_to_general_engine() -> Result<()> {
    init_tracing();
    let symbols: SymbolTable = ["R", "S", "T"]
        .into_iter()
        .map(|p| (p, RelationKind::ProbabilisticFact { probability_column: 0 }))
        .collect();
    // Not hierarchical, but every variable is an answer variable.
    let query = rule(
        &[x(), y()],
        Formula::and([atom("R", &[x()]), atom("S", &[x(), y()]), atom("T", &[y()])]),
    );
    let outcome = solve_succ_hierarchical(&query, &symbols)?;
    assert!(matches!(outcome, FastPathOutcome::NotHierarchical { .. }));

    let plan = solve_succ_with_fast_path(&query, &symbols)?;
    assert_eq!(plan, solve_succ(&query, &symbols)?);
    assert!(matches!(plan, Plan::NaturalJoin { .. }));
    Ok(())
}

#[test]
fn test_fast_path_sees_deterministic_links() -> Result<()> {
    init_tracing();
    // ans() ← Smart(x) ∧ Enrolled(x, y) ∧ Hard(y): the deterministic join
    // correlates Smart and Hard exactly as in H0.
    let symbols = SymbolTable::new()
        .with_relation("Smart", RelationKind::ProbabilisticFact { probability_column: 1 })
        .with_relation("Enrolled", RelationKind::Deterministic)
        .with_relation("Hard", RelationKind::ProbabilisticFact { probability_column: 1 });
    let query = rule(
        &[],
        Formula::and([
            atom("Smart", &[x()]),
            atom("Enrolled", &[x(), y()]),
            atom("Hard", &[y()]),
        ]),
    );
    let outcome = solve_succ_hierarchical(&query, &symbols)?;
    assert!(
        matches!(outcome, FastPathOutcome::NotHierarchical { .. }),
        "got {outcome:?}"
    );
    assert!(matches!(
        solve_succ_with_fast_path(&query, &symbols),
        Err(LiftError::QueryNotLiftable { .. })
    ));
    Ok(())
}

#[test]
fn test_fast_path_rejects_disjunctions() -> Result<()> {
    let query = rule(
        &[x()],
        Formula::or([atom("Hard", &[x()]), atom("Takes", &[x(), Term::str("math")])]),
    );
    let outcome = solve_succ_hierarchical(&query, &university())?;
    assert!(matches!(outcome, FastPathOutcome::UnsupportedShape { .. }));
    assert!(solve_succ_with_fast_path(&query, &university())?.is_pure_lifted());
    Ok(())
}

// ============================================================================
// JSON interchange
// ============================================================================

#[test]
fn test_plan_json_roundtrip() -> Result<()> {
    let query = rule(&[], Formula::and([atom("Takes", &[x(), y()]), atom("Hard", &[y()])]));
    let plan = solve_succ(&query, &university())?;

    let json = plan.to_json()?;
    let value: serde_json::Value = serde_json::from_str(&json)?;
    assert_eq!(value["op"], "independent_projection");
    let back: Plan = serde_json::from_str(&json)?;
    assert_eq!(back, plan);
    Ok(())
}

#[test]
fn test_config_and_symbols_from_json() -> Result<()> {
    let config: LiftConfig = serde_json::from_str(
        r#"{ "shatter_probabilistic_facts": false, "max_inclusion_exclusion_terms": 4 }"#,
    )?;
    assert!(!config.shatter_probabilistic_facts);
    assert_eq!(config.max_recursion_depth, LiftConfig::default().max_recursion_depth);

    let symbols: SymbolTable = serde_json::from_str(
        r#"{
            "Student": { "kind": "deterministic" },
            "Takes": { "kind": "probabilistic_fact", "probability_column": 2 }
        }"#,
    )?;
    assert!(symbols.contains("Takes"));

    let engine = LiftingEngine::with_config(config);
    let query = rule(&[x()], Formula::and([atom("Student", &[x()]), atom("Takes", &[x(), y()])]));
    assert!(engine.solve_succ(&query, &symbols)?.is_pure_lifted());
    Ok(())
}
