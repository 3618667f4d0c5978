//! Shattering of tuple-independent atoms with constant arguments.
//!
//! An atom `R('a', y)` over a tuple-independent relation only ever touches the
//! tuples of `R` whose first column is `'a'`. When every occurrence of `R`
//! fixes the same argument positions, occurrences with different constants
//! touch disjoint (hence independent) sets of tuples, so each constant tuple
//! can be given a relation of its own: `R('a', y)` becomes `R_1(y)`. This
//! removes the constants, which the separator and component rules cannot see
//! through.
//!
//! If two occurrences of `R` fix different positions (`R('a', y)` and
//! `R(x, 'b')`) their tuple sets may overlap, and the query is left alone.

use crate::error::NotEasilyShatterable;
use liftql_logic::{Atom, Formula, Name, SymbolTable, Term};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How a shattered relation maps back to the original one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShatteredRelation {
    pub predicate: Name,
    /// Original argument list: `Some` for the fixed constants, `None` for the
    /// positions filled, in order, by the shattered atom's arguments.
    pub template: Vec<Option<Term>>,
}

impl ShatteredRelation {
    pub fn restore(&self, shattered: &Atom) -> Atom {
        let mut args = shattered.args.iter();
        Atom::new(
            self.predicate.clone(),
            self.template
                .iter()
                .map(|slot| match slot {
                    Some(constant) => constant.clone(),
                    None => args.next().cloned().unwrap_or_else(|| Term::var("_")),
                }),
        )
    }
}

/// A shattered query together with the extended symbol table it must be
/// lifted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shattering {
    pub formula: Formula,
    pub symbols: SymbolTable,
    pub relations: BTreeMap<Name, ShatteredRelation>,
}

impl Shattering {
    /// Replace shattered atoms in `formula` by the original atoms.
    pub fn restore(&self, formula: &Formula) -> Formula {
        formula.map_atoms(&mut |atom| match self.relations.get(&atom.predicate) {
            Some(relation) => Formula::Atom(relation.restore(atom)),
            None => Formula::Atom(atom.clone()),
        })
    }
}

/// Deterministic supply of predicate names not used elsewhere.
struct FreshPredicates {
    taken: BTreeSet<Name>,
}

impl FreshPredicates {
    fn next(&mut self, base: &str) -> Name {
        let name = (1usize..)
            .map(|i| format!("{base}_{i}"))
            .find(|candidate| !self.taken.contains(candidate))
            .unwrap_or_else(|| format!("{base}_"));
        self.taken.insert(name.clone());
        name
    }
}

fn constant_positions(atom: &Atom) -> BTreeSet<usize> {
    atom.args
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_constant())
        .map(|(i, _)| i)
        .collect()
}

/// Shatter every tuple-independent predicate that occurs with constant
/// arguments.
pub fn shatter(
    formula: &Formula,
    symbols: &SymbolTable,
) -> Result<Shattering, NotEasilyShatterable> {
    let atoms = formula.atoms();

    let mut positions: BTreeMap<&str, BTreeSet<BTreeSet<usize>>> = BTreeMap::new();
    for atom in &atoms {
        if symbols.is_probabilistic_fact(atom) {
            positions
                .entry(atom.predicate.as_str())
                .or_default()
                .insert(constant_positions(atom));
        }
    }

    let mut to_shatter: BTreeSet<&str> = BTreeSet::new();
    for (predicate, shapes) in &positions {
        if shapes.iter().all(BTreeSet::is_empty) {
            continue;
        }
        if shapes.len() > 1 {
            return Err(NotEasilyShatterable {
                predicate: (*predicate).to_string(),
                reason: "occurrences fix constants at different positions".to_string(),
            });
        }
        to_shatter.insert(*predicate);
    }

    let mut fresh = FreshPredicates {
        taken: symbols
            .iter()
            .map(|(name, _)| name.to_string())
            .chain(formula.predicates().into_iter().map(str::to_string))
            .collect(),
    };
    let mut table = symbols.clone();
    let mut relations = BTreeMap::new();
    let mut by_constants: BTreeMap<(Name, Vec<Term>), Name> = BTreeMap::new();

    for atom in &atoms {
        if !to_shatter.contains(atom.predicate.as_str()) {
            continue;
        }
        let constants: Vec<Term> = atom.args.iter().filter(|t| t.is_constant()).cloned().collect();
        let key = (atom.predicate.clone(), constants);
        if by_constants.contains_key(&key) {
            continue;
        }
        let name = fresh.next(&atom.predicate);
        if let Some(kind) = symbols.kind_of(atom) {
            table.insert(name.clone(), kind);
        }
        relations.insert(
            name.clone(),
            ShatteredRelation {
                predicate: atom.predicate.clone(),
                template: atom
                    .args
                    .iter()
                    .map(|t| t.is_constant().then(|| t.clone()))
                    .collect(),
            },
        );
        tracing::debug!(predicate = %atom.predicate, shattered = %name, "shattered relation");
        by_constants.insert(key, name);
    }

    let shattered = formula.map_atoms(&mut |atom| {
        if !to_shatter.contains(atom.predicate.as_str()) {
            return Formula::Atom(atom.clone());
        }
        let constants: Vec<Term> = atom.args.iter().filter(|t| t.is_constant()).cloned().collect();
        match by_constants.get(&(atom.predicate.clone(), constants)) {
            Some(name) => Formula::atom(
                name.clone(),
                atom.args.iter().filter(|t| !t.is_constant()).cloned(),
            ),
            None => Formula::Atom(atom.clone()),
        }
    });

    Ok(Shattering {
        formula: shattered,
        symbols: table,
        relations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use liftql_logic::{RelationKind, Variable};

    fn table() -> SymbolTable {
        [
            ("R", RelationKind::ProbabilisticFact { probability_column: 2 }),
            ("D", RelationKind::Deterministic),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn constants_move_into_fresh_relations() {
        // R('a', y) ∧ R('b', y) ∧ D('a')
        let f = Formula::exists(
            Variable::new("y"),
            Formula::and([
                Formula::atom("R", [Term::str("a"), Term::var("y")]),
                Formula::atom("R", [Term::str("b"), Term::var("y")]),
                Formula::atom("D", [Term::str("a")]),
            ]),
        );
        let s = shatter(&f, &table()).expect("shatterable");
        assert_eq!(
            s.formula,
            Formula::exists(
                Variable::new("y"),
                Formula::and([
                    Formula::atom("R_1", [Term::var("y")]),
                    Formula::atom("R_2", [Term::var("y")]),
                    Formula::atom("D", [Term::str("a")]),
                ]),
            )
        );
        assert_eq!(
            s.symbols.get("R_1"),
            Some(RelationKind::ProbabilisticFact { probability_column: 2 })
        );
        assert_eq!(s.restore(&s.formula), f);
    }

    #[test]
    fn mixed_positions_are_rejected() {
        let f = Formula::and([
            Formula::atom("R", [Term::str("a"), Term::var("y")]),
            Formula::atom("R", [Term::var("x"), Term::str("b")]),
        ]);
        let err = shatter(&f, &table()).expect_err("not shatterable");
        assert_eq!(err.predicate, "R");
    }

    #[test]
    fn constant_free_queries_are_unchanged() {
        let f = Formula::atom("R", [Term::var("x"), Term::var("y")]);
        let s = shatter(&f, &table()).expect("shatterable");
        assert_eq!(s.formula, f);
        assert!(s.relations.is_empty());
        assert_eq!(s.symbols, table());
    }
}
