//! Probabilistic symbol table.
//!
//! Maps predicate names to how the relation behind them is stored:
//!
//! - `Deterministic`: an ordinary relation; every tuple is certain.
//! - `ProbabilisticFact`: tuple-independent; each tuple carries its own
//!   probability in `probability_column`.
//! - `ProbabilisticChoice`: block-independent-disjoint; the tuples of the
//!   relation are mutually exclusive alternatives.
//!
//! The table is persistent: `with_relation` returns an extended copy and
//! leaves the receiver untouched, so a caller's table is never observed to
//! change while a query is compiled against it.

use crate::formula::{Atom, Name};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationKind {
    Deterministic,
    ProbabilisticFact { probability_column: usize },
    ProbabilisticChoice { probability_column: usize },
}

impl RelationKind {
    pub fn is_deterministic(self) -> bool {
        matches!(self, RelationKind::Deterministic)
    }

    pub fn probability_column(self) -> Option<usize> {
        match self {
            RelationKind::Deterministic => None,
            RelationKind::ProbabilisticFact { probability_column }
            | RelationKind::ProbabilisticChoice { probability_column } => Some(probability_column),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Name, RelationKind>", into = "BTreeMap<Name, RelationKind>")]
pub struct SymbolTable {
    relations: Arc<BTreeMap<Name, RelationKind>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare (or redeclare) a relation in place.
    pub fn insert(&mut self, predicate: impl Into<Name>, kind: RelationKind) {
        Arc::make_mut(&mut self.relations).insert(predicate.into(), kind);
    }

    /// A copy of this table with one more declaration.
    pub fn with_relation(&self, predicate: impl Into<Name>, kind: RelationKind) -> Self {
        let mut next = self.clone();
        next.insert(predicate, kind);
        next
    }

    pub fn get(&self, predicate: &str) -> Option<RelationKind> {
        self.relations.get(predicate).copied()
    }

    pub fn contains(&self, predicate: &str) -> bool {
        self.relations.contains_key(predicate)
    }

    pub fn kind_of(&self, atom: &Atom) -> Option<RelationKind> {
        self.get(&atom.predicate)
    }

    /// Only relations declared `Deterministic` count; undeclared ones do not.
    pub fn is_deterministic(&self, atom: &Atom) -> bool {
        matches!(self.kind_of(atom), Some(RelationKind::Deterministic))
    }

    pub fn is_probabilistic_fact(&self, atom: &Atom) -> bool {
        matches!(self.kind_of(atom), Some(RelationKind::ProbabilisticFact { .. }))
    }

    pub fn is_probabilistic_choice(&self, atom: &Atom) -> bool {
        matches!(self.kind_of(atom), Some(RelationKind::ProbabilisticChoice { .. }))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, RelationKind)> + '_ {
        self.relations.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

impl From<BTreeMap<Name, RelationKind>> for SymbolTable {
    fn from(relations: BTreeMap<Name, RelationKind>) -> Self {
        Self {
            relations: Arc::new(relations),
        }
    }
}

impl From<SymbolTable> for BTreeMap<Name, RelationKind> {
    fn from(table: SymbolTable) -> Self {
        Arc::try_unwrap(table.relations).unwrap_or_else(|shared| (*shared).clone())
    }
}

impl<N: Into<Name>> FromIterator<(N, RelationKind)> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = (N, RelationKind)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(name, kind)| (name.into(), kind))
            .collect::<BTreeMap<_, _>>()
            .into()
    }
}
