//! liftql logic model
//!
//! This crate defines the immutable logical formulas and the probabilistic
//! symbol table consumed by the `liftql-lift` compilation engine.
//!
//! Formulas are plain data: every transformation builds a new tree, and
//! structural equality / hashing is stable so formulas can key maps and sets.
//! The symbol table is a persistent mapping; extending it never affects other
//! holders of the same table.

pub mod formula;
pub mod symbol_table;

pub use formula::{fresh_variable, Atom, Formula, FormulaError, Name, Term, Value, Variable};
pub use symbol_table::{RelationKind, SymbolTable};
