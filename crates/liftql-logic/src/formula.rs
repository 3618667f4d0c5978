//! Logical formulas over relational atoms.
//!
//! The variant set is closed: every consumer matches exhaustively, so adding a
//! connective means touching every matching site.
//!
//! Notes:
//! - `Implication(head, body)` reads as `head ← body` (a rule).
//! - `Equality` is an interpreted binary predicate; it never names a relation
//!   in a symbol table.
//! - Formulas are never mutated in place. Substitution is capture-avoiding and
//!   renames binders deterministically (see [`fresh_variable`]).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

pub type Name = String;

// ============================================================================
// Terms
// ============================================================================

/// A named logic variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variable(Name);

impl Variable {
    pub fn new(name: impl Into<Name>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// A literal constant appearing as an atom argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Term {
    Variable(Variable),
    Constant(Value),
}

impl Term {
    pub fn var(name: impl Into<Name>) -> Self {
        Term::Variable(Variable::new(name))
    }

    pub fn str(value: impl Into<String>) -> Self {
        Term::Constant(Value::Str(value.into()))
    }

    pub fn int(value: i64) -> Self {
        Term::Constant(Value::Int(value))
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Term::Variable(v) => Some(v),
            Term::Constant(_) => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Term::Constant(_))
    }

    pub fn substitute(&self, map: &BTreeMap<Variable, Term>) -> Term {
        match self {
            Term::Variable(v) => map.get(v).cloned().unwrap_or_else(|| self.clone()),
            Term::Constant(_) => self.clone(),
        }
    }
}

impl From<Variable> for Term {
    fn from(v: Variable) -> Self {
        Term::Variable(v)
    }
}

// ============================================================================
// Atoms
// ============================================================================

/// `predicate(args…)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Atom {
    pub predicate: Name,
    pub args: Vec<Term>,
}

impl Atom {
    pub fn new(predicate: impl Into<Name>, args: impl IntoIterator<Item = Term>) -> Self {
        Self {
            predicate: predicate.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Variables in argument order (repeats included).
    pub fn variables(&self) -> impl Iterator<Item = &Variable> + '_ {
        self.args.iter().filter_map(Term::as_variable)
    }

    pub fn variable_set(&self) -> BTreeSet<Variable> {
        self.variables().cloned().collect()
    }

    pub fn is_ground(&self) -> bool {
        self.args.iter().all(Term::is_constant)
    }

    /// Argument positions holding `var`.
    pub fn positions_of(&self, var: &Variable) -> BTreeSet<usize> {
        self.args
            .iter()
            .enumerate()
            .filter(|(_, t)| t.as_variable() == Some(var))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn substitute(&self, map: &BTreeMap<Variable, Term>) -> Atom {
        Atom {
            predicate: self.predicate.clone(),
            args: self.args.iter().map(|t| t.substitute(map)).collect(),
        }
    }
}

// ============================================================================
// Formulas
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum Formula {
    True,
    False,
    Atom(Atom),
    Equality(Term, Term),
    Conjunction(Vec<Formula>),
    Disjunction(Vec<Formula>),
    Negation(Box<Formula>),
    Exists(Variable, Box<Formula>),
    /// `head ← body`.
    Implication(Box<Formula>, Box<Formula>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("expected a rule `head ← body`, found `{0}`")]
    NotARule(String),
    #[error("rule head must be an atom, found `{0}`")]
    HeadNotAnAtom(String),
}

impl Formula {
    pub fn atom(predicate: impl Into<Name>, args: impl IntoIterator<Item = Term>) -> Self {
        Formula::Atom(Atom::new(predicate, args))
    }

    pub fn and(formulas: impl IntoIterator<Item = Formula>) -> Self {
        Formula::Conjunction(formulas.into_iter().collect())
    }

    pub fn or(formulas: impl IntoIterator<Item = Formula>) -> Self {
        Formula::Disjunction(formulas.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(formula: Formula) -> Self {
        Formula::Negation(Box::new(formula))
    }

    pub fn exists(var: Variable, body: Formula) -> Self {
        Formula::Exists(var, Box::new(body))
    }

    /// `∃v₁.∃v₂.….body`, outermost binder first.
    pub fn exists_all(vars: impl IntoIterator<Item = Variable>, body: Formula) -> Self {
        let vars: Vec<Variable> = vars.into_iter().collect();
        vars.into_iter()
            .rev()
            .fold(body, |acc, v| Formula::Exists(v, Box::new(acc)))
    }

    pub fn implies(head: Formula, body: Formula) -> Self {
        Formula::Implication(Box::new(head), Box::new(body))
    }

    pub fn equals(left: Term, right: Term) -> Self {
        Formula::Equality(left, right)
    }

    pub fn is_atom(&self) -> bool {
        matches!(self, Formula::Atom(_))
    }

    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Formula::Atom(a) => Some(a),
            _ => None,
        }
    }

    /// The conjuncts of a conjunction, or the formula itself.
    pub fn conjuncts(&self) -> &[Formula] {
        match self {
            Formula::Conjunction(fs) => fs,
            _ => std::slice::from_ref(self),
        }
    }

    /// The disjuncts of a disjunction, or the formula itself.
    pub fn disjuncts(&self) -> &[Formula] {
        match self {
            Formula::Disjunction(fs) => fs,
            _ => std::slice::from_ref(self),
        }
    }

    /// Split a rule into its head atom and body.
    pub fn as_implication(&self) -> Result<(&Atom, &Formula), FormulaError> {
        match self {
            Formula::Implication(head, body) => match head.as_ref() {
                Formula::Atom(atom) => Ok((atom, body)),
                other => Err(FormulaError::HeadNotAnAtom(other.to_string())),
            },
            other => Err(FormulaError::NotARule(other.to_string())),
        }
    }

    pub fn free_variables(&self) -> BTreeSet<Variable> {
        let mut out = BTreeSet::new();
        self.collect_free(&mut out, &mut Vec::new());
        out
    }

    fn collect_free(&self, out: &mut BTreeSet<Variable>, bound: &mut Vec<Variable>) {
        fn add_term(t: &Term, bound: &[Variable], out: &mut BTreeSet<Variable>) {
            if let Term::Variable(v) = t {
                if !bound.contains(v) {
                    out.insert(v.clone());
                }
            }
        }
        match self {
            Formula::True | Formula::False => {}
            Formula::Atom(a) => a.args.iter().for_each(|t| add_term(t, bound, out)),
            Formula::Equality(l, r) => {
                add_term(l, bound, out);
                add_term(r, bound, out);
            }
            Formula::Conjunction(fs) | Formula::Disjunction(fs) => {
                fs.iter().for_each(|f| f.collect_free(out, bound))
            }
            Formula::Negation(f) => f.collect_free(out, bound),
            Formula::Exists(v, body) => {
                bound.push(v.clone());
                body.collect_free(out, bound);
                bound.pop();
            }
            Formula::Implication(h, b) => {
                h.collect_free(out, bound);
                b.collect_free(out, bound);
            }
        }
    }

    /// Every variable mentioned anywhere, binders included.
    pub fn variables(&self) -> BTreeSet<Variable> {
        let mut out = BTreeSet::new();
        self.visit(&mut |f| match f {
            Formula::Atom(a) => out.extend(a.variables().cloned()),
            Formula::Equality(l, r) => {
                out.extend(l.as_variable().cloned());
                out.extend(r.as_variable().cloned());
            }
            Formula::Exists(v, _) => {
                out.insert(v.clone());
            }
            _ => {}
        });
        out
    }

    /// Relational atoms in pre-order, including those under negation.
    pub fn atoms(&self) -> Vec<&Atom> {
        let mut out = Vec::new();
        self.collect_atoms(&mut out);
        out
    }

    fn collect_atoms<'a>(&'a self, out: &mut Vec<&'a Atom>) {
        match self {
            Formula::Atom(a) => out.push(a),
            Formula::True | Formula::False | Formula::Equality(..) => {}
            Formula::Conjunction(fs) | Formula::Disjunction(fs) => {
                fs.iter().for_each(|f| f.collect_atoms(out))
            }
            Formula::Negation(f) | Formula::Exists(_, f) => f.collect_atoms(out),
            Formula::Implication(h, b) => {
                h.collect_atoms(out);
                b.collect_atoms(out);
            }
        }
    }

    pub fn predicates(&self) -> BTreeSet<&str> {
        self.atoms().into_iter().map(|a| a.predicate.as_str()).collect()
    }

    /// Pre-order traversal.
    pub fn visit(&self, f: &mut impl FnMut(&Formula)) {
        f(self);
        match self {
            Formula::True | Formula::False | Formula::Atom(_) | Formula::Equality(..) => {}
            Formula::Conjunction(fs) | Formula::Disjunction(fs) => {
                fs.iter().for_each(|sub| sub.visit(f))
            }
            Formula::Negation(sub) | Formula::Exists(_, sub) => sub.visit(f),
            Formula::Implication(h, b) => {
                h.visit(f);
                b.visit(f);
            }
        }
    }

    /// Rebuild the formula with every atom replaced by `f(atom)`.
    pub fn map_atoms(&self, f: &mut impl FnMut(&Atom) -> Formula) -> Formula {
        match self {
            Formula::Atom(a) => f(a),
            Formula::True | Formula::False | Formula::Equality(..) => self.clone(),
            Formula::Conjunction(fs) => {
                Formula::Conjunction(fs.iter().map(|sub| sub.map_atoms(f)).collect())
            }
            Formula::Disjunction(fs) => {
                Formula::Disjunction(fs.iter().map(|sub| sub.map_atoms(f)).collect())
            }
            Formula::Negation(sub) => Formula::not(sub.map_atoms(f)),
            Formula::Exists(v, sub) => Formula::exists(v.clone(), sub.map_atoms(f)),
            Formula::Implication(h, b) => Formula::implies(h.map_atoms(f), b.map_atoms(f)),
        }
    }

    /// Capture-avoiding substitution of free variables.
    pub fn substitute(&self, map: &BTreeMap<Variable, Term>) -> Formula {
        if map.is_empty() {
            return self.clone();
        }
        match self {
            Formula::True | Formula::False => self.clone(),
            Formula::Atom(a) => Formula::Atom(a.substitute(map)),
            Formula::Equality(l, r) => Formula::Equality(l.substitute(map), r.substitute(map)),
            Formula::Conjunction(fs) => {
                Formula::Conjunction(fs.iter().map(|f| f.substitute(map)).collect())
            }
            Formula::Disjunction(fs) => {
                Formula::Disjunction(fs.iter().map(|f| f.substitute(map)).collect())
            }
            Formula::Negation(f) => Formula::not(f.substitute(map)),
            Formula::Implication(h, b) => Formula::implies(h.substitute(map), b.substitute(map)),
            Formula::Exists(var, body) => {
                let body_free = body.free_variables();
                let inner: BTreeMap<Variable, Term> = map
                    .iter()
                    .filter(|(k, _)| *k != var && body_free.contains(*k))
                    .map(|(k, t)| (k.clone(), t.clone()))
                    .collect();
                if inner.is_empty() {
                    return self.clone();
                }
                let captures = inner.values().any(|t| t.as_variable() == Some(var));
                if !captures {
                    return Formula::exists(var.clone(), body.substitute(&inner));
                }
                let mut avoid = body.variables();
                avoid.extend(inner.keys().cloned());
                avoid.extend(inner.values().filter_map(Term::as_variable).cloned());
                let renamed = fresh_variable(var, &avoid);
                let renaming = BTreeMap::from([(var.clone(), Term::Variable(renamed.clone()))]);
                Formula::exists(renamed, body.substitute(&renaming).substitute(&inner))
            }
        }
    }

    /// Replace free occurrences of `from` by `to`.
    pub fn rename_variable(&self, from: &Variable, to: &Variable) -> Formula {
        if from == to {
            return self.clone();
        }
        self.substitute(&BTreeMap::from([(from.clone(), Term::Variable(to.clone()))]))
    }
}

/// Deterministic fresh variable: `base_1`, `base_2`, … (a trailing `_N` on
/// `base` is stripped first), the first one not in `avoid`.
pub fn fresh_variable(base: &Variable, avoid: &BTreeSet<Variable>) -> Variable {
    let stem = match base.name().rsplit_once('_') {
        Some((stem, suffix))
            if !stem.is_empty()
                && !suffix.is_empty()
                && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            stem
        }
        _ => base.name(),
    };
    (1usize..)
        .map(|i| Variable::new(format!("{stem}_{i}")))
        .find(|candidate| !avoid.contains(candidate))
        .unwrap_or_else(|| base.clone())
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(v) => v.fmt(f),
            Term::Constant(c) => c.fmt(f),
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.predicate)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Formula], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(")")
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::True => f.write_str("⊤"),
            Formula::False => f.write_str("⊥"),
            Formula::Atom(a) => a.fmt(f),
            Formula::Equality(l, r) => write!(f, "{l} = {r}"),
            Formula::Conjunction(fs) if fs.is_empty() => f.write_str("⊤"),
            Formula::Disjunction(fs) if fs.is_empty() => f.write_str("⊥"),
            Formula::Conjunction(fs) => write_joined(f, fs, " ∧ "),
            Formula::Disjunction(fs) => write_joined(f, fs, " ∨ "),
            Formula::Negation(sub) => write!(f, "¬{sub}"),
            Formula::Exists(v, sub) => write!(f, "∃{v}.{sub}"),
            Formula::Implication(h, b) => write!(f, "{h} ← {b}"),
        }
    }
}
