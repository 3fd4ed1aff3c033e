//! # Common Types
//!
//! Typed indices for variables, literals and clauses, used throughout the
//! library to guarantee type safety between the different index spaces.

use std::{
    fmt,
    ops::{self, Index, IndexMut},
};

use thiserror::Error;

pub mod constraints;
pub use constraints::Clause;

/// The hash map to use throughout the library
pub type RsHashMap<K, V> = rustc_hash::FxHashMap<K, V>;
/// The hash set to use throughout the library
pub type RsHashSet<V> = rustc_hash::FxHashSet<V>;

/// Type representing boolean variables. Variable indexing starts from 0 and
/// the maximum index is `(u32::MAX - 1) / 2` because literals are represented
/// as a single `u32` as well. The memory representation of variables is `u32`.
#[derive(Hash, Eq, PartialEq, PartialOrd, Clone, Copy, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Var {
    idx: u32,
}

impl Var {
    /// The maximum index that can be represented.
    pub const MAX_IDX: u32 = (u32::MAX - 1) / 2;

    /// Creates a new variable with a given index. Indices start from 0.
    ///
    /// # Panics
    ///
    /// If `idx > Var::MAX_IDX`.
    #[must_use]
    pub const fn new(idx: u32) -> Var {
        assert!(idx <= Var::MAX_IDX, "variable index too high");
        Var { idx }
    }

    /// Creates a literal with a given negation from the variable
    #[inline]
    #[must_use]
    pub const fn lit(self, negated: bool) -> Lit {
        Lit::new(self.idx, negated)
    }

    /// Creates a literal that is not negated.
    #[inline]
    #[must_use]
    pub const fn pos_lit(self) -> Lit {
        Lit::new(self.idx, false)
    }

    /// Creates a negated literal.
    #[inline]
    #[must_use]
    pub const fn neg_lit(self) -> Lit {
        Lit::new(self.idx, true)
    }

    /// Returns the index of the variable. This is a `usize` to enable easier
    /// indexing of data structures like vectors, even though the internal
    /// representation of a variable is `u32`.
    #[inline]
    #[must_use]
    pub const fn idx(self) -> usize {
        self.idx as usize
    }

    /// Returns the 32 bit index of the variable.
    #[inline]
    #[must_use]
    pub const fn idx32(self) -> u32 {
        self.idx
    }
}

/// Incrementing variables
impl ops::Add<u32> for Var {
    type Output = Var;

    fn add(self, rhs: u32) -> Self::Output {
        let idx = self.idx + rhs;
        debug_assert!(idx <= Var::MAX_IDX, "variable index overflow");
        Var { idx }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.idx)
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.idx)
    }
}

/// More easily creates variables. Mainly used in tests.
///
/// ```
/// # use boolopt::{var, types::Var};
/// assert_eq!(var![42], Var::new(42));
/// ```
#[macro_export]
macro_rules! var {
    ($v:expr) => {
        $crate::types::Var::new($v)
    };
}

/// Type representing literals, possibly negated boolean variables.
///
/// # Representation in Memory
///
/// Literal representation is `idx << 1` with the last bit representing
/// whether the literal is negated or not. This way the literal can directly
/// be used to index data structures with the two literals of a variable
/// being close together.
#[derive(Hash, Eq, PartialEq, PartialOrd, Ord, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Lit {
    lidx: u32,
}

impl Lit {
    /// Creates a new (negated or not) literal with a given index.
    ///
    /// # Panics
    ///
    /// If `idx > Var::MAX_IDX`.
    #[must_use]
    pub const fn new(idx: u32, negated: bool) -> Lit {
        assert!(idx <= Var::MAX_IDX, "variable index too high");
        Lit {
            lidx: (idx << 1) + if negated { 1 } else { 0 },
        }
    }

    /// Creates a new positive literal with a given index.
    #[inline]
    #[must_use]
    pub const fn positive(idx: u32) -> Lit {
        Lit::new(idx, false)
    }

    /// Creates a new negated literal with a given index.
    #[inline]
    #[must_use]
    pub const fn negative(idx: u32) -> Lit {
        Lit::new(idx, true)
    }

    /// Creates a literal from its literal index, the inverse of [`Lit::lidx`]
    #[inline]
    #[must_use]
    pub const fn from_lidx(lidx: usize) -> Lit {
        Lit::new((lidx >> 1) as u32, lidx & 1 == 1)
    }

    /// Gets the variable index of the literal
    #[inline]
    #[must_use]
    pub const fn vidx(self) -> usize {
        (self.lidx >> 1) as usize
    }

    /// Gets a literal representation for indexing data structures
    #[inline]
    #[must_use]
    pub const fn lidx(self) -> usize {
        self.lidx as usize
    }

    /// Gets the variable that the literal corresponds to
    #[inline]
    #[must_use]
    pub const fn var(self) -> Var {
        Var { idx: self.lidx >> 1 }
    }

    /// True if the literal is positive.
    #[inline]
    #[must_use]
    pub const fn is_pos(self) -> bool {
        (self.lidx & 1u32) == 0
    }

    /// True if the literal is negated.
    #[inline]
    #[must_use]
    pub const fn is_neg(self) -> bool {
        (self.lidx & 1u32) == 1
    }
}

/// Trait implementation allowing for negating literals with the `!` operator.
impl ops::Not for Lit {
    type Output = Lit;

    #[inline]
    fn not(self) -> Lit {
        Lit {
            lidx: self.lidx ^ 1u32,
        }
    }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", if self.is_neg() { "~" } else { "" }, self.var())
    }
}

impl fmt::Debug for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", if self.is_neg() { "~" } else { "" }, self.var())
    }
}

/// More easily creates literals. Mainly used in tests.
///
/// ```
/// # use boolopt::{lit, types::Lit};
/// assert_eq!(lit![42], Lit::positive(42));
/// assert_eq!(!lit![42], Lit::negative(42));
/// ```
#[macro_export]
macro_rules! lit {
    ($l:expr) => {
        $crate::types::Lit::positive($l)
    };
}

/// An index into the presolver's clause database.
///
/// Clause indices are never reused: a deleted clause keeps its index with an
/// empty literal sequence, so that the postsolve log stays valid across
/// destructive rewrites.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct ClauseIdx(pub usize);

impl fmt::Display for ClauseIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ternary value assigned to a literal or variable, including possible "don't care"
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum TernaryVal {
    /// Positive assignment.
    True,
    /// Negative assignment.
    False,
    /// Unassigned.
    #[default]
    DontCare,
}

impl TernaryVal {
    /// Converts a [`TernaryVal`] to a [`bool`] with a default value for "don't cares"
    #[must_use]
    pub fn to_bool_with_def(self, def: bool) -> bool {
        match self {
            TernaryVal::True => true,
            TernaryVal::False => false,
            TernaryVal::DontCare => def,
        }
    }
}

impl fmt::Display for TernaryVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TernaryVal::True => write!(f, "1"),
            TernaryVal::False => write!(f, "0"),
            TernaryVal::DontCare => write!(f, "_"),
        }
    }
}

impl From<bool> for TernaryVal {
    fn from(value: bool) -> Self {
        if value {
            return TernaryVal::True;
        }
        TernaryVal::False
    }
}

impl ops::Not for TernaryVal {
    type Output = TernaryVal;

    fn not(self) -> Self::Output {
        match self {
            TernaryVal::True => TernaryVal::False,
            TernaryVal::False => TernaryVal::True,
            TernaryVal::DontCare => TernaryVal::DontCare,
        }
    }
}

/// Type representing an assignment of variables.
#[derive(Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Assignment {
    assignment: Vec<TernaryVal>,
}

impl Assignment {
    /// Creates an assignment with `n_vars` unassigned variables
    #[must_use]
    pub fn new(n_vars: usize) -> Self {
        Assignment {
            assignment: vec![TernaryVal::DontCare; n_vars],
        }
    }

    /// The number of variables the assignment ranges over
    #[must_use]
    pub fn len(&self) -> usize {
        self.assignment.len()
    }

    /// True if the assignment ranges over no variables
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignment.is_empty()
    }

    /// Get the value that the assignment assigns to a variable.
    /// If the variable is not included, returns `TernaryVal::DontCare`.
    #[must_use]
    pub fn var_value(&self, var: Var) -> TernaryVal {
        if var.idx() >= self.assignment.len() {
            TernaryVal::DontCare
        } else {
            self.assignment[var.idx()]
        }
    }

    /// Same as [`Assignment::var_value`], but for literals.
    #[must_use]
    pub fn lit_value(&self, lit: Lit) -> TernaryVal {
        if lit.is_neg() {
            !self.var_value(lit.var())
        } else {
            self.var_value(lit.var())
        }
    }

    /// True if the literal is assigned true
    #[must_use]
    pub fn lit_is_true(&self, lit: Lit) -> bool {
        self.lit_value(lit) == TernaryVal::True
    }

    /// True if the literal is assigned false
    #[must_use]
    pub fn lit_is_false(&self, lit: Lit) -> bool {
        self.lit_value(lit) == TernaryVal::False
    }

    /// True if the underlying variable is assigned either way
    #[must_use]
    pub fn lit_is_assigned(&self, lit: Lit) -> bool {
        self.var_value(lit.var()) != TernaryVal::DontCare
    }

    /// Assigns a variable in the assignment
    pub fn assign_var(&mut self, variable: Var, value: TernaryVal) {
        if self.assignment.len() < variable.idx() + 1 {
            self.assignment
                .resize(variable.idx() + 1, TernaryVal::DontCare);
        }
        self.assignment[variable.idx()] = value;
    }

    /// Assigns a literal to true
    pub fn assign_lit(&mut self, lit: Lit) {
        let val = if lit.is_pos() {
            TernaryVal::True
        } else {
            TernaryVal::False
        };
        self.assign_var(lit.var(), val);
    }

    /// Unassigns a variable
    pub fn unassign_var(&mut self, variable: Var) {
        if variable.idx() < self.assignment.len() {
            self.assignment[variable.idx()] = TernaryVal::DontCare;
        }
    }

    /// Replaces unassigned variables in the assignment with a default value
    pub fn replace_dont_care(&mut self, def: bool) {
        let def = TernaryVal::from(def);
        self.assignment.iter_mut().for_each(|tv| {
            if tv == &TernaryVal::DontCare {
                *tv = def;
            }
        });
    }

    /// Gets an iterator over literals assigned to either value
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = Lit> + '_ {
        self.assignment
            .iter()
            .enumerate()
            .filter_map(|(idx, tv)| match tv {
                TernaryVal::True => Some(Lit::new(idx as u32, false)),
                TernaryVal::False => Some(Lit::new(idx as u32, true)),
                TernaryVal::DontCare => None,
            })
    }
}

impl fmt::Debug for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.assignment.iter().try_for_each(|tv| write!(f, "{tv}"))
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.assignment.iter().try_for_each(|tv| write!(f, "{tv}"))
    }
}

impl FromIterator<Lit> for Assignment {
    fn from_iter<T: IntoIterator<Item = Lit>>(iter: T) -> Self {
        let mut assignment = Assignment::default();
        iter.into_iter().for_each(|l| assignment.assign_lit(l));
        assignment
    }
}

impl FromIterator<bool> for Assignment {
    fn from_iter<T: IntoIterator<Item = bool>>(iter: T) -> Self {
        Self::from(iter.into_iter().map(TernaryVal::from).collect::<Vec<_>>())
    }
}

impl From<Vec<TernaryVal>> for Assignment {
    fn from(assignment: Vec<TernaryVal>) -> Self {
        Self { assignment }
    }
}

impl Index<Var> for Assignment {
    type Output = TernaryVal;

    fn index(&self, index: Var) -> &Self::Output {
        &self.assignment[index.idx()]
    }
}

impl IndexMut<Var> for Assignment {
    fn index_mut(&mut self, index: Var) -> &mut Self::Output {
        &mut self.assignment[index.idx()]
    }
}

/// Errors related to types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// The requested index is too high.
    /// Contains the requested and the maximum index.
    #[error("index {0} is too high (maximum {1})")]
    IdxTooHigh(u32, u32),
}

/// An iterator over literals
pub trait LitIter: IntoIterator<Item = Lit> {}
impl<I: IntoIterator<Item = Lit>> LitIter for I {}

/// An iterator over integer-weighted literals
pub trait IWLitIter: IntoIterator<Item = (Lit, i64)> {}
impl<I: IntoIterator<Item = (Lit, i64)>> IWLitIter for I {}

#[cfg(test)]
mod tests {
    use std::mem::size_of;

    use super::{Assignment, Lit, TernaryVal, Var};

    #[test]
    fn var_index() {
        let var = Var::new(5);
        assert_eq!(var.idx(), 5);
        assert_eq!(var.idx32(), 5);
    }

    #[test]
    fn var_lits() {
        let var = Var::new(5);
        assert_eq!(var.pos_lit(), Lit::positive(5));
        assert_eq!(var.neg_lit(), Lit::negative(5));
        assert_eq!(Lit::positive(5).var(), var);
    }

    #[test]
    fn lit_representation() {
        let lit = Lit::new(5, true);
        assert_eq!(lit.lidx(), 0b1011);
        assert_eq!(Lit::from_lidx(0b1011), lit);
    }

    #[test]
    fn lit_negation() {
        let lit1 = Lit::positive(0);
        let lit2 = !lit1;
        assert!(!lit2.is_pos());
        assert!(lit2.is_neg());
        assert_eq!(lit1.var(), lit2.var());
    }

    #[test]
    fn lit_ordered_by_var() {
        assert!(lit![1] < !lit![1]);
        assert!(!lit![1] < lit![2]);
    }

    #[test]
    fn ternary_var_dnc() {
        let tv = TernaryVal::DontCare;
        assert!(tv.to_bool_with_def(true));
        assert!(!tv.to_bool_with_def(false));
    }

    #[test]
    fn assignment_values() {
        let sol = Assignment::from(vec![
            TernaryVal::True,
            TernaryVal::False,
            TernaryVal::DontCare,
        ]);
        assert_eq!(sol.var_value(Var::new(0)), TernaryVal::True);
        assert_eq!(sol.var_value(Var::new(1)), TernaryVal::False);
        assert_eq!(sol.var_value(Var::new(2)), TernaryVal::DontCare);
        assert_eq!(sol.lit_value(Lit::negative(0)), TernaryVal::False);
        assert_eq!(sol.lit_value(Lit::negative(1)), TernaryVal::True);
        assert_eq!(sol.lit_value(Lit::positive(2)), TernaryVal::DontCare);
    }

    #[test]
    fn assignment_unassign() {
        let mut sol = Assignment::from_iter(vec![lit![0], !lit![1]]);
        assert!(sol.lit_is_true(lit![0]));
        sol.unassign_var(var![0]);
        assert_eq!(sol.var_value(var![0]), TernaryVal::DontCare);
        sol.assign_lit(!lit![0]);
        assert!(sol.lit_is_false(lit![0]));
    }

    #[test]
    fn assignment_repl_dont_care() {
        let mut sol = Assignment::from(vec![
            TernaryVal::True,
            TernaryVal::False,
            TernaryVal::DontCare,
        ]);
        sol.replace_dont_care(true);
        assert_eq!(sol.var_value(Var::new(2)), TernaryVal::True);
    }

    #[test]
    fn var_mem_size() {
        assert_eq!(size_of::<Var>(), size_of::<u32>());
    }

    #[test]
    fn lit_mem_size() {
        assert_eq!(size_of::<Lit>(), size_of::<u32>());
    }
}
