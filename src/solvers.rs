//! # SAT Solver Interface
//!
//! The narrow contract between this library and the underlying SAT decision
//! procedure. The presolver loads its reduced problem through this interface,
//! the prober drives propagation queries through it and the core-guided
//! optimizer solves under assumptions with it.
//!
//! The [`Dpll`] solver in this module is a deliberately simple reference
//! implementation; any assumption-capable CDCL engine can be plugged in
//! instead by implementing [`Solve`].

use std::fmt;

use crate::types::{Assignment, Lit, Var};

pub mod dpll;
pub use dpll::Dpll;

/// Outcome of a solving query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// The query was found satisfiable.
    Sat,
    /// The query was found unsatisfiable (possibly only under the given
    /// assumptions).
    Unsat,
    /// A conflict, wall-time or deterministic-time budget was hit first.
    LimitReached,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Sat => write!(f, "SAT"),
            SolveStatus::Unsat => write!(f, "UNSAT"),
            SolveStatus::LimitReached => write!(f, "LIMIT"),
        }
    }
}

/// Per-call solver parameters
///
/// All limits are honored cooperatively by the solver; a hit limit surfaces
/// as [`SolveStatus::LimitReached`] with the solver state left consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverParameters {
    /// Conflict budget for a single solving query
    pub max_number_of_conflicts: u64,
    /// Wall-clock budget in seconds for a single solving query
    pub max_time_in_seconds: f64,
    /// Deterministic-time budget for a single solving query
    pub max_deterministic_time: f64,
    /// Seed forwarded to any randomized tie-breaking the solver performs
    pub random_seed: i32,
}

impl Default for SolverParameters {
    fn default() -> Self {
        SolverParameters {
            max_number_of_conflicts: u64::MAX,
            max_time_in_seconds: f64::INFINITY,
            max_deterministic_time: f64::INFINITY,
            random_seed: 0,
        }
    }
}

/// Trait for assumption-capable SAT solvers usable with this library.
///
/// The decision procedure itself (propagation, conflict handling, search) is
/// entirely behind this interface; the library only relies on the contracts
/// documented per method.
pub trait Solve {
    /// Sets the number of variables. Only growing the variable count is
    /// supported.
    fn set_num_variables(&mut self, n_vars: usize);

    /// Gets the number of variables known to the solver
    fn num_variables(&self) -> usize;

    /// Creates a fresh variable
    fn new_variable(&mut self) -> Var;

    /// Adds a clause to the solver. Returns false if the clause makes the
    /// formula unsatisfiable at the root level.
    fn add_clause(&mut self, lits: &[Lit]) -> bool;

    /// Adds a unit clause. Returns false on a root-level conflict.
    fn add_unit_clause(&mut self, lit: Lit) -> bool {
        self.add_clause(&[lit])
    }

    /// Backtracks to a given decision level
    fn backtrack(&mut self, level: usize);

    /// Gets the current decision level
    fn current_decision_level(&self) -> usize;

    /// Gets the current (partial) assignment
    fn assignment(&self) -> &Assignment;

    /// Gets the propagation trail: all currently assigned literals in
    /// assignment order
    fn literal_trail(&self) -> &[Lit];

    /// Enqueues a decision and propagates it. If propagation conflicts, the
    /// solver backjumps to the root and fixes the negation of the decision
    /// there, leaving the decision level at 0.
    fn enqueue_decision_and_backjump_on_conflict(&mut self, lit: Lit);

    /// Backtracks to the root, installs the given assumptions and solves.
    /// Unsatisfiability may be caused by the assumptions; the responsible
    /// subset is available via [`Solve::last_incompatible_decisions`].
    fn reset_and_solve_with_assumptions(&mut self, assumptions: &[Lit]) -> SolveStatus;

    /// Continues solving under the assumptions given to the last
    /// [`Solve::reset_and_solve_with_assumptions`] call
    fn solve(&mut self) -> SolveStatus;

    /// After an [`SolveStatus::Unsat`] answer under assumptions, gets the
    /// subset of assumption literals sufficient for infeasibility, in
    /// assumption order
    fn last_incompatible_decisions(&self) -> Vec<Lit>;

    /// Total number of conflicts encountered over the lifetime of the solver
    fn num_failures(&self) -> u64;

    /// Monotone deterministic-time counter, a platform-independent proxy for
    /// work performed
    fn deterministic_time(&self) -> f64;

    /// Sets the per-call parameters
    fn set_parameters(&mut self, parameters: SolverParameters);

    /// Gets the current per-call parameters
    fn parameters(&self) -> &SolverParameters;
}
