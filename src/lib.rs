//! # boolopt - Boolean Optimization Building Blocks
//!
//! Two tightly coupled cores of a Boolean-optimization toolkit:
//!
//! - a **clause-database presolver/postsolver pair** that simplifies a CNF
//!   formula by subsumption, self-subsuming resolution, bounded variable
//!   elimination, blocked-clause elimination and equivalent-literal probing,
//!   while recording enough information to reconstruct a solution of the
//!   original formula from a solution of the simplified one;
//! - a **core-guided MaxSAT optimizer** that minimizes a weighted objective
//!   by repeatedly invoking an underlying SAT solver under assumption
//!   literals and refining a lower bound from UNSAT cores.
//!
//! The underlying SAT decision procedure is consumed through the narrow
//! [`solvers::Solve`] contract; the bundled [`solvers::Dpll`] reference
//! implementation is enough to use the library stand-alone.
//!
//! ## Example
//!
//! ```
//! use boolopt::{
//!     lit,
//!     postsolve::SatPostsolver,
//!     presolve::SatPresolver,
//!     solvers::{Dpll, Solve, SolveStatus},
//!     Parameters,
//! };
//!
//! let mut postsolver = SatPostsolver::new(3);
//! let mut presolver = SatPresolver::new(&mut postsolver, &Parameters::default());
//! presolver.add_clause(&[lit![0], lit![1]]);
//! presolver.add_clause(&[lit![0], lit![1], lit![2]]);
//! presolver.presolve().unwrap();
//!
//! // solve the reduced formula and map the model back
//! let mut solver = Dpll::new();
//! presolver.load_problem_into_sat_solver(&mut solver);
//! assert_eq!(solver.reset_and_solve_with_assumptions(&[]), SolveStatus::Sat);
//! let solution = postsolver.extract_and_postsolve(&solver);
//! assert!(solution[0] || solution[1]);
//! ```

#![warn(clippy::pedantic)]
#![warn(missing_docs)]

use thiserror::Error;

pub mod encodings;
pub mod optimize;
pub mod postsolve;
pub mod presolve;
pub mod probing;
pub mod solvers;
pub mod types;

/// Error returned when presolving proves the formula unsatisfiable (a clause
/// became empty through strengthening)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("formula is unsatisfiable")]
pub struct Unsat;

/// Tuning parameters recognized across the library
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    /// Per-call SAT conflict budget of the core-guided optimizer
    pub max_number_of_conflicts_in_random_lns: u64,
    /// Seed forwarded to the SAT solver
    pub random_seed: i32,
    /// Abort eliminating a variable when the product of its occurrence-list
    /// sizes exceeds this
    pub presolve_bve_threshold: usize,
    /// Additive per-clause cost in the variable-elimination budget
    pub presolve_bve_clause_weight: usize,
    /// Deterministic-time deadline for equivalent-literal probing
    pub presolve_probing_deterministic_time_limit: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            max_number_of_conflicts_in_random_lns: 2500,
            random_seed: 8,
            presolve_bve_threshold: 500,
            presolve_bve_clause_weight: 3,
            presolve_probing_deterministic_time_limit: 30.0,
        }
    }
}
