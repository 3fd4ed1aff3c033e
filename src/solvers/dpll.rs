//! # Reference Trail-Based Solver
//!
//! A small DPLL solver with assumption handling, chronological backtracking
//! and failed-assumption cores. It implements the full [`Solve`] contract so
//! the presolver, prober and optimizer can be exercised end-to-end, but it
//! performs no conflict analysis or clause learning and is not meant to be
//! competitive.

use std::time::Instant;

use crate::types::{Assignment, Clause, Lit, TernaryVal, Var};

use super::{Solve, SolveStatus, SolverParameters};

/// Deterministic time charged per scanned clause during propagation
const DT_PER_CLAUSE_SCAN: f64 = 1e-6;

/// A trail-based DPLL solver over a clause list
#[derive(Default)]
pub struct Dpll {
    params: SolverParameters,
    n_vars: usize,
    clauses: Vec<Clause>,
    assignment: Assignment,
    trail: Vec<Lit>,
    /// Trail index at which each decision level starts; the decision literal
    /// of level `d` is `trail[decision_starts[d - 1]]`
    decision_starts: Vec<usize>,
    assumptions: Vec<Lit>,
    core: Vec<Lit>,
    num_failures: u64,
    dtime: f64,
    /// Set once the formula is unsatisfiable at the root level
    root_conflict: bool,
}

impl Dpll {
    /// Creates an empty solver
    #[must_use]
    pub fn new() -> Self {
        Dpll::default()
    }

    /// Number of clauses currently loaded
    #[must_use]
    pub fn num_clauses(&self) -> usize {
        self.clauses.len()
    }

    fn assign(&mut self, lit: Lit) {
        debug_assert!(!self.assignment.lit_is_assigned(lit));
        self.assignment.assign_lit(lit);
        self.trail.push(lit);
    }

    fn decide(&mut self, lit: Lit) {
        self.decision_starts.push(self.trail.len());
        self.assign(lit);
    }

    /// Unit propagation to fixpoint by repeated clause scans. Returns false
    /// on conflict, leaving the trail as far as propagation got.
    fn propagate(&mut self) -> bool {
        loop {
            let mut fixed_point = true;
            for ci in 0..self.clauses.len() {
                self.dtime += DT_PER_CLAUSE_SCAN;
                let mut unassigned = None;
                let mut satisfied = false;
                for &l in self.clauses[ci].iter() {
                    match self.assignment.lit_value(l) {
                        TernaryVal::True => {
                            satisfied = true;
                            break;
                        }
                        TernaryVal::DontCare => {
                            if unassigned.replace(l).is_some() {
                                // two unassigned literals, nothing to propagate
                                satisfied = true;
                                break;
                            }
                        }
                        TernaryVal::False => {}
                    }
                }
                if satisfied {
                    continue;
                }
                match unassigned {
                    None => return false,
                    Some(l) => {
                        self.assign(l);
                        fixed_point = false;
                    }
                }
            }
            if fixed_point {
                return true;
            }
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn pick_branch(&self) -> Option<Var> {
        (0..self.n_vars)
            .map(|idx| Var::new(idx as u32))
            .find(|&v| self.assignment.var_value(v) == TernaryVal::DontCare)
    }

    /// Installs the stored assumptions as the first decision levels and runs
    /// the search
    fn search(&mut self) -> SolveStatus {
        if self.root_conflict {
            self.core.clear();
            return SolveStatus::Unsat;
        }
        self.backtrack(0);
        if !self.propagate() {
            self.root_conflict = true;
            self.core.clear();
            return SolveStatus::Unsat;
        }

        let start_failures = self.num_failures;
        let start_dtime = self.dtime;
        let start_wall = Instant::now();

        let assumptions = std::mem::take(&mut self.assumptions);
        for (idx, &a) in assumptions.iter().enumerate() {
            if self.assignment.lit_is_true(a) {
                continue;
            }
            let conflict = if self.assignment.lit_is_false(a) {
                true
            } else {
                self.decide(a);
                !self.propagate()
            };
            if conflict {
                self.num_failures += 1;
                self.core = assumptions[..=idx].to_vec();
                self.assumptions = assumptions;
                return SolveStatus::Unsat;
            }
        }
        self.assumptions = assumptions;
        let assumption_levels = self.decision_starts.len();

        // Chronological DPLL over the remaining variables. `flipped` tracks,
        // per level beyond the assumptions, whether the second phase of the
        // decision variable has already been tried.
        let mut flipped: Vec<bool> = Vec::new();
        loop {
            if self.num_failures - start_failures >= self.params.max_number_of_conflicts
                || self.dtime - start_dtime > self.params.max_deterministic_time
                || start_wall.elapsed().as_secs_f64() > self.params.max_time_in_seconds
            {
                return SolveStatus::LimitReached;
            }
            if self.propagate() {
                let Some(var) = self.pick_branch() else {
                    return SolveStatus::Sat;
                };
                self.decide(var.pos_lit());
                flipped.push(false);
                continue;
            }
            self.num_failures += 1;
            loop {
                if self.decision_starts.len() <= assumption_levels {
                    // Conflict cannot be resolved without dropping an
                    // assumption
                    self.core.clone_from(&self.assumptions);
                    return SolveStatus::Unsat;
                }
                let level_start = self.decision_starts[self.decision_starts.len() - 1];
                let decision = self.trail[level_start];
                let was_flipped = flipped.pop().expect("level without flip record");
                self.backtrack(self.decision_starts.len() - 1);
                if !was_flipped {
                    self.decide(!decision);
                    flipped.push(true);
                    break;
                }
            }
        }
    }
}

impl Solve for Dpll {
    fn set_num_variables(&mut self, n_vars: usize) {
        debug_assert!(n_vars >= self.n_vars, "shrinking the variable count");
        self.n_vars = n_vars;
    }

    fn num_variables(&self) -> usize {
        self.n_vars
    }

    fn new_variable(&mut self) -> Var {
        let var = Var::new(u32::try_from(self.n_vars).expect("variable index too high"));
        self.n_vars += 1;
        var
    }

    fn add_clause(&mut self, lits: &[Lit]) -> bool {
        if self.root_conflict {
            return false;
        }
        debug_assert_eq!(self.current_decision_level(), 0);
        let Some(clause) = Clause::from(lits).normalize() else {
            // tautology
            return true;
        };
        if clause.is_empty() {
            self.root_conflict = true;
            return false;
        }
        for l in clause.iter() {
            if l.vidx() >= self.n_vars {
                self.n_vars = l.vidx() + 1;
            }
        }
        self.clauses.push(clause);
        if !self.propagate() {
            self.num_failures += 1;
            self.root_conflict = true;
            return false;
        }
        true
    }

    fn backtrack(&mut self, level: usize) {
        while self.decision_starts.len() > level {
            let start = self.decision_starts.pop().expect("no decision level");
            while self.trail.len() > start {
                let lit = self.trail.pop().expect("trail shorter than level start");
                self.assignment.unassign_var(lit.var());
            }
        }
    }

    fn current_decision_level(&self) -> usize {
        self.decision_starts.len()
    }

    fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    fn literal_trail(&self) -> &[Lit] {
        &self.trail
    }

    fn enqueue_decision_and_backjump_on_conflict(&mut self, lit: Lit) {
        debug_assert_eq!(self.current_decision_level(), 0);
        if self.root_conflict || self.assignment.lit_is_assigned(lit) {
            return;
        }
        self.decide(lit);
        if !self.propagate() {
            self.num_failures += 1;
            self.backtrack(0);
            // failed literal, fix the negation at the root
            self.add_clause(&[!lit]);
        }
    }

    fn reset_and_solve_with_assumptions(&mut self, assumptions: &[Lit]) -> SolveStatus {
        self.assumptions = assumptions.to_vec();
        let status = self.search();
        log::trace!(
            "dpll: solve under {} assumptions -> {}",
            assumptions.len(),
            status
        );
        status
    }

    fn solve(&mut self) -> SolveStatus {
        self.search()
    }

    fn last_incompatible_decisions(&self) -> Vec<Lit> {
        self.core.clone()
    }

    fn num_failures(&self) -> u64 {
        self.num_failures
    }

    fn deterministic_time(&self) -> f64 {
        self.dtime
    }

    fn set_parameters(&mut self, parameters: SolverParameters) {
        self.params = parameters;
    }

    fn parameters(&self) -> &SolverParameters {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::{Dpll, Solve, SolveStatus};
    use crate::lit;

    #[test]
    fn simple_sat() {
        let mut solver = Dpll::new();
        solver.add_clause(&[lit![0], lit![1]]);
        solver.add_clause(&[!lit![0], lit![1]]);
        assert_eq!(
            solver.reset_and_solve_with_assumptions(&[]),
            SolveStatus::Sat
        );
        assert!(solver.assignment().lit_is_true(lit![1]));
    }

    #[test]
    fn simple_unsat() {
        let mut solver = Dpll::new();
        solver.add_clause(&[lit![0], lit![1]]);
        solver.add_clause(&[lit![0], !lit![1]]);
        solver.add_clause(&[!lit![0], lit![1]]);
        solver.add_clause(&[!lit![0], !lit![1]]);
        assert_eq!(
            solver.reset_and_solve_with_assumptions(&[]),
            SolveStatus::Unsat
        );
    }

    #[test]
    fn assumption_core() {
        let mut solver = Dpll::new();
        solver.add_clause(&[lit![0], lit![1], lit![2]]);
        let status = solver.reset_and_solve_with_assumptions(&[!lit![0], !lit![1], !lit![2]]);
        assert_eq!(status, SolveStatus::Unsat);
        let core = solver.last_incompatible_decisions();
        assert!(!core.is_empty());
        assert!(core.iter().all(|l| [!lit![0], !lit![1], !lit![2]].contains(l)));
    }

    #[test]
    fn root_units_propagate() {
        let mut solver = Dpll::new();
        solver.add_clause(&[lit![0]]);
        solver.add_clause(&[!lit![0], lit![1]]);
        assert!(solver.assignment().lit_is_true(lit![1]));
        assert_eq!(solver.current_decision_level(), 0);
    }

    #[test]
    fn failed_literal_is_fixed() {
        let mut solver = Dpll::new();
        solver.add_clause(&[!lit![0], lit![1]]);
        solver.add_clause(&[!lit![0], !lit![1]]);
        solver.enqueue_decision_and_backjump_on_conflict(lit![0]);
        assert_eq!(solver.current_decision_level(), 0);
        assert!(solver.assignment().lit_is_false(lit![0]));
    }

    #[test]
    fn conflict_budget() {
        let mut solver = Dpll::new();
        // unsatisfiable pigeonhole-ish instance that needs several conflicts
        for a in [lit![0], !lit![0]] {
            for b in [lit![1], !lit![1]] {
                for c in [lit![2], !lit![2]] {
                    solver.add_clause(&[a, b, c]);
                }
            }
        }
        solver.set_parameters(super::SolverParameters {
            max_number_of_conflicts: 1,
            ..Default::default()
        });
        assert_eq!(
            solver.reset_and_solve_with_assumptions(&[]),
            SolveStatus::LimitReached
        );
    }
}
