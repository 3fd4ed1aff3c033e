//! # Postsolver
//!
//! Records, for each destructive presolve step, an associated literal and the
//! clause that justified it, and later reconstructs a satisfying assignment
//! of the original formula from a solution of the simplified one by replaying
//! the log in reverse.

use crate::{
    solvers::Solve,
    types::{Assignment, Lit, TernaryVal, Var},
};

/// The reverse-mapping table and replay log of a presolve/probe session.
///
/// All literals handed to [`SatPostsolver::add`] and
/// [`SatPostsolver::fix_variable`] are in the *current internal* namespace;
/// they are translated into the external namespace through the reverse
/// mapping at recording time. The log itself is append-only.
pub struct SatPostsolver {
    /// Maps a live internal variable to the external variable it stands for.
    /// Stays at the external size forever; indices of eliminated variables
    /// turn to `None` when a mapping is applied.
    reverse_mapping: Vec<Option<Var>>,
    /// Per log entry, the literal to set true if the recorded clause is not
    /// already satisfied during replay
    associated_literal: Vec<Lit>,
    /// Start of each log entry in `clause_literals`
    clause_starts: Vec<usize>,
    /// Concatenated literal sequences of all recorded clauses
    clause_literals: Vec<Lit>,
    /// Literals fixed by probing, applied before replay
    assignment: Assignment,
}

impl SatPostsolver {
    /// Creates a postsolver for a formula over `num_variables` external
    /// variables, with the identity reverse mapping
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(num_variables: usize) -> Self {
        SatPostsolver {
            reverse_mapping: (0..num_variables)
                .map(|idx| Some(Var::new(idx as u32)))
                .collect(),
            associated_literal: Vec::new(),
            clause_starts: Vec::new(),
            clause_literals: Vec::new(),
            assignment: Assignment::new(num_variables),
        }
    }

    /// Number of external variables
    #[must_use]
    pub fn num_variables(&self) -> usize {
        self.reverse_mapping.len()
    }

    /// Number of entries in the replay log
    #[must_use]
    pub fn num_log_entries(&self) -> usize {
        self.clause_starts.len()
    }

    /// Appends a log entry: `clause` was deleted and is justified by the
    /// associated literal `x`. Both are remapped to the external namespace
    /// before being stored.
    ///
    /// # Panics
    ///
    /// If the clause is empty, or if `x` is not in the clause (debug builds).
    pub fn add(&mut self, x: Lit, clause: &[Lit]) {
        assert!(!clause.is_empty(), "empty clause in postsolve log");
        debug_assert!(clause.contains(&x));
        self.associated_literal.push(self.apply_reverse_mapping(x));
        self.clause_starts.push(self.clause_literals.len());
        for &l in clause {
            self.clause_literals.push(self.apply_reverse_mapping(l));
        }
    }

    /// Asserts a literal fixed by probing in the internal assignment store
    ///
    /// # Panics
    ///
    /// If the underlying variable is already assigned.
    pub fn fix_variable(&mut self, x: Lit) {
        let l = self.apply_reverse_mapping(x);
        assert!(
            !self.assignment.lit_is_assigned(l),
            "fixing an already assigned variable"
        );
        self.assignment.assign_lit(l);
    }

    /// Composes the reverse mapping with the inverse of `mapping`, where
    /// `mapping[v]` is the new internal variable that old internal variable
    /// `v` became (`None` for eliminated variables).
    ///
    /// # Panics
    ///
    /// If the composition is not an injection on live variables or maps
    /// through an eliminated variable.
    pub fn apply_mapping(&mut self, mapping: &[Option<Var>]) {
        let mut new_mapping: Vec<Option<Var>> = vec![None; self.reverse_mapping.len()];
        for (v, &image) in mapping.iter().enumerate() {
            let Some(image) = image else {
                continue;
            };
            assert!(
                new_mapping[image.idx()].is_none(),
                "variable mapping is not an injection"
            );
            assert!(v < self.reverse_mapping.len());
            let external = self.reverse_mapping[v];
            assert!(external.is_some(), "mapping a dead variable");
            new_mapping[image.idx()] = external;
        }
        self.reverse_mapping = new_mapping;
    }

    /// Translates an internal literal into the external namespace
    ///
    /// # Panics
    ///
    /// If the underlying variable has no external image.
    #[must_use]
    pub fn apply_reverse_mapping(&self, l: Lit) -> Lit {
        assert!(l.vidx() < self.reverse_mapping.len());
        let image = self.reverse_mapping[l.vidx()].expect("literal with no external image");
        image.lit(l.is_neg())
    }

    /// Completes `assignment` (over external variables) into a model of the
    /// original formula by reverse replay of the log.
    ///
    /// Every variable unassigned on entry is first set to true; then, walking
    /// the log backwards, the associated literal of each entry whose clause
    /// is not yet satisfied is forced to true.
    pub fn postsolve(&self, assignment: &mut Assignment) {
        for idx in 0..self.reverse_mapping.len() {
            #[allow(clippy::cast_possible_truncation)]
            let var = Var::new(idx as u32);
            if assignment.var_value(var) == TernaryVal::DontCare {
                assignment.assign_var(var, TernaryVal::True);
            }
        }

        let mut previous_start = self.clause_literals.len();
        for i in (0..self.clause_starts.len()).rev() {
            let start = self.clause_starts[i];
            let satisfied = self.clause_literals[start..previous_start]
                .iter()
                .any(|&l| assignment.lit_is_true(l));
            previous_start = start;
            if !satisfied {
                let x = self.associated_literal[i];
                assignment.unassign_var(x.var());
                assignment.assign_lit(x);
            }
        }
    }

    /// Seeds the internal assignment from a solution of the reduced formula
    /// (one value per live internal variable, via the reverse mapping), runs
    /// [`SatPostsolver::postsolve`] and returns the external solution.
    ///
    /// # Panics
    ///
    /// If a reduced variable has no external image or its image was already
    /// fixed by probing.
    #[must_use]
    pub fn postsolve_solution(&self, solution: &[bool]) -> Vec<bool> {
        let mut assignment = self.assignment.clone();
        for (v, &value) in solution.iter().enumerate() {
            assert!(v < self.reverse_mapping.len());
            let external = self.reverse_mapping[v].expect("solution value for a dead variable");
            assert!(
                !assignment.lit_is_assigned(external.pos_lit()),
                "solution value for a variable fixed by probing"
            );
            assignment.assign_var(external, TernaryVal::from(value));
        }
        self.postsolve(&mut assignment);
        #[allow(clippy::cast_possible_truncation)]
        let solution = (0..self.reverse_mapping.len())
            .map(|idx| assignment.lit_is_true(Lit::new(idx as u32, false)))
            .collect();
        solution
    }

    /// Pulls the full assignment out of a solver that just answered SAT on
    /// the reduced formula and postsolves it
    ///
    /// # Panics
    ///
    /// If the solver leaves variables unassigned.
    #[must_use]
    pub fn extract_and_postsolve<S: Solve>(&self, solver: &S) -> Vec<bool> {
        let solution: Vec<bool> = (0..solver.num_variables())
            .map(|idx| {
                #[allow(clippy::cast_possible_truncation)]
                let lit = Lit::new(idx as u32, false);
                assert!(
                    solver.assignment().lit_is_assigned(lit),
                    "solver left a variable unassigned"
                );
                solver.assignment().lit_is_true(lit)
            })
            .collect();
        self.postsolve_solution(&solution)
    }
}
