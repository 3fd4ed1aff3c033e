//! # Presolver
//!
//! Simplifies a clause database by subsumption, self-subsuming resolution,
//! bounded variable elimination and blocked-clause elimination, recording
//! every destructive step with the [`SatPostsolver`] so that a model of the
//! reduced formula can be mapped back to a model of the original.
//!
//! The driver alternates two phases until fixpoint: draining a clause queue
//! through [`SatPresolver::process_clause_to_simplify_others`], then popping
//! variables from a priority queue ordered by occurrence count and trying to
//! eliminate them with [`SatPresolver::cross_product`].

use std::collections::VecDeque;

use crate::{
    postsolve::SatPostsolver,
    solvers::Solve,
    types::{Clause, ClauseIdx, Lit, Var},
    Parameters, Unsat,
};

pub mod occurrences;
pub mod primitives;
pub mod var_queue;

use occurrences::OccurrenceLists;
use primitives::{compute_resolvent, compute_resolvent_size, simplify_clause, ClauseSimplification};
use var_queue::VarPriorityQueue;

/// Aggregate statistics over the live clause database
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresolveStats {
    /// Live (non-deleted) clauses
    pub num_clauses: usize,
    /// Literals over all live clauses
    pub num_literals: usize,
    /// Variables with at least one occurrence
    pub num_variables: usize,
    /// Variables occurring in one polarity only
    pub num_one_sided_variables: usize,
    /// Variables with exactly one occurrence in some polarity
    pub num_simple_definitions: usize,
    /// Live unit clauses
    pub num_singleton_clauses: usize,
    /// Tautologies dropped on insertion
    pub num_trivial_clauses: usize,
}

/// The clause-database presolver
///
/// Destructive steps push their justification to the borrowed postsolver;
/// once [`SatPresolver::load_problem_into_sat_solver`] has been called the
/// presolver is spent and only the postsolver remains of interest.
pub struct SatPresolver<'p> {
    postsolver: &'p mut SatPostsolver,
    clauses: Vec<Clause>,
    /// Queue of clauses to use for simplifying others, with a dedup bitmap
    clause_to_process: VecDeque<ClauseIdx>,
    in_clause_to_process: Vec<bool>,
    occs: OccurrenceLists,
    var_pq: VarPriorityQueue,
    /// Literal-to-representative mapping from equivalence probing, applied to
    /// every added clause; empty means identity
    equiv_mapping: Vec<Lit>,
    bve_threshold: usize,
    bve_clause_weight: usize,
    num_trivial_clauses: usize,
}

impl<'p> SatPresolver<'p> {
    /// Creates a presolver over an empty clause database
    pub fn new(postsolver: &'p mut SatPostsolver, params: &Parameters) -> Self {
        SatPresolver {
            postsolver,
            clauses: Vec::new(),
            clause_to_process: VecDeque::new(),
            in_clause_to_process: Vec::new(),
            occs: OccurrenceLists::default(),
            var_pq: VarPriorityQueue::default(),
            equiv_mapping: Vec::new(),
            bve_threshold: params.presolve_bve_threshold,
            bve_clause_weight: params.presolve_bve_clause_weight,
            num_trivial_clauses: 0,
        }
    }

    /// Installs a literal-to-representative mapping (indexed by literal
    /// index) that is applied to every subsequently added clause
    pub fn set_equivalent_literal_mapping(&mut self, mapping: Vec<Lit>) {
        self.equiv_mapping = mapping;
    }

    /// Number of variables the database ranges over
    #[must_use]
    pub fn num_variables(&self) -> usize {
        self.occs.num_variables()
    }

    /// Exact number of live clauses containing `lit`
    #[must_use]
    pub fn occurrence_count(&self, lit: Lit) -> usize {
        self.occs.occ_size(lit)
    }

    /// Adds a binary clause to the database
    pub fn add_binary_clause(&mut self, a: Lit, b: Lit) {
        self.add_clause(&[a, b]);
    }

    /// Adds a clause to the database: applies the equivalence mapping if one
    /// is installed, normalizes, drops tautologies, registers occurrences and
    /// marks the clause for processing
    ///
    /// # Panics
    ///
    /// If `lits` is empty.
    pub fn add_clause(&mut self, lits: &[Lit]) {
        assert!(!lits.is_empty(), "added an empty clause to the presolver");
        let mut lits = lits.to_vec();
        if !self.equiv_mapping.is_empty() {
            for l in &mut lits {
                *l = self.equiv_mapping[l.lidx()];
            }
        }
        let Some(clause) = Clause::from(lits).normalize() else {
            self.num_trivial_clauses += 1;
            return;
        };
        self.occs.grow_for(clause[clause.len() - 1].var());
        self.push_clause(clause);
    }

    /// Fast path for clauses that are known normalized (resolvents produced
    /// by [`compute_resolvent`] come out of the merge sorted and clean)
    fn add_clause_internal(&mut self, lits: &[Lit]) {
        assert!(!lits.is_empty(), "empty resolvent, missed an unsat case");
        let clause = Clause::from(lits);
        debug_assert!(clause.is_normalized());
        self.push_clause(clause);
    }

    fn push_clause(&mut self, clause: Clause) {
        let ci = ClauseIdx(self.clauses.len());
        self.occs.attach(&clause, ci);
        self.clauses.push(clause);
        self.in_clause_to_process.push(true);
        self.clause_to_process.push_back(ci);
    }

    /// Runs subsumption/strengthening and bounded variable elimination to
    /// fixpoint
    ///
    /// # Errors
    ///
    /// [`Unsat`] if a clause became empty through strengthening.
    pub fn presolve(&mut self) -> Result<(), Unsat> {
        log::debug!("num trivial clauses: {}", self.num_trivial_clauses);
        self.log_stats();

        self.process_all_clauses()?;
        self.log_stats();

        self.initialize_priority_queue();
        while let Some(var) = self.var_pq.pop() {
            if self.cross_product(var.pos_lit()) {
                self.process_all_clauses()?;
            }
        }

        self.log_stats();
        Ok(())
    }

    /// Drains the clause queue
    ///
    /// # Errors
    ///
    /// [`Unsat`] if a clause became empty through strengthening.
    pub fn process_all_clauses(&mut self) -> Result<(), Unsat> {
        while let Some(ci) = self.clause_to_process.pop_front() {
            self.in_clause_to_process[ci.0] = false;
            self.process_clause_to_simplify_others(ci)?;
        }
        Ok(())
    }

    /// Uses the clause `ci` to subsume or strengthen the clauses sharing a
    /// literal with it, scanning the occurrence lists of its pivot (the
    /// contained literal with the shortest list) and of the pivot's negation
    ///
    /// # Errors
    ///
    /// [`Unsat`] if a clause became empty through strengthening.
    pub fn process_clause_to_simplify_others(&mut self, ci: ClauseIdx) -> Result<(), Unsat> {
        if self.clauses[ci.0].is_empty() {
            return Ok(());
        }
        debug_assert!(self.clauses[ci.0].is_normalized());
        let lit = self.find_literal_with_shortest_occurrence_list(&self.clauses[ci.0]);

        // Simplify the clauses containing the pivot. Deleted clauses are
        // skipped here and compacted out of the list afterwards.
        for idx in 0..self.occs.list(lit).len() {
            let di = self.occs.list(lit)[idx];
            if di == ci || self.clauses[di.0].is_empty() {
                continue;
            }
            let (a, b) = both_clauses(&mut self.clauses, ci, di);
            match simplify_clause(a, b) {
                ClauseSimplification::Unchanged => {}
                ClauseSimplification::Subsumed => self.remove(di),
                ClauseSimplification::Strengthened(opp) => {
                    debug_assert_ne!(opp.var(), lit.var());
                    if self.clauses[di.0].is_empty() {
                        return Err(Unsat);
                    }
                    // The strengthened clause no longer occurs under `opp`;
                    // that list cannot be the one being scanned.
                    self.occs.remove_occurrence(opp, di);
                    self.update_priority_queue(opp.var());
                    self.enqueue_clause(di);
                }
            }
        }
        let expected = self.occs.occ_size(lit);
        let Self { occs, clauses, .. } = self;
        occs.compact(lit, |di| clauses[di.0].contains(lit));
        debug_assert_eq!(self.occs.occ_size(lit), expected);

        // Now treat the clauses containing the negated pivot. The only
        // possible polarity mismatch is the pivot itself, so every hit is a
        // self-subsuming resolution removing the negated pivot.
        let nlit = !lit;
        let mut something_removed = false;
        for idx in 0..self.occs.list(nlit).len() {
            let di = self.occs.list(nlit)[idx];
            if self.clauses[di.0].is_empty() {
                continue;
            }
            debug_assert_ne!(di, ci);
            let (a, b) = both_clauses(&mut self.clauses, ci, di);
            match simplify_clause(a, b) {
                ClauseSimplification::Unchanged => {}
                ClauseSimplification::Subsumed => {
                    unreachable!("clause containing the negated pivot cannot be subsumed")
                }
                ClauseSimplification::Strengthened(opp) => {
                    debug_assert_eq!(opp, nlit);
                    if self.clauses[di.0].is_empty() {
                        return Err(Unsat);
                    }
                    self.enqueue_clause(di);
                    something_removed = true;
                }
            }
        }
        let Self { occs, clauses, .. } = self;
        occs.compact(nlit, |di| clauses[di.0].contains(nlit));
        if something_removed {
            self.update_priority_queue(lit.var());
        }
        Ok(())
    }

    /// Tries to eliminate the variable of `x` by replacing all clauses
    /// containing it with their pairwise resolvents (bounded variable
    /// elimination), removing blocked clauses found along the way.
    ///
    /// Elimination is gated twice: skipped entirely when the occurrence-list
    /// product exceeds the threshold parameter, and aborted when the summed
    /// resolvent cost exceeds the cost of the clauses it would replace.
    ///
    /// Returns true iff work was done (the variable was eliminated or a
    /// blocked clause was removed), in which case the clause queue needs
    /// draining again.
    pub fn cross_product(&mut self, x: Lit) -> bool {
        let s1 = self.occs.occ_size(x);
        let s2 = self.occs.occ_size(!x);

        if s1 == 0 && s2 == 0 {
            return false;
        }
        if s1 > 1 && s2 > 1 && s1 * s2 > self.bve_threshold {
            return false;
        }

        // Cost of the clauses that elimination would delete
        let mut threshold = 0;
        for lit in [x, !x] {
            for idx in 0..self.occs.list(lit).len() {
                let ci = self.occs.list(lit)[idx];
                if !self.clauses[ci.0].is_empty() {
                    threshold += self.bve_clause_weight + self.clauses[ci.0].len();
                }
            }
        }

        // For the blocked-clause scan, prefer the negated side to be small
        let x = if s1 < s2 { !x } else { x };

        let mut work_done = false;
        let mut size = 0;
        for idx_i in 0..self.occs.list(x).len() {
            let i = self.occs.list(x)[idx_i];
            if self.clauses[i.0].is_empty() {
                continue;
            }
            let mut no_resolvent = true;
            for idx_j in 0..self.occs.list(!x).len() {
                let j = self.occs.list(!x)[idx_j];
                if self.clauses[j.0].is_empty() {
                    continue;
                }
                if let Some(rs) = compute_resolvent_size(x, &self.clauses[i.0], &self.clauses[j.0])
                {
                    no_resolvent = false;
                    size += self.bve_clause_weight + rs;
                    if size > threshold {
                        return work_done;
                    }
                }
            }
            if no_resolvent {
                // Every resolvent of this clause on `x` is tautological, so
                // the clause is blocked and can be removed on its own.
                self.remove_and_register_for_postsolve(i, x);
                work_done = true;
            }
        }

        // The budget survived: add all resolvents, then delete the clauses
        // containing the variable. The priority queue is only updated during
        // the deletions.
        let mut temp = Vec::new();
        for idx_i in 0..self.occs.list(x).len() {
            let i = self.occs.list(x)[idx_i];
            if self.clauses[i.0].is_empty() {
                continue;
            }
            for idx_j in 0..self.occs.list(!x).len() {
                let j = self.occs.list(!x)[idx_j];
                if self.clauses[j.0].is_empty() {
                    continue;
                }
                if compute_resolvent(x, &self.clauses[i.0], &self.clauses[j.0], &mut temp) {
                    self.add_clause_internal(&temp);
                }
            }
        }

        self.remove_all_clauses_containing(x);
        self.remove_all_clauses_containing(!x);
        true
    }

    /// Deletes a clause that is implied by the remaining database (no
    /// postsolve entry needed)
    fn remove(&mut self, ci: ClauseIdx) {
        let clause = std::mem::take(&mut self.clauses[ci.0]);
        for &l in &clause {
            self.occs.decrement(l);
            self.update_priority_queue(l.var());
        }
    }

    /// Deletes a clause whose satisfaction postsolve must restore, recording
    /// it with `x` as the associated literal
    fn remove_and_register_for_postsolve(&mut self, ci: ClauseIdx, x: Lit) {
        let clause = std::mem::take(&mut self.clauses[ci.0]);
        for &l in &clause {
            self.occs.decrement(l);
            self.update_priority_queue(l.var());
        }
        self.postsolver.add(x, &clause);
    }

    fn remove_all_clauses_containing(&mut self, x: Lit) {
        for idx in 0..self.occs.list(x).len() {
            let ci = self.occs.list(x)[idx];
            if !self.clauses[ci.0].is_empty() {
                self.remove_and_register_for_postsolve(ci, x);
            }
        }
        self.occs.clear_list(x);
    }

    fn enqueue_clause(&mut self, ci: ClauseIdx) {
        if !self.in_clause_to_process[ci.0] {
            self.in_clause_to_process[ci.0] = true;
            self.clause_to_process.push_back(ci);
        }
    }

    fn find_literal_with_shortest_occurrence_list(&self, clause: &Clause) -> Lit {
        debug_assert!(!clause.is_empty());
        let mut result = clause[0];
        for &l in clause.iter() {
            if self.occs.occ_size(l) < self.occs.occ_size(result) {
                result = l;
            }
        }
        result
    }

    fn update_priority_queue(&mut self, var: Var) {
        if !self.var_pq.is_initialized() {
            return;
        }
        let weight = self.occs.occ_size(var.pos_lit()) + self.occs.occ_size(var.neg_lit());
        self.var_pq.update(var, weight);
    }

    fn initialize_priority_queue(&mut self) {
        #[allow(clippy::cast_possible_truncation)]
        let weights = (0..self.num_variables())
            .map(|idx| {
                let var = Var::new(idx as u32);
                self.occs.occ_size(var.pos_lit()) + self.occs.occ_size(var.neg_lit())
            })
            .collect();
        self.var_pq = VarPriorityQueue::new(weights);
    }

    /// Yields a dense remap for variables with at least one remaining
    /// occurrence; unused variables map to `None`
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn variable_mapping(&self) -> Vec<Option<Var>> {
        let mut next = 0u32;
        (0..self.num_variables())
            .map(|idx| {
                let var = Var::new(idx as u32);
                if self.occs.occ_size(var.pos_lit()) > 0 || self.occs.occ_size(var.neg_lit()) > 0 {
                    let mapped = Var::new(next);
                    next += 1;
                    Some(mapped)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Consumes the clause database: applies the dense variable remap to the
    /// postsolver, then submits every live clause to the solver in remapped
    /// form. The presolver's working memory is released; only the occurrence
    /// size counters survive (they back [`SatPresolver::variable_mapping`]).
    pub fn load_problem_into_sat_solver<S: Solve>(&mut self, solver: &mut S) {
        self.var_pq.clear();
        self.in_clause_to_process = Vec::new();
        self.clause_to_process = VecDeque::new();
        self.occs.clear_lists();

        let mapping = self.variable_mapping();
        let new_size = mapping.iter().flatten().count();
        self.postsolver.apply_mapping(&mapping);

        solver.set_num_variables(new_size);
        let mut temp = Vec::new();
        for clause in &mut self.clauses {
            if clause.is_empty() {
                continue;
            }
            temp.clear();
            for &l in clause.iter() {
                let image = mapping[l.vidx()].expect("live clause over an unmapped variable");
                temp.push(image.lit(l.is_neg()));
            }
            solver.add_clause(&temp);
            clause.clear();
        }
    }

    /// Aggregate statistics over the live database
    #[must_use]
    pub fn stats(&self) -> PresolveStats {
        let mut stats = PresolveStats {
            num_trivial_clauses: self.num_trivial_clauses,
            ..PresolveStats::default()
        };
        for clause in &self.clauses {
            if !clause.is_empty() {
                if clause.len() == 1 {
                    stats.num_singleton_clauses += 1;
                }
                stats.num_clauses += 1;
                stats.num_literals += clause.len();
            }
        }
        #[allow(clippy::cast_possible_truncation)]
        for idx in 0..self.num_variables() {
            let var = Var::new(idx as u32);
            let s1 = self.occs.occ_size(var.pos_lit());
            let s2 = self.occs.occ_size(var.neg_lit());
            if s1 == 0 && s2 == 0 {
                continue;
            }
            stats.num_variables += 1;
            if s1 == 0 || s2 == 0 {
                stats.num_one_sided_variables += 1;
            } else if s1 == 1 || s2 == 1 {
                stats.num_simple_definitions += 1;
            }
        }
        stats
    }

    fn log_stats(&self) {
        let stats = self.stats();
        log::debug!(
            "clauses:{} literals:{} vars:{} one_side_vars:{} simple_definition:{} singleton_clauses:{}",
            stats.num_clauses,
            stats.num_literals,
            stats.num_variables,
            stats.num_one_sided_variables,
            stats.num_simple_definitions,
            stats.num_singleton_clauses,
        );
    }

    /// Checks the database invariants, panicking on any violation. Intended
    /// as a debugging aid after public operations.
    ///
    /// # Panics
    ///
    /// If a live clause is not normalized, an occurrence size counter is not
    /// exact, a live clause is missing from an occurrence list, or a queued
    /// variable's priority differs from its occurrence count.
    pub fn check_invariants(&self) {
        let mut exact_sizes = vec![0usize; 2 * self.num_variables()];
        for (idx, clause) in self.clauses.iter().enumerate() {
            assert!(clause.is_normalized(), "clause {idx} is not normalized");
            for &l in clause.iter() {
                exact_sizes[l.lidx()] += 1;
                assert!(
                    self.occs.list(l).contains(&ClauseIdx(idx)),
                    "clause {idx} missing from the occurrence list of {l}"
                );
            }
        }
        #[allow(clippy::cast_possible_truncation)]
        for idx in 0..self.num_variables() {
            let var = Var::new(idx as u32);
            for lit in [var.pos_lit(), var.neg_lit()] {
                assert_eq!(
                    self.occs.occ_size(lit),
                    exact_sizes[lit.lidx()],
                    "occurrence size of {lit} is not exact"
                );
            }
            if self.var_pq.contains(var) {
                assert_eq!(
                    self.var_pq.weight(var),
                    exact_sizes[var.pos_lit().lidx()] + exact_sizes[var.neg_lit().lidx()],
                    "priority of {var} out of sync with its occurrence count"
                );
            }
        }
    }
}

/// Gets the clause `ci` immutably and the clause `di` mutably at the same
/// time
fn both_clauses(clauses: &mut [Clause], ci: ClauseIdx, di: ClauseIdx) -> (&Clause, &mut Clause) {
    debug_assert_ne!(ci, di);
    if ci.0 < di.0 {
        let (left, right) = clauses.split_at_mut(di.0);
        (&left[ci.0], &mut right[0])
    } else {
        let (left, right) = clauses.split_at_mut(ci.0);
        (&right[0], &mut left[di.0])
    }
}

#[cfg(test)]
mod tests {
    use super::SatPresolver;
    use crate::{lit, postsolve::SatPostsolver, types::Lit, Parameters};

    fn presolver_with<'p>(
        postsolver: &'p mut SatPostsolver,
        clauses: &[&[Lit]],
    ) -> SatPresolver<'p> {
        let mut presolver = SatPresolver::new(postsolver, &Parameters::default());
        for cl in clauses {
            presolver.add_clause(cl);
        }
        presolver
    }

    #[test]
    fn trivial_clause_dropped() {
        let mut postsolver = SatPostsolver::new(2);
        let presolver = presolver_with(&mut postsolver, &[&[lit![0], !lit![0], lit![1]]]);
        assert_eq!(presolver.stats().num_clauses, 0);
        assert_eq!(presolver.stats().num_trivial_clauses, 1);
    }

    #[test]
    fn subsumption_during_processing() {
        let mut postsolver = SatPostsolver::new(3);
        let mut presolver = presolver_with(
            &mut postsolver,
            &[&[lit![0], lit![1]], &[lit![0], lit![1], lit![2]]],
        );
        presolver.process_all_clauses().unwrap();
        presolver.check_invariants();
        assert_eq!(presolver.stats().num_clauses, 1);
    }

    #[test]
    fn strengthening_requeues() {
        let mut postsolver = SatPostsolver::new(3);
        let mut presolver = presolver_with(
            &mut postsolver,
            &[&[lit![0], lit![1]], &[!lit![0], lit![1], lit![2]]],
        );
        presolver.process_all_clauses().unwrap();
        presolver.check_invariants();
        // (~0 | 1 | 2) strengthened to (1 | 2), which is then kept
        let stats = presolver.stats();
        assert_eq!(stats.num_clauses, 2);
        assert_eq!(stats.num_literals, 4);
    }

    #[test]
    fn unit_conflict_is_unsat() {
        let mut postsolver = SatPostsolver::new(1);
        let mut presolver = presolver_with(&mut postsolver, &[&[lit![0]], &[!lit![0]]]);
        assert!(presolver.process_all_clauses().is_err());
    }

    #[test]
    fn variable_mapping_is_dense() {
        let mut postsolver = SatPostsolver::new(3);
        let mut presolver = presolver_with(
            &mut postsolver,
            &[&[lit![0], lit![2]]],
        );
        // make room for the unused middle variable
        presolver.add_clause(&[lit![1], lit![2]]);
        presolver.remove(crate::types::ClauseIdx(1));
        let mapping = presolver.variable_mapping();
        assert_eq!(mapping[0], Some(crate::types::Var::new(0)));
        assert_eq!(mapping[1], None);
        assert_eq!(mapping[2], Some(crate::types::Var::new(1)));
    }

    #[test]
    fn cross_product_eliminates_pure_literal() {
        let mut postsolver = SatPostsolver::new(2);
        let mut presolver = presolver_with(&mut postsolver, &[&[lit![0], lit![1]]]);
        // x0 occurs only positively: no resolvents, the clause is blocked
        assert!(presolver.cross_product(lit![0]));
        presolver.check_invariants();
        assert_eq!(presolver.stats().num_clauses, 0);
        assert_eq!(postsolver.num_log_entries(), 1);
    }
}
