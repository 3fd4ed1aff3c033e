//! # Core-Guided Optimizer
//!
//! Minimizes a weighted objective over literals by repeatedly solving under
//! assumptions that forbid any violation beyond the proved lower bound. Every
//! UNSAT answer yields a core of assumption literals; the corresponding
//! encoding nodes are merged into one that concedes a single extra violation,
//! advancing the lower bound by the core's minimum weight.
//!
//! Heavy objective terms are tackled first ("stratification"): only nodes
//! whose weight reaches the current stratified threshold contribute
//! assumptions, and the threshold is lowered whenever a model is found.

use std::time::Instant;

use crate::{
    encodings::{create_initial_encoding_nodes, NodeId, NodeRepository},
    solvers::{Solve, SolveStatus, SolverParameters},
    types::{Assignment, Lit},
    Parameters,
};

/// Sentinel for an unknown upper bound
const COST_MAX: i64 = i64::MAX;

/// Exit status of an [`CoreGuidedOptimizer::optimize`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A budget ran out; call again to continue
    Continue,
    /// A new incumbent was found and the stratification threshold lowered;
    /// more calls may improve it
    SolutionFound,
    /// The incumbent is optimal
    OptimalSolutionFound,
    /// The problem has no feasible solution
    Infeasible,
}

/// Read-only view of the shared problem state the optimizer synchronizes
/// against
pub struct ProblemState {
    update_stamp: u64,
    objective: Vec<(Lit, i64)>,
    /// Best known feasible solution and its objective value (without offset)
    incumbent: Option<(Assignment, i64)>,
}

impl ProblemState {
    /// Creates a problem state for the given objective
    #[must_use]
    pub fn new(objective: Vec<(Lit, i64)>) -> Self {
        ProblemState {
            update_stamp: 1,
            objective,
            incumbent: None,
        }
    }

    /// Monotone counter bumped on every state change
    #[must_use]
    pub fn update_stamp(&self) -> u64 {
        self.update_stamp
    }

    /// The minimization objective as integer-weighted literals
    #[must_use]
    pub fn objective(&self) -> &[(Lit, i64)] {
        &self.objective
    }

    /// True if a feasible solution is known
    #[must_use]
    pub fn has_feasible_solution(&self) -> bool {
        self.incumbent.is_some()
    }

    /// Objective value of the incumbent
    ///
    /// # Panics
    ///
    /// If no feasible solution is known.
    #[must_use]
    pub fn solution_cost(&self) -> i64 {
        self.incumbent.as_ref().expect("no feasible solution").1
    }

    /// Evaluates the objective under `assignment` and installs it as the new
    /// incumbent if it improves, bumping the update stamp
    pub fn merge_solution(&mut self, assignment: &Assignment) {
        let cost = self
            .objective
            .iter()
            .map(|&(l, c)| if assignment.lit_is_true(l) { c } else { 0 })
            .sum();
        if self.incumbent.as_ref().map_or(true, |(_, old)| cost < *old) {
            self.incumbent = Some((assignment.clone(), cost));
            self.update_stamp += 1;
        }
    }
}

/// Write-only output of an optimize call
#[derive(Default)]
pub struct LearnedInfo {
    /// Proved lower bound on the objective (in the external objective scale)
    pub lower_bound: Option<i64>,
    /// Improving solution, if one was found
    pub solution: Option<Assignment>,
    /// Literals the solver has fixed at its root level
    pub fixed_literals: Vec<Lit>,
}

impl LearnedInfo {
    fn clear(&mut self) {
        self.lower_bound = None;
        self.solution = None;
        self.fixed_literals.clear();
    }
}

/// Cooperative wall-clock and deterministic-time budget for an optimize call
pub struct TimeLimit {
    start: Instant,
    wall_budget: f64,
    deterministic_budget: f64,
    deterministic_used: f64,
}

impl TimeLimit {
    /// Creates a budget with the given wall-clock and deterministic limits
    #[must_use]
    pub fn new(wall_seconds: f64, deterministic: f64) -> Self {
        TimeLimit {
            start: Instant::now(),
            wall_budget: wall_seconds,
            deterministic_budget: deterministic,
            deterministic_used: 0.0,
        }
    }

    /// An effectively unlimited budget
    #[must_use]
    pub fn unlimited() -> Self {
        TimeLimit::new(f64::INFINITY, f64::INFINITY)
    }

    /// True once either budget is spent
    #[must_use]
    pub fn limit_reached(&self) -> bool {
        self.start.elapsed().as_secs_f64() >= self.wall_budget
            || self.deterministic_used >= self.deterministic_budget
    }

    /// Remaining wall-clock seconds
    #[must_use]
    pub fn time_left(&self) -> f64 {
        (self.wall_budget - self.start.elapsed().as_secs_f64()).max(0.0)
    }

    /// Remaining deterministic time
    #[must_use]
    pub fn deterministic_time_left(&self) -> f64 {
        (self.deterministic_budget - self.deterministic_used).max(0.0)
    }

    /// Charges deterministic time against the budget
    pub fn advance_deterministic_time(&mut self, elapsed: f64) {
        self.deterministic_used += elapsed;
    }
}

/// Disambiguated result of a solving query: an UNSAT answer with a non-empty
/// set of incompatible decisions was caused by the assumptions, one with an
/// empty set holds regardless of them
enum SolveOutcome {
    Sat,
    Unsat,
    AssumptionsUnsat(Vec<Lit>),
    LimitReached,
}

fn classify<S: Solve>(status: SolveStatus, solver: &S) -> SolveOutcome {
    match status {
        SolveStatus::Sat => SolveOutcome::Sat,
        SolveStatus::LimitReached => SolveOutcome::LimitReached,
        SolveStatus::Unsat => {
            let core = solver.last_incompatible_decisions();
            if core.is_empty() {
                SolveOutcome::Unsat
            } else {
                SolveOutcome::AssumptionsUnsat(core)
            }
        }
    }
}

/// The core-guided optimizer over a borrowed-exclusively SAT solver
pub struct CoreGuidedOptimizer<S> {
    solver: S,
    repository: NodeRepository,
    nodes: Vec<NodeId>,
    state_update_stamp: Option<u64>,
    initialized: bool,
    assumptions_already_added: bool,
    offset: i64,
    lower_bound: i64,
    upper_bound: i64,
    stratified_lower_bound: u64,
}

impl<S: Solve> CoreGuidedOptimizer<S> {
    /// Creates an optimizer over a solver already loaded with the problem
    /// constraints
    pub fn new(solver: S) -> Self {
        CoreGuidedOptimizer {
            solver,
            repository: NodeRepository::default(),
            nodes: Vec::new(),
            state_update_stamp: None,
            initialized: false,
            assumptions_already_added: false,
            offset: 0,
            lower_bound: 0,
            upper_bound: COST_MAX,
            stratified_lower_bound: 0,
        }
    }

    /// The proved lower bound, in the external objective scale
    #[must_use]
    pub fn lower_bound(&self) -> i64 {
        self.lower_bound - self.offset
    }

    /// Access to the underlying solver
    pub fn solver(&mut self) -> &mut S {
        &mut self.solver
    }

    /// Only meaningful to run with a non-empty objective
    #[must_use]
    pub fn should_be_run(problem_state: &ProblemState) -> bool {
        !problem_state.objective().is_empty()
    }

    fn synchronize_if_needed(&mut self, problem_state: &ProblemState) -> Status {
        if self.state_update_stamp == Some(problem_state.update_stamp()) {
            return Status::Continue;
        }
        self.state_update_stamp = Some(problem_state.update_stamp());

        if !self.initialized {
            let (nodes, offset) = create_initial_encoding_nodes(
                problem_state.objective().iter().copied(),
                &mut self.repository,
            );
            self.nodes = nodes;
            self.offset = offset;
            self.initialized = true;

            // Used by the stratified approach: start with the heaviest terms.
            self.stratified_lower_bound = self
                .nodes
                .iter()
                .map(|&n| self.repository[n].weight())
                .max()
                .unwrap_or(0);
        }

        // Extract the new upper bound.
        if problem_state.has_feasible_solution() {
            self.upper_bound = problem_state.solution_cost() + self.offset;
        }
        Status::Continue
    }

    /// Reduces the nodes, applies the upper-bound gap and solves under the
    /// assumptions of the surviving nodes above the stratification threshold
    fn solve_with_assumptions(&mut self) -> SolveOutcome {
        self.solver.backtrack(0);
        for idx in 0..self.nodes.len() {
            let id = self.nodes[idx];
            let increments = self.repository.reduce(id, &self.solver);
            #[allow(clippy::cast_possible_wrap)]
            {
                self.lower_bound += (increments * self.repository[id].weight()) as i64;
            }
        }
        if self.upper_bound != COST_MAX {
            let gap = self.upper_bound - self.lower_bound;
            if gap <= 0 {
                // The lower bound meets the incumbent: the current model is
                // over-constrained on purpose, so the synchronized solution
                // is optimal.
                return SolveOutcome::Unsat;
            }
            #[allow(clippy::cast_sign_loss)]
            for idx in 0..self.nodes.len() {
                let id = self.nodes[idx];
                let weight = self.repository[id].weight();
                if weight > 0 {
                    self.repository
                        .apply_upper_bound(id, gap as u64 / weight, &mut self.solver);
                }
            }
        }
        let mut assumptions = Vec::new();
        self.nodes.retain(|&id| {
            if self.repository[id].size() == 0 {
                return false;
            }
            if self.repository[id].weight() >= self.stratified_lower_bound {
                assumptions.push(!self.repository[id].literal(0));
            }
            true
        });
        debug_assert!(assumptions.len() <= self.nodes.len());
        let status = self.solver.reset_and_solve_with_assumptions(&assumptions);
        classify(status, &self.solver)
    }

    /// Runs the core-guided loop until a terminal status or a spent budget
    ///
    /// # Panics
    ///
    /// On invariant violations: a core literal matching no assumption node,
    /// or a derived unit clause rejected by the solver at the root.
    pub fn optimize(
        &mut self,
        parameters: &Parameters,
        problem_state: &ProblemState,
        learned_info: &mut LearnedInfo,
        time_limit: &mut TimeLimit,
    ) -> Status {
        learned_info.clear();

        let sync_status = self.synchronize_if_needed(problem_state);
        if sync_status != Status::Continue {
            return sync_status;
        }

        #[allow(clippy::cast_possible_wrap)]
        let mut conflict_limit = parameters.max_number_of_conflicts_in_random_lns as i64;
        let mut deterministic_time_at_last_sync = self.solver.deterministic_time();
        while !time_limit.limit_reached() {
            #[allow(clippy::cast_sign_loss)]
            self.solver.set_parameters(SolverParameters {
                max_time_in_seconds: time_limit.time_left(),
                max_deterministic_time: time_limit.deterministic_time_left(),
                random_seed: parameters.random_seed,
                max_number_of_conflicts: conflict_limit.max(0) as u64,
            });

            let old_num_conflicts = self.solver.num_failures();
            let outcome = if self.assumptions_already_added {
                let status = self.solver.solve();
                classify(status, &self.solver)
            } else {
                self.solve_with_assumptions()
            };
            time_limit.advance_deterministic_time(
                self.solver.deterministic_time() - deterministic_time_at_last_sync,
            );
            deterministic_time_at_last_sync = self.solver.deterministic_time();

            self.assumptions_already_added = true;
            #[allow(clippy::cast_possible_wrap)]
            {
                conflict_limit -= (self.solver.num_failures() - old_num_conflicts) as i64;
            }
            learned_info.lower_bound = Some(self.lower_bound - self.offset);
            log::debug!(
                "core-guided: lb {} ub {} strat {}",
                self.lower_bound,
                self.upper_bound,
                self.stratified_lower_bound
            );

            match outcome {
                SolveOutcome::Unsat => {
                    // The assumptions were not responsible, but the objective
                    // was over-constrained by the incumbent's upper bound.
                    return if problem_state.has_feasible_solution() {
                        Status::OptimalSolutionFound
                    } else {
                        Status::Infeasible
                    };
                }
                SolveOutcome::LimitReached => {
                    self.export_learned_info(learned_info);
                    return Status::Continue;
                }
                SolveOutcome::Sat => {
                    self.export_learned_info(learned_info);
                    if conflict_limit < 0 {
                        return Status::Continue;
                    }
                    // Lower the stratification threshold to the largest node
                    // weight strictly below it, if any exists.
                    let old_threshold = self.stratified_lower_bound;
                    if let Some(next) = self
                        .nodes
                        .iter()
                        .map(|&id| self.repository[id].weight())
                        .filter(|&weight| weight < old_threshold)
                        .max()
                    {
                        self.stratified_lower_bound = next;
                    }

                    // We found a better solution!
                    learned_info.solution = Some(self.solver.assignment().clone());
                    if self.stratified_lower_bound < old_threshold {
                        self.assumptions_already_added = false;
                        return Status::SolutionFound;
                    }
                    return Status::OptimalSolutionFound;
                }
                SolveOutcome::AssumptionsUnsat(mut core) => {
                    // The interesting case: we have a core.
                    if conflict_limit < 0 {
                        self.export_learned_info(learned_info);
                        return Status::Continue;
                    }
                    minimize_core(&mut self.solver, &mut core);
                    self.process_core(&core);
                }
            }
        }
        Status::Continue
    }

    /// Folds an extracted core back into the node list: the single node of a
    /// unit core is grown by one; a larger core has its nodes merged into a
    /// fresh node of the core's minimum weight, keeping the residual weight
    /// of heavier nodes in place.
    fn process_core(&mut self, core: &[Lit]) {
        assert!(!core.is_empty(), "empty core from the solver");

        // Match the core against the node list in one left-to-right scan;
        // cores come back in assumption order.
        let mut min_weight = u64::MAX;
        {
            let mut index = 0;
            for &core_lit in core {
                while index < self.nodes.len()
                    && !self.repository[self.nodes[index]].literal(0) != core_lit
                {
                    index += 1;
                }
                assert!(index < self.nodes.len(), "core literal matches no node");
                min_weight = min_weight.min(self.repository[self.nodes[index]].weight());
            }
        }
        self.solver.backtrack(0);
        self.assumptions_already_added = false;

        if core.len() == 1 {
            let matching = self
                .nodes
                .iter()
                .position(|&id| !self.repository[id].literal(0) == core[0])
                .expect("core literal matches no node");
            debug_assert!(
                !self.nodes[matching + 1..]
                    .iter()
                    .any(|&id| !self.repository[id].literal(0) == core[0]),
                "core literal matches two nodes"
            );
            let id = self.nodes[matching];
            let unit = self.repository[id].literal(0);
            let ok = self.solver.add_unit_clause(unit);
            assert!(ok, "solver rejected the unit clause of a unit core");
            self.repository.increase_node_size(id, &mut self.solver);
            return;
        }

        // Rebuild the node list: cored nodes are pulled out for merging,
        // keeping a residual copy in place when their weight exceeds the
        // core's minimum (its assumption literal is unchanged).
        let mut new_nodes = Vec::with_capacity(self.nodes.len());
        let mut to_merge = Vec::with_capacity(core.len());
        let mut index = 0;
        for &core_lit in core {
            while !self.repository[self.nodes[index]].literal(0) != core_lit {
                new_nodes.push(self.nodes[index]);
                index += 1;
                assert!(index < self.nodes.len(), "core literal matches no node");
            }
            let id = self.nodes[index];
            to_merge.push(id);
            if self.repository[id].weight() > min_weight {
                let residual = self.repository[id].weight() - min_weight;
                self.repository[id].set_weight(residual);
                new_nodes.push(id);
            }
            index += 1;
        }
        new_nodes.extend_from_slice(&self.nodes[index..]);
        self.nodes = new_nodes;

        let merged = self
            .repository
            .lazy_merge_all_nodes_with_pq(&to_merge, &mut self.solver);
        self.repository.increase_node_size(merged, &mut self.solver);
        self.repository[merged].set_weight(min_weight);
        // The core proves at least one violation among the merged leaves.
        let ok = self
            .solver
            .add_unit_clause(self.repository[merged].literal(0));
        assert!(ok, "solver rejected the unit clause of a merged core node");
        self.nodes.push(merged);
    }

    fn export_learned_info(&mut self, learned_info: &mut LearnedInfo) {
        let level_zero = if self.solver.current_decision_level() == 0 {
            self.solver.literal_trail().len()
        } else {
            0
        };
        learned_info.fixed_literals = self.solver.literal_trail()[..level_zero].to_vec();
    }
}

/// Shrinks a core by re-solving with only the core literals as assumptions
/// and keeping the subset the solver reports, until no further shrink happens
pub fn minimize_core<S: Solve>(solver: &mut S, core: &mut Vec<Lit>) {
    while core.len() > 1 {
        if solver.reset_and_solve_with_assumptions(core) != SolveStatus::Unsat {
            break;
        }
        let smaller = solver.last_incompatible_decisions();
        if smaller.len() >= core.len() {
            break;
        }
        // keep the original assumption order
        core.retain(|l| smaller.contains(l));
    }
    solver.backtrack(0);
}

#[cfg(test)]
mod tests {
    use super::{minimize_core, TimeLimit};
    use crate::{
        lit,
        solvers::{Dpll, Solve, SolveStatus},
    };

    #[test]
    fn time_limit_accounting() {
        let mut limit = TimeLimit::new(f64::INFINITY, 1.0);
        assert!(!limit.limit_reached());
        limit.advance_deterministic_time(0.5);
        assert!(!limit.limit_reached());
        limit.advance_deterministic_time(0.6);
        assert!(limit.limit_reached());
        assert_eq!(limit.deterministic_time_left(), 0.0);
    }

    #[test]
    fn core_minimization_drops_unrelated_assumptions() {
        let mut solver = Dpll::new();
        solver.add_clause(&[lit![0], lit![1]]);
        solver.add_clause(&[lit![3], lit![4]]);
        let status =
            solver.reset_and_solve_with_assumptions(&[!lit![3], !lit![0], !lit![1], !lit![4]]);
        assert_eq!(status, SolveStatus::Unsat);
        let mut core = solver.last_incompatible_decisions();
        minimize_core(&mut solver, &mut core);
        // the first clause alone is enough; ~3 is unrelated once ~4 is gone
        assert!(core.contains(&!lit![0]));
        assert!(core.contains(&!lit![1]));
        assert!(core.len() <= 3);
    }
}
