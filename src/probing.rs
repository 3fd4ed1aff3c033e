//! # Equivalent-Literal Probing
//!
//! Probes every literal of a loaded solver and runs a strongly-connected
//! component analysis over the implication graph spanned by unit propagation.
//! Literals in the same component are equivalent and get collapsed onto a
//! representative; the collapse is recorded with the postsolver so models can
//! be restored.
//!
//! Probing can be expensive, hence the support for a deterministic time
//! limit: once it is hit, the remaining graph nodes expose empty adjacency
//! lists, which keeps the analysis correct but possibly incomplete.

use crate::{
    postsolve::SatPostsolver,
    solvers::Solve,
    types::Lit,
};

/// A virtual directed graph where the nodes are the literals and the nodes
/// adjacent to a literal `l` are the literals propagated when `l` is decided
/// at the root of the underlying solver.
struct PropagationGraph<'s, S> {
    solver: &'s mut S,
    /// Absolute deterministic-time deadline
    deadline: f64,
}

impl<'s, S: Solve> PropagationGraph<'s, S> {
    fn new(solver: &'s mut S, deterministic_time_limit: f64) -> Self {
        let deadline = solver.deterministic_time() + deterministic_time_limit;
        PropagationGraph { solver, deadline }
    }

    /// Returns the literal indices adjacent to the given one.
    ///
    /// Repeated queries on the same literal from the same solver state are
    /// idempotent: the solver is backtracked to the root before every probe.
    fn adjacent(&mut self, lidx: usize) -> Vec<usize> {
        self.solver.backtrack(0);

        // When the time limit is reached we keep returning empty adjacency
        // lists. The SCC algorithm then terminates quickly and the
        // equivalent-literal detection is incomplete but correct.
        if self.solver.deterministic_time() > self.deadline {
            return Vec::new();
        }

        let l = Lit::from_lidx(lidx);
        if self.solver.assignment().lit_is_assigned(l) {
            return Vec::new();
        }
        let trail_index = self.solver.literal_trail().len();
        self.solver.enqueue_decision_and_backjump_on_conflict(l);
        if self.solver.current_decision_level() == 0 {
            return Vec::new();
        }
        // The +1 avoids adding l => l.
        self.solver.literal_trail()[trail_index + 1..]
            .iter()
            .map(|l| l.lidx())
            .collect()
    }
}

/// Union-find over the `2n` literal nodes, used to merge the SCC cycles of a
/// literal and of its negation.
///
/// The representative of a merge is always the root of the *first* argument;
/// together with mirrored merge calls this keeps the roots of a class and of
/// its negated class complementary.
struct MergingPartition {
    parent: Vec<usize>,
}

impl MergingPartition {
    fn new(n: usize) -> Self {
        MergingPartition {
            parent: (0..n).collect(),
        }
    }

    fn root_and_compress(&mut self, mut i: usize) -> usize {
        while self.parent[self.parent[i]] != self.parent[i] {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        self.parent[i]
    }

    fn merge_parts_of(&mut self, a: usize, b: usize) {
        let ra = self.root_and_compress(a);
        let rb = self.root_and_compress(b);
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

/// Iterative Tarjan SCC over the propagation graph. Components come out in
/// reverse topological order; each component lists the nodes in discovery
/// order, so the first entry is the probe-order representative.
fn strongly_connected_components<S: Solve>(
    num_nodes: usize,
    graph: &mut PropagationGraph<'_, S>,
) -> Vec<Vec<usize>> {
    const UNSEEN: usize = usize::MAX;

    let mut index = vec![UNSEEN; num_nodes];
    let mut lowlink = vec![0usize; num_nodes];
    let mut on_stack = vec![false; num_nodes];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0;
    let mut components = Vec::new();

    // Explicit DFS frames: (node, adjacency, position in the adjacency)
    let mut frames: Vec<(usize, Vec<usize>, usize)> = Vec::new();

    for start in 0..num_nodes {
        if index[start] != UNSEEN {
            continue;
        }
        index[start] = next_index;
        lowlink[start] = next_index;
        next_index += 1;
        stack.push(start);
        on_stack[start] = true;
        let adj = graph.adjacent(start);
        frames.push((start, adj, 0));

        while let Some(frame) = frames.last_mut() {
            let node = frame.0;
            if frame.2 < frame.1.len() {
                let succ = frame.1[frame.2];
                frame.2 += 1;
                if index[succ] == UNSEEN {
                    index[succ] = next_index;
                    lowlink[succ] = next_index;
                    next_index += 1;
                    stack.push(succ);
                    on_stack[succ] = true;
                    let adj = graph.adjacent(succ);
                    frames.push((succ, adj, 0));
                } else if on_stack[succ] {
                    lowlink[node] = lowlink[node].min(index[succ]);
                }
                continue;
            }
            frames.pop();
            if let Some(parent) = frames.last() {
                lowlink[parent.0] = lowlink[parent.0].min(lowlink[node]);
            }
            if lowlink[node] == index[node] {
                // `node` roots a component; pop it off the node stack and
                // restore discovery order
                let mut component = Vec::new();
                loop {
                    let member = stack.pop().expect("tarjan stack underflow");
                    on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                component.reverse();
                components.push(component);
            }
        }
    }
    components
}

/// Probes all literals of the solver, detects equivalent-literal classes and
/// collapses each class onto its representative.
///
/// Returns the literal-to-representative mapping, indexed by literal index,
/// or an empty vector if no non-trivial class was found. Additionally:
///
/// - if any member of a class is fixed, the fixing is propagated to the
///   representative and through it to all members, by unit clauses;
/// - for each unfixed non-representative `l`, a postsolve entry
///   `(l, {l, ¬rep})` is recorded so postsolve restores `l` from the value of
///   its representative.
///
/// # Panics
///
/// If the representatives of a literal and of its negation are not
/// complementary (an invariant of the merged partition).
pub fn probe_and_find_equivalent_literals<S: Solve>(
    solver: &mut S,
    postsolver: &mut SatPostsolver,
    deterministic_time_limit: f64,
) -> Vec<Lit> {
    solver.backtrack(0);
    let num_already_fixed = solver.literal_trail().len();

    let size = solver.num_variables() * 2;
    let mut graph = PropagationGraph::new(solver, deterministic_time_limit);
    let sccs = strongly_connected_components(size, &mut graph);

    // There is no guarantee that the cycle of x and the one of ¬x touch the
    // same variables: propagation may be stronger in one direction. The
    // cycles are merged so that rep(l) and rep(¬l) stay complementary.
    let mut partition = MergingPartition::new(size);
    let mut any_equivalence = false;
    for component in &sccs {
        if component.len() <= 1 {
            continue;
        }
        any_equivalence = true;
        let representative = Lit::from_lidx(component[0]);
        for &member in &component[1..] {
            let l = Lit::from_lidx(member);
            partition.merge_parts_of(representative.lidx(), l.lidx());
            partition.merge_parts_of((!representative).lidx(), (!l).lidx());
        }
        let rep_root = partition.root_and_compress(representative.lidx());
        let neg_root = partition.root_and_compress((!representative).lidx());
        assert_eq!(
            Lit::from_lidx(rep_root),
            !Lit::from_lidx(neg_root),
            "representatives of complementary literals are not complementary"
        );
    }

    solver.backtrack(0);
    let mut num_equivalent = 0;
    let mut mapping = Vec::new();
    if any_equivalence {
        // If a literal in a cycle is fixed, fix the representative too.
        for i in 0..size {
            let l = Lit::from_lidx(i);
            let rep = Lit::from_lidx(partition.root_and_compress(i));
            if solver.assignment().lit_is_assigned(l)
                && !solver.assignment().lit_is_assigned(rep)
            {
                let unit = if solver.assignment().lit_is_true(l) {
                    rep
                } else {
                    !rep
                };
                solver.add_unit_clause(unit);
            }
        }

        mapping.reserve(size);
        for i in 0..size {
            let l = Lit::from_lidx(i);
            let rep = Lit::from_lidx(partition.root_and_compress(i));
            mapping.push(rep);
            if solver.assignment().lit_is_assigned(rep) {
                if !solver.assignment().lit_is_assigned(l) {
                    let unit = if solver.assignment().lit_is_true(rep) {
                        l
                    } else {
                        !l
                    };
                    solver.add_unit_clause(unit);
                }
            } else if rep != l {
                debug_assert!(!solver.assignment().lit_is_assigned(l));
                num_equivalent += 1;
                postsolver.add(l, &[l, !rep]);
            }
        }
    }

    log::info!(
        "probing: fixed {} + {} equiv {} total {}",
        num_already_fixed,
        solver.literal_trail().len() - num_already_fixed,
        num_equivalent / 2,
        solver.num_variables()
    );
    mapping
}

/// Turns a literal-to-representative mapping into a dense variable remap:
/// variables that are the representative of their class (or untouched) get a
/// fresh index, collapsed variables map to `None`
#[must_use]
pub fn dense_variable_mapping(lit_mapping: &[Lit]) -> Vec<Option<crate::types::Var>> {
    let mut next = 0u32;
    (0..lit_mapping.len() / 2)
        .map(|v| {
            #[allow(clippy::cast_possible_truncation)]
            let pos = crate::types::Var::new(v as u32).pos_lit();
            if lit_mapping[pos.lidx()].var() == pos.var() {
                let mapped = crate::types::Var::new(next);
                next += 1;
                Some(mapped)
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::probe_and_find_equivalent_literals;
    use crate::{
        lit,
        postsolve::SatPostsolver,
        solvers::{Dpll, Solve},
    };

    #[test]
    fn no_equivalences_empty_mapping() {
        let mut solver = Dpll::new();
        solver.add_clause(&[lit![0], lit![1]]);
        let mut postsolver = SatPostsolver::new(2);
        let mapping = probe_and_find_equivalent_literals(&mut solver, &mut postsolver, 1.0);
        assert!(mapping.is_empty());
        assert_eq!(postsolver.num_log_entries(), 0);
    }

    #[test]
    fn binary_cycle_collapses() {
        let mut solver = Dpll::new();
        // x0 <=> x1
        solver.add_clause(&[!lit![0], lit![1]]);
        solver.add_clause(&[!lit![1], lit![0]]);
        // an unrelated clause to keep the instance satisfiable
        solver.add_clause(&[lit![2], !lit![0]]);
        let mut postsolver = SatPostsolver::new(3);
        let mapping = probe_and_find_equivalent_literals(&mut solver, &mut postsolver, 1.0);
        assert!(!mapping.is_empty());
        // the two literals collapse onto one representative and the mapping
        // stays complementary
        assert_eq!(mapping[lit![0].lidx()], mapping[lit![1].lidx()]);
        assert_eq!(mapping[!lit![0].lidx()], mapping[!lit![1].lidx()]);
        for l in [lit![0], lit![1], lit![2]] {
            assert_eq!(!mapping[l.lidx()], mapping[(!l).lidx()]);
        }
        // one postsolve entry for the collapsed literal of the class and one
        // for its negation
        assert_eq!(postsolver.num_log_entries(), 2);
    }

    #[test]
    fn exhausted_budget_is_incomplete_but_sane() {
        let mut solver = Dpll::new();
        solver.add_clause(&[!lit![0], lit![1]]);
        solver.add_clause(&[!lit![1], lit![0]]);
        let mut postsolver = SatPostsolver::new(2);
        // a deadline in the past: all adjacency lists are empty
        let mapping = probe_and_find_equivalent_literals(&mut solver, &mut postsolver, -1.0);
        assert!(mapping.is_empty());
        assert_eq!(postsolver.num_log_entries(), 0);
    }

    #[test]
    fn failed_literal_fixed_during_probing() {
        let mut solver = Dpll::new();
        // x0 <=> x1, and x2 is a failed literal (it implies both polarities
        // of x0)
        solver.add_clause(&[!lit![0], lit![1]]);
        solver.add_clause(&[!lit![1], lit![0]]);
        solver.add_clause(&[!lit![2], lit![0]]);
        solver.add_clause(&[!lit![2], !lit![0]]);
        let mut postsolver = SatPostsolver::new(3);
        let mapping = probe_and_find_equivalent_literals(&mut solver, &mut postsolver, 1.0);
        // probing x2 conflicts and fixes it false at the root
        assert!(solver.assignment().lit_is_false(lit![2]));
        // the x0/x1 class still collapses
        assert!(!mapping.is_empty());
        assert_eq!(mapping[lit![1].lidx()], mapping[lit![0].lidx()]);
        assert_eq!(postsolver.num_log_entries(), 2);
    }
}
