//! # Encoding Nodes
//!
//! Lazy cardinality constraints over weighted sets of literals, used by the
//! core-guided optimizer to bound the objective. Each node owns a sorted
//! ladder of output literals: output `i` is true if at least `lb + i + 1` of
//! the node's leaf literals are true. The negation of output 0 serves as the
//! node's assumption literal.
//!
//! The encoding is a totalizer built incrementally \[1\]\[2\]: a merged node
//! starts with a single output and grows one output at a time as cores are
//! found, adding only the counting clauses that the new output needs.
//!
//! All nodes live in a [`NodeRepository`] arena whose lifetime is tied to the
//! optimizer session; merging builds a DAG over node ids and nothing is
//! freed until the repository is dropped.
//!
//! ## References
//!
//! - \[1\] Olivier Bailleux and Yacine Boufkhad: _Efficient CNF Encoding of
//!   Boolean Cardinality Constraints_, CP 2003.
//! - \[2\] Ruben Martins and Saurabh Joshi and Vasco Manquinho and Ines
//!   Lynce: _Incremental Cardinality Constraints for MaxSAT_, CP 2014.

use std::{cmp::Reverse, collections::BinaryHeap, fmt, ops};

use crate::{
    solvers::Solve,
    types::{IWLitIter, Lit},
};

/// An ID of a node in a [`NodeRepository`]. The [`usize`] is the index in the
/// repository's node vector.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
#[repr(transparent)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A lazy cardinality constraint over the leaf literals of its sub-DAG
pub struct EncodingNode {
    /// Materialized output literals; `lits[i]` is true if at least
    /// `lb + i + 1` leaves are true
    lits: Vec<Lit>,
    /// Number of leaves proved true (at the solver's root level)
    lb: u64,
    /// Upper cap on the represented sum; outputs are never materialized past
    /// this value
    max_ub: u64,
    /// Weight by which each violation counts into the objective
    weight: u64,
    /// Distance to the deepest leaf, used to balance lazy merges
    depth: u32,
    children: Option<(NodeId, NodeId)>,
}

impl EncodingNode {
    /// The `i`-th currently materialized output literal
    #[must_use]
    pub fn literal(&self, i: usize) -> Lit {
        self.lits[i]
    }

    /// Number of currently materialized output literals
    #[must_use]
    pub fn size(&self) -> usize {
        self.lits.len()
    }

    /// The node's weight
    #[must_use]
    pub fn weight(&self) -> u64 {
        self.weight
    }

    /// Sets the node's weight
    pub fn set_weight(&mut self, weight: u64) {
        self.weight = weight;
    }

    /// Number of leaves proved true
    #[must_use]
    pub fn lower_bound(&self) -> u64 {
        self.lb
    }

    /// The value encoded by the highest materialized output
    fn top_value(&self) -> u64 {
        self.lb + self.lits.len() as u64
    }
}

/// Arena owning every [`EncodingNode`] of an optimizer session
#[derive(Default)]
pub struct NodeRepository {
    nodes: Vec<EncodingNode>,
}

impl ops::Index<NodeId> for NodeRepository {
    type Output = EncodingNode;

    fn index(&self, id: NodeId) -> &EncodingNode {
        &self.nodes[id.0]
    }
}

impl ops::IndexMut<NodeId> for NodeRepository {
    fn index_mut(&mut self, id: NodeId) -> &mut EncodingNode {
        &mut self.nodes[id.0]
    }
}

impl NodeRepository {
    /// Number of nodes in the arena
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the arena holds no nodes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Creates a leaf node over a single literal
    pub fn new_leaf(&mut self, lit: Lit, weight: u64) -> NodeId {
        self.nodes.push(EncodingNode {
            lits: vec![lit],
            lb: 0,
            max_ub: 1,
            weight,
            depth: 0,
            children: None,
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Propagates root-fixed output literals into the node's bounds: outputs
    /// fixed true are absorbed into the lower bound, outputs fixed false cap
    /// the upper bound. Returns the (non-negative) number of lower-bound
    /// increments; the caller scales it by the node's weight.
    pub fn reduce<S: Solve>(&mut self, id: NodeId, solver: &S) -> u64 {
        debug_assert_eq!(solver.current_decision_level(), 0);
        let node = &mut self.nodes[id.0];
        let mut increments = 0;
        while let Some(&first) = node.lits.first() {
            if !solver.assignment().lit_is_true(first) {
                break;
            }
            node.lits.remove(0);
            node.lb += 1;
            increments += 1;
        }
        while let Some(&last) = node.lits.last() {
            if !solver.assignment().lit_is_false(last) {
                break;
            }
            node.lits.pop();
            node.max_ub = node.top_value();
        }
        increments
    }

    /// Adds unit clauses forbidding more than `allowed` violations beyond the
    /// node's current lower bound and truncates the output ladder accordingly
    pub fn apply_upper_bound<S: Solve>(&mut self, id: NodeId, allowed: u64, solver: &mut S) {
        let node = &mut self.nodes[id.0];
        #[allow(clippy::cast_possible_truncation)]
        let allowed = allowed.min(node.lits.len() as u64) as usize;
        for &out in &node.lits[allowed..] {
            solver.add_unit_clause(!out);
        }
        node.lits.truncate(allowed);
        node.max_ub = node.max_ub.min(node.top_value());
    }

    /// Lazily extends the node's output ladder by one literal, materializing
    /// whatever child outputs the new counting clauses need. A no-op if the
    /// node is already at its maximum size.
    pub fn increase_node_size<S: Solve>(&mut self, id: NodeId, solver: &mut S) {
        if self.nodes[id.0].top_value() >= self.nodes[id.0].max_ub {
            return;
        }
        let new_out = solver.new_variable().pos_lit();
        let node = &mut self.nodes[id.0];
        node.lits.push(new_out);
        if node.lits.len() >= 2 {
            // outputs are ordered: a higher count implies the lower ones
            let prev = node.lits[node.lits.len() - 2];
            let ok = solver.add_clause(&[!new_out, prev]);
            assert!(ok, "solver rejected an output ordering clause");
        }
        let v = self.nodes[id.0].top_value();
        let Some((a, b)) = self.nodes[id.0].children else {
            return;
        };

        // Make sure the children can express the counts that sum to `v`,
        // growing them lazily as well.
        let b_lb = self.nodes[b.0].lb;
        while self.nodes[a.0].top_value() < self.nodes[a.0].max_ub.min(v.saturating_sub(b_lb)) {
            self.increase_node_size(a, solver);
        }
        let a_lb = self.nodes[a.0].lb;
        while self.nodes[b.0].top_value() < self.nodes[b.0].max_ub.min(v.saturating_sub(a_lb)) {
            self.increase_node_size(b, solver);
        }

        // Counting clauses for the new output: whenever the children sums
        // reach `va + vb = v`, the output must be true.
        let mut clause = Vec::new();
        for va in self.nodes[a.0].lb..=self.nodes[a.0].top_value() {
            let vb = v - va;
            if vb < self.nodes[b.0].lb || vb > self.nodes[b.0].top_value() {
                continue;
            }
            clause.clear();
            clause.push(new_out);
            if va > self.nodes[a.0].lb {
                clause.push(!self.output_for(a, va));
            }
            if vb > self.nodes[b.0].lb {
                clause.push(!self.output_for(b, vb));
            }
            debug_assert!(clause.len() >= 2);
            let ok = solver.add_clause(&clause);
            assert!(ok, "solver rejected a totalizer counting clause");
        }
    }

    /// The child output literal encoding "at least `value` leaves true"
    fn output_for(&self, id: NodeId, value: u64) -> Lit {
        let node = &self.nodes[id.0];
        debug_assert!(value > node.lb && value <= node.top_value());
        #[allow(clippy::cast_possible_truncation)]
        let idx = (value - node.lb - 1) as usize;
        node.lits[idx]
    }

    /// Builds a node representing the sum of the given nodes by repeatedly
    /// merging the two shallowest ones (priority-queue order). The merged
    /// node starts with a single output literal and weight 0; the caller sets
    /// the weight and typically grows the node by one before use.
    ///
    /// # Panics
    ///
    /// If `ids` is empty, or if a solver clause is rejected at the root.
    pub fn lazy_merge_all_nodes_with_pq<S: Solve>(
        &mut self,
        ids: &[NodeId],
        solver: &mut S,
    ) -> NodeId {
        assert!(!ids.is_empty(), "merging an empty node set");
        let mut heap: BinaryHeap<(Reverse<u32>, Reverse<NodeId>)> = ids
            .iter()
            .map(|&id| (Reverse(self.nodes[id.0].depth), Reverse(id)))
            .collect();
        loop {
            let (_, Reverse(a)) = heap.pop().expect("heap cannot be empty");
            let Some((_, Reverse(b))) = heap.pop() else {
                return a;
            };
            let merged = self.lazy_merge(a, b, solver);
            heap.push((Reverse(self.nodes[merged.0].depth), Reverse(merged)));
        }
    }

    /// Merges two nodes into a lazy parent with a single output literal
    fn lazy_merge<S: Solve>(&mut self, a: NodeId, b: NodeId, solver: &mut S) -> NodeId {
        let out = solver.new_variable().pos_lit();
        let lb = self.nodes[a.0].lb + self.nodes[b.0].lb;
        let max_ub = self.nodes[a.0].max_ub + self.nodes[b.0].max_ub;
        let depth = self.nodes[a.0].depth.max(self.nodes[b.0].depth) + 1;
        self.nodes.push(EncodingNode {
            lits: vec![out],
            lb,
            max_ub,
            weight: 0,
            depth,
            children: Some((a, b)),
        });
        let id = NodeId(self.nodes.len() - 1);
        // either child exceeding its own lower bound pushes the sum past `lb`
        for child in [a, b] {
            if let Some(&first) = self.nodes[child.0].lits.first() {
                let ok = solver.add_clause(&[!first, out]);
                assert!(ok, "solver rejected a merge implication clause");
            }
        }
        id
    }
}

/// Builds the initial encoding nodes from a weighted objective: one leaf node
/// per term. Terms with negative coefficients are flipped onto the negated
/// literal and their coefficient is collected into the returned offset.
pub fn create_initial_encoding_nodes<O: IWLitIter>(
    objective: O,
    repository: &mut NodeRepository,
) -> (Vec<NodeId>, i64) {
    let mut nodes = Vec::new();
    let mut offset = 0;
    for (lit, coeff) in objective {
        match coeff.cmp(&0) {
            std::cmp::Ordering::Greater => {
                #[allow(clippy::cast_sign_loss)]
                let id = repository.new_leaf(lit, coeff as u64);
                nodes.push(id);
            }
            std::cmp::Ordering::Less => {
                // minimizing c * l with c < 0 is minimizing |c| * ¬l, up to
                // the constant c
                #[allow(clippy::cast_sign_loss)]
                let id = repository.new_leaf(!lit, (-coeff) as u64);
                nodes.push(id);
                offset += coeff;
            }
            std::cmp::Ordering::Equal => {}
        }
    }
    (nodes, offset)
}

#[cfg(test)]
mod tests {
    use super::{create_initial_encoding_nodes, NodeRepository};
    use crate::{
        lit,
        solvers::{Dpll, Solve, SolveStatus},
    };

    #[test]
    fn initial_nodes_and_offset() {
        let mut repo = NodeRepository::default();
        let (nodes, offset) =
            create_initial_encoding_nodes(vec![(lit![0], 2), (lit![1], -3), (lit![2], 0)], &mut repo);
        assert_eq!(nodes.len(), 2);
        assert_eq!(offset, -3);
        assert_eq!(repo[nodes[0]].weight(), 2);
        assert_eq!(repo[nodes[0]].literal(0), lit![0]);
        assert_eq!(repo[nodes[1]].weight(), 3);
        assert_eq!(repo[nodes[1]].literal(0), !lit![1]);
    }

    #[test]
    fn reduce_absorbs_fixed_outputs() {
        let mut solver = Dpll::new();
        let mut repo = NodeRepository::default();
        let (nodes, _) = create_initial_encoding_nodes(vec![(lit![0], 1)], &mut repo);
        solver.set_num_variables(1);
        solver.add_unit_clause(lit![0]);
        let increments = repo.reduce(nodes[0], &solver);
        assert_eq!(increments, 1);
        assert_eq!(repo[nodes[0]].size(), 0);
        assert_eq!(repo[nodes[0]].lower_bound(), 1);
    }

    #[test]
    fn apply_upper_bound_forbids_outputs() {
        let mut solver = Dpll::new();
        let mut repo = NodeRepository::default();
        let (nodes, _) = create_initial_encoding_nodes(vec![(lit![0], 1)], &mut repo);
        solver.set_num_variables(1);
        repo.apply_upper_bound(nodes[0], 0, &mut solver);
        assert_eq!(repo[nodes[0]].size(), 0);
        assert!(solver.assignment().lit_is_false(lit![0]));
    }

    #[test]
    fn merge_implies_parent_output() {
        let mut solver = Dpll::new();
        let mut repo = NodeRepository::default();
        let (nodes, _) =
            create_initial_encoding_nodes(vec![(lit![0], 1), (lit![1], 1)], &mut repo);
        solver.set_num_variables(2);
        let merged = repo.lazy_merge_all_nodes_with_pq(&nodes, &mut solver);
        assert_eq!(repo[merged].size(), 1);
        let out = repo[merged].literal(0);
        // a leaf being true forces the merged output
        assert_eq!(
            solver.reset_and_solve_with_assumptions(&[lit![0], !out]),
            SolveStatus::Unsat
        );
        assert_eq!(
            solver.reset_and_solve_with_assumptions(&[!lit![0], !lit![1], !out]),
            SolveStatus::Sat
        );
    }

    #[test]
    fn grown_node_counts_to_two() {
        let mut solver = Dpll::new();
        let mut repo = NodeRepository::default();
        let (nodes, _) =
            create_initial_encoding_nodes(vec![(lit![0], 1), (lit![1], 1)], &mut repo);
        solver.set_num_variables(2);
        let merged = repo.lazy_merge_all_nodes_with_pq(&nodes, &mut solver);
        repo.increase_node_size(merged, &mut solver);
        assert_eq!(repo[merged].size(), 2);
        let second = repo[merged].literal(1);
        // both leaves true force the second output
        assert_eq!(
            solver.reset_and_solve_with_assumptions(&[lit![0], lit![1], !second]),
            SolveStatus::Unsat
        );
        // a single true leaf does not
        assert_eq!(
            solver.reset_and_solve_with_assumptions(&[lit![0], !lit![1], !second]),
            SolveStatus::Sat
        );
        // growing past the leaf count is a no-op
        repo.increase_node_size(merged, &mut solver);
        assert_eq!(repo[merged].size(), 2);
    }

    #[test]
    fn three_way_merge_counts() {
        let mut solver = Dpll::new();
        let mut repo = NodeRepository::default();
        let (nodes, _) = create_initial_encoding_nodes(
            vec![(lit![0], 1), (lit![1], 1), (lit![2], 1)],
            &mut repo,
        );
        solver.set_num_variables(3);
        let merged = repo.lazy_merge_all_nodes_with_pq(&nodes, &mut solver);
        repo.increase_node_size(merged, &mut solver);
        let second = repo[merged].literal(1);
        // any two leaves force the second output
        assert_eq!(
            solver.reset_and_solve_with_assumptions(&[lit![1], lit![2], !second]),
            SolveStatus::Unsat
        );
        assert_eq!(
            solver.reset_and_solve_with_assumptions(&[lit![0], !lit![1], lit![2], !second]),
            SolveStatus::Unsat
        );
        assert_eq!(
            solver.reset_and_solve_with_assumptions(&[lit![0], !lit![1], !lit![2], !second]),
            SolveStatus::Sat
        );
    }
}
