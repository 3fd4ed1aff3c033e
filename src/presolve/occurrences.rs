//! # Occurrence Index
//!
//! For each literal, the list of clause indices in which it appears, plus a
//! parallel size counter. Deletion is lazy: a deleted clause may linger in a
//! list until the next scan compacts it, but the size counters are kept exact
//! at all times.

use crate::types::{ClauseIdx, Lit, Var};

/// Per-literal occurrence lists with exact live counts
#[derive(Default)]
pub struct OccurrenceLists {
    lists: Vec<Vec<ClauseIdx>>,
    sizes: Vec<usize>,
}

impl OccurrenceLists {
    /// Number of variables the index has room for
    #[must_use]
    pub fn num_variables(&self) -> usize {
        self.lists.len() / 2
    }

    /// Grows the index space so that both literals of `var` can be indexed
    pub fn grow_for(&mut self, var: Var) {
        let required = var.neg_lit().lidx() + 1;
        if required > self.lists.len() {
            self.lists.resize_with(required, Vec::new);
            self.sizes.resize(required, 0);
        }
    }

    /// Registers a clause in the list of every given literal
    pub fn attach(&mut self, lits: &[Lit], ci: ClauseIdx) {
        for &l in lits {
            self.lists[l.lidx()].push(ci);
            self.sizes[l.lidx()] += 1;
        }
    }

    /// Exact number of live clauses containing `lit`
    #[must_use]
    pub fn occ_size(&self, lit: Lit) -> usize {
        self.sizes[lit.lidx()]
    }

    /// The (possibly stale) occurrence list of `lit`
    #[must_use]
    pub fn list(&self, lit: Lit) -> &[ClauseIdx] {
        &self.lists[lit.lidx()]
    }

    /// Accounts for a lazy deletion of a clause containing `lit`: only the
    /// size counter is updated, the list entry is compacted later
    pub fn decrement(&mut self, lit: Lit) {
        debug_assert!(self.sizes[lit.lidx()] > 0);
        self.sizes[lit.lidx()] -= 1;
    }

    /// Eagerly removes a single occurrence of `ci` from the list of `lit`
    ///
    /// # Panics
    ///
    /// If `ci` is not in the list.
    pub fn remove_occurrence(&mut self, lit: Lit, ci: ClauseIdx) {
        let list = &mut self.lists[lit.lidx()];
        let pos = list
            .iter()
            .position(|&entry| entry == ci)
            .expect("occurrence list out of sync with clause");
        list.remove(pos);
        self.decrement(lit);
    }

    /// Drops the whole list of `lit` and zeroes its counter (used when every
    /// clause containing `lit` has just been deleted)
    pub fn clear_list(&mut self, lit: Lit) {
        self.lists[lit.lidx()] = Vec::new();
        self.sizes[lit.lidx()] = 0;
    }

    /// Compacts the list of `lit` in place, keeping only the entries for
    /// which `live` holds, and resyncs the size counter to the kept count
    pub fn compact<P: FnMut(ClauseIdx) -> bool>(&mut self, lit: Lit, mut live: P) {
        let list = &mut self.lists[lit.lidx()];
        list.retain(|&ci| live(ci));
        self.sizes[lit.lidx()] = list.len();
    }

    /// Releases all list memory, keeping only the size counters (which are
    /// all that is needed to compute the variable mapping afterwards)
    pub fn clear_lists(&mut self) {
        self.lists = Vec::new();
    }
}
