//! The single-base-at-a-time branch walker shared by tip trimming,
//! bubble popping and contig emission. One `step_once` call
//! performs exactly one round of the walk so that bubble popping can
//! round-robin several branches in lockstep; tip trimming and contig
//! emission simply call it in a loop until the branch leaves the
//! `Active` state.

use crate::graph::GraphOps;
use crate::kmer::{Direction, Kmer};
use crate::vertex::VertexData;
use std::collections::HashSet;

/// Terminal (or still-active) state of a branch walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchState {
    Active,
    NoExt,
    AmbiSame,
    AmbiOpp,
    Loop,
    TooLong,
}

impl BranchState {
    pub fn is_active(self) -> bool {
        matches!(self, BranchState::Active)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

/// An ordered walk of `(k-mer, vertex data)` pairs extending away from
/// some origin vertex in a single direction.
#[derive(Debug, Clone)]
pub struct BranchRecord {
    path: Vec<(Kmer, VertexData)>,
    visited: HashSet<Kmer>,
    direction: Direction,
    /// `None` means unbounded (the contig walker runs with no cap).
    length_cap: Option<usize>,
    state: BranchState,
}

impl BranchRecord {
    /// A branch seeded with its first vertex (the root's neighbor in
    /// `direction`), as every caller in this crate constructs one: the
    /// root itself is never part of the walked path.
    pub fn seeded(direction: Direction, length_cap: Option<usize>, first: (Kmer, VertexData)) -> Self {
        let mut visited = HashSet::new();
        visited.insert(first.0.clone());
        BranchRecord {
            path: vec![first],
            visited,
            direction,
            length_cap,
            state: BranchState::Active,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> BranchState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    pub fn tip(&self) -> &(Kmer, VertexData) {
        self.path.last().expect("branch always seeded non-empty")
    }

    pub fn path(&self) -> &[(Kmer, VertexData)] {
        &self.path
    }

    pub fn contains(&self, k: &Kmer) -> bool {
        self.visited.contains(k)
    }

    pub fn total_multiplicity(&self) -> u64 {
        self.path.iter().map(|(_, v)| v.total_multiplicity()).sum()
    }

    fn force_state(&mut self, state: BranchState) {
        self.state = state;
    }

    /// Evaluate the tip's forward extension and either report a terminal
    /// state or hand back the single unambiguous next k-mer to try.
    /// Shared by the plain walker (`step_once`, which stops on forward
    /// ambiguity) and the bubble group's forking walker (which forks
    /// instead of stopping).
    fn forward_candidate(&mut self) -> Option<Kmer> {
        if let Some(cap) = self.length_cap {
            if self.path.len() > cap {
                self.force_state(BranchState::TooLong);
                return None;
            }
        }
        let (tip_kmer, tip_data) = self.tip().clone();
        let fwd = tip_data.edges(self.direction);
        if !fwd.any() {
            self.force_state(BranchState::NoExt);
            return None;
        }
        match fwd.single_base() {
            Some(base) => {
                let mut candidate = tip_kmer.clone();
                candidate.shift(self.direction, base);
                Some(candidate)
            }
            None => {
                self.force_state(BranchState::AmbiSame);
                None
            }
        }
    }

    /// Validate and append `candidate` (already known to extend the tip);
    /// returns `true` if the branch is still active afterward.
    fn try_append<G: GraphOps>(&mut self, store: &mut G, candidate: Kmer) -> bool {
        if self.visited.contains(&candidate) {
            self.force_state(BranchState::Loop);
            return false;
        }
        // A palindromic vertex is its own reverse complement, so "the"
        // extension direction collapses; treat it the same as a forward
        // ambiguity (reaching a palindrome gets the same ambiguous-same
        // treatment as a genuine fork).
        if candidate.is_palindrome() {
            self.force_state(BranchState::AmbiSame);
            return false;
        }
        let data = match store.get_seq_data(&candidate) {
            Some(d) => d,
            None => {
                self.force_state(BranchState::NoExt);
                return false;
            }
        };
        if data.edges(self.direction.flip()).ambiguous() {
            self.force_state(BranchState::AmbiOpp);
            return false;
        }
        self.visited.insert(candidate.clone());
        self.path.push((candidate, data));
        if let Some(cap) = self.length_cap {
            if self.path.len() > cap {
                self.force_state(BranchState::TooLong);
                return false;
            }
        }
        true
    }

    /// Extend by exactly one k-mer, or transition to a terminal state.
    /// Step order: cap check, forward-extension check (no-ext /
    /// ambiguous), loop check, reverse-ambiguity check, append, re-check
    /// cap.
    pub fn step_once<G: GraphOps>(&mut self, store: &mut G) {
        if self.state.is_terminal() {
            return;
        }
        store.pump();
        if let Some(candidate) = self.forward_candidate() {
            self.try_append(store, candidate);
        }
    }

    /// The edge set the tip currently offers in the walking direction,
    /// without committing to any of them. Used by the bubble popper to
    /// decide whether to fork.
    pub(crate) fn forward_edges(&self) -> crate::vertex::EdgeSet {
        self.tip().1.edges(self.direction)
    }

    pub(crate) fn length_cap(&self) -> Option<usize> {
        self.length_cap
    }

    pub(crate) fn mark_terminal(&mut self, state: BranchState) {
        self.force_state(state);
    }

    /// Extend the tip with a specific (already-known-valid-to-try) base,
    /// bypassing the ambiguity check in `forward_candidate` — used by the
    /// bubble popper, which resolves ambiguity itself by forking one
    /// `BranchRecord` per candidate base instead of stopping.
    pub(crate) fn extend_with_base<G: GraphOps>(&mut self, store: &mut G, base: u8) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if let Some(cap) = self.length_cap {
            if self.path.len() > cap {
                self.force_state(BranchState::TooLong);
                return false;
            }
        }
        let (tip_kmer, _) = self.tip().clone();
        let mut candidate = tip_kmer;
        candidate.shift(self.direction, base);
        self.try_append(store, candidate)
    }

    /// Run `step_once` until the branch leaves the `Active` state.
    /// Every long loop in this crate calls `pump()` once per iteration;
    /// `step_once` already does so, so callers need not repeat it.
    pub fn walk_to_completion<G: GraphOps>(&mut self, store: &mut G) -> BranchState {
        while self.state.is_active() {
            self.step_once(store);
        }
        self.state
    }
}

/// Delete every vertex in `branch`'s path and sever whatever live edge(s)
/// the tip still holds in its walking direction. Safe to call regardless
/// of the branch's terminal state (`AmbiSame`'s multiple tip edges,
/// `AmbiOpp`'s single blocked edge, `NoExt`'s none, and `Loop`'s
/// already-internal edge are all handled by the same "read the tip's
/// current edges and clear their reciprocals" rule) as long as the
/// branch's *root* end has no live edge of its own to worry about, which
/// holds for every caller that seeds a branch at a true endpoint (tip
/// trimming; the bubble popper manages its own, different, anchors and
/// does not use this helper).
pub fn remove_branch<G: GraphOps>(store: &mut G, branch: &BranchRecord) {
    use crate::vertex::EdgeSet;
    let dir = branch.direction();
    let (tip_kmer, cached) = branch.tip().clone();
    let data = store.get_seq_data(&tip_kmer).unwrap_or(cached);
    for base in data.edges(dir).bases() {
        let mut neighbor = tip_kmer.clone();
        let dropped = neighbor.shift(dir, base);
        store.remove_extension(&neighbor, dir.flip(), EdgeSet::from_bits(1 << dropped));
    }
    for (k, _) in branch.path() {
        store.remove(k);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::Kmer;
    use crate::store::VertexStore;

    fn kmer(s: &str) -> Kmer {
        Kmer::from_ascii(s.as_bytes(), false).unwrap()
    }

    fn linear_store(k: u8, seq: &[u8]) -> VertexStore {
        let mut s = VertexStore::new(k, false);
        let kl = k as usize;
        for w in seq.windows(kl) {
            s.add(&Kmer::from_ascii(w, false).unwrap()).unwrap();
        }
        s.finalize();
        crate::edits::generate_adjacency(&mut s);
        s
    }

    #[test]
    fn walks_a_linear_path_to_noext() {
        let mut s = linear_store(4, b"ACGTACGTAC");
        let root = kmer("ACGT");
        let data = s.get_seq_data(&root).unwrap();
        let base = data.edges(Direction::Sense).single_base().unwrap();
        let mut next = root.clone();
        next.shift(Direction::Sense, base);
        let next_data = s.get_seq_data(&next).unwrap();
        let mut branch = BranchRecord::seeded(Direction::Sense, None, (next, next_data));
        let state = branch.walk_to_completion(&mut s);
        assert!(matches!(state, BranchState::NoExt | BranchState::Loop));
    }
}
