//! Iterative tip trimming: prune dead-end branches shorter than
//! `trim_len`, sweeping the length cutoff from 1, doubling, up to
//! `trim_len`, then repeating at `trim_len` until a pass removes nothing.

use crate::branch::{remove_branch, BranchRecord, BranchState};
use crate::graph::GraphOps;
use crate::kmer::Direction;
use crate::vertex::Flag;
use log::info;

/// One sweep at a fixed length cutoff. Returns the number of branches
/// removed.
fn trim_pass<G: GraphOps>(store: &mut G, cutoff: usize) -> usize {
    let mut removed = 0usize;
    for k in store.local_live_keys() {
        store.pump();
        let data = match store.get_seq_data(&k) {
            Some(d) if !store.marked(&k, None) => d,
            _ => continue,
        };
        let dir = match data.is_endpoint() {
            Some(dir) => dir,
            None => continue,
        };
        let mut branch = BranchRecord::seeded(dir, Some(cutoff), (k.clone(), data));
        let state = branch.walk_to_completion(store);
        if state == BranchState::TooLong {
            continue; // KEEP
        }
        for (kmer, _) in branch.path() {
            store.mark(kmer, None);
        }
        remove_branch(store, &branch);
        removed += 1;
    }
    store.wipe_flag(Flag::MarkedSense);
    store.wipe_flag(Flag::MarkedAntisense);
    if store.cleanup() > 0 {
        store.pump();
    }
    removed
}

/// Cutoff sequence: 1, 2, 4, ... up to and including `trim_len`, then
/// `trim_len` again as many times as it takes to reach a fixed point
/// (sweep, then repeat at `trim_len` until no branch is removed).
fn cutoffs(trim_len: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut c = 1usize;
    while c < trim_len {
        out.push(c);
        c *= 2;
    }
    out.push(trim_len);
    out
}

pub fn trim<G: GraphOps>(store: &mut G, trim_len: usize) -> usize {
    if trim_len == 0 {
        return 0;
    }
    let mut total = 0usize;
    for cutoff in cutoffs(trim_len) {
        let removed = trim_pass(store, cutoff);
        total += removed;
        info!("trim pass (cutoff {cutoff}): removed {removed} branches");
    }
    loop {
        let removed = trim_pass(store, trim_len);
        total += removed;
        if removed == 0 {
            break;
        }
        info!("trim pass (cutoff {trim_len}, repeat): removed {removed} branches");
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edits::adjacency::generate_adjacency;
    use crate::kmer::Kmer;
    use crate::store::VertexStore;

    fn build(k: u8, seqs: &[&[u8]]) -> VertexStore {
        let mut s = VertexStore::new(k, false);
        for seq in seqs {
            for w in seq.windows(k as usize) {
                s.add(&Kmer::from_ascii(w, false).unwrap()).unwrap();
            }
        }
        s.finalize();
        generate_adjacency(&mut s);
        s
    }

    #[test]
    fn trims_a_short_dead_end_spur() {
        // Backbone "AAAACCCCGGGGTTTT" with a 1-base spur off the middle
        // is awkward to construct without a branch vertex; instead use a
        // short isolated dead-end chain directly: a 2-kmer tip shorter
        // than trim_len should be fully removed since it has no
        // reciprocal partner to rejoin.
        let mut s = build(4, &[b"AAAACCCC"]);
        let removed = trim(&mut s, 8);
        // A single linear chain with both ends true dead ends (NOEXT) is
        // entirely a "branch" from each endpoint; since it is shorter
        // than the cutoff it is removed in its entirety.
        assert!(removed >= 1);
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn keeps_branches_longer_than_trim_len() {
        let mut s = build(4, &[b"AAAACCCCGGGGTTTTAAAA"]);
        let before = s.len();
        trim(&mut s, 2);
        assert_eq!(s.len(), before);
    }
}
