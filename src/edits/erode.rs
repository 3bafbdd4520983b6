//! Erosion (optional): strip low-coverage dead-end vertices, with the
//! removal cascading inward as newly-exposed dead ends qualify in turn.
//!
//! Rather than the reference implementation's observer-callback cascade,
//! this pass uses an explicit worklist, which is the natural Rust shape
//! for the same idea (and works uniformly over `GraphOps`, so it runs
//! unmodified against both the single-process store and the sharded
//! one). `VertexStore` still exposes a `ChangeObserver` hook (see
//! `store.rs`) for callers that want to watch edits made through other
//! means; this pass doesn't need it.

use crate::graph::GraphOps;
use crate::kmer::Direction;
use crate::vertex::{EdgeSet, VertexData};
use log::info;
use std::collections::{HashSet, VecDeque};

fn should_erode(data: &VertexData, erode_total: Option<u64>, erode_strand: Option<u64>) -> bool {
    let zero_in = !data.edges(Direction::Antisense).any();
    let zero_out = !data.edges(Direction::Sense).any();
    if !(zero_in || zero_out) {
        return false;
    }
    let total_low = erode_total.is_some_and(|t| data.total_multiplicity() < t);
    let strand_low = erode_strand.is_some_and(|t| {
        (data.multiplicity(Direction::Sense) as u64) < t
            || (data.multiplicity(Direction::Antisense) as u64) < t
    });
    total_low || strand_low
}

/// Run one erosion pass (which, via its cascade, handles the rest).
/// Returns the number of vertices removed. `erode_total`/`erode_strand`
/// of `None` disable that half of the criterion (`erode` of 0 disables
/// the pass entirely, which the caller expresses by never calling this
/// function rather than by passing `Some(0)`).
pub fn erode<G: GraphOps>(
    store: &mut G,
    erode_total: Option<u64>,
    erode_strand: Option<u64>,
) -> usize {
    let mut queue: VecDeque<_> = store.local_live_keys().into_iter().collect();
    let mut queued: HashSet<_> = queue.iter().cloned().collect();
    let mut removed = 0usize;

    while let Some(k) = queue.pop_front() {
        queued.remove(&k);
        store.pump();
        let data = match store.get_seq_data(&k) {
            Some(d) => d,
            None => continue,
        };
        if !should_erode(&data, erode_total, erode_strand) {
            continue;
        }
        for dir in [Direction::Sense, Direction::Antisense] {
            for base in data.edges(dir).bases() {
                let mut neighbor = k.clone();
                let dropped = neighbor.shift(dir, base);
                store.remove_extension(&neighbor, dir.flip(), EdgeSet::from_bits(1 << dropped));
                if queued.insert(neighbor.clone()) {
                    queue.push_back(neighbor);
                }
            }
        }
        store.remove(&k);
        removed += 1;
    }

    if removed > 0 {
        info!("eroded {removed} vertices");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edits::adjacency::generate_adjacency;
    use crate::kmer::Kmer;
    use crate::store::VertexStore;

    #[test]
    fn erodes_low_coverage_tip_and_cascades() {
        let mut s = VertexStore::new(4, false);
        // A long, well-covered backbone with a single-copy 1-base overhang
        // at one end: eroding should strip the overhang only.
        for w in b"AAACGTACGTTT".windows(4) {
            let k = Kmer::from_ascii(w, false).unwrap();
            s.add(&k).unwrap();
            s.add(&k).unwrap(); // multiplicity 2
        }
        let tip = Kmer::from_ascii(b"TTTT", false).unwrap();
        s.add(&tip).unwrap(); // multiplicity 1, dead end
        s.finalize();
        generate_adjacency(&mut s);
        let removed = erode(&mut s, Some(2), None);
        assert!(removed >= 1);
        assert!(!s.contains(&tip));
    }

    #[test]
    fn disabled_thresholds_erode_nothing() {
        let mut s = VertexStore::new(4, false);
        for w in b"ACGTACGT".windows(4) {
            s.add(&Kmer::from_ascii(w, false).unwrap()).unwrap();
        }
        s.finalize();
        generate_adjacency(&mut s);
        let before = s.len();
        erode(&mut s, None, None);
        assert_eq!(s.len(), before);
    }
}
