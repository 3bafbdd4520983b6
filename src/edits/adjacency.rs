//! Adjacency generation: the first graph edit, run once after FINALIZE
//! (or skipped entirely when a loaded dump already carries adjacency).

use crate::graph::GraphOps;
use crate::kmer::Direction;
use log::info;

/// For every live vertex `u` and direction `d`, probe all four possible
/// one-base extensions; whenever the candidate k-mer exists, set *its*
/// reciprocal edge back to `u` (not `u`'s own edge — that gets set in the
/// symmetric iteration when the loop later visits the candidate itself).
/// Running this pass once over every live vertex therefore establishes
/// every reciprocal edge exactly.
pub fn generate_adjacency<G: GraphOps>(store: &mut G) {
    let keys = store.local_live_keys();
    let mut edges_set = 0u64;
    for (i, u) in keys.iter().enumerate() {
        for dir in [Direction::Sense, Direction::Antisense] {
            for base in 0..4u8 {
                let mut candidate = u.clone();
                let dropped = candidate.shift(dir, base);
                if store.get_seq_data(&candidate).is_some()
                    && store.set_base_extension(&candidate, dir.flip(), dropped)
                {
                    edges_set += 1;
                }
            }
        }
        if i % 1_000_000 == 999_999 {
            store.pump();
        }
    }
    store.pump();
    info!("generated {edges_set} adjacency edges over {} vertices", keys.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::Kmer;
    use crate::store::VertexStore;

    #[test]
    fn linear_chain_gets_reciprocal_edges() {
        let mut s = VertexStore::new(4, false);
        for w in b"ACGTACGTAC".windows(4) {
            s.add(&Kmer::from_ascii(w, false).unwrap()).unwrap();
        }
        s.finalize();
        generate_adjacency(&mut s);
        let a = Kmer::from_ascii(b"ACGT", false).unwrap();
        let data = s.get_seq_data(&a).unwrap();
        assert!(data.edges(Direction::Sense).any());
    }

    #[test]
    fn bubble_branch_point_sees_ambiguous_extension() {
        let mut s = VertexStore::new(5, false);
        for w in b"AAAAACCCCCGGGGG".windows(5) {
            s.add(&Kmer::from_ascii(w, false).unwrap()).unwrap();
        }
        for w in b"AAAAATCCCCGGGGG".windows(5) {
            s.add(&Kmer::from_ascii(w, false).unwrap()).unwrap();
        }
        s.finalize();
        generate_adjacency(&mut s);
        let branch_point = Kmer::from_ascii(b"AAAAA", false).unwrap();
        let data = s.get_seq_data(&branch_point).unwrap();
        assert!(data.edges(Direction::Sense).ambiguous());
    }
}
