//! Mark / split ambiguous: the final graph-cleaning pass before
//! contig emission. A first sweep marks every direction whose edge set is
//! ambiguous, or whose overlap surviving a shift in that direction is
//! itself a half-palindrome (and, for full palindromes, both directions
//! as a whole plus their sense-side neighbours); a second sweep severs
//! every marked direction entirely, cutting the graph into purely linear
//! fragments.

use crate::graph::GraphOps;
use crate::kmer::Direction;
use crate::vertex::Flag;
use log::info;

/// Resolved detail (`markAmbiguous`): in non-strand-specific mode, a
/// palindromic vertex is marked on *both* directions as a whole, and its
/// sense-direction neighbours are also marked (on the direction that
/// points back at the palindrome), in addition to the ordinary
/// per-direction "this edge set is ambiguous, or this direction is a
/// half-palindrome" marking every vertex gets.
fn mark_ambiguous<G: GraphOps>(store: &mut G) {
    for u in store.local_live_keys() {
        store.pump();
        let data = match store.get_seq_data(&u) {
            Some(d) => d,
            None => continue,
        };
        for dir in [Direction::Sense, Direction::Antisense] {
            if data.edges(dir).ambiguous() || u.is_palindrome_dir(dir) {
                store.mark(&u, Some(dir));
            }
        }
        if u.is_palindrome() {
            store.mark(&u, Some(Direction::Sense));
            store.mark(&u, Some(Direction::Antisense));
            for base in data.edges(Direction::Sense).bases() {
                let mut neighbor = u.clone();
                neighbor.shift(Direction::Sense, base);
                store.mark(&neighbor, Some(Direction::Antisense));
            }
        }
    }
    store.pump();
}

/// Second pass: clear every marked direction's entire edge set, severing
/// the matching reciprocal edge on the neighbor at the far end of each one.
fn split_marked<G: GraphOps>(store: &mut G) -> usize {
    let mut severed = 0usize;
    for u in store.local_live_keys() {
        store.pump();
        let data = match store.get_seq_data(&u) {
            Some(d) => d,
            None => continue,
        };
        for dir in [Direction::Sense, Direction::Antisense] {
            if !store.marked(&u, Some(dir)) {
                continue;
            }
            let edges = data.edges(dir);
            if edges.any() {
                for base in edges.bases() {
                    let mut neighbor = u.clone();
                    let dropped = neighbor.shift(dir, base);
                    store.remove_extension(
                        &neighbor,
                        dir.flip(),
                        crate::vertex::EdgeSet::from_bits(1 << dropped),
                    );
                }
                store.remove_extension(&u, dir, edges);
            }
            severed += 1;
        }
    }
    store.wipe_flag(Flag::MarkedSense);
    store.wipe_flag(Flag::MarkedAntisense);
    severed
}

/// Run the mark pass then the split pass. Returns the number of
/// (vertex, direction) pairs severed.
pub fn split<G: GraphOps>(store: &mut G) -> usize {
    mark_ambiguous(store);
    let severed = split_marked(store);
    info!("split {severed} ambiguous directions");
    severed
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
    fn splits_a_branch_point_into_disconnected_pieces() {
        let mut s = build(5, &[b"AAAAACCCCCGGGGG"]);
        for w in b"AAAAATCCCCGGGGG".windows(5) {
            s.add(&Kmer::from_ascii(w, false).unwrap()).unwrap();
        }
        generate_adjacency(&mut s);
        let branch_point = Kmer::from_ascii(b"AAAAA", false).unwrap();
        assert!(s.get_seq_data(&branch_point).unwrap().edges(Direction::Sense).ambiguous());
        split(&mut s);
        let after = s.get_seq_data(&branch_point).unwrap();
        assert!(!after.edges(Direction::Sense).any());
    }

    #[test]
    fn half_palindrome_direction_is_marked_and_severed_even_when_unambiguous() {
        // CAATT's single Sense edge (into AATTG) is not ambiguous, but
        // the overlap that edge leaves behind (AATT) is itself a
        // palindrome, so the direction must still be split.
        let mut s = build(5, &[b"CAATTG"]);
        let v = Kmer::from_ascii(b"CAATT", false).unwrap();
        let before = s.get_seq_data(&v).unwrap();
        assert!(!before.edges(Direction::Sense).ambiguous());
        assert!(before.edges(Direction::Sense).any());
        assert!(v.is_palindrome_dir(Direction::Sense));
        split(&mut s);
        let after = s.get_seq_data(&v).unwrap();
        assert!(!after.edges(Direction::Sense).any());
    }

    #[test]
    fn linear_graph_is_unaffected() {
        let mut s = build(4, &[b"ACGTACGTAC"]);
        let before: std::collections::HashSet<_> = s.iter_live_keys().collect();
        split(&mut s);
        let after: std::collections::HashSet<_> = s.iter_live_keys().collect();
        assert_eq!(before, after);
        let mid = Kmer::from_ascii(b"CGTA", false).unwrap();
        let data = s.get_seq_data(&mid).unwrap();
        assert!(data.edges(Direction::Sense).any());
        assert!(data.edges(Direction::Antisense).any());
    }
}
