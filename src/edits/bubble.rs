//! Bubble popping (optional): find vertices with a sense-ambiguous
//! extension, walk every alternative in lockstep (forking further if a
//! branch itself forks before the bubble rejoins), and when all branches
//! converge back onto the same k-mer, keep the highest-coverage path and
//! discard the rest.
//!
//! Only the `Sense` direction is scanned for bubble roots: a bubble's
//! antisense side looks exactly like a sense-ambiguous extension from the
//! other end, so scanning one direction over every live vertex still
//! finds (and pops) every bubble exactly once.

use crate::branch::{BranchRecord, BranchState};
use crate::graph::GraphOps;
use crate::kmer::{Direction, Kmer};
use crate::vertex::EdgeSet;
use log::info;

/// One allele of a popped bubble, handed back so the caller can write
/// every allele — kept and discarded alike — to the bubble FASTA file
/// before the discarded ones' k-mers are gone from the graph.
#[derive(Debug, Clone)]
pub struct BubbleAllele {
    pub sequence: Vec<u8>,
    pub length: usize,
    pub multiplicity: u64,
    pub kept: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupStatus {
    Active,
    Joined,
    TooLong,
    Loop,
    TooMany,
    NoExt,
}

/// Round-robin-extend every branch in `group` by exactly one step, forking
/// a clone per extra candidate base whenever a tip's forward extension is
/// itself ambiguous (the resolved forking rule: the bubble popper does not
/// stop on forward ambiguity the way a plain walk does, it tries every
/// alternative). Returns the group's status after this round.
fn bubble_round<G: GraphOps>(store: &mut G, group: &mut Vec<BranchRecord>, max_branches: usize) -> GroupStatus {
    let mut forked = Vec::new();
    for branch in group.iter_mut() {
        if !branch.state().is_active() {
            continue;
        }
        store.pump();
        let fwd = branch.forward_edges();
        if !fwd.any() {
            branch.mark_terminal(BranchState::NoExt);
            continue;
        }
        let bases: Vec<u8> = fwd.bases().collect();
        let snapshot = if bases.len() > 1 { Some(branch.clone()) } else { None };
        branch.extend_with_base(store, bases[0]);
        if let Some(snapshot) = snapshot {
            for &base in &bases[1..] {
                let mut clone = snapshot.clone();
                clone.extend_with_base(store, base);
                forked.push(clone);
            }
        }
    }
    group.extend(forked);

    if group.len() > max_branches {
        return GroupStatus::TooMany;
    }
    if group.iter().any(|b| b.state() == BranchState::TooLong) {
        return GroupStatus::TooLong;
    }
    if group.iter().any(|b| b.state() == BranchState::Loop) {
        return GroupStatus::Loop;
    }
    if group.iter().any(|b| b.state() == BranchState::NoExt) {
        return GroupStatus::NoExt;
    }
    // Every surviving branch is still `Active` at this point; `Joined` asks
    // whether they all currently sit on the same k-mer.
    let first_tip = &group[0].tip().0;
    if group.iter().all(|b| &b.tip().0 == first_tip) {
        return GroupStatus::Joined;
    }
    GroupStatus::Active
}

/// Sever the edge on `from` (in direction `dir`) that leads to `to`, by
/// probing every currently-set base until the shift lands on `to`. Avoids
/// needing to remember which specific base was used when the branch that
/// is being discarded was first created or last extended.
fn sever_edge_to<G: GraphOps>(store: &mut G, from: &Kmer, dir: Direction, to: &Kmer) {
    let data = match store.get_seq_data(from) {
        Some(d) => d,
        None => return,
    };
    for base in data.edges(dir).bases() {
        let mut candidate = from.clone();
        candidate.shift(dir, base);
        if &candidate == to {
            store.remove_extension(from, dir, EdgeSet::from_bits(1 << base));
            break;
        }
    }
}

fn discard_branch<G: GraphOps>(store: &mut G, root: &Kmer, branch: &BranchRecord) {
    let dir = branch.direction();
    let join = &branch.tip().0;
    let predecessor = if branch.len() >= 2 {
        branch.path()[branch.len() - 2].0.clone()
    } else {
        root.clone()
    };
    sever_edge_to(store, root, dir, &branch.path()[0].0);
    sever_edge_to(store, join, dir.flip(), &predecessor);
    // Every k-mer in the path except the shared join vertex belongs only
    // to this branch.
    for (k, _) in &branch.path()[..branch.len() - 1] {
        store.remove(k);
    }
}

/// Run one pass of bubble popping over every live vertex. Returns every
/// popped bubble as a `Vec` of its alleles (for the bubble FASTA writer)
/// and the number of bubbles popped.
pub fn pop_bubbles<G: GraphOps>(store: &mut G, k: u8, max_branches: usize) -> (Vec<Vec<BubbleAllele>>, usize) {
    let cap = 2 * (k as usize + 1);
    let mut bubbles = Vec::new();
    let mut popped = 0usize;

    for root in store.local_live_keys() {
        store.pump();
        let data = match store.get_seq_data(&root) {
            Some(d) => d,
            None => continue,
        };
        let fwd = data.edges(Direction::Sense);
        if !fwd.ambiguous() {
            continue;
        }
        let mut group = Vec::new();
        let mut ok = true;
        for base in fwd.bases() {
            let mut neighbor = root.clone();
            neighbor.shift(Direction::Sense, base);
            let neighbor_data = match store.get_seq_data(&neighbor) {
                Some(d) => d,
                None => {
                    ok = false;
                    break;
                }
            };
            group.push(BranchRecord::seeded(Direction::Sense, Some(cap), (neighbor, neighbor_data)));
        }
        if !ok {
            continue;
        }

        let status = loop {
            let status = bubble_round(store, &mut group, max_branches);
            if status != GroupStatus::Active {
                break status;
            }
        };

        if status != GroupStatus::Joined {
            continue; // TooLong/Loop/TooMany/NoExt: leave the graph unchanged
        }

        let best = group
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                // Highest total read support wins; ties broken by
                // lexicographically *smaller* path (a `Less` result here
                // makes `b` the winner under `max_by`).
                a.total_multiplicity().cmp(&b.total_multiplicity()).then_with(|| {
                    for (x, y) in a.path().iter().zip(b.path().iter()) {
                        let c = y.0.compare(&x.0);
                        if c != std::cmp::Ordering::Equal {
                            return c;
                        }
                    }
                    std::cmp::Ordering::Equal
                })
            })
            .map(|(i, _)| i)
            .unwrap();

        let mut alleles = Vec::with_capacity(group.len());
        for (i, branch) in group.iter().enumerate() {
            let sequence = branch_sequence(&root, branch);
            alleles.push(BubbleAllele {
                length: branch.len(),
                multiplicity: branch.total_multiplicity(),
                sequence,
                kept: i == best,
            });
            if i != best {
                discard_branch(store, &root, branch);
            }
        }
        bubbles.push(alleles);
        store.pump();
        popped += 1;
    }

    if popped > 0 {
        let discarded: usize = bubbles.iter().map(|b| b.len() - 1).sum();
        info!("popped {popped} bubbles, discarded {discarded} alternative paths");
    }
    (bubbles, popped)
}

/// Reconstruct the nucleotide sequence of `root` followed by `branch`'s
/// path, for the bubble FASTA writer.
fn branch_sequence(root: &Kmer, branch: &BranchRecord) -> Vec<u8> {
    let mut seq = root.decode();
    for (kmer, _) in branch.path() {
        seq.push(*kmer.decode().last().unwrap());
    }
    seq
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
    fn pops_a_single_base_snp_bubble() {
        // Two reads that agree except for one base in the middle; the
        // higher-coverage allele (C, seen twice) should survive and the
        // lower-coverage one (T, seen once) should be discarded.
        let mut s = build(5, &[b"AAAAACCCCCGGGGG", b"AAAAACCCCCGGGGG"]);
        for w in b"AAAAATCCCCGGGGG".windows(5) {
            s.add(&Kmer::from_ascii(w, false).unwrap()).unwrap();
        }
        generate_adjacency(&mut s);
        let before = s.len();
        let (bubbles, popped) = pop_bubbles(&mut s, 5, 3);
        assert_eq!(popped, 1);
        assert_eq!(bubbles.len(), 1);
        assert_eq!(bubbles[0].len(), 2);
        assert_eq!(bubbles[0].iter().filter(|a| a.kept).count(), 1);
        assert_eq!(bubbles[0].iter().filter(|a| !a.kept).count(), 1);
        assert!(s.len() < before);
    }

    #[test]
    fn leaves_non_ambiguous_graph_untouched() {
        let mut s = build(4, &[b"ACGTACGTAC"]);
        let before = s.len();
        let (bubbles, popped) = pop_bubbles(&mut s, 4, 3);
        assert_eq!(popped, 0);
        assert!(bubbles.is_empty());
        assert_eq!(s.len(), before);
    }
}
