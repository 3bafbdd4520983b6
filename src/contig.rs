//! Linear-path contig walker: the final pass before ASSEMBLE reports
//! its output. By the time this runs, SPLIT has already severed every
//! ambiguous direction, so every vertex is either an ISLAND (no edges), an
//! ENDPOINT (edges in exactly one direction, the single remaining case the
//! walker needs to handle), or CONTIGUOUS (an interior vertex, skipped —
//! its contig will be emitted from one of its endpoints instead). A
//! palindromic ISLAND is the one case where a single physical vertex
//! stands in for two strand representatives (its reverse complement is
//! itself), so it is emitted twice rather than once.

use crate::branch::{BranchRecord, BranchState};
use crate::graph::GraphOps;
use crate::kmer::{Direction, Kmer};
use crate::vertex::VertexData;
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct Contig {
    pub id: u64,
    pub sequence: Vec<u8>,
    /// Base length of `sequence` (not the k-mer count of the walk).
    pub length: usize,
    /// Sum of per-k-mer multiplicities along the walk, reported verbatim
    /// in the FASTA header's COVERAGE field.
    pub coverage: u64,
}

/// Walk every live vertex to emit contigs, removing (rather than merely
/// excluding) any contig whose `coverage / k-mer-count` ratio falls below
/// `coverage_threshold`. Returns the emitted contigs and the number of
/// k-mers discarded as "low coverage" for end-of-run statistics.
pub fn walk_contigs<G: GraphOps>(
    store: &mut G,
    coverage_threshold: Option<f32>,
) -> (Vec<Contig>, usize) {
    let mut contigs = Vec::new();
    let mut low_coverage_kmers = 0usize;
    let mut next_id = 0u64;
    let mut consumed: HashSet<Kmer> = HashSet::new();
    let keys = store.local_live_keys();

    // Pass 1: islands and every endpoint-seeded linear branch.
    for u in &keys {
        store.pump();
        if consumed.contains(u) {
            continue;
        }
        let data = match store.get_seq_data(u) {
            Some(d) => d,
            None => continue,
        };
        if data.is_island() {
            consumed.insert(u.clone());
            // A palindromic k-mer's reverse complement is itself, so both
            // strand representatives collapse onto this one physical
            // vertex. Emit one island per representative (scenario E)
            // rather than silently dropping the second strand; the
            // underlying vertex is still only ever removed/consumed once.
            let emissions = if u.is_palindrome() { 2 } else { 1 };
            for _ in 0..emissions {
                emit_or_drop(
                    store,
                    &mut contigs,
                    &mut next_id,
                    &mut low_coverage_kmers,
                    vec![(u.clone(), data)],
                    coverage_threshold,
                );
            }
            continue;
        }
        let dir = match data.is_endpoint() {
            Some(d) => d,
            None => continue, // CONTIGUOUS: interior vertex, or part of a closed cycle (pass 2)
        };
        let path = match walk_branch(store, u, &data, dir) {
            Some(p) => p,
            None => continue,
        };
        for (kmer, _) in &path {
            consumed.insert(kmer.clone());
        }
        if !is_canonical_orientation(&path) {
            continue; // the other endpoint's walk (this path's reverse complement) emits it
        }
        emit_or_drop(
            store,
            &mut contigs,
            &mut next_id,
            &mut low_coverage_kmers,
            path,
            coverage_threshold,
        );
    }

    // Pass 2: components with no endpoint at all — closed cycles (every
    // vertex CONTIGUOUS), e.g. a fully-assembled circular plasmid.
    for u in &keys {
        if consumed.contains(u) {
            continue;
        }
        let data = match store.get_seq_data(u) {
            Some(d) => d,
            None => continue,
        };
        if data.is_island() || data.is_endpoint().is_some() {
            continue;
        }
        let mut path = match walk_branch(store, u, &data, Direction::Sense) {
            Some(p) => p,
            None => continue,
        };
        for (kmer, _) in &path {
            consumed.insert(kmer.clone());
        }
        // A Sense-direction walk around a closed, endpoint-free cycle
        // necessarily comes back around to `u` itself (every vertex in
        // the component has exactly one outgoing edge); drop that
        // trailing repeat so the path names the cycle exactly once.
        if path.last().map(|(k, _)| k) != Some(u) {
            continue; // not actually a closed cycle; leave it for a future pass
        }
        path.pop();
        let min = path
            .iter()
            .map(|(k, _)| k)
            .min_by(|a, b| a.compare(b))
            .cloned()
            .unwrap_or_else(|| u.clone());
        if &min != u {
            continue; // the rotation starting at `min` emits this cycle instead
        }
        emit_or_drop(
            store,
            &mut contigs,
            &mut next_id,
            &mut low_coverage_kmers,
            path,
            coverage_threshold,
        );
    }

    (contigs, low_coverage_kmers)
}

/// Walk from `root`'s single live neighbor in `dir` to completion, and
/// return the full path (including `root` itself at the front). A
/// terminal state of `Loop` or `NoExt` is the only acceptable outcome
/// here; `AmbiSame`/`AmbiOpp` are impossible because split has already
/// run.
fn walk_branch<G: GraphOps>(
    store: &mut G,
    root: &Kmer,
    root_data: &VertexData,
    dir: Direction,
) -> Option<Vec<(Kmer, VertexData)>> {
    let base = root_data.edges(dir).single_base()?;
    let mut neighbor = root.clone();
    neighbor.shift(dir, base);
    let neighbor_data = store.get_seq_data(&neighbor)?;
    let mut branch = BranchRecord::seeded(dir, None, (neighbor, neighbor_data));
    let state = branch.walk_to_completion(store);
    debug_assert!(
        matches!(state, BranchState::NoExt | BranchState::Loop),
        "ambiguous termination {state:?} after SPLIT should be impossible"
    );
    let mut path = vec![(root.clone(), *root_data)];
    path.extend(branch.path().iter().cloned());
    Some(path)
}

/// Emit this contig exactly once regardless of which endpoint's walk
/// found it, by comparing the walk's first and last k-mer: the reverse
/// walk from the other endpoint sees first and last swapped, so exactly
/// one of the two comparisons is non-`Greater`.
fn is_canonical_orientation(path: &[(Kmer, VertexData)]) -> bool {
    let first = &path[0].0;
    let last = &path[path.len() - 1].0;
    first.compare(last) != Ordering::Greater
}

fn emit_or_drop<G: GraphOps>(
    store: &mut G,
    contigs: &mut Vec<Contig>,
    next_id: &mut u64,
    low_coverage_kmers: &mut usize,
    path: Vec<(Kmer, VertexData)>,
    coverage_threshold: Option<f32>,
) {
    let kmer_count = path.len();
    let total: u64 = path.iter().map(|(_, v)| v.total_multiplicity()).sum();
    let ratio = total as f32 / kmer_count as f32;
    if let Some(threshold) = coverage_threshold {
        if ratio < threshold {
            for (kmer, _) in &path {
                store.remove(kmer);
            }
            *low_coverage_kmers += kmer_count;
            return;
        }
    }
    let sequence = sequence_from_path(&path);
    let length = sequence.len();
    contigs.push(Contig {
        id: *next_id,
        sequence,
        length,
        coverage: total,
    });
    *next_id += 1;
}

fn sequence_from_path(path: &[(Kmer, VertexData)]) -> Vec<u8> {
    let mut seq = path[0].0.decode();
    for (kmer, _) in &path[1..] {
        seq.push(*kmer.decode().last().unwrap());
    }
    seq
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edits::{generate_adjacency, split};
    use crate::store::VertexStore;

    fn build(k: u8, seq: &[u8]) -> VertexStore {
        let mut s = VertexStore::new(k, false);
        for w in seq.windows(k as usize) {
            s.add(&Kmer::from_ascii(w, false).unwrap()).unwrap();
        }
        s.finalize();
        generate_adjacency(&mut s);
        s
    }

    #[test]
    fn walks_a_simple_linear_contig() {
        let mut s = build(4, b"ACGTACGTAC");
        split(&mut s);
        let (contigs, low_cov) = walk_contigs(&mut s, None);
        assert_eq!(low_cov, 0);
        assert_eq!(contigs.len(), 1);
        assert_eq!(contigs[0].length, 10);
    }

    #[test]
    fn emits_an_isolated_kmer_as_a_one_base_k_island() {
        let mut s = VertexStore::new(4, false);
        s.add(&Kmer::from_ascii(b"AAAA", false).unwrap()).unwrap();
        s.finalize();
        generate_adjacency(&mut s);
        let (contigs, _) = walk_contigs(&mut s, None);
        assert_eq!(contigs.len(), 1);
        assert_eq!(contigs[0].length, 4);
    }

    #[test]
    fn palindromic_island_present_twice_emits_two_contigs_without_duplicating_the_vertex() {
        // Scenario E: a palindromic k-mer (k=4) added from two separate
        // reads is still exactly one physical vertex (its RC is itself),
        // but SPLIT/ASSEMBLE must still report one island per strand.
        let mut s = VertexStore::new(4, false);
        s.add(&Kmer::from_ascii(b"AATT", false).unwrap()).unwrap();
        s.add(&Kmer::from_ascii(b"AATT", false).unwrap()).unwrap();
        s.finalize();
        generate_adjacency(&mut s);
        assert_eq!(s.len(), 1);
        split(&mut s);
        let (contigs, low_cov) = walk_contigs(&mut s, None);
        assert_eq!(low_cov, 0);
        assert_eq!(contigs.len(), 2);
        for c in &contigs {
            assert_eq!(c.length, 4);
            assert_eq!(c.sequence, b"AATT");
        }
    }

    #[test]
    fn low_coverage_contig_is_removed_from_the_store() {
        let mut s = build(4, b"ACGTACGTAC");
        split(&mut s);
        let before = s.len();
        let (contigs, low_cov) = walk_contigs(&mut s, Some(100.0));
        assert!(contigs.is_empty());
        assert_eq!(low_cov, before);
        assert_eq!(s.len(), 0);
    }
}
