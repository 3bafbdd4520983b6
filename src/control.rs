//! Control loop: sequences every phase from LOAD through DONE.
//!
//! `LOADING -> FINALIZE -> GEN_ADJ -> [ERODE] -> TRIM -> POP_BUBBLE ->
//! SPLIT -> ASSEMBLE -> DONE`. Every phase boundary calls `checkpoint()`,
//! a no-op for the single-process store and a real barrier for the
//! sharded one, so workers never race ahead into a phase whose
//! preconditions a slower peer hasn't finished establishing yet.
//! GEN_ADJ is skipped entirely when the store already carries adjacency
//! (loaded from a prior dump via `VertexStore::load`, which sets that
//! flag itself); callers signal "already loaded" by passing an empty
//! `input_paths` so LOADING/FINALIZE are skipped too.

use crate::config::AssemblyConfig;
use crate::contig::{walk_contigs, Contig};
use crate::edits::bubble::BubbleAllele;
use crate::edits::{erode, generate_adjacency, pop_bubbles, split, trim};
use crate::error::{AssemblyError, Result};
use crate::graph::GraphOps;
use crate::histogram::Histogram;
use crate::load::{load_files, LoadStats};
use log::info;
use std::path::PathBuf;

/// Everything a run produced, for the binary drivers to write to disk.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub load: LoadStats,
    pub eroded: usize,
    pub trimmed: usize,
    pub bubbles_popped: usize,
    pub split: usize,
    pub low_coverage_kmers: usize,
    pub contigs: Vec<Contig>,
    pub bubbles: Vec<Vec<BubbleAllele>>,
    pub histogram: Histogram,
}

/// Run every phase against `store`, which may already be finalized and
/// carrying adjacency (pass an empty `input_paths` in that case) or fresh
/// and in need of loading from `input_paths`.
pub fn run<G: GraphOps>(
    store: &mut G,
    config: &AssemblyConfig,
    input_paths: &[PathBuf],
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    if !input_paths.is_empty() {
        info!("LOADING {} file(s)", input_paths.len());
        summary.load = load_files(store, input_paths, config.k, config.colour_space)?;
        store.checkpoint();

        info!("FINALIZE");
        store.finalize();
        store.checkpoint();
    }

    if !store.adjacency_loaded() {
        info!("GEN_ADJ");
        generate_adjacency(store);
        store.set_adjacency_loaded(true);
    } else {
        info!("GEN_ADJ skipped: adjacency already loaded");
    }
    store.checkpoint();

    let local_hist = store.local_histogram();
    let merged = store.merge_histogram(local_hist);
    let min_cov = merged.first_local_minimum().ok_or_else(|| {
        AssemblyError::invariant("empty coverage histogram: LOAD produced zero live vertices")
    })?;
    summary.histogram = merged;

    let erode_total = Some(config.erode.map(|v| v as u64).unwrap_or(min_cov));
    let erode_strand = config.erode_strand.map(|v| v as u64);
    info!("ERODE (total >= {erode_total:?}, strand >= {erode_strand:?})");
    summary.eroded = erode(store, erode_total, erode_strand);
    store.checkpoint();

    info!("TRIM (cutoff {})", config.trim_len);
    summary.trimmed = trim(store, config.trim_len as usize);
    store.checkpoint();

    if config.bubble_popping_enabled() {
        info!("POP_BUBBLE (max branches {})", config.bubbles);
        let (bubbles, popped) = pop_bubbles(store, config.k, config.bubbles as usize);
        summary.bubbles_popped = popped;
        summary.bubbles = bubbles;
    } else {
        info!("POP_BUBBLE skipped: bubbles disabled");
    }
    store.checkpoint();

    info!("SPLIT");
    summary.split = split(store);
    store.checkpoint();

    info!("ASSEMBLE");
    store.begin_serialized_phase();
    let coverage_threshold = Some(config.coverage.unwrap_or(min_cov as f32));
    let (contigs, low_coverage_kmers) = walk_contigs(store, coverage_threshold);
    summary.contigs = contigs;
    summary.low_coverage_kmers = low_coverage_kmers;
    store.end_serialized_phase();
    store.checkpoint();

    info!(
        "DONE: {} contigs emitted, {} low-coverage k-mers discarded",
        summary.contigs.len(),
        summary.low_coverage_kmers
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::Kmer;
    use crate::store::VertexStore;
    use std::io::Write;

    fn config(k: u8) -> AssemblyConfig {
        AssemblyConfig {
            k,
            erode: Some(0),
            erode_strand: None,
            trim_len: 0,
            coverage: Some(0.0),
            bubbles: 0,
            snp_path: None,
            graph_dump_path: None,
            colour_space: false,
            rank: 0,
            size: 1,
        }
    }

    fn write_fasta(name: &str, seq: &str) -> PathBuf {
        let dir = std::env::temp_dir();
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, ">r1\n{seq}").unwrap();
        path
    }

    #[test]
    fn runs_the_full_loop_on_a_simple_linear_input() {
        let path = write_fasta("control_test_linear.fa", "ACGTACGTAC");
        let mut store = VertexStore::new(4, false);
        let summary = run(&mut store, &config(4), &[path.clone()]).unwrap();
        assert_eq!(summary.contigs.len(), 1);
        assert_eq!(summary.contigs[0].length, 10);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn pops_a_bubble_end_to_end() {
        let path = write_fasta("control_test_bubble.fa", "AAAAACCCCCGGGGG");
        let path2 = write_fasta("control_test_bubble2.fa", "AAAAATCCCCGGGGG");
        let mut store = VertexStore::new(5, false);
        let mut c = config(5);
        c.bubbles = 3;
        let summary = run(&mut store, &c, &[path.clone(), path2.clone()]).unwrap();
        assert_eq!(summary.bubbles_popped, 1);
        assert_eq!(summary.contigs.len(), 1);
        std::fs::remove_file(path).ok();
        std::fs::remove_file(path2).ok();
    }

    #[test]
    fn resumes_from_an_already_finalized_store_without_reloading() {
        let mut store = VertexStore::new(4, false);
        for w in b"ACGTACGTAC".windows(4) {
            store.add(&Kmer::from_ascii(w, false).unwrap()).unwrap();
        }
        store.finalize();
        let summary = run(&mut store, &config(4), &[]).unwrap();
        assert_eq!(summary.load.records_seen, 0);
        assert_eq!(summary.contigs.len(), 1);
    }

    #[test]
    fn empty_store_with_no_input_reports_invariant_violation() {
        let mut store = VertexStore::new(4, false);
        store.finalize();
        let err = run(&mut store, &config(4), &[]).unwrap_err();
        assert!(matches!(err, AssemblyError::Invariant(_)));
    }
}
