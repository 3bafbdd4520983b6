//! LOAD phase: decode input sequence files into k-mers and populate the
//! store. Decoding runs in parallel (via `abyss_seq::read_parallel`); store
//! mutation does not, so every `work` closure below hands back plain owned
//! data and the calling thread alone ever calls `store.add()`.

use crate::error::Result;
use crate::graph::GraphOps;
use crate::kmer::Kmer;
use abyss_seq::{create_reader, read_parallel, Record};
use log::{info, warn};
use std::path::{Path, PathBuf};

/// Per-run tally of what LOAD saw, kept rather than discarded so the
/// control loop can report a summary and so `AssemblyError`'s doc comment
/// has somewhere concrete to point readers who ask where input-data
/// problems (too-short reads, invalid characters) actually end up: here,
/// not in an error return.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadStats {
    pub records_seen: u64,
    pub records_kept: u64,
    pub too_short: u64,
    pub invalid_character: u64,
    pub kmers_added: u64,
}

impl LoadStats {
    pub fn merge(&mut self, other: &LoadStats) {
        self.records_seen += other.records_seen;
        self.records_kept += other.records_kept;
        self.too_short += other.too_short;
        self.invalid_character += other.invalid_character;
        self.kmers_added += other.kmers_added;
    }
}

fn is_colour_space_digit(c: u8) -> bool {
    matches!(c, b'0' | b'1' | b'2' | b'3')
}

fn is_valid_base(c: u8, colour_space: bool) -> bool {
    if colour_space {
        is_colour_space_digit(c)
    } else {
        matches!(c.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T')
    }
}

/// Peek the first byte of the first readable record across `paths`, before
/// `AssemblyConfig` is built: a leading colour-space digit latches the
/// whole run into colour-space mode, and that decision can't be deferred
/// once decoding starts.
pub fn detect_colour_space(paths: &[PathBuf]) -> Result<bool> {
    for path in paths {
        let mut reader = create_reader(path, 0)?;
        if let Some(record) = reader.next()? {
            if let Some(&first) = record.seq.first() {
                return Ok(is_colour_space_digit(first));
            }
        }
    }
    Ok(false)
}

/// Decode every k-mer window out of one batch of records, discarding (and
/// counting, never erroring on) reads shorter than `k` or carrying a
/// character outside the active alphabet.
fn decode_batch(records: &[Record], k: u8, colour_space: bool) -> (Vec<Kmer>, LoadStats) {
    let mut stats = LoadStats::default();
    let mut kmers = Vec::new();
    let kl = k as usize;
    for record in records {
        stats.records_seen += 1;
        if record.seq.len() < kl {
            stats.too_short += 1;
            continue;
        }
        if !record.seq.iter().all(|&c| is_valid_base(c, colour_space)) {
            stats.invalid_character += 1;
            continue;
        }
        stats.records_kept += 1;
        for window in record.seq.windows(kl) {
            if let Ok(kmer) = Kmer::from_ascii(window, colour_space) {
                kmers.push(kmer);
            }
        }
    }
    stats.kmers_added = kmers.len() as u64;
    (kmers, stats)
}

/// Every decoded k-mer plus the batch's stats, funneled one batch at a time
/// from `work` to the single consumer thread `read_parallel` runs `func`
/// on; `func` just accumulates, it never touches the store.
fn accumulate(parallel: &mut abyss_seq::ParallelResult<(Vec<Kmer>, LoadStats)>) -> (Vec<Kmer>, LoadStats) {
    let mut kmers = Vec::new();
    let mut stats = LoadStats::default();
    while let Some((batch_kmers, batch_stats)) = parallel.next() {
        kmers.extend(batch_kmers);
        stats.merge(&batch_stats);
    }
    (kmers, stats)
}

/// Every `PUMP_INTERVAL` adds the calling thread pumps the store, so a
/// sharded store's inbound message buffer can't back up behind a long
/// single-threaded `add()` run.
const PUMP_INTERVAL: usize = 256;

/// Decode and load every file in `paths` into `store`, in order, returning
/// the combined stats across all of them. `colour_space` must already be
/// latched (see `detect_colour_space`) before this is called.
pub fn load_files<G: GraphOps>(
    store: &mut G,
    paths: &[PathBuf],
    k: u8,
    colour_space: bool,
) -> Result<LoadStats> {
    let mut total = LoadStats::default();
    let n_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(3);
    let buffer_len = n_threads * 2;
    let batch_size = 1000;

    for (file_index, path) in paths.iter().enumerate() {
        info!("loading {} (file #{file_index})", path.display());
        let mut reader = create_reader(path, file_index)?;
        let (kmers, stats) = read_parallel(
            reader.as_mut(),
            n_threads,
            buffer_len,
            batch_size,
            move |records| decode_batch(records, k, colour_space),
            accumulate,
        )?;
        for (i, kmer) in kmers.iter().enumerate() {
            store.add(kmer);
            if i % PUMP_INTERVAL == PUMP_INTERVAL - 1 {
                store.pump();
            }
        }
        store.pump();
        if stats.too_short > 0 || stats.invalid_character > 0 {
            warn!(
                "{}: discarded {} too-short and {} invalid-character reads",
                path.display(),
                stats.too_short,
                stats.invalid_character
            );
        }
        total.merge(&stats);
    }

    info!(
        "load complete: {} records kept of {} seen, {} k-mers added",
        total.records_kept, total.records_seen, total.kmers_added
    );
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VertexStore;
    use std::io::Write;

    fn write_fasta(dir: &Path, name: &str, records: &[(&str, &str)]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        for (id, seq) in records {
            writeln!(f, ">{id}\n{seq}").unwrap();
        }
        path
    }

    #[test]
    fn loads_kmers_from_a_fasta_file() {
        let dir = std::env::temp_dir();
        let path = write_fasta(&dir, "load_test_basic.fa", &[("r1", "ACGTACGTAC")]);
        let mut store = VertexStore::new(4, false);
        let stats = load_files(&mut store, &[path.clone()], 4, false).unwrap();
        assert_eq!(stats.records_kept, 1);
        assert_eq!(stats.too_short, 0);
        assert!(store.len() > 0);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn discards_reads_shorter_than_k() {
        let dir = std::env::temp_dir();
        let path = write_fasta(&dir, "load_test_short.fa", &[("r1", "AC")]);
        let mut store = VertexStore::new(4, false);
        let stats = load_files(&mut store, &[path.clone()], 4, false).unwrap();
        assert_eq!(stats.too_short, 1);
        assert_eq!(stats.records_kept, 0);
        assert_eq!(store.len(), 0);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn discards_reads_with_invalid_characters() {
        let dir = std::env::temp_dir();
        let path = write_fasta(&dir, "load_test_invalid.fa", &[("r1", "ACGTNACGT")]);
        let mut store = VertexStore::new(4, false);
        let stats = load_files(&mut store, &[path.clone()], 4, false).unwrap();
        assert_eq!(stats.invalid_character, 1);
        assert_eq!(store.len(), 0);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn detects_colour_space_from_leading_digit() {
        let dir = std::env::temp_dir();
        let path = write_fasta(&dir, "load_test_cs.fa", &[("r1", "0123012301")]);
        let detected = detect_colour_space(&[path.clone()]).unwrap();
        assert!(detected);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn detects_base_space_when_no_digit_leads() {
        let dir = std::env::temp_dir();
        let path = write_fasta(&dir, "load_test_bs.fa", &[("r1", "ACGTACGTAC")]);
        let detected = detect_colour_space(&[path.clone()]).unwrap();
        assert!(!detected);
        std::fs::remove_file(path).ok();
    }
}
