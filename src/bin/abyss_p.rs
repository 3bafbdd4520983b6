//! Multi-process assembly driver: one OS process per shard, connected by
//! TCP, running the identical control loop `abyss-rs` does against a
//! `ChannelTransport` of size 1 — only the transport and the process
//! topology differ. Rank 0 is the controller: after every worker reaches
//! DONE it concatenates the rank-suffixed contig and bubble files into
//! the merged output a single-process run would have produced.

use abyss_rs::shard::{ShardedStore, TcpTransport};
use abyss_rs::{control, load, output, AssemblyConfig, VertexStore};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Assemble a de Bruijn graph sharded across a fixed set of peer processes.
#[derive(Parser, Debug)]
#[clap(author, version, about = "Distributed (multi-process) de Bruijn graph genome assembler")]
struct Args {
    /// K-mer length.
    #[arg(short = 'k', long)]
    k: u8,

    /// This process's rank, in `0..size`.
    #[arg(long)]
    rank: usize,

    /// Total number of worker processes.
    #[arg(long)]
    size: usize,

    /// `host:port` of every peer, indexed by rank (this process's own
    /// entry is the address it listens on).
    #[arg(long, value_delimiter = ',', required = true)]
    peers: Vec<String>,

    /// Erode dead ends whose total multiplicity is below this cutoff
    /// (defaults to the coverage histogram's first local minimum).
    #[arg(long)]
    erode: Option<u32>,

    /// As `--erode`, checked per strand instead of on the summed
    /// multiplicity. Unset leaves this half of the criterion disabled.
    #[arg(long = "erode-strand")]
    erode_strand: Option<u32>,

    /// Tip-trimming length cutoff; 0 disables the pass.
    #[arg(long = "trim-len", default_value_t = 0)]
    trim_len: u32,

    /// Minimum coverage (total multiplicity / k-mer count) a contig must
    /// clear to be emitted (defaults to the same histogram-derived
    /// minimum used for `--erode`).
    #[arg(long)]
    coverage: Option<f32>,

    /// Maximum branches a bubble group may fork into; 0 disables bubble
    /// popping.
    #[arg(long, default_value_t = 0)]
    bubbles: u32,

    /// Directory (and filename prefix) output files are written under.
    #[arg(long = "output-prefix", default_value = "./")]
    output_prefix: PathBuf,

    /// Input FASTA/FASTQ read files; every rank reads every file and
    /// relies on k-mer-hash routing to keep only the ones it owns.
    #[arg(required = true)]
    input_files: Vec<PathBuf>,
}

/// Append every rank's `<stem>-<rank>.<ext>` file onto one merged
/// `<stem>.<ext>`, in rank order, matching the record order a
/// single-process run would have produced them in.
fn concatenate_ranked_outputs(prefix: &std::path::Path, stem: &str, ext: &str, size: usize) -> std::io::Result<()> {
    let mut merged = std::fs::File::create(prefix.join(format!("{stem}.{ext}")))?;
    for rank in 0..size {
        let part = std::fs::read(prefix.join(format!("{stem}-{rank}.{ext}")))?;
        merged.write_all(&part)?;
    }
    Ok(())
}

fn run(args: Args) -> abyss_rs::Result<()> {
    let colour_space = load::detect_colour_space(&args.input_files)?;
    let config = AssemblyConfig {
        k: args.k,
        erode: args.erode,
        erode_strand: args.erode_strand,
        trim_len: args.trim_len,
        coverage: args.coverage,
        bubbles: args.bubbles,
        snp_path: None,
        graph_dump_path: None,
        colour_space,
        rank: args.rank,
        size: args.size,
    };
    config.validate()?;

    let transport = TcpTransport::connect(config.rank, &args.peers, config.k, config.colour_space)?;
    let mut store = ShardedStore::new(VertexStore::new(config.k, config.colour_space), transport);

    let summary = control::run(&mut store, &config, &args.input_files)?;

    log::info!(
        "rank {}: LOAD {} record(s) seen, {} kept; DONE {} contig(s), {} low-coverage k-mer(s)",
        config.rank,
        summary.load.records_seen,
        summary.load.records_kept,
        summary.contigs.len(),
        summary.low_coverage_kmers,
    );

    std::fs::create_dir_all(&args.output_prefix)?;
    let contigs_path = args.output_prefix.join(format!("contigs-{}.fa", config.rank));
    output::write_contigs_fasta(&contigs_path, &summary.contigs)?;
    let snp_path = args.output_prefix.join(format!("snp-{}.fa", config.rank));
    output::write_bubbles_fasta(&snp_path, &summary.bubbles)?;

    // Every rank reaches this point only after every other rank's own
    // DONE-phase checkpoint has already been observed (the control loop's
    // last `store.checkpoint()` call), so every rank-suffixed file rank 0
    // is about to read here is guaranteed to exist and be complete.
    if config.rank == 0 {
        concatenate_ranked_outputs(&args.output_prefix, "contigs", "fa", config.size)?;
        concatenate_ranked_outputs(&args.output_prefix, "snp", "fa", config.size)?;
        let histogram_path = args.output_prefix.join("histogram.tsv");
        output::write_histogram(&histogram_path, &summary.histogram)?;
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("abyss-p: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
