//! Single-process assembly driver: builds one `AssemblyConfig` at rank 0
//! of size 1 and runs the full control loop against a `ChannelTransport`
//! mesh of size 1 — the degenerate sharded case, so this binary exercises
//! the exact same message-passing code path `abyss-p` does, just with no
//! peer ever on the other end of it.

use abyss_rs::shard::{ChannelTransport, ShardedStore};
use abyss_rs::{control, load, output, AssemblyConfig, VertexStore};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Assemble a de Bruijn graph from one or more FASTA/FASTQ read files.
#[derive(Parser, Debug)]
#[clap(author, version, about = "De Bruijn graph genome assembler")]
struct Args {
    /// K-mer length.
    #[arg(short = 'k', long)]
    k: u8,

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

    /// Write popped bubble alleles to this FASTA path instead of the
    /// default `<prefix>snp.fa`.
    #[arg(long = "snp-path")]
    snp_path: Option<PathBuf>,

    /// Write a GraphViz dump of the post-SPLIT graph to this path.
    #[arg(long = "graph-dump")]
    graph_dump: Option<PathBuf>,

    /// Directory (and filename prefix) output files are written under.
    #[arg(long = "output-prefix", default_value = "./")]
    output_prefix: PathBuf,

    /// Input FASTA/FASTQ read files (may be gzip- or bzip2-compressed).
    #[arg(required = true)]
    input_files: Vec<PathBuf>,
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
        snp_path: args.snp_path.clone(),
        graph_dump_path: args.graph_dump.clone(),
        colour_space,
        rank: 0,
        size: 1,
    };
    config.validate()?;

    let transport = ChannelTransport::mesh(1, config.k, config.colour_space)
        .pop()
        .expect("mesh(1, ..) always returns exactly one transport");
    let mut store = ShardedStore::new(VertexStore::new(config.k, config.colour_space), transport);

    let summary = control::run(&mut store, &config, &args.input_files)?;

    log::info!(
        "LOAD: {} record(s) seen, {} kept, {} too short, {} with an invalid character",
        summary.load.records_seen,
        summary.load.records_kept,
        summary.load.too_short,
        summary.load.invalid_character,
    );

    std::fs::create_dir_all(&args.output_prefix)?;
    let contigs_path = args.output_prefix.join("contigs.fa");
    output::write_contigs_fasta(&contigs_path, &summary.contigs)?;

    let snp_path = config.snp_path.unwrap_or_else(|| args.output_prefix.join("snp.fa"));
    output::write_bubbles_fasta(&snp_path, &summary.bubbles)?;

    let histogram_path = args.output_prefix.join("histogram.tsv");
    output::write_histogram(&histogram_path, &summary.histogram)?;

    if let Some(graph_dump) = config.graph_dump_path {
        output::write_graphviz(&graph_dump, store.local_store())?;
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("abyss-rs: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
