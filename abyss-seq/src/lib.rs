//! FASTA/FASTQ/gzip/bzip2 read ingestion, decoupled from the assembly core
//! so that the k-mer engine never has to know how a sequence reached it.

mod fasta;
mod fastq;
mod parallel;
mod reader;
mod seq;

pub use fasta::*;
pub use fastq::*;
pub use parallel::*;
pub use reader::*;
pub use seq::*;
