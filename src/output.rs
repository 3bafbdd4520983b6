//! Plain buffered output writers: contig FASTA, bubble FASTA, coverage
//! histogram TSV, and an optional GraphViz dump. No abstraction beyond
//! `std::io::Write`; each writer owns exactly one file.

use crate::contig::Contig;
use crate::edits::bubble::BubbleAllele;
use crate::error::Result;
use crate::histogram::Histogram;
use crate::kmer::Direction;
use crate::store::VertexStore;
use std::io::{BufWriter, Write};
use std::path::Path;

/// `contigs-<rank>.fa`, header `>ID LEN COVERAGE`.
pub fn write_contigs_fasta(path: &Path, contigs: &[Contig]) -> Result<()> {
    let mut w = BufWriter::new(std::fs::File::create(path)?);
    for contig in contigs {
        writeln!(w, ">{} {} {}", contig.id, contig.length, contig.coverage)?;
        w.write_all(&contig.sequence)?;
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}

/// `snp-<rank>.fa`, two (or more) records per bubble: `>ID{A,B,...} LEN
/// MULTIPLICITY`, one per allele in the order the bubble popper returned
/// them (kept allele included, so the file is a complete record of every
/// path considered, not just the discarded ones).
pub fn write_bubbles_fasta(path: &Path, bubbles: &[Vec<BubbleAllele>]) -> Result<()> {
    let mut w = BufWriter::new(std::fs::File::create(path)?);
    for (id, alleles) in bubbles.iter().enumerate() {
        for (i, allele) in alleles.iter().enumerate() {
            let letter = (b'A' + i as u8) as char;
            writeln!(w, ">{id}{letter} {} {}", allele.length, allele.multiplicity)?;
            w.write_all(&allele.sequence)?;
            writeln!(w)?;
        }
    }
    w.flush()?;
    Ok(())
}

/// Two-column text, `<multiplicity>\t<count>\n`, one line per non-zero
/// bucket in increasing multiplicity order.
pub fn write_histogram(path: &Path, histogram: &Histogram) -> Result<()> {
    let mut w = BufWriter::new(std::fs::File::create(path)?);
    for (multiplicity, count) in histogram.iter() {
        writeln!(w, "{multiplicity}\t{count}")?;
    }
    w.flush()?;
    Ok(())
}

/// GraphViz `digraph`: one `"<id><+/->"` vertex per strand, with an edge to
/// every outgoing neighbor in that strand's frame. Strictly a diagnostic
/// aid (`--graph-dump`), so it walks a concrete `VertexStore` directly
/// rather than going through `GraphOps` — there is no sharded equivalent,
/// each worker dumps only its own shard.
pub fn write_graphviz(path: &Path, store: &VertexStore) -> Result<()> {
    let mut w = BufWriter::new(std::fs::File::create(path)?);
    writeln!(w, "digraph G {{")?;
    for (kmer, data) in store.iter_live() {
        let id = String::from_utf8_lossy(&kmer.decode()).into_owned();
        for (dir, sign) in [(Direction::Sense, '+'), (Direction::Antisense, '-')] {
            let label = format!("{id}{sign}");
            for base in data.edges(dir).bases() {
                let mut neighbor = kmer.clone();
                neighbor.shift(dir, base);
                let neighbor_id = String::from_utf8_lossy(&neighbor.decode()).into_owned();
                let neighbor_sign = if dir == Direction::Sense { '+' } else { '-' };
                writeln!(w, "  \"{label}\" -> \"{neighbor_id}{neighbor_sign}\";")?;
            }
        }
    }
    writeln!(w, "}}")?;
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contig::Contig;

    #[test]
    fn writes_contig_fasta_header_and_sequence() {
        let dir = std::env::temp_dir();
        let path = dir.join("output_test_contigs.fa");
        let contigs = vec![Contig { id: 0, sequence: b"ACGT".to_vec(), length: 4, coverage: 7 }];
        write_contigs_fasta(&path, &contigs).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, ">0 4 7\nACGT\n");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn writes_bubble_fasta_with_letter_suffixes() {
        let dir = std::env::temp_dir();
        let path = dir.join("output_test_bubbles.fa");
        let bubbles = vec![vec![
            BubbleAllele { sequence: b"AC".to_vec(), length: 2, multiplicity: 3, kept: true },
            BubbleAllele { sequence: b"AT".to_vec(), length: 2, multiplicity: 1, kept: false },
        ]];
        write_bubbles_fasta(&path, &bubbles).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, ">0A 2 3\nAC\n>0B 2 1\nAT\n");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn writes_histogram_as_two_column_tsv() {
        let dir = std::env::temp_dir();
        let path = dir.join("output_test_hist.tsv");
        let mut h = Histogram::new();
        h.insert_count(2, 5);
        h.insert_count(7, 1);
        write_histogram(&path, &h).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "2\t5\n7\t1\n");
        std::fs::remove_file(path).ok();
    }
}
