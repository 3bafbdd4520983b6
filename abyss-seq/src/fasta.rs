use crate::reader::{dyn_reader, trim_end, Reader, BUFSIZE};
use crate::seq::{Record, SeqFormat, SEQ_LIMIT};
use std::io::{BufRead, BufReader, Read, Result};
use std::path::Path;

/// Reads one `>`-delimited FASTA record per call to `next()`.
pub struct FastaReader<R>
where
    R: Read + Send,
{
    reader: BufReader<R>,
    file_index: usize,
    record_index: u64,
    header: Vec<u8>,
    seq: Vec<u8>,
}

impl<R> FastaReader<R>
where
    R: Read + Send,
{
    pub fn new(reader: R, file_index: usize) -> Self {
        Self::with_capacity(reader, file_index, BUFSIZE)
    }

    pub fn with_capacity(reader: R, file_index: usize, capacity: usize) -> Self {
        assert!(capacity >= 3);
        Self {
            reader: BufReader::with_capacity(capacity, reader),
            file_index,
            record_index: 0,
            header: Vec::new(),
            seq: Vec::new(),
        }
    }

    fn read_record(&mut self) -> Result<bool> {
        self.header.clear();
        if self.reader.read_until(b'\n', &mut self.header)? == 0 {
            return Ok(false);
        }
        self.seq.clear();
        if self.reader.read_until(b'>', &mut self.seq)? == 0 {
            return Ok(false);
        }
        // read_until leaves the delimiter '>' attached when found mid-stream
        if self.seq.last() == Some(&b'>') {
            self.seq.pop();
        }
        trim_end(&mut self.seq);
        // FASTA sequences are conventionally wrapped across multiple
        // lines; strip every embedded newline, not just the trailing run.
        self.seq.retain(|&b| b != b'\n' && b != b'\r');
        Ok(true)
    }

    fn id_from_header(&self) -> String {
        let slice = if self.header.starts_with(b">") {
            &self.header[1..]
        } else {
            &self.header[..]
        };
        let s = String::from_utf8_lossy(slice);
        let s = s.trim_end();
        match s.as_bytes().iter().position(|&c| c == b' ' || c == b'\t') {
            Some(i) => s[..i].to_string(),
            None => s.to_string(),
        }
    }
}

impl FastaReader<Box<dyn Read + Send>> {
    #[inline]
    pub fn from_path<P: AsRef<Path>>(path: P, file_index: usize) -> Result<Self> {
        let reader = dyn_reader(path)?;
        Ok(Self::new(reader, file_index))
    }
}

impl<R: Read + Send> Reader for FastaReader<R> {
    fn next(&mut self) -> Result<Option<Record>> {
        if !self.read_record()? {
            return Ok(None);
        }
        if self.seq.len() as u64 > SEQ_LIMIT {
            log::warn!(
                "record {} in file {} exceeds the maximum handled sequence length, skipping",
                self.record_index,
                self.file_index
            );
            return self.next();
        }
        let id = self.id_from_header();
        self.record_index += 1;
        Ok(Some(Record {
            file_index: self.file_index,
            record_index: self.record_index,
            id,
            seq: self.seq.to_ascii_uppercase(),
            format: SeqFormat::Fasta,
        }))
    }
}
