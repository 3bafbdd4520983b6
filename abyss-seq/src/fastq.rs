use crate::reader::{dyn_reader, trim_end, Reader, BUFSIZE};
use crate::seq::{Record, SeqFormat, SEQ_LIMIT};
use std::io::{BufRead, BufReader, Read, Result};
use std::path::Path;

/// Reads one 4-line FASTQ record per call to `next()`. Quality lines are
/// read (to stay positioned correctly) but not otherwise inspected: the
/// core's only notion of "bad" input is an out-of-alphabet base, not a
/// quality score, and paired-end handling is out of scope for this engine.
pub struct FastqReader<R: Read + Send> {
    reader: BufReader<R>,
    file_index: usize,
    record_index: u64,
    header: Vec<u8>,
    seq: Vec<u8>,
    plus: Vec<u8>,
    quals: Vec<u8>,
}

impl<R> FastqReader<R>
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
            plus: Vec::new(),
            quals: Vec::new(),
        }
    }

    fn read_record(&mut self) -> Result<bool> {
        self.header.clear();
        if self.reader.read_until(b'\n', &mut self.header)? == 0 {
            return Ok(false);
        }
        self.seq.clear();
        if self.reader.read_until(b'\n', &mut self.seq)? == 0 {
            return Ok(false);
        }
        trim_end(&mut self.seq);

        self.plus.clear();
        if self.reader.read_until(b'\n', &mut self.plus)? == 0 {
            return Ok(false);
        }

        self.quals.clear();
        if self.reader.read_until(b'\n', &mut self.quals)? == 0 {
            return Ok(false);
        }
        trim_end(&mut self.quals);
        Ok(true)
    }

    fn id_from_header(&self) -> String {
        let slice = if self.header.starts_with(b"@") {
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

impl FastqReader<Box<dyn Read + Send>> {
    #[inline]
    pub fn from_path<P: AsRef<Path>>(path: P, file_index: usize) -> Result<Self> {
        let reader = dyn_reader(path)?;
        Ok(Self::new(reader, file_index))
    }
}

impl<R> Reader for FastqReader<R>
where
    R: Read + Send,
{
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
            format: SeqFormat::Fastq,
        }))
    }
}
