use crate::seq::Record;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, Read, Result, Seek};
use std::path::Path;

/// Open `path`, transparently unwrapping a gzip or bzip2 envelope if one is
/// present. Detection peeks the first two bytes and rewinds, so callers never
/// see the compressed bytes either way.
pub fn dyn_reader<P: AsRef<Path>>(path: P) -> Result<Box<dyn Read + Send>> {
    let mut file = open_file(path)?;
    match sniff(&mut file)? {
        Envelope::Gzip => Ok(Box::new(GzDecoder::new(file))),
        Envelope::Bzip2 => Ok(Box::new(BzDecoder::new(file))),
        Envelope::Plain => Ok(Box::new(file)),
    }
}

enum Envelope {
    Gzip,
    Bzip2,
    Plain,
}

fn sniff(file: &mut File) -> Result<Envelope> {
    let mut buffer = [0u8; 3];
    let n = file.read(&mut buffer)?;
    file.rewind()?;
    if n >= 2 && buffer[..2] == [0x1f, 0x8b] {
        Ok(Envelope::Gzip)
    } else if n >= 3 && buffer[..3] == *b"BZh" {
        Ok(Envelope::Bzip2)
    } else {
        Ok(Envelope::Plain)
    }
}

pub fn open_file<P: AsRef<Path>>(path: P) -> Result<File> {
    File::open(&path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            io::Error::new(e.kind(), format!("file not found: {:?}", path.as_ref()))
        } else {
            e
        }
    })
}

pub fn trim_end(buffer: &mut Vec<u8>) {
    while let Some(&b'\n' | &b'\r') = buffer.last() {
        buffer.pop();
    }
}

pub const BUFSIZE: usize = 8 * 1024 * 1024;

/// A source of sequence records, one file format per implementor.
pub trait Reader: Send {
    fn next(&mut self) -> Result<Option<Record>>;
}

/// Detect FASTA vs FASTQ by the first non-whitespace byte of the
/// (possibly compressed) stream: `>` or `@` respectively. Any other
/// leading byte is a configuration error — the caller is expected to map
/// it to `AssemblyError::Configuration`.
pub fn detect_file_format<P: AsRef<Path>>(path: P) -> Result<crate::seq::SeqFormat> {
    use crate::seq::SeqFormat;
    let mut reader = dyn_reader(path)?;
    let mut buf = [0u8; 1];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "empty input file",
            ));
        }
        match buf[0] {
            b'>' => return Ok(SeqFormat::Fasta),
            b'@' => return Ok(SeqFormat::Fastq),
            b'\n' | b'\r' | b' ' | b'\t' => continue,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unrecognized read file header byte {:?}", other as char),
                ))
            }
        }
    }
}
