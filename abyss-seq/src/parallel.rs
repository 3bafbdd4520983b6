use crate::fasta::FastaReader;
use crate::fastq::FastqReader;
use crate::reader::{detect_file_format, Reader};
use crate::seq::{Record, SeqFormat};
use crossbeam_channel::{bounded, Receiver};
use scoped_threadpool::Pool;
use std::io::Result;
use std::path::Path;
use std::sync::Arc;

/// Channel-backed handle the consumer stage drains to collect worker output,
/// one value per processed batch.
pub struct ParallelResult<P>
where
    P: Send,
{
    recv: Receiver<P>,
}

impl<P> ParallelResult<P>
where
    P: Send,
{
    #[inline]
    pub fn next(&mut self) -> Option<P> {
        self.recv.recv().ok()
    }
}

/// Open `path` with the reader appropriate to its sniffed format.
pub fn create_reader<P: AsRef<Path>>(path: P, file_index: usize) -> Result<Box<dyn Reader>> {
    match detect_file_format(&path)? {
        SeqFormat::Fasta => Ok(Box::new(FastaReader::from_path(path, file_index)?)),
        SeqFormat::Fastq => Ok(Box::new(FastqReader::from_path(path, file_index)?)),
    }
}

/// Three-stage pipeline: one producer thread reads `Record`s off `reader`
/// into batches of `batch_size`, `n_threads - 2` worker threads run `work`
/// over each batch, and one consumer thread drains results through `func`.
/// Mirrors the read-then-scan-then-collect pipeline shape used for k-mer
/// ingestion, generalized so the "scan" step (here, k-mer decoding) is
/// supplied by the caller rather than baked in, since decoding depends on
/// `k` and the colour-space latch, both of which are core-engine state this
/// crate does not own.
pub fn read_parallel<W, F, O, Out>(
    reader: &mut dyn Reader,
    n_threads: usize,
    buffer_len: usize,
    batch_size: usize,
    work: W,
    func: F,
) -> Result<Out>
where
    O: Send,
    Out: Send + Default,
    W: Send + Sync + Fn(&[Record]) -> O,
    F: FnOnce(&mut ParallelResult<O>) -> Out + Send,
{
    assert!(n_threads > 2, "read_parallel needs at least 3 threads");
    assert!(n_threads <= buffer_len);
    let (sender, receiver) = bounded::<Vec<Record>>(buffer_len);
    let (done_send, done_recv) = bounded::<O>(buffer_len);
    let receiver = Arc::new(receiver);
    let done_send = Arc::new(done_send);
    let mut pool = Pool::new(n_threads as u32);

    let mut parallel_result = ParallelResult { recv: done_recv };
    let mut out = Out::default();

    pool.scoped(|scope| {
        scope.execute(move || {
            let mut batch = Vec::with_capacity(batch_size);
            loop {
                match reader.next() {
                    Ok(Some(rec)) => {
                        batch.push(rec);
                        if batch.len() >= batch_size {
                            if sender.send(std::mem::take(&mut batch)).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        if !batch.is_empty() {
                            let _ = sender.send(batch);
                        }
                        break;
                    }
                    Err(e) => {
                        log::warn!("read error, ending input early: {e}");
                        break;
                    }
                }
            }
        });

        for _ in 0..n_threads - 2 {
            let receiver = Arc::clone(&receiver);
            let work = &work;
            let done_send = Arc::clone(&done_send);
            scope.execute(move || {
                while let Ok(batch) = receiver.recv() {
                    let output = work(&batch);
                    if done_send.send(output).is_err() {
                        break;
                    }
                }
            });
        }

        drop(done_send);
        scope.execute(|| {
            out = func(&mut parallel_result);
        });

        scope.join_all();
    });

    Ok(out)
}
