//! `GraphOps` over a k-mer space partitioned across N workers: every
//! mutation and query first checks whether the target k-mer's canonical
//! form belongs to this worker's own shard, applying it locally if so and
//! routing it through the transport otherwise.
//!
//! `get_seq_data` is the one operation that cannot be fire-and-forget: a
//! caller needs the answer before it can continue walking. Since
//! `GraphOps::get_seq_data` is a synchronous call, this store blocks
//! inside it — cooperatively, still answering any inbound request that
//! arrives while waiting — until the matching response shows up. Because
//! every read this crate issues is awaited immediately (none of the
//! graph-edit or contig-walking algorithms pipeline multiple outstanding
//! `get_seq_data` calls), at most one request is ever in flight per
//! worker, so the high/low-watermark flow control a batching transport
//! supports never has anything to do here; it would matter for a
//! hypothetical caller that fires many reads before awaiting any of them.

use super::message::Message;
use super::transport::Transport;
use crate::graph::GraphOps;
use crate::histogram::Histogram;
use crate::kmer::{Direction, Kmer};
use crate::store::VertexStore;
use crate::vertex::{EdgeSet, Flag, VertexData};
use std::collections::VecDeque;

pub struct ShardedStore<T: Transport> {
    local: VertexStore,
    transport: T,
    size: usize,
    rank: usize,
    next_seq_id: u64,
    checkpoint_inbox: VecDeque<usize>,
    histogram_reports: Vec<Histogram>,
    histogram_broadcast: Option<Histogram>,
    assemble_token_held: bool,
}

impl<T: Transport> ShardedStore<T> {
    pub fn new(local: VertexStore, transport: T) -> Self {
        let size = transport.peer_count();
        let rank = transport.rank();
        ShardedStore {
            local,
            transport,
            size,
            rank,
            next_seq_id: 0,
            checkpoint_inbox: VecDeque::new(),
            histogram_reports: Vec::new(),
            histogram_broadcast: None,
            assemble_token_held: rank == 0,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn local_store(&self) -> &VertexStore {
        &self.local
    }

    pub fn local_store_mut(&mut self) -> &mut VertexStore {
        &mut self.local
    }

    fn shard_of(&self, k: &Kmer) -> usize {
        (k.canonical().hash() % self.size as u64) as usize
    }

    /// Apply an inbound message. Returns the `(group_id, seq_id, data)` of
    /// a `SeqDataResponse`, so `await_response` can recognize the one it's
    /// waiting for; every other message kind is fully handled here.
    fn dispatch_one(&mut self, sender: usize, msg: Message) -> Option<(u64, u64, Option<VertexData>)> {
        match msg {
            Message::Add(k) => {
                let _ = self.local.add(&k);
                None
            }
            Message::Remove(k) => {
                self.local.remove(&k);
                None
            }
            Message::SetBase { kmer, dir, base } => {
                self.local.set_base_extension(&kmer, dir, base);
                None
            }
            Message::RemoveExt { kmer, dir, edges } => {
                self.local.remove_extension(&kmer, dir, edges);
                None
            }
            Message::Mark { kmer, dir } => {
                self.local.mark(&kmer, dir);
                None
            }
            Message::SeqDataRequest { kmer, group_id, seq_id } => {
                let data = self.local.get_seq_data(&kmer);
                self.transport.send(sender, Message::SeqDataResponse { group_id, seq_id, data });
                None
            }
            Message::SeqDataResponse { group_id, seq_id, data } => Some((group_id, seq_id, data)),
            Message::Checkpoint => {
                self.checkpoint_inbox.push_back(sender);
                None
            }
            Message::CheckpointAck => None,
            Message::HistogramReport(buckets) => {
                let mut h = Histogram::new();
                for (key, count) in buckets {
                    h.insert_count(key, count);
                }
                self.histogram_reports.push(h);
                None
            }
            Message::HistogramBroadcast(buckets) => {
                let mut h = Histogram::new();
                for (key, count) in buckets {
                    h.insert_count(key, count);
                }
                self.histogram_broadcast = Some(h);
                None
            }
            Message::AssembleToken => {
                self.assemble_token_held = true;
                None
            }
        }
    }

    fn drain(&mut self) {
        while let Some((sender, msg)) = self.transport.try_recv() {
            self.dispatch_one(sender, msg);
        }
    }

    fn await_response(&mut self, group_id: u64, seq_id: u64) -> Option<VertexData> {
        loop {
            match self.transport.try_recv() {
                Some((sender, msg)) => {
                    if let Some((g, s, data)) = self.dispatch_one(sender, msg) {
                        if g == group_id && s == seq_id {
                            return data;
                        }
                    }
                }
                None => std::thread::yield_now(),
            }
        }
    }

    /// Broadcast a checkpoint to every peer and wait until every peer's
    /// own checkpoint has been observed, still answering any inbound
    /// request that arrives in the meantime.
    pub fn checkpoint_barrier(&mut self) {
        if self.size <= 1 {
            return;
        }
        for peer in 0..self.size {
            if peer != self.rank {
                self.transport.send(peer, Message::Checkpoint);
            }
        }
        while self.checkpoint_inbox.len() < self.size - 1 {
            self.drain();
        }
        self.checkpoint_inbox.clear();
    }

    /// Sum every worker's coverage histogram into rank 0, then broadcast
    /// the combined result back out. Every rank, including 0, returns the
    /// same fully-merged histogram.
    pub fn histogram_merge_barrier(&mut self, local: Histogram) -> Histogram {
        if self.size <= 1 {
            return local;
        }
        if self.rank == 0 {
            let mut combined = local;
            while self.histogram_reports.len() < self.size - 1 {
                self.drain();
            }
            for h in self.histogram_reports.drain(..) {
                combined.merge(&h);
            }
            let buckets: Vec<(u64, u64)> = combined.iter().collect();
            for peer in 1..self.size {
                self.transport.send(peer, Message::HistogramBroadcast(buckets.clone()));
            }
            combined
        } else {
            let buckets: Vec<(u64, u64)> = local.iter().collect();
            self.transport.send(0, Message::HistogramReport(buckets));
            while self.histogram_broadcast.is_none() {
                self.drain();
            }
            self.histogram_broadcast.take().unwrap()
        }
    }

    /// Block until this rank holds the ASSEMBLE token: rank 0 already
    /// holds it from the start of the run; every other rank waits for
    /// rank `r-1` to pass it along.
    pub fn wait_for_assemble_token(&mut self) {
        while !self.assemble_token_held {
            self.drain();
        }
    }

    /// Hand the ASSEMBLE token to the next rank, if any.
    pub fn release_assemble_token(&mut self) {
        self.assemble_token_held = false;
        let next = self.rank + 1;
        if next < self.size {
            self.transport.send(next, Message::AssembleToken);
        }
    }
}

impl<T: Transport> GraphOps for ShardedStore<T> {
    fn k(&self) -> u8 {
        self.local.k()
    }

    fn colour_space(&self) -> bool {
        self.local.colour_space()
    }

    fn add(&mut self, k: &Kmer) {
        if self.shard_of(k) == self.rank {
            self.local.add(k).expect("add() called after finalize()");
        } else {
            self.transport.send(self.shard_of(k), Message::Add(k.clone()));
        }
    }

    fn remove(&mut self, k: &Kmer) {
        if self.shard_of(k) == self.rank {
            self.local.remove(k);
        } else {
            self.transport.send(self.shard_of(k), Message::Remove(k.clone()));
        }
    }

    fn set_base_extension(&mut self, k: &Kmer, d: Direction, base: u8) -> bool {
        if self.shard_of(k) == self.rank {
            self.local.set_base_extension(k, d, base)
        } else {
            // Every caller in this crate has already confirmed the target
            // exists via a prior `get_seq_data` before setting an
            // extension on it, so optimistically reporting success here
            // costs nothing (there is no acknowledgement to optimistically
            // report from, since mutations are fire-and-forget).
            self.transport.send(self.shard_of(k), Message::SetBase { kmer: k.clone(), dir: d, base });
            true
        }
    }

    fn remove_extension(&mut self, k: &Kmer, d: Direction, edges: EdgeSet) {
        if self.shard_of(k) == self.rank {
            self.local.remove_extension(k, d, edges);
        } else {
            self.transport.send(self.shard_of(k), Message::RemoveExt { kmer: k.clone(), dir: d, edges });
        }
    }

    fn get_seq_data(&mut self, k: &Kmer) -> Option<VertexData> {
        if self.shard_of(k) == self.rank {
            return self.local.get_seq_data(k);
        }
        let group_id = self.rank as u64;
        let seq_id = self.next_seq_id;
        self.next_seq_id += 1;
        self.transport
            .send(self.shard_of(k), Message::SeqDataRequest { kmer: k.clone(), group_id, seq_id });
        self.await_response(group_id, seq_id)
    }

    fn mark(&mut self, k: &Kmer, d: Option<Direction>) {
        if self.shard_of(k) == self.rank {
            self.local.mark(k, d);
        } else {
            self.transport.send(self.shard_of(k), Message::Mark { kmer: k.clone(), dir: d });
        }
    }

    fn marked(&mut self, k: &Kmer, d: Option<Direction>) -> bool {
        // Every pass in this crate only ever re-checks `marked` on a
        // vertex it just pulled from `local_live_keys`, i.e. always local;
        // a non-local query falls back to "unmarked" rather than adding a
        // sixth round-trip message type this crate never actually needs.
        if self.shard_of(k) == self.rank {
            self.local.marked(k, d)
        } else {
            false
        }
    }

    fn wipe_flag(&mut self, flag: Flag) {
        self.local.wipe_flag(flag);
    }

    fn cleanup(&mut self) -> usize {
        self.local.cleanup()
    }

    fn pump(&mut self) {
        self.drain();
    }

    fn local_live_keys(&self) -> Vec<Kmer> {
        self.local.iter_live_keys().collect()
    }

    fn local_len(&self) -> usize {
        self.local.iter_live().count()
    }

    fn checkpoint(&mut self) {
        self.checkpoint_barrier();
    }

    fn merge_histogram(&mut self, local: Histogram) -> Histogram {
        self.histogram_merge_barrier(local)
    }

    fn begin_serialized_phase(&mut self) {
        self.wait_for_assemble_token();
    }

    fn end_serialized_phase(&mut self) {
        self.release_assemble_token();
    }

    fn finalize(&mut self) {
        self.local.finalize();
    }

    fn adjacency_loaded(&self) -> bool {
        self.local.adjacency_loaded()
    }

    fn set_adjacency_loaded(&mut self, v: bool) {
        self.local.set_adjacency_loaded(v);
    }

    fn local_histogram(&self) -> Histogram {
        self.local.total_multiplicity_histogram()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::transport::ChannelTransport;

    fn mesh(size: usize, k: u8) -> Vec<ShardedStore<ChannelTransport>> {
        ChannelTransport::mesh(size, k, false)
            .into_iter()
            .map(|t| ShardedStore::new(VertexStore::new(k, false), t))
            .collect()
    }

    #[test]
    fn single_worker_mesh_behaves_like_a_plain_store() {
        let mut workers = mesh(1, 4);
        let w = &mut workers[0];
        let kmer = Kmer::from_ascii(b"ACGT", false).unwrap();
        w.add(&kmer);
        assert!(w.get_seq_data(&kmer).is_some());
    }

    #[test]
    fn remote_add_routes_to_the_owning_shard() {
        let mut workers = mesh(4, 4);
        let kmer = Kmer::from_ascii(b"ACGT", false).unwrap();
        let owner = (kmer.canonical().hash() % 4) as usize;
        // Every worker issues the same add(); only the owner should ever
        // end up holding it locally, and every worker's get_seq_data
        // (whether local or routed) should agree on that.
        for i in 0..4 {
            workers[i].add(&kmer);
        }
        // The owner must pump to receive the fire-and-forget Add messages
        // routed to it by every other worker. (A genuine cross-shard
        // `get_seq_data` round trip needs the owner pumping concurrently
        // on its own thread/process, as it would in a real run; exercised
        // by the control-loop integration test instead of here.)
        workers[owner].pump();
        assert_eq!(workers[owner].local.len(), 1);
        for (i, w) in workers.iter().enumerate() {
            if i != owner {
                assert_eq!(w.local.len(), 0);
            }
        }
    }

    /// Drives a genuine multi-worker run: one OS thread per rank, each
    /// running the full control loop against its own `ShardedStore` over a
    /// shared in-process mesh, so `checkpoint_barrier`/`await_response`/the
    /// ASSEMBLE token actually synchronize across concurrent threads
    /// instead of being pumped single-threadedly as the unit tests above
    /// do. The sharded run must account for the same bases as a
    /// single-process one, just split across ranks by k-mer ownership.
    #[test]
    fn scenario_f_three_worker_run_matches_single_process_output() {
        use crate::config::AssemblyConfig;
        use crate::control::run;
        use std::io::Write;

        let path = std::env::temp_dir().join("sharded_scenario_f_linear.fa");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, ">r1\nACGTACGTAC").unwrap();
        }

        let k = 4;
        let size = 3;
        let transports = ChannelTransport::mesh(size, k, false);
        let build_config = |rank: usize| AssemblyConfig {
            k,
            erode: Some(0),
            erode_strand: None,
            trim_len: 0,
            coverage: Some(0.0),
            bubbles: 0,
            snp_path: None,
            graph_dump_path: None,
            colour_space: false,
            rank,
            size,
        };

        let summaries = std::thread::scope(|scope| {
            let path = &path;
            let handles: Vec<_> = transports
                .into_iter()
                .enumerate()
                .map(|(rank, transport)| {
                    let cfg = build_config(rank);
                    scope.spawn(move || {
                        let mut store = ShardedStore::new(VertexStore::new(k, false), transport);
                        run(&mut store, &cfg, std::slice::from_ref(path)).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>()
        });

        let total_contigs: usize = summaries.iter().map(|s| s.contigs.len()).sum();
        assert_eq!(total_contigs, 1, "exactly one rank owns the sole contig's endpoint");
        let total_len: usize =
            summaries.iter().flat_map(|s| s.contigs.iter()).map(|c| c.length).sum();
        assert_eq!(total_len, 10);

        std::fs::remove_file(&path).ok();
    }
}
