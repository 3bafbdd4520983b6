//! The operation set every graph-edit algorithm, the contig walker
//! and the control loop are written against. `VertexStore`
//! implements it directly; `ShardedStore` implements the identical
//! interface by routing each call through the shard map and the message
//! transport. Because every algorithm in this crate is generic over
//! `GraphOps`, the single-worker and N-worker code paths are *the same
//! code*, which is exactly what sharded-mode equivalence requires.

use crate::histogram::Histogram;
use crate::kmer::{Direction, Kmer};
use crate::vertex::{EdgeSet, Flag, VertexData};

/// Uniform graph-mutation/query surface. All methods take `&mut self`
/// even where a given implementor (`VertexStore`) could answer
/// read-only, so that `ShardedStore` — which may need to pump inbound
/// messages to make progress on a request — has the same signature.
pub trait GraphOps {
    fn k(&self) -> u8;
    fn colour_space(&self) -> bool;

    fn add(&mut self, k: &Kmer);
    fn remove(&mut self, k: &Kmer);
    fn set_base_extension(&mut self, k: &Kmer, d: Direction, base: u8) -> bool;
    fn remove_extension(&mut self, k: &Kmer, d: Direction, edges: EdgeSet);
    fn get_seq_data(&mut self, k: &Kmer) -> Option<VertexData>;
    fn mark(&mut self, k: &Kmer, d: Option<Direction>);
    fn marked(&mut self, k: &Kmer, d: Option<Direction>) -> bool;
    fn wipe_flag(&mut self, flag: Flag);
    fn cleanup(&mut self) -> usize;

    /// Seal the store against further `add()` calls, ending LOAD.
    fn finalize(&mut self);

    /// Whether this worker's local shard already carries generated
    /// adjacency (set by loading a prior dump), so the control loop can
    /// skip GEN_ADJ.
    fn adjacency_loaded(&self) -> bool;
    fn set_adjacency_loaded(&mut self, v: bool);

    /// This worker's own local multiplicity histogram, before any
    /// cross-worker merge.
    fn local_histogram(&self) -> Histogram;

    /// Drain and dispatch any pending inbound messages. A no-op for the
    /// single-process store; required inside every long loop for the
    /// sharded store to avoid deadlocking on a full send buffer.
    fn pump(&mut self);

    /// This worker's own local live vertices (for the sharded store: only
    /// the shard it owns). Used to drive every "for every live vertex"
    /// pass in the graph-cleaning, contig-walking and histogram code.
    fn local_live_keys(&self) -> Vec<Kmer>;

    fn local_len(&self) -> usize;

    /// End-of-phase barrier: block until every other worker has finished
    /// the phase just completed, cooperatively answering any inbound
    /// request in the meantime. A no-op for the single-process store,
    /// which has no other workers to wait for; `ShardedStore` overrides
    /// this to run a real checkpoint broadcast.
    fn checkpoint(&mut self) {
        self.pump();
    }

    /// Combine this worker's local histogram with every other worker's.
    /// A no-op for the single-process store, which has nothing to sum;
    /// `ShardedStore` overrides this with a real gather-then-broadcast
    /// exchange.
    fn merge_histogram(&mut self, local: Histogram) -> Histogram {
        local
    }

    /// Enter the ASSEMBLE phase's serialization token: the controller
    /// assembles first, then releases each worker one by one, because a
    /// single contig may be split across shards and concurrent emission
    /// would duplicate output. A no-op for the single-process store,
    /// which has no other worker to wait behind; `ShardedStore` overrides
    /// this to block until the previous rank's token arrives (rank 0
    /// never waits).
    fn begin_serialized_phase(&mut self) {}

    /// Leave the ASSEMBLE phase's serialization token, handing it to the
    /// next rank. A no-op for the single-process store.
    fn end_serialized_phase(&mut self) {}
}

/// Shift `u` one base in `d` toward base `b` and report whether the
/// result is present in the graph; a small helper every adjacency-facing
/// algorithm (GEN_ADJ, erosion's neighbor severing, the walker) needs.
pub fn shift_and_lookup<G: GraphOps>(
    store: &mut G,
    u: &Kmer,
    d: Direction,
    base: u8,
) -> (Kmer, u8, Option<VertexData>) {
    let mut v = u.clone();
    let dropped = v.shift(d, base);
    let data = store.get_seq_data(&v);
    (v, dropped, data)
}
