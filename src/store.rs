//! Hash set of canonical k-mers with per-vertex adjacency.
//!
//! Every public operation accepts a k-mer in either orientation and
//! canonicalizes internally; callers never observe which physical
//! orientation is stored. The reverse-complement/flip transform lives in
//! `VertexData::flipped` (vertex.rs); this module is responsible for
//! deciding *when* to apply it.

use crate::error::{AssemblyError, Result};
use crate::kmer::{Direction, Kmer, KmerBuildHasher};
use crate::vertex::{EdgeSet, Flag, Multiplicity, VertexData};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const DUMP_MAGIC: &[u8; 8] = b"ABYSSGRF";

/// Registered while erosion runs; fired whenever `remove_extension` clears
/// a bit on a live vertex, so the erode pass can re-queue that neighbor for
/// re-evaluation without the store needing to know anything about erosion
/// itself.
pub type ChangeObserver = Box<dyn FnMut(&Kmer)>;

pub struct VertexStore {
    table: HashMap<Kmer, VertexData, KmerBuildHasher>,
    k: u8,
    colour_space: bool,
    finalized: bool,
    adjacency_loaded: bool,
    observer: Option<ChangeObserver>,
}

/// Which physical orientation a caller's k-mer maps to in the table.
struct Canon {
    key: Kmer,
    flipped: bool,
}

fn canonicalize(k: &Kmer) -> Canon {
    let key = k.canonical();
    let flipped = &key != k;
    Canon { key, flipped }
}

impl VertexStore {
    pub fn new(k: u8, colour_space: bool) -> Self {
        VertexStore {
            table: HashMap::default(),
            k,
            colour_space,
            finalized: false,
            adjacency_loaded: false,
            observer: None,
        }
    }

    pub fn k(&self) -> u8 {
        self.k
    }

    pub fn colour_space(&self) -> bool {
        self.colour_space
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn adjacency_loaded(&self) -> bool {
        self.adjacency_loaded
    }

    pub fn set_observer(&mut self, observer: ChangeObserver) {
        self.observer = Some(observer);
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    fn notify(&mut self, k: &Kmer) {
        if let Some(observer) = self.observer.as_mut() {
            observer(k);
        }
    }

    /// Insert `k`, creating it with multiplicity 1 on the strand matching
    /// its orientation, or incrementing that strand's (saturating)
    /// multiplicity if already present. Forbidden after `finalize()`.
    pub fn add(&mut self, k: &Kmer) -> Result<()> {
        if self.finalized {
            return Err(AssemblyError::invariant("add() called after finalize()"));
        }
        let Canon { key, flipped } = canonicalize(k);
        let dir = if flipped {
            Direction::Antisense
        } else {
            Direction::Sense
        };
        let entry = self.table.entry(key).or_default();
        entry.incr_multiplicity(dir);
        Ok(())
    }

    /// Logically delete `k`; physical removal is deferred to `cleanup()`.
    pub fn remove(&mut self, k: &Kmer) {
        let Canon { key, .. } = canonicalize(k);
        if let Some(v) = self.table.get_mut(&key) {
            v.set_deleted(true);
        }
    }

    pub fn contains(&self, k: &Kmer) -> bool {
        let Canon { key, .. } = canonicalize(k);
        self.table
            .get(&key)
            .map(|v| !v.is_deleted())
            .unwrap_or(false)
    }

    /// Set one outgoing bit on `canonical(k)` in direction `d`, flipping
    /// direction and complementing the base first if `k` is stored under
    /// its reverse complement. Idempotent; returns whether the vertex
    /// exists at all (a no-op on an absent vertex, matching the source's
    /// tolerant `setBaseExtension` on not-yet-inserted neighbors).
    pub fn set_base_extension(&mut self, k: &Kmer, d: Direction, base: u8) -> bool {
        let Canon { key, flipped } = canonicalize(k);
        let (d, base) = self.to_canonical_frame(k, flipped, d, base);
        match self.table.get_mut(&key) {
            Some(v) => {
                v.edges_mut(d).set(base);
                true
            }
            None => false,
        }
    }

    /// Clear `edges` (already in `k`'s own frame) on direction `d` of `k`,
    /// transforming into the stored frame, and notify the erosion observer
    /// if one is registered.
    pub fn remove_extension(&mut self, k: &Kmer, d: Direction, edges: EdgeSet) {
        let Canon { key, flipped } = canonicalize(k);
        let stored_dir = if flipped { d.flip() } else { d };
        let stored_edges = if flipped {
            edges.complement()
        } else {
            edges
        };
        if let Some(v) = self.table.get_mut(&key) {
            v.edges_mut(stored_dir).clear_set(stored_edges);
        }
        self.notify(&key);
    }

    /// Transform a (direction, base) pair from `k`'s own frame into the
    /// frame the canonical key is stored in.
    fn to_canonical_frame(
        &self,
        _k: &Kmer,
        flipped: bool,
        d: Direction,
        base: u8,
    ) -> (Direction, u8) {
        if flipped {
            let base = if self.colour_space { base } else { 3 - base };
            (d.flip(), base)
        } else {
            (d, base)
        }
    }

    /// Look up `k`'s adjacency and multiplicity, returned in `k`'s own
    /// frame regardless of which orientation is physically stored.
    pub fn get_seq_data(&self, k: &Kmer) -> Option<VertexData> {
        let Canon { key, flipped } = canonicalize(k);
        self.table.get(&key).map(|v| {
            if flipped {
                v.flipped()
            } else {
                *v
            }
        })
    }

    pub fn mark(&mut self, k: &Kmer, d: Option<Direction>) {
        let Canon { key, flipped } = canonicalize(k);
        if let Some(v) = self.table.get_mut(&key) {
            match d {
                Some(d) => v.mark(if flipped { d.flip() } else { d }),
                None => {
                    v.mark(Direction::Sense);
                    v.mark(Direction::Antisense);
                }
            }
        }
    }

    pub fn marked(&self, k: &Kmer, d: Option<Direction>) -> bool {
        let Canon { key, flipped } = canonicalize(k);
        self.table
            .get(&key)
            .map(|v| match d {
                Some(d) => v.marked(if flipped { d.flip() } else { d }),
                None => v.marked_any(),
            })
            .unwrap_or(false)
    }

    /// Clear `flag` on every vertex. Used between cleaning passes that
    /// reuse the scratch `MarkedSense`/`MarkedAntisense` bits.
    pub fn wipe_flag(&mut self, flag: Flag) {
        for v in self.table.values_mut() {
            v.wipe_flag(flag);
        }
    }

    /// Physically erase every vertex with the deleted flag set; returns
    /// the number removed.
    pub fn cleanup(&mut self) -> usize {
        let before = self.table.len();
        self.table.retain(|_, v| !v.is_deleted());
        before - self.table.len()
    }

    /// Seal the store: no further `add()` calls are permitted.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Mark the store as already carrying generated adjacency, so the
    /// control loop can skip adjacency generation. Set by `load()`;
    /// exposed separately so the sharded controller can latch it once
    /// all workers have loaded.
    pub fn set_adjacency_loaded(&mut self, v: bool) {
        self.adjacency_loaded = v;
    }

    /// Iterate every live (non-deleted) vertex.
    pub fn iter_live(&self) -> impl Iterator<Item = (&Kmer, &VertexData)> {
        self.table.iter().filter(|(_, v)| !v.is_deleted())
    }

    pub fn iter_live_keys(&self) -> impl Iterator<Item = Kmer> + '_ {
        self.iter_live().map(|(k, _)| k.clone())
    }

    /// Total per-vertex (sense+antisense) multiplicity histogram over all
    /// live vertices, for threshold auto-selection.
    pub fn total_multiplicity_histogram(&self) -> crate::histogram::Histogram {
        let mut h = crate::histogram::Histogram::new();
        for (_, v) in self.iter_live() {
            h.insert(v.total_multiplicity());
        }
        h
    }

    /// Dump the store, including adjacency, to a fixed little-endian
    /// binary format (resolves Open Question 1 — see `DESIGN.md`): magic,
    /// header (k, vertex count, colour-space flag, adjacency-present
    /// flag), then one fixed-size record per vertex (packed k-mer bytes,
    /// edges byte pair, flags byte, two multiplicity fields). Explicitly
    /// not portable across endianness; `load()` byte-swaps on a
    /// big-endian host.
    pub fn store(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);
        w.write_all(DUMP_MAGIC)?;
        w.write_u8(self.k)?;
        w.write_u8(self.colour_space as u8)?;
        w.write_u8(1u8)?; // adjacency is always complete by the time store() is called
        w.write_u64::<LittleEndian>(self.table.len() as u64)?;
        let kmer_bytes = crate::kmer::num_bytes_for(self.k);
        for (kmer, v) in self.table.iter() {
            debug_assert_eq!(kmer.as_bytes().len(), kmer_bytes);
            w.write_all(kmer.as_bytes())?;
            w.write_u8(v.edges(Direction::Sense).bits())?;
            w.write_u8(v.edges(Direction::Antisense).bits())?;
            w.write_u8(v.raw_flags())?;
            write_multiplicity(&mut w, v.multiplicity(Direction::Sense))?;
            write_multiplicity(&mut w, v.multiplicity(Direction::Antisense))?;
        }
        w.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut r = BufReader::new(file);
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic)?;
        if &magic != DUMP_MAGIC {
            return Err(AssemblyError::invariant(format!(
                "{}: not an abyss graph dump (bad magic)",
                path.display()
            )));
        }
        let k = r.read_u8()?;
        let colour_space = r.read_u8()? != 0;
        let adjacency_present = r.read_u8()? != 0;
        let count = r.read_u64::<LittleEndian>()?;
        let mut store = VertexStore::new(k, colour_space);
        let kmer_bytes = crate::kmer::num_bytes_for(k);
        let mut buf = vec![0u8; kmer_bytes];
        for _ in 0..count {
            r.read_exact(&mut buf)?;
            let kmer = Kmer::from_raw_parts(&buf, k, colour_space);
            let sense = EdgeSet::from_bits(r.read_u8()?);
            let antisense = EdgeSet::from_bits(r.read_u8()?);
            let flags = r.read_u8()?;
            let mult_sense = read_multiplicity(&mut r)?;
            let mult_antisense = read_multiplicity(&mut r)?;
            let v = VertexData::from_raw_parts(sense, antisense, flags, mult_sense, mult_antisense);
            store.table.insert(kmer, v);
        }
        store.finalize();
        store.set_adjacency_loaded(adjacency_present);
        Ok(store)
    }
}

#[cfg(not(feature = "exact_counting"))]
fn write_multiplicity<W: Write>(w: &mut W, m: Multiplicity) -> Result<()> {
    w.write_u8(m)?;
    Ok(())
}
#[cfg(feature = "exact_counting")]
fn write_multiplicity<W: Write>(w: &mut W, m: Multiplicity) -> Result<()> {
    w.write_u32::<LittleEndian>(m)?;
    Ok(())
}

#[cfg(not(feature = "exact_counting"))]
fn read_multiplicity<R: Read>(r: &mut R) -> Result<Multiplicity> {
    Ok(r.read_u8()?)
}
#[cfg(feature = "exact_counting")]
fn read_multiplicity<R: Read>(r: &mut R) -> Result<Multiplicity> {
    Ok(r.read_u32::<LittleEndian>()?)
}

impl crate::graph::GraphOps for VertexStore {
    fn k(&self) -> u8 {
        self.k
    }

    fn colour_space(&self) -> bool {
        self.colour_space
    }

    fn add(&mut self, k: &Kmer) {
        VertexStore::add(self, k).expect("add() called after finalize()");
    }

    fn remove(&mut self, k: &Kmer) {
        VertexStore::remove(self, k)
    }

    fn set_base_extension(&mut self, k: &Kmer, d: Direction, base: u8) -> bool {
        VertexStore::set_base_extension(self, k, d, base)
    }

    fn remove_extension(&mut self, k: &Kmer, d: Direction, edges: EdgeSet) {
        VertexStore::remove_extension(self, k, d, edges)
    }

    fn get_seq_data(&mut self, k: &Kmer) -> Option<VertexData> {
        VertexStore::get_seq_data(self, k)
    }

    fn mark(&mut self, k: &Kmer, d: Option<Direction>) {
        VertexStore::mark(self, k, d)
    }

    fn marked(&mut self, k: &Kmer, d: Option<Direction>) -> bool {
        VertexStore::marked(self, k, d)
    }

    fn wipe_flag(&mut self, flag: Flag) {
        VertexStore::wipe_flag(self, flag)
    }

    fn cleanup(&mut self) -> usize {
        VertexStore::cleanup(self)
    }

    fn pump(&mut self) {
        // Single-process store has no message substrate to drain.
    }

    fn local_live_keys(&self) -> Vec<Kmer> {
        self.iter_live_keys().collect()
    }

    fn local_len(&self) -> usize {
        self.iter_live().count()
    }

    fn finalize(&mut self) {
        VertexStore::finalize(self)
    }

    fn adjacency_loaded(&self) -> bool {
        VertexStore::adjacency_loaded(self)
    }

    fn set_adjacency_loaded(&mut self, v: bool) {
        VertexStore::set_adjacency_loaded(self, v)
    }

    fn local_histogram(&self) -> crate::histogram::Histogram {
        self.total_multiplicity_histogram()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::Kmer;

    fn kmer(s: &str) -> Kmer {
        Kmer::from_ascii(s.as_bytes(), false).unwrap()
    }

    #[test]
    fn add_canonicalizes_rc_pairs() {
        let mut s = VertexStore::new(4, false);
        s.add(&kmer("ACGT")).unwrap(); // palindrome, rc==self
        s.add(&kmer("AATT")).unwrap();
        s.add(&kmer("AATT")).unwrap();
        assert!(s.contains(&kmer("AATT")));
        let v = s.get_seq_data(&kmer("AATT")).unwrap();
        assert_eq!(v.total_multiplicity(), 2);
    }

    #[test]
    fn add_then_lookup_by_rc_sees_same_vertex() {
        let mut s = VertexStore::new(4, false);
        s.add(&kmer("ACGG")).unwrap();
        let rc = kmer("ACGG").reverse_complement();
        assert!(s.contains(&rc));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn set_base_extension_is_idempotent() {
        let mut s = VertexStore::new(4, false);
        s.add(&kmer("ACGG")).unwrap();
        assert!(s.set_base_extension(&kmer("ACGG"), Direction::Sense, 1));
        assert!(s.set_base_extension(&kmer("ACGG"), Direction::Sense, 1));
        let v = s.get_seq_data(&kmer("ACGG")).unwrap();
        assert_eq!(v.edges(Direction::Sense).count(), 1);
    }

    #[test]
    fn get_seq_data_flips_for_rc_lookup() {
        let mut s = VertexStore::new(4, false);
        s.add(&kmer("ACGG")).unwrap();
        s.set_base_extension(&kmer("ACGG"), Direction::Sense, 1);
        let rc = kmer("ACGG").reverse_complement();
        let flipped = s.get_seq_data(&rc).unwrap();
        // base 1 (C) in sense from ACGG's frame becomes base 2 (G) in
        // antisense from the rc's frame.
        assert!(flipped.edges(Direction::Antisense).test(2));
    }

    #[test]
    fn remove_extension_notifies_observer() {
        let mut s = VertexStore::new(4, false);
        s.add(&kmer("ACGG")).unwrap();
        s.set_base_extension(&kmer("ACGG"), Direction::Sense, 1);
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let seen2 = seen.clone();
        s.set_observer(Box::new(move |k| seen2.borrow_mut().push(k.clone())));
        s.remove_extension(&kmer("ACGG"), Direction::Sense, EdgeSet::from_bits(1 << 1));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn cleanup_erases_only_deleted() {
        let mut s = VertexStore::new(4, false);
        s.add(&kmer("ACGG")).unwrap();
        s.add(&kmer("TTTT")).unwrap();
        s.remove(&kmer("ACGG"));
        assert_eq!(s.cleanup(), 1);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn round_trip_store_load() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("abyss-test-{}.grf", std::process::id()));
        let mut s = VertexStore::new(4, false);
        s.add(&kmer("ACGG")).unwrap();
        s.add(&kmer("CGGT")).unwrap();
        s.set_base_extension(&kmer("ACGG"), Direction::Sense, 3);
        s.finalize();
        s.store(&path).unwrap();
        let loaded = VertexStore::load(&path).unwrap();
        assert_eq!(loaded.len(), s.len());
        assert!(loaded.adjacency_loaded());
        assert_eq!(
            loaded.get_seq_data(&kmer("ACGG")),
            s.get_seq_data(&kmer("ACGG"))
        );
        std::fs::remove_file(&path).ok();
    }
}
