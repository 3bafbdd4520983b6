//! Wire messages exchanged between shard workers. Bit-exact
//! little-endian encoding, mirroring the vertex store's on-disk dump
//! format (`store.rs`) for the same reason: fixed, documented, and
//! explicitly not portable across endianness.

use crate::kmer::{Direction, Kmer};
use crate::vertex::{EdgeSet, VertexData};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

const TAG_ADD: u8 = 1;
const TAG_REMOVE: u8 = 2;
const TAG_SET_BASE: u8 = 3;
const TAG_REMOVE_EXT: u8 = 4;
const TAG_MARK: u8 = 5;
const TAG_SEQ_DATA_REQUEST: u8 = 6;
const TAG_SEQ_DATA_RESPONSE: u8 = 7;
const TAG_CHECKPOINT: u8 = 8;
const TAG_CHECKPOINT_ACK: u8 = 9;
const TAG_HISTOGRAM_REPORT: u8 = 10;
const TAG_HISTOGRAM_BROADCAST: u8 = 11;
const TAG_ASSEMBLE_TOKEN: u8 = 12;

/// The five mutation/query message kinds, the two control-channel
/// messages the checkpoint/barrier protocol needs, and the two used to
/// sum per-worker coverage histograms before threshold auto-selection.
#[derive(Debug, Clone)]
pub enum Message {
    Add(Kmer),
    Remove(Kmer),
    SetBase { kmer: Kmer, dir: Direction, base: u8 },
    RemoveExt { kmer: Kmer, dir: Direction, edges: EdgeSet },
    Mark { kmer: Kmer, dir: Option<Direction> },
    SeqDataRequest { kmer: Kmer, group_id: u64, seq_id: u64 },
    SeqDataResponse { group_id: u64, seq_id: u64, data: Option<VertexData> },
    Checkpoint,
    CheckpointAck,
    /// A worker's local histogram buckets, sent to rank 0 for merging.
    HistogramReport(Vec<(u64, u64)>),
    /// The fully-merged histogram, sent by rank 0 back to every worker.
    HistogramBroadcast(Vec<(u64, u64)>),
    /// ASSEMBLE's serialization token, passed rank `i` -> `i+1`.
    AssembleToken,
}

fn dir_tag(dir: Direction) -> u8 {
    match dir {
        Direction::Sense => 0,
        Direction::Antisense => 1,
    }
}

fn tag_dir(b: u8) -> Direction {
    if b == 0 {
        Direction::Sense
    } else {
        Direction::Antisense
    }
}

fn write_kmer<W: Write>(w: &mut W, k: &Kmer) -> io::Result<()> {
    w.write_all(k.as_bytes())
}

fn read_kmer<R: Read>(r: &mut R, k: u8, colour_space: bool) -> io::Result<Kmer> {
    let n = crate::kmer::num_bytes_for(k);
    let mut buf = vec![0u8; n];
    r.read_exact(&mut buf)?;
    Ok(Kmer::from_raw_parts(&buf, k, colour_space))
}

/// Multiplicity always travels as a `u32` on the wire regardless of the
/// local `Multiplicity` type width (`u8` unless built with
/// `exact_counting`), so peers built with different feature flags could
/// never silently disagree on frame layout — not that this crate expects
/// to mix them, but the wire format costs nothing extra to make explicit.
fn write_mult<W: Write>(w: &mut W, m: u64) -> io::Result<()> {
    w.write_u32::<LittleEndian>(m as u32)
}

fn read_mult<R: Read>(r: &mut R) -> io::Result<crate::vertex::Multiplicity> {
    Ok(r.read_u32::<LittleEndian>()? as crate::vertex::Multiplicity)
}

pub fn encode(msg: &Message) -> Vec<u8> {
    let mut buf = Vec::new();
    match msg {
        Message::Add(k) => {
            buf.write_u8(TAG_ADD).unwrap();
            write_kmer(&mut buf, k).unwrap();
        }
        Message::Remove(k) => {
            buf.write_u8(TAG_REMOVE).unwrap();
            write_kmer(&mut buf, k).unwrap();
        }
        Message::SetBase { kmer, dir, base } => {
            buf.write_u8(TAG_SET_BASE).unwrap();
            write_kmer(&mut buf, kmer).unwrap();
            buf.write_u8(dir_tag(*dir)).unwrap();
            buf.write_u8(*base).unwrap();
        }
        Message::RemoveExt { kmer, dir, edges } => {
            buf.write_u8(TAG_REMOVE_EXT).unwrap();
            write_kmer(&mut buf, kmer).unwrap();
            buf.write_u8(dir_tag(*dir)).unwrap();
            buf.write_u8(edges.bits()).unwrap();
        }
        Message::Mark { kmer, dir } => {
            buf.write_u8(TAG_MARK).unwrap();
            write_kmer(&mut buf, kmer).unwrap();
            match dir {
                Some(d) => {
                    buf.write_u8(1).unwrap();
                    buf.write_u8(dir_tag(*d)).unwrap();
                }
                None => {
                    buf.write_u8(0).unwrap();
                    buf.write_u8(0).unwrap();
                }
            }
        }
        Message::SeqDataRequest { kmer, group_id, seq_id } => {
            buf.write_u8(TAG_SEQ_DATA_REQUEST).unwrap();
            write_kmer(&mut buf, kmer).unwrap();
            buf.write_u64::<LittleEndian>(*group_id).unwrap();
            buf.write_u64::<LittleEndian>(*seq_id).unwrap();
        }
        Message::SeqDataResponse { group_id, seq_id, data } => {
            buf.write_u8(TAG_SEQ_DATA_RESPONSE).unwrap();
            buf.write_u64::<LittleEndian>(*group_id).unwrap();
            buf.write_u64::<LittleEndian>(*seq_id).unwrap();
            match data {
                Some(v) => {
                    buf.write_u8(1).unwrap();
                    buf.write_u8(v.edges(Direction::Sense).bits()).unwrap();
                    buf.write_u8(v.edges(Direction::Antisense).bits()).unwrap();
                    buf.write_u8(v.raw_flags()).unwrap();
                    write_mult(&mut buf, v.multiplicity(Direction::Sense) as u64).unwrap();
                    write_mult(&mut buf, v.multiplicity(Direction::Antisense) as u64).unwrap();
                }
                None => {
                    buf.write_u8(0).unwrap();
                }
            }
        }
        Message::Checkpoint => {
            buf.write_u8(TAG_CHECKPOINT).unwrap();
        }
        Message::CheckpointAck => {
            buf.write_u8(TAG_CHECKPOINT_ACK).unwrap();
        }
        Message::HistogramReport(buckets) => {
            buf.write_u8(TAG_HISTOGRAM_REPORT).unwrap();
            write_buckets(&mut buf, buckets);
        }
        Message::HistogramBroadcast(buckets) => {
            buf.write_u8(TAG_HISTOGRAM_BROADCAST).unwrap();
            write_buckets(&mut buf, buckets);
        }
        Message::AssembleToken => {
            buf.write_u8(TAG_ASSEMBLE_TOKEN).unwrap();
        }
    }
    buf
}

fn write_buckets<W: Write>(w: &mut W, buckets: &[(u64, u64)]) {
    w.write_u64::<LittleEndian>(buckets.len() as u64).unwrap();
    for &(key, count) in buckets {
        w.write_u64::<LittleEndian>(key).unwrap();
        w.write_u64::<LittleEndian>(count).unwrap();
    }
}

fn read_buckets<R: Read>(r: &mut R) -> io::Result<Vec<(u64, u64)>> {
    let n = r.read_u64::<LittleEndian>()?;
    let mut buckets = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let key = r.read_u64::<LittleEndian>()?;
        let count = r.read_u64::<LittleEndian>()?;
        buckets.push((key, count));
    }
    Ok(buckets)
}

pub fn decode(bytes: &[u8], k: u8, colour_space: bool) -> io::Result<Message> {
    let mut r = Cursor::new(bytes);
    let tag = r.read_u8()?;
    let msg = match tag {
        TAG_ADD => Message::Add(read_kmer(&mut r, k, colour_space)?),
        TAG_REMOVE => Message::Remove(read_kmer(&mut r, k, colour_space)?),
        TAG_SET_BASE => {
            let kmer = read_kmer(&mut r, k, colour_space)?;
            let dir = tag_dir(r.read_u8()?);
            let base = r.read_u8()?;
            Message::SetBase { kmer, dir, base }
        }
        TAG_REMOVE_EXT => {
            let kmer = read_kmer(&mut r, k, colour_space)?;
            let dir = tag_dir(r.read_u8()?);
            let edges = EdgeSet::from_bits(r.read_u8()?);
            Message::RemoveExt { kmer, dir, edges }
        }
        TAG_MARK => {
            let kmer = read_kmer(&mut r, k, colour_space)?;
            let has_dir = r.read_u8()?;
            let dir_byte = r.read_u8()?;
            let dir = if has_dir != 0 { Some(tag_dir(dir_byte)) } else { None };
            Message::Mark { kmer, dir }
        }
        TAG_SEQ_DATA_REQUEST => {
            let kmer = read_kmer(&mut r, k, colour_space)?;
            let group_id = r.read_u64::<LittleEndian>()?;
            let seq_id = r.read_u64::<LittleEndian>()?;
            Message::SeqDataRequest { kmer, group_id, seq_id }
        }
        TAG_SEQ_DATA_RESPONSE => {
            let group_id = r.read_u64::<LittleEndian>()?;
            let seq_id = r.read_u64::<LittleEndian>()?;
            let present = r.read_u8()?;
            let data = if present != 0 {
                let sense = EdgeSet::from_bits(r.read_u8()?);
                let antisense = EdgeSet::from_bits(r.read_u8()?);
                let flags = r.read_u8()?;
                let mult_sense = read_mult(&mut r)?;
                let mult_antisense = read_mult(&mut r)?;
                Some(VertexData::from_raw_parts(sense, antisense, flags, mult_sense, mult_antisense))
            } else {
                None
            };
            Message::SeqDataResponse { group_id, seq_id, data }
        }
        TAG_CHECKPOINT => Message::Checkpoint,
        TAG_CHECKPOINT_ACK => Message::CheckpointAck,
        TAG_HISTOGRAM_REPORT => Message::HistogramReport(read_buckets(&mut r)?),
        TAG_HISTOGRAM_BROADCAST => Message::HistogramBroadcast(read_buckets(&mut r)?),
        TAG_ASSEMBLE_TOKEN => Message::AssembleToken,
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown message tag {other}"),
            ))
        }
    };
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::Kmer;

    #[test]
    fn round_trips_add_message() {
        let k = Kmer::from_ascii(b"ACGT", false).unwrap();
        let bytes = encode(&Message::Add(k.clone()));
        match decode(&bytes, 4, false).unwrap() {
            Message::Add(got) => assert_eq!(got, k),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn round_trips_seq_data_response_with_data() {
        let mut v = VertexData::default();
        v.edges_mut(Direction::Sense).set(2);
        v.set_multiplicity(Direction::Sense, 7);
        let msg = Message::SeqDataResponse { group_id: 3, seq_id: 9, data: Some(v) };
        let bytes = encode(&msg);
        match decode(&bytes, 4, false).unwrap() {
            Message::SeqDataResponse { group_id, seq_id, data } => {
                assert_eq!(group_id, 3);
                assert_eq!(seq_id, 9);
                assert_eq!(data.unwrap().edges(Direction::Sense).test(2), true);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn round_trips_seq_data_response_absent() {
        let msg = Message::SeqDataResponse { group_id: 1, seq_id: 2, data: None };
        let bytes = encode(&msg);
        match decode(&bytes, 4, false).unwrap() {
            Message::SeqDataResponse { data, .. } => assert!(data.is_none()),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn round_trips_histogram_report() {
        let msg = Message::HistogramReport(vec![(1, 5), (2, 3)]);
        let bytes = encode(&msg);
        match decode(&bytes, 4, false).unwrap() {
            Message::HistogramReport(buckets) => assert_eq!(buckets, vec![(1, 5), (2, 3)]),
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
