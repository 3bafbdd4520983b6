//! Point-to-point transport between shard workers, replacing the
//! reference implementation's raw MPI calls with something small enough
//! to have two interchangeable, independently testable implementations.

use super::message::{self, Message};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};

/// Uniform messaging surface `ShardedStore` drives. Every implementation
/// guarantees FIFO delivery per ordered (sender, receiver) pair.
pub trait Transport {
    fn send(&mut self, peer: usize, msg: Message);
    /// Drain one buffered inbound message, if any, tagged with the
    /// sending peer's rank.
    fn try_recv(&mut self) -> Option<(usize, Message)>;
    fn peer_count(&self) -> usize;
    fn rank(&self) -> usize;
}

/// All workers living in one process, one `crossbeam_channel` per ordered
/// peer pair. Used by the single-process driver (with `size == 1`, the
/// degenerate case that still exercises the full message-passing code
/// path) and by tests, since it needs no OS processes or sockets to
/// exercise a multi-worker run.
pub struct ChannelTransport {
    rank: usize,
    senders: Vec<Sender<(usize, Vec<u8>)>>,
    receiver: Receiver<(usize, Vec<u8>)>,
    k: u8,
    colour_space: bool,
}

impl ChannelTransport {
    /// Build a fully-connected mesh of `size` peers, one `ChannelTransport`
    /// per rank.
    pub fn mesh(size: usize, k: u8, colour_space: bool) -> Vec<ChannelTransport> {
        let mut txs = Vec::with_capacity(size);
        let mut rxs = Vec::with_capacity(size);
        for _ in 0..size {
            let (tx, rx) = crossbeam_channel::unbounded();
            txs.push(tx);
            rxs.push(rx);
        }
        rxs.into_iter()
            .enumerate()
            .map(|(rank, receiver)| ChannelTransport {
                rank,
                senders: txs.clone(),
                receiver,
                k,
                colour_space,
            })
            .collect()
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, peer: usize, msg: Message) {
        let bytes = message::encode(&msg);
        let _ = self.senders[peer].send((self.rank, bytes));
    }

    fn try_recv(&mut self) -> Option<(usize, Message)> {
        match self.receiver.try_recv() {
            Ok((sender, bytes)) => {
                let msg = message::decode(&bytes, self.k, self.colour_space)
                    .expect("malformed in-process message");
                Some((sender, msg))
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    fn peer_count(&self) -> usize {
        self.senders.len()
    }

    fn rank(&self) -> usize {
        self.rank
    }
}

/// One `TcpStream` per peer, used by the `abyss-p` multi-process binary.
/// Frames are length-prefixed (`u32` little-endian byte count, matching
/// the on-disk dump format's endianness convention) followed by the
/// `message::encode` body. Streams are kept in non-blocking mode so
/// `try_recv` never stalls the cooperative single-threaded loop.
pub struct TcpTransport {
    rank: usize,
    streams: Vec<Option<TcpStream>>,
    k: u8,
    colour_space: bool,
    read_buf: Vec<u8>,
}

impl TcpTransport {
    /// `peers[i]` is the `host:port` this process listens on (for `i ==
    /// rank`) or dials (for `i != rank`); every ordered pair ends up
    /// connected exactly once by having the lower rank listen and the
    /// higher rank dial.
    pub fn connect(rank: usize, peers: &[String], k: u8, colour_space: bool) -> io::Result<Self> {
        let size = peers.len();
        let mut streams: Vec<Option<TcpStream>> = (0..size).map(|_| None).collect();
        let listener = TcpListener::bind(&peers[rank])?;
        // Accept connections from every lower rank, then dial every
        // higher rank, matching the listen/dial split above.
        for _ in 0..rank {
            let (stream, _) = listener.accept()?;
            stream.set_nodelay(true)?;
            // The peer announces its rank as the first byte so we can file
            // the stream under the right slot regardless of accept order.
            let mut who = [0u8; 1];
            let mut s = &stream;
            s.read_exact(&mut who)?;
            streams[who[0] as usize] = Some(stream);
        }
        for peer_rank in (rank + 1)..size {
            let mut stream = TcpStream::connect(&peers[peer_rank])?;
            stream.set_nodelay(true)?;
            stream.write_all(&[rank as u8])?;
            streams[peer_rank] = Some(stream);
        }
        for s in streams.iter().flatten() {
            s.set_nonblocking(true)?;
        }
        Ok(TcpTransport {
            rank,
            streams,
            k,
            colour_space,
            read_buf: Vec::new(),
        })
    }

    fn try_read_one(stream: &mut TcpStream, scratch: &mut Vec<u8>) -> io::Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        match stream.peek(&mut len_buf) {
            Ok(4) => {}
            Ok(_) => return Ok(None), // fewer than 4 bytes buffered so far
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(e),
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        scratch.resize(4 + len, 0);
        match stream.peek(scratch) {
            Ok(n) if n == scratch.len() => {
                // Consume exactly what we peeked.
                stream.read_exact(scratch)?;
                Ok(Some(scratch[4..].to_vec()))
            }
            Ok(_) => Ok(None), // body not fully arrived yet
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, peer: usize, msg: Message) {
        if peer == self.rank {
            return;
        }
        let bytes = message::encode(&msg);
        if let Some(stream) = self.streams[peer].as_mut() {
            let _ = stream.write_u32::<LittleEndian>(bytes.len() as u32);
            let _ = stream.write_all(&bytes);
        }
    }

    fn try_recv(&mut self) -> Option<(usize, Message)> {
        for peer in 0..self.streams.len() {
            if peer == self.rank {
                continue;
            }
            let Some(stream) = self.streams[peer].as_mut() else {
                continue;
            };
            match Self::try_read_one(stream, &mut self.read_buf) {
                Ok(Some(body)) => {
                    let msg = message::decode(&body, self.k, self.colour_space)
                        .expect("malformed peer message");
                    return Some((peer, msg));
                }
                Ok(None) => continue,
                Err(_) => continue, // a dropped peer is handled by the checkpoint barrier timing out, not here
            }
        }
        None
    }

    fn peer_count(&self) -> usize {
        self.streams.len()
    }

    fn rank(&self) -> usize {
        self.rank
    }
}
