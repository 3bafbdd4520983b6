//! Sharded store: partitions the k-mer space across N workers and
//! routes every mutation/query through a `Transport`, while presenting
//! the identical `GraphOps` surface `VertexStore` does — so every
//! algorithm in `edits/`, `contig.rs` and `control.rs` runs unmodified in
//! both single-process and sharded mode.

pub mod message;
pub mod sharded_store;
pub mod transport;

pub use message::Message;
pub use sharded_store::ShardedStore;
pub use transport::{ChannelTransport, TcpTransport, Transport};
