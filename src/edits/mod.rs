//! Graph-cleaning algorithms: adjacency generation, erosion, tip
//! trimming, bubble popping and mark/split ambiguous. Each lives in its
//! own module but all are written generically over `GraphOps` so the
//! control loop can run them unmodified against either the
//! single-process store or the sharded one.

pub mod adjacency;
pub mod bubble;
pub mod erode;
pub mod split;
pub mod trim;

pub use adjacency::generate_adjacency;
pub use bubble::pop_bubbles;
pub use erode::erode;
pub use split::split;
pub use trim::trim;
