//! C6 (per-connection transport) and C9 (miner registry and election
//! heartbeat).

mod connection;
mod heartbeat;
mod registry;
mod session;

pub use connection::{send, Connection, SharedConnection};
pub use heartbeat::Heartbeat;
pub use registry::{BuildsBlocks, NetworkRegistry};
pub use session::{BoundedSet, MAX_KNOWN_BLOCKS, MAX_KNOWN_TXS};
