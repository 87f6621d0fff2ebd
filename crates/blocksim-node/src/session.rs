use blocksim_network::{BoundedSet, SharedConnection, MAX_KNOWN_BLOCKS, MAX_KNOWN_TXS};
use blocksim_types::Location;

/// The durable per-peer record spec.md §3 calls `ActiveSession`: the outbound
/// connection used to reach this peer, and the duplicate-suppression sets
/// consulted before including a hash in an outgoing `inv`.
pub struct Session<M> {
    pub peer_location: Location,
    pub out: SharedConnection<M>,
    pub known_txs: BoundedSet<blocksim_types::Hash256>,
    pub known_blocks: BoundedSet<blocksim_types::Hash256>,
    pub handshaken: bool,
}

impl<M> Session<M> {
    pub fn new(peer_location: Location, out: SharedConnection<M>) -> Self {
        Self {
            peer_location,
            out,
            known_txs: BoundedSet::new(MAX_KNOWN_TXS),
            known_blocks: BoundedSet::new(MAX_KNOWN_BLOCKS),
            handshaken: false,
        }
    }
}
