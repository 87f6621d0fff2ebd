use blocksim_types::Address;
use thiserror::Error;

/// Programmer-error category from spec.md §7: attempting to mine on a
/// non-miner, or addressing a peer session that was never established.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("node {address} has no mempool: it was not configured as a miner")]
    NotAMiner { address: Address },

    #[error("no active session with peer {peer} from {address}")]
    NoSuchSession { address: Address, peer: Address },
}
