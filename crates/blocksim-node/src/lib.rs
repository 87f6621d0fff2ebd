//! Per-node protocol state machines for the Bitcoin-like and Ethereum-like
//! variants (spec.md §4.6/§4.7, components C7/C8), built on the shared
//! transport and chain-store primitives from `blocksim-network` and
//! `blocksim-chain`.

mod bitcoin;
mod delay;
mod error;
mod ethereum;
mod listener;
mod observability;
mod outbound;
mod session;

pub use bitcoin::{BitcoinNode, BitcoinNodeState};
pub use delay::DelayTables;
pub use error::TopologyError;
pub use ethereum::{EthereumNode, EthereumNodeState};
pub use listener::{EnvelopeSink, Listener};
pub use observability::{PropagationLog, SharedPropagationLog};
pub use outbound::send_message;
pub use session::Session;
