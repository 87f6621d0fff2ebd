//! A protocol-erased node handle. The world driver builds, connects, and
//! seeds a homogeneous population (every node speaks the same protocol, per
//! `config.json`'s `blockchain` key) without branching on which one it is.

use std::cell::Ref;

use blocksim_chain::ChainStore;
use blocksim_kernel::Kernel;
use blocksim_node::{BitcoinNode, EthereumNode};
use blocksim_types::{Address, Transaction};

#[derive(Clone)]
pub enum AnyNode {
    Bitcoin(BitcoinNode),
    Ethereum(EthereumNode),
}

impl AnyNode {
    pub fn address(&self) -> &Address {
        match self {
            AnyNode::Bitcoin(n) => &n.address,
            AnyNode::Ethereum(n) => &n.address,
        }
    }

    pub fn submit_transaction(&self, tx: Transaction, kernel: &mut Kernel) {
        match self {
            AnyNode::Bitcoin(n) => n.submit_transaction(tx, kernel),
            AnyNode::Ethereum(n) => n.submit_transaction(tx, kernel),
        }
    }

    pub fn forks(&self) -> u64 {
        match self {
            AnyNode::Bitcoin(n) => n.forks(),
            AnyNode::Ethereum(n) => n.forks(),
        }
    }

    pub fn mempool_queue_len(&self) -> u64 {
        match self {
            AnyNode::Bitcoin(n) => n.mempool_queue_len(),
            AnyNode::Ethereum(n) => n.mempool_queue_len(),
        }
    }

    pub fn chain(&self) -> Ref<'_, ChainStore> {
        match self {
            AnyNode::Bitcoin(n) => n.chain(),
            AnyNode::Ethereum(n) => n.chain(),
        }
    }

    /// Peers `a` and `b`. Both must be the same protocol variant: a single
    /// run is homogeneous, fixed by `config.json`'s `blockchain` key.
    pub fn connect(a: &AnyNode, b: &AnyNode, kernel: &mut Kernel) {
        match (a, b) {
            (AnyNode::Bitcoin(a), AnyNode::Bitcoin(b)) => BitcoinNode::connect(a, b, kernel),
            (AnyNode::Ethereum(a), AnyNode::Ethereum(b)) => EthereumNode::connect(a, b, kernel),
            _ => unreachable!("a run's node population is homogeneous in protocol"),
        }
    }
}
