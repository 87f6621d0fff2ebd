use blocksim_sampling::kb_to_mb;
use blocksim_types::{BlockHeader, Hash256, Transaction, WireSize};
use serde::{Deserialize, Serialize};

/// The Ethereum protocol's static message size table, in kilobytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthereumMessageSizeKb {
    pub status: f64,
    pub hash_size: f64,
    pub tx: f64,
    pub header: f64,
    pub block_bodies: f64,
    pub get_headers: f64,
}

/// A tagged Ethereum wire message. Each variant carries its own `size_mb`,
/// computed once at construction from the size table.
#[derive(Debug, Clone)]
pub enum EthereumMessage {
    Status { protocol_version: u32, network: String, td: f64, best_hash: Hash256, genesis_hash: Hash256, size_mb: f64 },
    NewBlocks { blocks: Vec<(Hash256, u64)>, size_mb: f64 },
    Transactions { txs: Vec<Transaction>, size_mb: f64 },
    GetHeaders { block_number: u64, max_headers: u32, size_mb: f64 },
    BlockHeaders { headers: Vec<BlockHeader>, size_mb: f64 },
    GetBlockBodies { hashes: Vec<Hash256>, size_mb: f64 },
    BlockBodies { bodies: Vec<(Hash256, Vec<Transaction>)>, size_mb: f64 },
}

impl EthereumMessage {
    pub fn status(
        protocol_version: u32,
        network: String,
        td: f64,
        best_hash: Hash256,
        genesis_hash: Hash256,
        table: &EthereumMessageSizeKb,
    ) -> Self {
        Self::Status {
            protocol_version,
            network,
            td,
            best_hash,
            genesis_hash,
            size_mb: kb_to_mb(table.status),
        }
    }

    pub fn new_blocks(blocks: Vec<(Hash256, u64)>, table: &EthereumMessageSizeKb) -> Self {
        let size_mb = kb_to_mb(table.hash_size * blocks.len() as f64);
        Self::NewBlocks { blocks, size_mb }
    }

    pub fn transactions(txs: Vec<Transaction>, table: &EthereumMessageSizeKb) -> Self {
        let size_mb = kb_to_mb(table.tx * txs.len() as f64);
        Self::Transactions { txs, size_mb }
    }

    pub fn get_headers(block_number: u64, max_headers: u32, table: &EthereumMessageSizeKb) -> Self {
        Self::GetHeaders { block_number, max_headers, size_mb: kb_to_mb(table.get_headers) }
    }

    pub fn block_headers(headers: Vec<BlockHeader>, table: &EthereumMessageSizeKb) -> Self {
        let size_mb = kb_to_mb(table.header * headers.len() as f64);
        Self::BlockHeaders { headers, size_mb }
    }

    pub fn get_block_bodies(hashes: Vec<Hash256>, table: &EthereumMessageSizeKb) -> Self {
        let size_mb = kb_to_mb(table.hash_size * hashes.len() as f64);
        Self::GetBlockBodies { hashes, size_mb }
    }

    pub fn block_bodies(bodies: Vec<(Hash256, Vec<Transaction>)>, table: &EthereumMessageSizeKb) -> Self {
        let tx_count: usize = bodies.iter().map(|(_, txs)| txs.len()).sum();
        let size_mb = kb_to_mb(table.block_bodies + table.tx * tx_count as f64);
        Self::BlockBodies { bodies, size_mb }
    }
}

impl WireSize for EthereumMessage {
    fn size_mb(&self) -> f64 {
        match self {
            EthereumMessage::Status { size_mb, .. }
            | EthereumMessage::NewBlocks { size_mb, .. }
            | EthereumMessage::Transactions { size_mb, .. }
            | EthereumMessage::GetHeaders { size_mb, .. }
            | EthereumMessage::BlockHeaders { size_mb, .. }
            | EthereumMessage::GetBlockBodies { size_mb, .. }
            | EthereumMessage::BlockBodies { size_mb, .. } => *size_mb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> EthereumMessageSizeKb {
        EthereumMessageSizeKb {
            status: 0.1,
            hash_size: 0.032,
            tx: 0.3,
            header: 0.05,
            block_bodies: 0.08,
            get_headers: 0.02,
        }
    }

    #[test]
    fn block_bodies_size_scales_with_total_tx_count() {
        let t = table();
        let empty = EthereumMessage::block_bodies(vec![(Hash256::ZERO, vec![])], &t);
        let txs = vec![
            blocksim_types::Transaction::new_ethereum(
                blocksim_types::Address::new("a"),
                blocksim_types::Address::new("b"),
                1,
                "s".into(),
                0,
                1,
                21_000,
            );
            3
        ];
        let full = EthereumMessage::block_bodies(vec![(Hash256::ZERO, txs)], &t);
        assert!(full.size_mb() > empty.size_mb());
    }

    #[test]
    fn get_headers_size_is_fixed_regardless_of_max_headers() {
        let t = table();
        let a = EthereumMessage::get_headers(10, 1, &t);
        let b = EthereumMessage::get_headers(10, 100, &t);
        assert_eq!(a.size_mb(), b.size_mb());
    }
}
