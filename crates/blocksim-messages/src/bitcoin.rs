use blocksim_sampling::kb_to_mb;
use blocksim_types::{Block, Hash256, Transaction, WireSize};
use serde::{Deserialize, Serialize};

/// The Bitcoin protocol's static message size table, in kilobytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoinMessageSizeKb {
    pub header: f64,
    pub version: f64,
    pub verack: f64,
    pub inv_vector: f64,
    pub tx: f64,
    pub block_base: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvKind {
    Tx,
    Block,
}

/// A tagged Bitcoin wire message. Each variant carries its own `size_mb`,
/// computed once at construction from the size table.
#[derive(Debug, Clone)]
pub enum BitcoinMessage {
    Version { size_mb: f64 },
    Verack { size_mb: f64 },
    Inv { kind: InvKind, hashes: Vec<Hash256>, size_mb: f64 },
    GetData { kind: InvKind, hashes: Vec<Hash256>, size_mb: f64 },
    Tx { tx: Transaction, size_mb: f64 },
    Block { block: Block, size_mb: f64 },
}

impl BitcoinMessage {
    pub fn version(table: &BitcoinMessageSizeKb) -> Self {
        Self::Version { size_mb: kb_to_mb(table.version) }
    }

    pub fn verack(table: &BitcoinMessageSizeKb) -> Self {
        Self::Verack { size_mb: kb_to_mb(table.verack) }
    }

    pub fn inv(kind: InvKind, hashes: Vec<Hash256>, table: &BitcoinMessageSizeKb) -> Self {
        let size_mb = kb_to_mb(table.header + table.inv_vector * hashes.len() as f64);
        Self::Inv { kind, hashes, size_mb }
    }

    pub fn get_data(kind: InvKind, hashes: Vec<Hash256>, table: &BitcoinMessageSizeKb) -> Self {
        let size_mb = kb_to_mb(table.header + table.inv_vector * hashes.len() as f64);
        Self::GetData { kind, hashes, size_mb }
    }

    pub fn tx(tx: Transaction, table: &BitcoinMessageSizeKb) -> Self {
        let size_mb = kb_to_mb(table.tx);
        Self::Tx { tx, size_mb }
    }

    pub fn block(block: Block, table: &BitcoinMessageSizeKb) -> Self {
        let size_mb = kb_to_mb(table.block_base + table.tx * block.transactions.len() as f64);
        Self::Block { block, size_mb }
    }
}

impl WireSize for BitcoinMessage {
    fn size_mb(&self) -> f64 {
        match self {
            BitcoinMessage::Version { size_mb }
            | BitcoinMessage::Verack { size_mb }
            | BitcoinMessage::Inv { size_mb, .. }
            | BitcoinMessage::GetData { size_mb, .. }
            | BitcoinMessage::Tx { size_mb, .. }
            | BitcoinMessage::Block { size_mb, .. } => *size_mb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksim_types::Address;

    fn table() -> BitcoinMessageSizeKb {
        BitcoinMessageSizeKb {
            header: 0.024,
            version: 0.1,
            verack: 0.024,
            inv_vector: 0.036,
            tx: 0.25,
            block_base: 0.08,
        }
    }

    #[test]
    fn inv_size_grows_with_hash_count() {
        let t = table();
        let one = BitcoinMessage::inv(InvKind::Tx, vec![Hash256::ZERO], &t);
        let three =
            BitcoinMessage::inv(InvKind::Tx, vec![Hash256::ZERO, Hash256::ZERO, Hash256::ZERO], &t);
        assert!(three.size_mb() > one.size_mb());
    }

    #[test]
    fn block_size_accounts_for_its_transactions() {
        let t = table();
        let tx = Transaction::new_bitcoin(Address::new("a"), Address::new("b"), 1, "s".into(), 1);
        let empty = BitcoinMessage::block(
            Block::new(blocksim_types::BlockHeader::genesis(Address::new("m")), vec![]),
            &t,
        );
        let full = BitcoinMessage::block(
            Block::new(blocksim_types::BlockHeader::genesis(Address::new("m")), vec![tx]),
            &t,
        );
        assert!(full.size_mb() > empty.size_mb());
    }
}
