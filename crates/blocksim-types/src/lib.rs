//! Shared domain types: the data model of spec.md §3, independent of the
//! event kernel and of any particular protocol's message catalogue.

pub mod address;
pub mod block;
pub mod encode;
pub mod envelope;
pub mod hash;
pub mod header;
pub mod time;
pub mod transaction;

pub use address::{Address, Location};
pub use block::Block;
pub use envelope::{Envelope, WireSize};
pub use hash::{CanonicalEncode, Hash256};
pub use header::{BlockHeader, EthereumHeaderExt, MIN_DIFFICULTY};
pub use time::VirtualTime;
pub use transaction::{BitcoinTransaction, EthereumTransaction, Transaction};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_hash_is_stable_under_reencoding() {
        let h1 = BlockHeader::genesis(Address::new("miner-a"));
        let h2 = BlockHeader::genesis(Address::new("miner-a"));
        assert_eq!(h1.hash(), h2.hash());
        assert_eq!(h1, h2);
    }

    #[test]
    fn different_coinbase_changes_hash() {
        let h1 = BlockHeader::genesis(Address::new("miner-a"));
        let h2 = BlockHeader::genesis(Address::new("miner-b"));
        assert_ne!(h1.hash(), h2.hash());
    }

    #[test]
    fn ethereum_tx_fee_is_gas_price_times_start_gas() {
        let tx = Transaction::new_ethereum(
            Address::new("bob"),
            Address::new("alice"),
            100,
            "sig".into(),
            1,
            5,
            21_000,
        );
        assert_eq!(tx.fee(), 5 * 21_000);
    }

    #[test]
    fn tx_ordering_is_highest_fee_first() {
        let low =
            Transaction::new_bitcoin(Address::new("b"), Address::new("a"), 1, "s1".into(), 10);
        let high =
            Transaction::new_bitcoin(Address::new("b"), Address::new("a"), 1, "s2".into(), 50);
        assert!(high > low);
    }

    #[test]
    fn hash_prefix_is_a_substring_of_full_hex() {
        let h = BlockHeader::genesis(Address::new("x")).hash();
        let full = h.to_string();
        assert!(full.starts_with(&h.prefix(8)));
    }
}
