//! C5: the Bitcoin and Ethereum message catalogues. Every message computes
//! its own on-wire size in megabytes at construction time, from the
//! protocol's static size table (spec.md §4.4): `header_size + Σ
//! per_item_size` for list-bearing messages.

mod bitcoin;
mod ethereum;

pub use bitcoin::{BitcoinMessage, BitcoinMessageSizeKb, InvKind};
pub use ethereum::{EthereumMessage, EthereumMessageSizeKb};
