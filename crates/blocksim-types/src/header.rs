use crate::address::Address;
use crate::encode::{push_i64, push_str, push_u64};
use crate::hash::{CanonicalEncode, Hash256};
use crate::time::VirtualTime;
use serde::{Deserialize, Serialize};

/// The minimum difficulty a block may carry; the Ethereum `calc_difficulty`
/// formula can otherwise walk below zero when blocks arrive faster than
/// their parent's timestamp predicts.
pub const MIN_DIFFICULTY: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthereumHeaderExt {
    pub gas_limit: u64,
    pub gas_used: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    pub prev_hash: Hash256,
    pub number: u64,
    pub timestamp: VirtualTime,
    pub coinbase: Address,
    pub difficulty: i64,
    pub nonce: u64,
    pub ethereum: Option<EthereumHeaderExt>,
}

impl BlockHeader {
    pub fn genesis(coinbase: Address) -> Self {
        let mut header = BlockHeader {
            prev_hash: Hash256::ZERO,
            number: 0,
            timestamp: VirtualTime::ZERO,
            coinbase,
            difficulty: MIN_DIFFICULTY,
            nonce: 0,
            ethereum: None,
        };
        header.nonce = 0;
        header
    }

    pub fn genesis_ethereum(coinbase: Address, gas_limit: u64) -> Self {
        BlockHeader {
            ethereum: Some(EthereumHeaderExt { gas_limit, gas_used: 0 }),
            ..Self::genesis(coinbase)
        }
    }

    pub fn hash(&self) -> Hash256 {
        self.digest()
    }
}

impl CanonicalEncode for BlockHeader {
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.prev_hash.as_bytes());
        push_u64(&mut buf, self.number);
        push_u64(&mut buf, self.timestamp.as_secs_f64().to_bits());
        push_str(&mut buf, self.coinbase.as_str());
        push_i64(&mut buf, self.difficulty);
        push_u64(&mut buf, self.nonce);
        if let Some(ext) = &self.ethereum {
            push_u64(&mut buf, ext.gas_limit);
            push_u64(&mut buf, ext.gas_used);
        }
        buf
    }
}

/// Two headers are equal iff their hashes are equal.
impl PartialEq for BlockHeader {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}
impl Eq for BlockHeader {}
