use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

type Blake2b256 = Blake2b<U32>;

/// A stable 256-bit digest of a canonical encoding. Two values that encode
/// to the same bytes hash to the same value; this is the only notion of
/// equality the simulator uses for headers and transactions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// A short hex prefix, used as a map key in the observability record
    /// (`tx_propagation`, `block_propagation`).
    pub fn prefix(&self, chars: usize) -> String {
        let full = hex::encode(self.0);
        full.chars().take(chars).collect()
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.prefix(8))
    }
}

/// Implemented by every type whose identity is its digest: transactions and
/// block headers. `canonical_bytes` must be a deterministic, order-preserving
/// encoding of the fields listed in the data model.
pub trait CanonicalEncode {
    fn canonical_bytes(&self) -> Vec<u8>;

    fn digest(&self) -> Hash256 {
        digest(&self.canonical_bytes())
    }
}

pub fn digest(bytes: &[u8]) -> Hash256 {
    let mut hasher = Blake2b256::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&out[..32]);
    Hash256(buf)
}
