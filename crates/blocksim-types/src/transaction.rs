use crate::address::Address;
use crate::encode::{push_str, push_u64};
use crate::hash::{CanonicalEncode, Hash256};
use serde::{Deserialize, Serialize};

/// Fields shared by both protocol variants: `{to, sender, value, signature,
/// fee, hash}`. The Ethereum variant layers `{nonce, gas_price, start_gas}`
/// on top and derives `fee = gas_price * start_gas`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transaction {
    Bitcoin(BitcoinTransaction),
    Ethereum(EthereumTransaction),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinTransaction {
    pub to: Address,
    pub sender: Address,
    pub value: u64,
    pub signature: String,
    pub fee: u64,
    pub hash: Hash256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthereumTransaction {
    pub to: Address,
    pub sender: Address,
    pub value: u64,
    pub signature: String,
    pub nonce: u64,
    pub gas_price: u64,
    pub start_gas: u64,
    pub fee: u64,
    pub hash: Hash256,
}

impl Transaction {
    pub fn new_bitcoin(
        to: Address,
        sender: Address,
        value: u64,
        signature: String,
        fee: u64,
    ) -> Self {
        let mut tx = BitcoinTransaction { to, sender, value, signature, fee, hash: Hash256::ZERO };
        tx.hash = tx.digest();
        Transaction::Bitcoin(tx)
    }

    pub fn new_ethereum(
        to: Address,
        sender: Address,
        value: u64,
        signature: String,
        nonce: u64,
        gas_price: u64,
        start_gas: u64,
    ) -> Self {
        let fee = gas_price.saturating_mul(start_gas);
        let mut tx = EthereumTransaction {
            to,
            sender,
            value,
            signature,
            nonce,
            gas_price,
            start_gas,
            fee,
            hash: Hash256::ZERO,
        };
        tx.hash = tx.digest();
        Transaction::Ethereum(tx)
    }

    pub fn hash(&self) -> Hash256 {
        match self {
            Transaction::Bitcoin(tx) => tx.hash,
            Transaction::Ethereum(tx) => tx.hash,
        }
    }

    pub fn sender(&self) -> &Address {
        match self {
            Transaction::Bitcoin(tx) => &tx.sender,
            Transaction::Ethereum(tx) => &tx.sender,
        }
    }

    pub fn to(&self) -> &Address {
        match self {
            Transaction::Bitcoin(tx) => &tx.to,
            Transaction::Ethereum(tx) => &tx.to,
        }
    }

    /// `fee` for Bitcoin transactions, `gas_price * start_gas` for Ethereum
    /// ones. Used by the mempool to order by priority.
    pub fn fee(&self) -> u64 {
        match self {
            Transaction::Bitcoin(tx) => tx.fee,
            Transaction::Ethereum(tx) => tx.fee,
        }
    }

    pub fn start_gas(&self) -> Option<u64> {
        match self {
            Transaction::Bitcoin(_) => None,
            Transaction::Ethereum(tx) => Some(tx.start_gas),
        }
    }
}

impl CanonicalEncode for BitcoinTransaction {
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        push_str(&mut buf, self.to.as_str());
        push_str(&mut buf, self.sender.as_str());
        push_u64(&mut buf, self.value);
        push_str(&mut buf, &self.signature);
        push_u64(&mut buf, self.fee);
        buf
    }
}

impl CanonicalEncode for EthereumTransaction {
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        push_str(&mut buf, self.to.as_str());
        push_str(&mut buf, self.sender.as_str());
        push_u64(&mut buf, self.value);
        push_str(&mut buf, &self.signature);
        push_u64(&mut buf, self.nonce);
        push_u64(&mut buf, self.gas_price);
        push_u64(&mut buf, self.start_gas);
        buf
    }
}

/// Highest-fee-first ordering: `fee()` already folds in `gas_price *
/// start_gas` for the Ethereum variant.
impl PartialOrd for Transaction {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Transaction {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fee().cmp(&other.fee()).then_with(|| self.hash().cmp(&other.hash()))
    }
}
