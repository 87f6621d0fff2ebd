use std::time::Duration;

use blocksim_messages::{BitcoinMessageSizeKb, EthereumMessageSizeKb};
use blocksim_sampling::Distribution;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockchainKind {
    Bitcoin,
    Ethereum,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BitcoinConfig {
    pub message_size_kb: BitcoinMessageSizeKb,
    pub block_size_limit_mb: u64,
    pub number_transactions_per_block: Distribution,
    pub orphan_blocks_probability: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EthereumConfig {
    pub message_size_kb: EthereumMessageSizeKb,
    pub block_gas_limit: u64,
    pub tx_gas_limit: u64,
    pub orphan_blocks_probability: f64,
}

/// The top-level `config.json` (spec.md §6): selects the simulated protocol
/// and carries that protocol's parameters. The other variant's section is
/// accepted but ignored, matching the source's permissive single-file shape.
///
/// `duration` is an optional human-readable override (`"1day"`, `"12h"`,
/// via `humantime_serde`) of how long the run lasts; the original
/// (`original_source/blocksim/main.py`) hardcodes `now + 86400`, so absence
/// here falls back to that same one-day default in `blocksim-world`.
#[derive(Debug, Clone, Deserialize)]
pub struct SimConfig {
    pub blockchain: BlockchainKind,
    pub bitcoin: Option<BitcoinConfig>,
    pub ethereum: Option<EthereumConfig>,
    #[serde(default, with = "humantime_serde::option")]
    pub duration: Option<Duration>,
}

/// Per-blockchain delay distributions (`delays.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct DelaysConfig {
    pub tx_validation: Distribution,
    pub block_validation: Distribution,
    pub time_between_blocks_seconds: Distribution,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DelaysFile {
    pub bitcoin: Option<DelaysConfig>,
    pub ethereum: Option<DelaysConfig>,
}
