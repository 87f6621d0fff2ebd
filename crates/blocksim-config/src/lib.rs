//! Loads and cross-validates the simulator's JSON input files (spec.md §6):
//! the run config, the latency/throughput tables, the per-blockchain delay
//! distributions, and the node factory spec.

mod error;
mod factory;
mod loader;
mod sim_config;
mod tables;

pub use error::ConfigError;
pub use factory::{FactoryConfig, HashrateRange, MinerSpec, NonMinerSpec, TxSeedingConfig};
pub use loader::{input_file_path, load_input_dir, validate_duration_secs, InputFiles};
pub use sim_config::{BitcoinConfig, BlockchainKind, DelaysConfig, DelaysFile, EthereumConfig, SimConfig};
pub use tables::LocationPairTable;
