use std::collections::HashMap;
use std::fmt;

use blocksim_sampling::parse_tuple_string;
use blocksim_types::Location;
use serde::{de, Deserialize, Deserializer};

/// `factory.json`'s `miners.{LOC}.mega_hashrate_range`: a `"(lo,hi)"` tuple
/// string, each miner assigned a hashrate uniformly within it (times 1e6 H/s).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HashrateRange {
    pub lo: f64,
    pub hi: f64,
}

impl<'de> Deserialize<'de> for HashrateRange {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        let values = parse_tuple_string(&text).map_err(de::Error::custom)?;
        match values.as_slice() {
            [lo, hi] => Ok(HashrateRange { lo: *lo, hi: *hi }),
            _ => Err(de::Error::custom(format!(
                "mega_hashrate_range expects a (lo, hi) pair, got {text:?}"
            ))),
        }
    }
}

impl fmt::Display for HashrateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lo, self.hi)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerSpec {
    pub how_many: u32,
    pub mega_hashrate_range: HashrateRange,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NonMinerSpec {
    pub how_many: u32,
}

/// `factory.json`'s optional `tx_seeding` section: periodic synthetic
/// transaction load, one batch broadcast from a randomly chosen node every
/// `interval_seconds`, for `number_of_batches` iterations.
#[derive(Debug, Clone, Deserialize)]
pub struct TxSeedingConfig {
    pub interval_seconds: f64,
    pub number_of_batches: u32,
    pub transactions_per_batch: u32,
}

/// `factory.json`: how many miners/non-miners to instantiate per location.
#[derive(Debug, Clone, Deserialize)]
pub struct FactoryConfig {
    pub miners: HashMap<Location, MinerSpec>,
    pub non_miners: HashMap<Location, NonMinerSpec>,
    pub tx_seeding: Option<TxSeedingConfig>,
}
