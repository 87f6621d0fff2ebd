use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::ConfigError;
use crate::factory::FactoryConfig;
use crate::sim_config::{DelaysFile, SimConfig};
use crate::tables::LocationPairTable;

/// Every input the world driver needs, loaded and cross-validated together.
pub struct InputFiles {
    pub config: SimConfig,
    pub latency: LocationPairTable,
    pub throughput_received: LocationPairTable,
    pub throughput_sent: LocationPairTable,
    pub delays: DelaysFile,
    pub factory: FactoryConfig,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_str(&text)
        .map_err(|source| ConfigError::Json { path: path.to_path_buf(), source })
}

/// Loads `{config,latency,throughput-received,throughput-sent,delays,factory}.json`
/// from `dir` and checks that the location set is identical across the
/// latency and both throughput files, mirroring the original's
/// `SimulationWorld._set_download_bandwidths`/`_set_upload_bandwidths` checks.
pub fn load_input_dir(dir: &Path) -> Result<InputFiles, ConfigError> {
    let config: SimConfig = read_json(&dir.join("config.json"))?;
    let latency: LocationPairTable = read_json(&dir.join("latency.json"))?;
    let throughput_received: LocationPairTable = read_json(&dir.join("throughput-received.json"))?;
    let throughput_sent: LocationPairTable = read_json(&dir.join("throughput-sent.json"))?;
    let delays: DelaysFile = read_json(&dir.join("delays.json"))?;
    let factory: FactoryConfig = read_json(&dir.join("factory.json"))?;

    let reference = latency.location_set();
    for (file_name, table) in [
        ("throughput-received.json", &throughput_received),
        ("throughput-sent.json", &throughput_sent),
    ] {
        let other = table.location_set();
        if other != reference {
            return Err(ConfigError::LocationSetMismatch {
                reference_file: dir.join("latency.json"),
                reference,
                other_file: dir.join(file_name),
                other,
            });
        }
    }

    Ok(InputFiles { config, latency, throughput_received, throughput_sent, delays, factory })
}

/// Simulation duration must be a positive integer number of seconds
/// (spec.md §7's `ConfigError` case for "non-integer simulation duration").
pub fn validate_duration_secs(duration_secs: f64) -> Result<u64, ConfigError> {
    if duration_secs <= 0.0 || duration_secs.fract() != 0.0 {
        return Err(ConfigError::InvalidDuration(duration_secs));
    }
    Ok(duration_secs as u64)
}

pub fn input_file_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}
