use std::collections::HashMap;
use std::path::PathBuf;

use blocksim_config::{ConfigError, LocationPairTable};
use blocksim_sampling::{ms_to_secs, throughput_delay_secs, SampleError, Sampler};
use blocksim_types::Location;
use rand::Rng;

/// Precomputed samplers for the latency and both throughput tables (spec.md
/// §4.5/§6). Built once at world-construction time; read-only afterwards,
/// shared by every node and connection via `Rc`.
pub struct DelayTables {
    latency: HashMap<(Location, Location), Sampler>,
    throughput_received: HashMap<(Location, Location), Sampler>,
    throughput_sent: HashMap<(Location, Location), Sampler>,
}

fn build_table(
    file: &'static str,
    table: &LocationPairTable,
) -> Result<HashMap<(Location, Location), Sampler>, ConfigError> {
    let mut out = HashMap::new();
    for origin in table.location_set() {
        for destination in table.location_set() {
            let origin = Location::new(origin.clone());
            let destination = Location::new(destination.clone());
            if let Some(dist) = table.get(&origin, &destination) {
                let sampler = Sampler::build(dist).map_err(|source| {
                    ConfigError::InvalidDistribution { file: PathBuf::from(file), source }
                })?;
                out.insert((origin, destination), sampler);
            }
        }
    }
    Ok(out)
}

impl DelayTables {
    pub fn build(
        latency: &LocationPairTable,
        throughput_received: &LocationPairTable,
        throughput_sent: &LocationPairTable,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            latency: build_table("latency.json", latency)?,
            throughput_received: build_table("throughput-received.json", throughput_received)?,
            throughput_sent: build_table("throughput-sent.json", throughput_sent)?,
        })
    }

    fn sampler(
        &self,
        table: &HashMap<(Location, Location), Sampler>,
        origin: &Location,
        destination: &Location,
    ) -> &Sampler {
        table.get(&(origin.clone(), destination.clone())).unwrap_or_else(|| {
            panic!("no distribution configured for {origin} -> {destination}")
        })
    }

    /// Per-hop latency, in seconds, for an envelope travelling `origin` ->
    /// `destination` (spec.md §4.5: `LATENCIES[origin.location][destination.location]`,
    /// recorded in milliseconds).
    pub fn latency_secs(&self, origin: &Location, destination: &Location, rng: &mut impl Rng) -> f64 {
        ms_to_secs(self.sampler(&self.latency, origin, destination).sample(rng))
    }

    /// Receive delay paid by the destination's listener after dequeuing an
    /// envelope: `size_mb * 8 / THROUGHPUT_RECEIVED[origin][destination]`.
    pub fn receive_delay_secs(
        &self,
        origin: &Location,
        destination: &Location,
        size_mb: f64,
        rng: &mut impl Rng,
    ) -> Result<f64, SampleError> {
        let throughput = self.sampler(&self.throughput_received, origin, destination).sample(rng);
        throughput_delay_secs(size_mb, throughput, "throughput_received")
    }

    /// Send delay paid by the sender before the message begins its latency
    /// transit: `size_mb * 8 / THROUGHPUT_SENT[origin][destination]`.
    pub fn send_delay_secs(
        &self,
        origin: &Location,
        destination: &Location,
        size_mb: f64,
        rng: &mut impl Rng,
    ) -> Result<f64, SampleError> {
        let throughput = self.sampler(&self.throughput_sent, origin, destination).sample(rng);
        throughput_delay_secs(size_mb, throughput, "throughput_sent")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksim_sampling::Distribution;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap as StdHashMap;

    fn single_pair_table(name: &str, params: Vec<f64>) -> LocationPairTable {
        let mut inner = StdHashMap::new();
        let mut dest = StdHashMap::new();
        dest.insert(Location::new("b"), Distribution { name: name.into(), parameters: params });
        inner.insert(Location::new("a"), dest);
        LocationPairTable { locations: inner }
    }

    #[test]
    fn delay_tables_sample_the_configured_distribution() {
        let latency = single_pair_table("constant", vec![100.0]);
        let rx = single_pair_table("constant", vec![8.0]);
        let tx = single_pair_table("constant", vec![8.0]);
        let tables = DelayTables::build(&latency, &rx, &tx).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let a = Location::new("a");
        let b = Location::new("b");
        assert!((tables.latency_secs(&a, &b, &mut rng) - 0.1).abs() < 1e-9);
        assert!((tables.receive_delay_secs(&a, &b, 2.0, &mut rng).unwrap() - 2.0).abs() < 1e-9);
    }
}
