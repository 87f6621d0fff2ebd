use std::collections::HashMap;

use blocksim_sampling::Distribution;
use blocksim_types::Location;
use serde::Deserialize;

/// The shape shared by the latency and throughput files: `{"locations": {
/// LOC: { LOC: distribution }}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationPairTable {
    pub locations: HashMap<Location, HashMap<Location, Distribution>>,
}

impl LocationPairTable {
    pub fn get(&self, origin: &Location, destination: &Location) -> Option<&Distribution> {
        self.locations.get(origin).and_then(|row| row.get(destination))
    }

    /// The set of locations this table is defined over (its top-level keys).
    pub fn location_set(&self) -> Vec<String> {
        let mut locations: Vec<String> =
            self.locations.keys().map(|l| l.as_str().to_owned()).collect();
        locations.sort();
        locations
    }
}
