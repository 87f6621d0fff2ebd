//! Cross-node propagation timing (spec.md §6's `tx_propagation` /
//! `block_propagation` observability fields). Shared by every node in a run
//! via `Rc<RefCell<_>>`; each side records its half of the story — the
//! sender notes when a hash was first seen, the receiver notes when it
//! finally arrived — with no coupling between the two beyond the hash.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use blocksim_types::{Address, Hash256, VirtualTime};

#[derive(Default)]
pub struct PropagationLog {
    tx_origin: HashMap<Hash256, (Address, VirtualTime)>,
    block_origin: HashMap<Hash256, (Address, VirtualTime)>,
    tx_propagation: HashMap<String, HashMap<String, f64>>,
    block_propagation: HashMap<String, HashMap<String, f64>>,
}

impl PropagationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `now` as the moment `hash` entered the network from `origin`.
    /// Only the first call for a given hash sticks: a tx or block is
    /// "created" exactly once, no matter how many peers later relay it.
    pub fn note_tx_origin(&mut self, hash: Hash256, origin: &Address, now: VirtualTime) {
        self.tx_origin.entry(hash).or_insert_with(|| (origin.clone(), now));
    }

    pub fn note_block_origin(&mut self, hash: Hash256, origin: &Address, now: VirtualTime) {
        self.block_origin.entry(hash).or_insert_with(|| (origin.clone(), now));
    }

    /// Records the elapsed time from `hash`'s origin to its arrival at
    /// `dest`. A no-op if the origin was never recorded (shouldn't happen:
    /// every tx/block is recorded before it can reach a peer) or if `dest`
    /// is the origin itself.
    pub fn note_tx_delivered(&mut self, hash: Hash256, dest: &Address, now: VirtualTime) {
        if let Some((origin, started)) = self.tx_origin.get(&hash) {
            if origin == dest {
                return;
            }
            let elapsed = now - *started;
            self.tx_propagation
                .entry(format!("{origin}_{dest}"))
                .or_default()
                .insert(hash.prefix(8), elapsed);
        }
    }

    pub fn note_block_delivered(&mut self, hash: Hash256, dest: &Address, now: VirtualTime) {
        if let Some((origin, started)) = self.block_origin.get(&hash) {
            if origin == dest {
                return;
            }
            let elapsed = now - *started;
            self.block_propagation
                .entry(format!("{origin}_{dest}"))
                .or_default()
                .insert(hash.prefix(8), elapsed);
        }
    }

    pub fn tx_propagation(&self) -> &HashMap<String, HashMap<String, f64>> {
        &self.tx_propagation
    }

    pub fn block_propagation(&self) -> &HashMap<String, HashMap<String, f64>> {
        &self.block_propagation
    }
}

pub type SharedPropagationLog = Rc<RefCell<PropagationLog>>;
