//! The driver itself (spec.md §4.9): owns the kernel, the node population,
//! and the shared propagation log; exposes `build` / `run_until` / `report`
//! as the three calls `bin/blocksim` makes.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use blocksim_config::{ConfigError, InputFiles};
use blocksim_kernel::Kernel;
use blocksim_network::Heartbeat;
use blocksim_node::{DelayTables, PropagationLog};
use blocksim_sampling::Sampler;
use blocksim_types::VirtualTime;

use crate::factory::{build_population, Population};
use crate::node::AnyNode;
use crate::report::{self, Observability};
use crate::seeding::TransactionFactory;

/// `original_source/blocksim/main.py` hardcodes a one-day run
/// (`now + 86400`); absent an explicit `config.json` `duration` or CLI
/// override, `bin/blocksim` falls back to this same default.
pub const DEFAULT_DURATION_SECS: u64 = 86_400;

pub struct World {
    kernel: Kernel,
    nodes: Vec<AnyNode>,
    propagation: Rc<RefCell<PropagationLog>>,
    created_transactions: Rc<Cell<u64>>,
    start_time: VirtualTime,
}

impl World {
    /// Loads delay tables, builds the node population, connects every node
    /// to every other one (`main.py`'s `for node in nodes_list:
    /// node.connect(nodes_list)` full mesh), spawns the miner-election
    /// heartbeat, and, if `factory.json` carries a `tx_seeding` section,
    /// spawns the periodic transaction seeder.
    pub fn build(input: &InputFiles, initial_time: VirtualTime, seed: u64) -> Result<Self, ConfigError> {
        let mut kernel = Kernel::new(initial_time, seed);
        let delay_tables = Rc::new(DelayTables::build(&input.latency, &input.throughput_received, &input.throughput_sent)?);
        let propagation = Rc::new(RefCell::new(PropagationLog::new()));
        let created_transactions = Rc::new(Cell::new(0));

        let Population { nodes, registry } =
            build_population(input, Rc::clone(&delay_tables), Some(Rc::clone(&propagation)), &mut kernel)?;

        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                AnyNode::connect(&nodes[i], &nodes[j], &mut kernel);
            }
        }

        let delays = match input.config.blockchain {
            blocksim_config::BlockchainKind::Bitcoin => {
                input.delays.bitcoin.as_ref().expect("bitcoin delays section, matching blockchain")
            }
            blocksim_config::BlockchainKind::Ethereum => {
                input.delays.ethereum.as_ref().expect("ethereum delays section, matching blockchain")
            }
        };
        let orphan_probability = match input.config.blockchain {
            blocksim_config::BlockchainKind::Bitcoin => {
                input.config.bitcoin.as_ref().expect("bitcoin config section").orphan_blocks_probability
            }
            blocksim_config::BlockchainKind::Ethereum => {
                input.config.ethereum.as_ref().expect("ethereum config section").orphan_blocks_probability
            }
        };
        let time_between_blocks = Sampler::build(&delays.time_between_blocks_seconds).map_err(|source| {
            ConfigError::InvalidDistribution { file: "delays.json".into(), source }
        })?;
        if registry.borrow().miner_count() > 0 {
            kernel.spawn(Box::new(Heartbeat::new(Rc::clone(&registry), time_between_blocks, orphan_probability)));
        }

        if let Some(tx_seeding) = &input.factory.tx_seeding {
            let tx_gas_limit = input.config.ethereum.as_ref().map_or(0, |e| e.tx_gas_limit);
            let seeder = TransactionFactory::new(
                nodes.clone(),
                input.config.blockchain,
                tx_gas_limit,
                tx_seeding,
                Rc::clone(&created_transactions),
            );
            kernel.spawn(Box::new(seeder));
        }

        Ok(World { kernel, nodes, propagation, created_transactions, start_time: initial_time })
    }

    pub fn run_until(&mut self, deadline: VirtualTime) {
        self.kernel.run_until(deadline);
    }

    pub fn now(&self) -> VirtualTime {
        self.kernel.now()
    }

    /// The node population, in factory-build order (miners first). Exposed
    /// read-only so a caller can address a specific node for
    /// `submit_transaction`.
    pub fn nodes(&self) -> &[AnyNode] {
        &self.nodes
    }

    /// Submits `tx` as if `node_index` originated it locally, the same path
    /// the periodic transaction seeder uses.
    pub fn submit_transaction(&mut self, node_index: usize, tx: blocksim_types::Transaction) {
        self.nodes[node_index].submit_transaction(tx, &mut self.kernel);
    }

    pub fn report(&self) -> Observability {
        report::build(
            &self.nodes,
            &self.propagation.borrow(),
            self.created_transactions.get(),
            self.start_time,
            self.kernel.now(),
        )
    }
}
