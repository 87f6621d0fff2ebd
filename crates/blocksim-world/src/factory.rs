//! Node population factory (spec.md §4.9), grounded in
//! `original_source/blocksim/node_factory.py`'s `NodeFactory.create_nodes`:
//! one shared, incrementing node id across every location, miners before
//! non-miners, each miner's hashrate drawn uniformly from its
//! `mega_hashrate_range` (times 1e6 H/s).

use std::rc::Rc;

use blocksim_config::{BlockchainKind, ConfigError, DelaysConfig, FactoryConfig, InputFiles, MinerSpec, NonMinerSpec};
use blocksim_kernel::Kernel;
use blocksim_network::{BuildsBlocks, NetworkRegistry};
use blocksim_node::{BitcoinNode, DelayTables, EthereumNode, SharedPropagationLog};
use blocksim_types::{Address, Block, BlockHeader, Location};
use rand::Rng;

use crate::node::AnyNode;

pub struct Population {
    pub nodes: Vec<AnyNode>,
    pub registry: Rc<std::cell::RefCell<NetworkRegistry>>,
}

fn sorted_locations<V>(map: &std::collections::HashMap<Location, V>) -> Vec<&Location> {
    let mut locations: Vec<&Location> = map.keys().collect();
    locations.sort();
    locations
}

/// `node_factory.py::_check_location`: every miner/non-miner location must
/// also appear in the latency table (the source of truth for "known
/// locations", since it's the table every other file cross-validates
/// against in `load_input_dir`).
fn check_locations(factory: &FactoryConfig, known: &[String]) -> Result<(), ConfigError> {
    for location in factory.miners.keys().chain(factory.non_miners.keys()) {
        if !known.contains(&location.as_str().to_owned()) {
            return Err(ConfigError::LocationSetMismatch {
                reference_file: "latency.json".into(),
                reference: known.to_vec(),
                other_file: "factory.json".into(),
                other: vec![location.as_str().to_owned()],
            });
        }
    }
    Ok(())
}

fn delays_for(input: &InputFiles) -> &DelaysConfig {
    match input.config.blockchain {
        BlockchainKind::Bitcoin => input.delays.bitcoin.as_ref(),
        BlockchainKind::Ethereum => input.delays.ethereum.as_ref(),
    }
    .expect("delays.json carries a section matching config.json's blockchain")
}

fn bitcoin_genesis() -> Block {
    Block::new(BlockHeader::genesis(Address::new("genesis")), Vec::new())
}

fn ethereum_genesis(gas_limit: u64) -> Block {
    Block::new(BlockHeader::genesis_ethereum(Address::new("genesis"), gas_limit), Vec::new())
}

#[allow(clippy::too_many_arguments)]
fn build_one(
    address: Address,
    location: Location,
    is_miner: bool,
    hashrate: f64,
    input: &InputFiles,
    delay_tables: Rc<DelayTables>,
    propagation: Option<SharedPropagationLog>,
    kernel: &mut Kernel,
) -> Result<AnyNode, ConfigError> {
    let delays = delays_for(input);
    match input.config.blockchain {
        BlockchainKind::Bitcoin => {
            let cfg = input.config.bitcoin.as_ref().expect("config.json's bitcoin section, matching blockchain");
            let genesis = bitcoin_genesis();
            let node = BitcoinNode::new(
                address,
                location,
                is_miner,
                hashrate,
                genesis,
                cfg.message_size_kb.clone(),
                cfg.block_size_limit_mb,
                &cfg.number_transactions_per_block,
                delay_tables,
                propagation,
                kernel,
            )?;
            Ok(AnyNode::Bitcoin(node))
        }
        BlockchainKind::Ethereum => {
            let cfg = input.config.ethereum.as_ref().expect("config.json's ethereum section, matching blockchain");
            let genesis = ethereum_genesis(cfg.block_gas_limit);
            let node = EthereumNode::new(
                address,
                location,
                is_miner,
                hashrate,
                genesis,
                cfg.message_size_kb.clone(),
                cfg.block_gas_limit,
                &delays.tx_validation,
                &delays.block_validation,
                delay_tables,
                propagation,
                kernel,
            )?;
            Ok(AnyNode::Ethereum(node))
        }
    }
}

fn register_if_miner(registry: &Rc<std::cell::RefCell<NetworkRegistry>>, node: &AnyNode, hashrate: f64) {
    match node {
        AnyNode::Bitcoin(n) => registry.borrow_mut().register_miner(Rc::new(n.clone()) as Rc<dyn BuildsBlocks>, hashrate),
        AnyNode::Ethereum(n) => registry.borrow_mut().register_miner(Rc::new(n.clone()) as Rc<dyn BuildsBlocks>, hashrate),
    }
}

/// Builds every miner and non-miner named in `factory.json`, in the
/// `{location.lower()}-{node_id}` addressing scheme the source uses, and
/// registers each miner (weighted by its drawn hashrate) into a fresh
/// `NetworkRegistry`.
pub fn build_population(
    input: &InputFiles,
    delay_tables: Rc<DelayTables>,
    propagation: Option<SharedPropagationLog>,
    kernel: &mut Kernel,
) -> Result<Population, ConfigError> {
    check_locations(&input.factory, &input.latency.location_set())?;

    let registry = Rc::new(std::cell::RefCell::new(NetworkRegistry::new()));
    let mut nodes = Vec::new();
    let mut node_id: u64 = 0;

    for location in sorted_locations(&input.factory.miners) {
        let MinerSpec { how_many, mega_hashrate_range: range } = input.factory.miners.get(location).expect("sorted_locations yields only keys present in the map");
        for _ in 0..*how_many {
            node_id += 1;
            let address = Address::new(format!("{}-{}", location.as_str().to_lowercase(), node_id));
            let hashrate = kernel.rng().gen_range(range.lo..=range.hi) * 1e6;
            let node = build_one(
                address,
                location.clone(),
                true,
                hashrate,
                input,
                Rc::clone(&delay_tables),
                propagation.clone(),
                kernel,
            )?;
            register_if_miner(&registry, &node, hashrate);
            nodes.push(node);
        }
    }

    for location in sorted_locations(&input.factory.non_miners) {
        let NonMinerSpec { how_many } = input.factory.non_miners.get(location).expect("sorted_locations yields only keys present in the map");
        for _ in 0..*how_many {
            node_id += 1;
            let address = Address::new(format!("{}-{}", location.as_str().to_lowercase(), node_id));
            let node = build_one(
                address,
                location.clone(),
                false,
                0.0,
                input,
                Rc::clone(&delay_tables),
                propagation.clone(),
                kernel,
            )?;
            nodes.push(node);
        }
    }

    Ok(Population { nodes, registry })
}
