//! Periodic synthetic transaction load, grounded in
//! `original_source/blocksim/main.py`'s `broadcast_transactions` generator
//! and `transaction_factory.py`'s `TransactionFactory.broadcast`: every
//! `interval_seconds`, pick one node at random and have it submit a batch
//! of placeholder transactions. Skipped entirely when `factory.json` has no
//! `tx_seeding` section — a bare chain/network sim with no organic traffic
//! is still a valid run.

use std::cell::Cell;
use std::rc::Rc;

use blocksim_config::{BlockchainKind, TxSeedingConfig};
use blocksim_kernel::{Kernel, StepResult, Task, WaitSpec, WakeReason};
use blocksim_types::{Address, Transaction};
use rand::Rng;

use crate::node::AnyNode;

/// A fixed stand-in for every synthetic transaction's `to`/`sender`: the
/// source uses the literal string `'address'` for both, since the simulator
/// never validates signatures or balances.
fn placeholder_address() -> Address {
    Address::new("address")
}

pub struct TransactionFactory {
    nodes: Vec<AnyNode>,
    protocol: BlockchainKind,
    tx_gas_limit: u64,
    interval_seconds: f64,
    number_of_batches: u32,
    transactions_per_batch: u32,
    batches_done: u32,
    created: Rc<Cell<u64>>,
}

impl TransactionFactory {
    pub fn new(
        nodes: Vec<AnyNode>,
        protocol: BlockchainKind,
        tx_gas_limit: u64,
        config: &TxSeedingConfig,
        created: Rc<Cell<u64>>,
    ) -> Self {
        Self {
            nodes,
            protocol,
            tx_gas_limit,
            interval_seconds: config.interval_seconds,
            number_of_batches: config.number_of_batches,
            transactions_per_batch: config.transactions_per_batch,
            batches_done: 0,
            created,
        }
    }

    fn build_tx(&self, nonce: u64, kernel: &mut Kernel) -> Transaction {
        let signature = format!("sig-{:x}", kernel.rng().gen::<u64>());
        match self.protocol {
            BlockchainKind::Bitcoin => {
                Transaction::new_bitcoin(placeholder_address(), placeholder_address(), 140, signature, 50)
            }
            BlockchainKind::Ethereum => Transaction::new_ethereum(
                placeholder_address(),
                placeholder_address(),
                140,
                signature,
                nonce,
                2,
                self.tx_gas_limit,
            ),
        }
    }

    fn broadcast_batch(&mut self, kernel: &mut Kernel) {
        let index = kernel.rng().gen_range(0..self.nodes.len());
        for nonce in 0..self.transactions_per_batch as u64 {
            let tx = self.build_tx(nonce, kernel);
            self.nodes[index].submit_transaction(tx, kernel);
            self.created.set(self.created.get() + 1);
        }
    }
}

impl Task for TransactionFactory {
    fn resume(&mut self, kernel: &mut Kernel, reason: WakeReason) -> StepResult {
        match reason {
            WakeReason::Started => StepResult::Suspend(WaitSpec::Delay(self.interval_seconds)),
            WakeReason::TimerFired => {
                self.broadcast_batch(kernel);
                self.batches_done += 1;
                if self.batches_done >= self.number_of_batches {
                    StepResult::Finished
                } else {
                    StepResult::Suspend(WaitSpec::Delay(self.interval_seconds))
                }
            }
            other => panic!("transaction factory received unexpected wake reason {other:?}"),
        }
    }

    fn label(&self) -> &str {
        "transaction-factory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksim_node::{BitcoinNode, DelayTables};
    use blocksim_sampling::Distribution;
    use blocksim_types::{Block, BlockHeader, Location, VirtualTime};
    use std::collections::HashMap as StdHashMap;

    fn constant_tables() -> Rc<DelayTables> {
        let mut one_pair = StdHashMap::new();
        let mut dest = StdHashMap::new();
        dest.insert(Location::new("a"), Distribution { name: "constant".into(), parameters: vec![10.0] });
        one_pair.insert(Location::new("a"), dest);
        let latency = blocksim_config::LocationPairTable { locations: one_pair.clone() };
        let rx = blocksim_config::LocationPairTable {
            locations: one_pair
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        v.iter()
                            .map(|(k2, _)| (k2.clone(), Distribution { name: "constant".into(), parameters: vec![100.0] }))
                            .collect(),
                    )
                })
                .collect(),
        };
        Rc::new(DelayTables::build(&latency, &rx, &rx).unwrap())
    }

    fn miner_size_kb() -> blocksim_messages::BitcoinMessageSizeKb {
        blocksim_messages::BitcoinMessageSizeKb {
            header: 0.024,
            version: 0.1,
            verack: 0.024,
            inv_vector: 0.036,
            tx: 0.3,
            block_base: 0.1,
        }
    }

    #[test]
    fn seeds_exactly_the_configured_batches() {
        let mut kernel = Kernel::new(VirtualTime::ZERO, 11);
        let genesis = Block::new(BlockHeader::genesis(Address::new("genesis")), Vec::new());
        let miner = BitcoinNode::new(
            Address::new("a-1"),
            Location::new("a"),
            true,
            1.0,
            genesis,
            miner_size_kb(),
            1,
            &Distribution { name: "constant".into(), parameters: vec![10.0] },
            constant_tables(),
            None,
            &mut kernel,
        )
        .unwrap();
        let nodes = vec![AnyNode::Bitcoin(miner.clone())];
        let created = Rc::new(Cell::new(0));
        let config = TxSeedingConfig { interval_seconds: 5.0, number_of_batches: 3, transactions_per_batch: 2 };
        let factory = TransactionFactory::new(nodes, BlockchainKind::Bitcoin, 0, &config, Rc::clone(&created));
        kernel.spawn(Box::new(factory));
        kernel.run_until(VirtualTime::new(100.0));

        assert_eq!(created.get(), 6);
        assert_eq!(miner.mempool_queue_len(), 6);
    }
}
