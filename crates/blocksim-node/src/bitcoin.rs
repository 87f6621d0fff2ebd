//! Bitcoin node state machine (spec.md §4.6 / C7).

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use blocksim_chain::{AddBlockResult, ChainStore};
use blocksim_config::ConfigError;
use blocksim_kernel::{EventId, Kernel, StepResult, Task, TaskId, WaitSpec, WakeReason};
use blocksim_mempool::Mempool;
use blocksim_messages::{BitcoinMessage, BitcoinMessageSizeKb, InvKind};
use blocksim_network::{BuildsBlocks, Connection, SharedConnection};
use blocksim_sampling::{Distribution, Sampler};
use blocksim_types::{
    Address, Block, BlockHeader, Envelope, Hash256, Location, Transaction, VirtualTime,
    MIN_DIFFICULTY,
};

use crate::delay::DelayTables;
use crate::error::TopologyError;
use crate::listener::{EnvelopeSink, Listener};
use crate::observability::SharedPropagationLog;
use crate::outbound::send_message;
use crate::session::Session;

/// `calc_difficulty` (Bitcoin-style, spec.md §4.6): a block mined faster than
/// its parent's timestamp predicts implies a higher difficulty.
fn calc_difficulty(parent: &BlockHeader, now: VirtualTime) -> i64 {
    let elapsed = now - parent.timestamp;
    (parent.difficulty + elapsed.round() as i64).max(MIN_DIFFICULTY)
}

pub struct BitcoinNodeState {
    pub location: Location,
    pub hashrate: f64,
    pub chain: ChainStore,
    pub mempool: Option<Mempool>,
    pub sessions: HashMap<Address, Session<BitcoinMessage>>,
    pub temp_txs: HashMap<Hash256, Transaction>,
    pub tx_on_transit: HashSet<Hash256>,
    pub handshake_events: HashMap<Address, EventId>,
    pub current_mining_task: Option<TaskId>,
    pub message_size_kb: BitcoinMessageSizeKb,
    pub block_size_limit_mb: f64,
    pub number_transactions_per_block: Sampler,
    pub delay_tables: Rc<DelayTables>,
    pub propagation: Option<SharedPropagationLog>,
}

/// A Bitcoin node handle. Cheap to clone (an `Rc` underneath); `address` is
/// kept outside the `RefCell` so `BuildsBlocks::address` can hand out a
/// plain reference.
#[derive(Clone)]
pub struct BitcoinNode {
    pub address: Address,
    inner: Rc<RefCell<BitcoinNodeState>>,
}

impl BitcoinNode {
    pub fn new(
        address: Address,
        location: Location,
        is_miner: bool,
        hashrate: f64,
        genesis: Block,
        message_size_kb: BitcoinMessageSizeKb,
        block_size_limit_mb: u64,
        number_transactions_per_block: &Distribution,
        delay_tables: Rc<DelayTables>,
        propagation: Option<SharedPropagationLog>,
        kernel: &mut Kernel,
    ) -> Result<Self, ConfigError> {
        let sampler = Sampler::build(number_transactions_per_block).map_err(|source| {
            ConfigError::InvalidDistribution { file: "config.json".into(), source }
        })?;
        let mempool = is_miner.then(|| Mempool::new(kernel));
        let state = BitcoinNodeState {
            location,
            hashrate,
            chain: ChainStore::new(genesis),
            mempool,
            sessions: HashMap::new(),
            temp_txs: HashMap::new(),
            tx_on_transit: HashSet::new(),
            handshake_events: HashMap::new(),
            current_mining_task: None,
            message_size_kb,
            block_size_limit_mb: block_size_limit_mb as f64,
            number_transactions_per_block: sampler,
            delay_tables,
            propagation,
        };
        Ok(Self { address, inner: Rc::new(RefCell::new(state)) })
    }

    pub fn chain(&self) -> std::cell::Ref<'_, ChainStore> {
        std::cell::Ref::map(self.inner.borrow(), |s| &s.chain)
    }

    pub fn mempool_queue_len(&self) -> u64 {
        self.inner.borrow().mempool.as_ref().map_or(0, Mempool::number_of_transactions_queue)
    }

    pub fn forks(&self) -> u64 {
        self.inner.borrow().chain.forks()
    }

    /// A pending transaction (e.g. from the world's transaction factory)
    /// enters through `temp_txs` and an `inv[tx]` announcement to every peer
    /// that doesn't already know it, exactly as the mining loop's `tx`
    /// handler rebroadcasts one it received from a peer.
    pub fn submit_transaction(&self, tx: Transaction, kernel: &mut Kernel) {
        let hash = tx.hash();
        let now = kernel.now();
        let (targets, delay_tables, size_kb) = {
            let mut st = self.inner.borrow_mut();
            if let Some(log) = &st.propagation {
                log.borrow_mut().note_tx_origin(hash, &self.address, now);
            }
            st.temp_txs.insert(hash, tx);
            let mut targets = Vec::new();
            for session in st.sessions.values_mut() {
                if !session.known_txs.contains(&hash) {
                    session.known_txs.insert(hash);
                    targets.push(Rc::clone(&session.out));
                }
            }
            (targets, Rc::clone(&st.delay_tables), st.message_size_kb.clone())
        };
        for conn in targets {
            send_message(&conn, BitcoinMessage::inv(InvKind::Tx, vec![hash], &size_kb), &delay_tables, kernel);
        }
    }

    /// Peers `a` and `b`, registers sessions on both sides, starts each
    /// side's listener after a 3x-latency RTT (spec.md §4.6's handshake),
    /// and immediately sends `version` both ways.
    pub fn connect(a: &BitcoinNode, b: &BitcoinNode, kernel: &mut Kernel) {
        let (a_loc, a_delay_tables) = {
            let s = a.inner.borrow();
            (s.location.clone(), Rc::clone(&s.delay_tables))
        };
        let b_loc = b.inner.borrow().location.clone();

        let conn_ab: SharedConnection<BitcoinMessage> =
            Connection::new(kernel, a.address.clone(), a_loc.clone(), b.address.clone(), b_loc.clone());
        let conn_ba: SharedConnection<BitcoinMessage> =
            Connection::new(kernel, b.address.clone(), b_loc.clone(), a.address.clone(), a_loc.clone());

        let handshake_event_a = kernel.new_event();
        let handshake_event_b = kernel.new_event();

        a.inner.borrow_mut().sessions.insert(b.address.clone(), Session::new(b_loc.clone(), Rc::clone(&conn_ab)));
        a.inner.borrow_mut().handshake_events.insert(b.address.clone(), handshake_event_a);
        b.inner.borrow_mut().sessions.insert(a.address.clone(), Session::new(a_loc.clone(), Rc::clone(&conn_ba)));
        b.inner.borrow_mut().handshake_events.insert(a.address.clone(), handshake_event_b);

        let rtt_ab = 3.0 * a_delay_tables.latency_secs(&a_loc, &b_loc, kernel.rng());
        let rtt_ba = 3.0 * a_delay_tables.latency_secs(&b_loc, &a_loc, kernel.rng());
        let listener_for_b = Listener::new(Rc::clone(&conn_ab), b.clone(), Rc::clone(&a_delay_tables));
        let listener_for_a = Listener::new(Rc::clone(&conn_ba), a.clone(), Rc::clone(&a_delay_tables));
        kernel.schedule(rtt_ab, move |k| {
            k.spawn(Box::new(listener_for_b));
        });
        kernel.schedule(rtt_ba, move |k| {
            k.spawn(Box::new(listener_for_a));
        });

        let size_kb_a = a.inner.borrow().message_size_kb.clone();
        let size_kb_b = b.inner.borrow().message_size_kb.clone();
        send_message(&conn_ab, BitcoinMessage::version(&size_kb_a), &a_delay_tables, kernel);
        send_message(&conn_ba, BitcoinMessage::version(&size_kb_b), &a_delay_tables, kernel);
        a.inner.borrow_mut().sessions.get_mut(&b.address).unwrap().handshaken = true;
        b.inner.borrow_mut().sessions.get_mut(&a.address).unwrap().handshaken = true;
    }

    fn on_version(&self, peer: Address, kernel: &mut Kernel) {
        let (conn, delay_tables, size_kb, need_initiate) = {
            let st = self.inner.borrow();
            let session = st.sessions.get(&peer).unwrap_or_else(|| {
                panic!("{}", TopologyError::NoSuchSession { address: self.address.clone(), peer: peer.clone() })
            });
            (Rc::clone(&session.out), Rc::clone(&st.delay_tables), st.message_size_kb.clone(), !session.handshaken)
        };
        send_message(&conn, BitcoinMessage::verack(&size_kb), &delay_tables, kernel);
        if need_initiate {
            send_message(&conn, BitcoinMessage::version(&size_kb), &delay_tables, kernel);
            self.inner.borrow_mut().sessions.get_mut(&peer).unwrap().handshaken = true;
        }
    }

    fn on_verack(&self, peer: Address, kernel: &mut Kernel) {
        let event = {
            let st = self.inner.borrow();
            *st.handshake_events.get(&peer).unwrap_or_else(|| {
                panic!("{}", TopologyError::NoSuchSession { address: self.address.clone(), peer: peer.clone() })
            })
        };
        kernel.fire(event);
    }

    fn on_inv_tx(&self, peer: Address, hashes: Vec<Hash256>, kernel: &mut Kernel) {
        let (conn, delay_tables, size_kb, requested) = {
            let mut st = self.inner.borrow_mut();
            let requested: Vec<Hash256> =
                hashes.into_iter().filter(|h| st.tx_on_transit.insert(*h)).collect();
            let session = st.sessions.get(&peer).expect("inv from a peer with no session");
            (Rc::clone(&session.out), Rc::clone(&st.delay_tables), st.message_size_kb.clone(), requested)
        };
        if !requested.is_empty() {
            send_message(&conn, BitcoinMessage::get_data(InvKind::Tx, requested, &size_kb), &delay_tables, kernel);
        }
    }

    fn on_inv_block(&self, peer: Address, hashes: Vec<Hash256>, kernel: &mut Kernel) {
        let (conn, delay_tables, size_kb, unknown, mining_task) = {
            let st = self.inner.borrow();
            let unknown: Vec<Hash256> = hashes.into_iter().filter(|h| !st.chain.contains(*h)).collect();
            let session = st.sessions.get(&peer).expect("inv from a peer with no session");
            (
                Rc::clone(&session.out),
                Rc::clone(&st.delay_tables),
                st.message_size_kb.clone(),
                unknown,
                st.current_mining_task,
            )
        };
        if let Some(task_id) = mining_task {
            kernel.interrupt(task_id);
        }
        if !unknown.is_empty() {
            send_message(&conn, BitcoinMessage::get_data(InvKind::Block, unknown, &size_kb), &delay_tables, kernel);
        }
    }

    fn on_getdata_tx(&self, peer: Address, hashes: Vec<Hash256>, kernel: &mut Kernel) {
        let (conn, delay_tables, size_kb, txs) = {
            let mut st = self.inner.borrow_mut();
            let txs: Vec<Transaction> = hashes.iter().filter_map(|h| st.temp_txs.remove(h)).collect();
            let session = st.sessions.get(&peer).expect("getdata from a peer with no session");
            (Rc::clone(&session.out), Rc::clone(&st.delay_tables), st.message_size_kb.clone(), txs)
        };
        for tx in txs {
            send_message(&conn, BitcoinMessage::tx(tx, &size_kb), &delay_tables, kernel);
        }
    }

    fn on_getdata_block(&self, peer: Address, hashes: Vec<Hash256>, kernel: &mut Kernel) {
        let (conn, delay_tables, size_kb, blocks) = {
            let st = self.inner.borrow();
            let blocks: Vec<Block> = hashes.iter().filter_map(|h| st.chain.get_block(*h).cloned()).collect();
            let session = st.sessions.get(&peer).expect("getdata from a peer with no session");
            (Rc::clone(&session.out), Rc::clone(&st.delay_tables), st.message_size_kb.clone(), blocks)
        };
        for block in blocks {
            send_message(&conn, BitcoinMessage::block(block, &size_kb), &delay_tables, kernel);
        }
    }

    /// `peer` is the sender: marked known on its session before rebroadcast
    /// so the announcement never bounces back to where it came from
    /// (spec.md §8's S1: "no inv[tx] is re-sent... back to the original
    /// sender").
    fn on_tx(&self, peer: Address, tx: Transaction, kernel: &mut Kernel) {
        let hash = tx.hash();
        let now = kernel.now();
        let (targets, delay_tables, size_kb) = {
            let mut st = self.inner.borrow_mut();
            st.tx_on_transit.remove(&hash);
            if let Some(log) = &st.propagation {
                log.borrow_mut().note_tx_delivered(hash, &self.address, now);
            }
            if let Some(pool) = st.mempool.as_mut() {
                pool.put(tx, kernel);
            }
            if let Some(session) = st.sessions.get_mut(&peer) {
                session.known_txs.insert(hash);
            }
            let mut targets = Vec::new();
            for session in st.sessions.values_mut() {
                if !session.known_txs.contains(&hash) {
                    session.known_txs.insert(hash);
                    targets.push(Rc::clone(&session.out));
                }
            }
            (targets, Rc::clone(&st.delay_tables), st.message_size_kb.clone())
        };
        for conn in targets {
            send_message(&conn, BitcoinMessage::inv(InvKind::Tx, vec![hash], &size_kb), &delay_tables, kernel);
        }
    }

    fn on_block(&self, block: Block, kernel: &mut Kernel) {
        let hash = block.hash();
        let now = kernel.now();
        let mut st = self.inner.borrow_mut();
        if let Some(log) = &st.propagation {
            log.borrow_mut().note_block_delivered(hash, &self.address, now);
        }
        match st.chain.add_block(block, kernel.rng()) {
            AddBlockResult::Added => tracing::debug!(node = %self.address, "added block"),
            AddBlockResult::AddedReorg { old_head, new_head } => {
                tracing::info!(node = %self.address, %old_head, %new_head, "reorg");
            }
            AddBlockResult::Orphaned => tracing::debug!(node = %self.address, "orphaned block queued"),
            AddBlockResult::Rejected => {}
        }
    }
}

impl EnvelopeSink<BitcoinMessage> for BitcoinNode {
    fn handle_envelope(&self, envelope: Envelope<BitcoinMessage>, kernel: &mut Kernel) {
        let Envelope { msg, origin, .. } = envelope;
        match msg {
            BitcoinMessage::Version { .. } => self.on_version(origin, kernel),
            BitcoinMessage::Verack { .. } => self.on_verack(origin, kernel),
            BitcoinMessage::Inv { kind: InvKind::Tx, hashes, .. } => self.on_inv_tx(origin, hashes, kernel),
            BitcoinMessage::Inv { kind: InvKind::Block, hashes, .. } => self.on_inv_block(origin, hashes, kernel),
            BitcoinMessage::GetData { kind: InvKind::Tx, hashes, .. } => self.on_getdata_tx(origin, hashes, kernel),
            BitcoinMessage::GetData { kind: InvKind::Block, hashes, .. } => {
                self.on_getdata_block(origin, hashes, kernel)
            }
            BitcoinMessage::Tx { tx, .. } => self.on_tx(origin, tx, kernel),
            BitcoinMessage::Block { block, .. } => self.on_block(block, kernel),
        }
    }
}

impl BuildsBlocks for BitcoinNode {
    fn address(&self) -> &Address {
        &self.address
    }

    /// Spawns the mining loop as its own cooperative task (spec.md §4.6,
    /// §9's "Interruptible mining"): its mempool-drain step is the genuine
    /// suspension point that an inbound `inv[block]` can interrupt.
    fn build_new_block(&self, kernel: &mut Kernel) {
        if self.inner.borrow().mempool.is_none() {
            panic!("{}", TopologyError::NotAMiner { address: self.address.clone() });
        }
        let task_id = kernel.spawn(Box::new(MiningTask::new(self.clone())));
        self.inner.borrow_mut().current_mining_task = Some(task_id);
    }
}

struct MiningTask {
    node: BitcoinNode,
    capacity: usize,
    drained: Vec<Transaction>,
}

impl MiningTask {
    fn new(node: BitcoinNode) -> Self {
        Self { node, capacity: 1, drained: Vec::new() }
    }

    fn drain_step(&mut self, kernel: &mut Kernel) -> StepResult {
        loop {
            if self.drained.len() >= self.capacity {
                self.finish(kernel);
                return StepResult::Finished;
            }
            let next = {
                let mut st = self.node.inner.borrow_mut();
                st.mempool.as_mut().expect("mining task on a non-miner").try_get()
            };
            match next {
                Some(tx) => self.drained.push(tx),
                None => {
                    let event = self.node.inner.borrow().mempool.as_ref().unwrap().not_empty_event();
                    return StepResult::Suspend(WaitSpec::Event(event));
                }
            }
        }
    }

    /// Constructs the candidate header, adds it to the local chain, and
    /// broadcasts `inv[block]` to every peer that doesn't already know it
    /// (spec.md §4.6 steps 3-4).
    fn finish(&mut self, kernel: &mut Kernel) {
        let mut st = self.node.inner.borrow_mut();
        let head = st.chain.head().clone();
        let now = kernel.now();
        let header = BlockHeader {
            prev_hash: head.hash(),
            number: head.number() + 1,
            timestamp: now,
            coinbase: self.node.address.clone(),
            difficulty: calc_difficulty(&head.header, now),
            nonce: 0,
            ethereum: None,
        };
        let candidate = Block::new(header, std::mem::take(&mut self.drained));
        let hash = candidate.hash();
        if let Some(log) = &st.propagation {
            log.borrow_mut().note_block_origin(hash, &self.node.address, now);
        }
        st.chain.add_block(candidate, kernel.rng());
        st.current_mining_task = None;
        let size_kb = st.message_size_kb.clone();
        let delay_tables = Rc::clone(&st.delay_tables);
        let mut targets = Vec::new();
        for session in st.sessions.values_mut() {
            if !session.known_blocks.contains(&hash) {
                session.known_blocks.insert(hash);
                targets.push(Rc::clone(&session.out));
            }
        }
        drop(st);
        for conn in targets {
            send_message(&conn, BitcoinMessage::inv(InvKind::Block, vec![hash], &size_kb), &delay_tables, kernel);
        }
    }
}

impl Task for MiningTask {
    fn resume(&mut self, kernel: &mut Kernel, reason: WakeReason) -> StepResult {
        match reason {
            WakeReason::Started => {
                let (tx_per_block, block_size_mb) = {
                    let st = self.node.inner.borrow();
                    (st.number_transactions_per_block.sample(kernel.rng()), st.block_size_limit_mb)
                };
                self.capacity = (tx_per_block * block_size_mb).max(1.0).round() as usize;
                self.drained.clear();
                self.drain_step(kernel)
            }
            WakeReason::EventFired(_) => self.drain_step(kernel),
            WakeReason::Interrupted => {
                self.drained.clear();
                self.drain_step(kernel)
            }
            WakeReason::TimerFired => panic!("mining task has no timer-based wait"),
        }
    }

    fn label(&self) -> &str {
        "bitcoin-mining"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksim_config::LocationPairTable;
    use std::collections::HashMap as StdHashMap;

    fn constant_tables() -> Rc<DelayTables> {
        let mut one_pair = StdHashMap::new();
        let mut dest = StdHashMap::new();
        dest.insert(Location::new("b"), Distribution { name: "constant".into(), parameters: vec![10.0] });
        one_pair.insert(Location::new("a"), dest);
        let mut dest_back = StdHashMap::new();
        dest_back.insert(Location::new("a"), Distribution { name: "constant".into(), parameters: vec![10.0] });
        one_pair.insert(Location::new("b"), dest_back);
        let latency = LocationPairTable { locations: one_pair.clone() };
        let rx = LocationPairTable {
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
        let tx = rx.clone();
        Rc::new(DelayTables::build(&latency, &rx, &tx).unwrap())
    }

    fn miner_size_kb() -> BitcoinMessageSizeKb {
        BitcoinMessageSizeKb { header: 0.024, version: 0.1, verack: 0.024, inv_vector: 0.036, tx: 0.3, block_base: 0.1 }
    }

    fn new_test_node(address: &str, location: &str, is_miner: bool, kernel: &mut Kernel) -> BitcoinNode {
        let genesis = Block::new(BlockHeader::genesis(Address::new("genesis")), Vec::new());
        BitcoinNode::new(
            Address::new(address),
            Location::new(location),
            is_miner,
            1.0,
            genesis,
            miner_size_kb(),
            1,
            &Distribution { name: "constant".into(), parameters: vec![10.0] },
            constant_tables(),
            None,
            kernel,
        )
        .unwrap()
    }

    #[test]
    fn handshake_fires_both_verack_events() {
        let mut kernel = Kernel::new(VirtualTime::ZERO, 7);
        let a = new_test_node("a", "a", false, &mut kernel);
        let b = new_test_node("b", "b", false, &mut kernel);
        BitcoinNode::connect(&a, &b, &mut kernel);
        kernel.run_until(VirtualTime::new(1000.0));
        assert!(a.inner.borrow().sessions.contains_key(&b.address));
        assert!(b.inner.borrow().sessions.contains_key(&a.address));
    }

    #[test]
    fn submitted_transaction_reaches_miner_mempool() {
        let mut kernel = Kernel::new(VirtualTime::ZERO, 7);
        let sender = new_test_node("sender", "a", false, &mut kernel);
        let miner = new_test_node("miner", "b", true, &mut kernel);
        BitcoinNode::connect(&sender, &miner, &mut kernel);
        kernel.run_until(VirtualTime::new(1000.0));

        let tx = Transaction::new_bitcoin(Address::new("bob"), Address::new("alice"), 10, "sig".into(), 1);
        sender.submit_transaction(tx, &mut kernel);
        kernel.run_until(VirtualTime::new(2000.0));

        assert_eq!(miner.mempool_queue_len(), 1);
    }

    #[test]
    fn mined_block_propagates_to_peer_chain() {
        let mut kernel = Kernel::new(VirtualTime::ZERO, 7);
        let a = new_test_node("a", "a", true, &mut kernel);
        let b = new_test_node("b", "b", false, &mut kernel);
        BitcoinNode::connect(&a, &b, &mut kernel);
        kernel.run_until(VirtualTime::new(1000.0));

        let tx = Transaction::new_bitcoin(Address::new("bob"), Address::new("alice"), 10, "sig".into(), 1);
        a.inner.borrow_mut().mempool.as_mut().unwrap().put(tx, &mut kernel);
        BuildsBlocks::build_new_block(&a, &mut kernel);
        kernel.run_until(VirtualTime::new(3000.0));

        assert_eq!(a.chain().head().number(), 1);
        assert_eq!(b.chain().head().number(), 1);
        assert_eq!(b.chain().head_hash(), a.chain().head_hash());
    }
}
