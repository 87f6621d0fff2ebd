//! Ethereum node state machine (spec.md §4.7 / C8).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use blocksim_chain::{AddBlockResult, ChainStore};
use blocksim_config::ConfigError;
use blocksim_kernel::{EventId, Kernel, StepResult, Task, TaskId, WaitSpec, WakeReason};
use blocksim_mempool::Mempool;
use blocksim_messages::{EthereumMessage, EthereumMessageSizeKb};
use blocksim_network::{BuildsBlocks, Connection, SharedConnection};
use blocksim_sampling::{Distribution, Sampler};
use blocksim_types::{
    Address, Block, BlockHeader, Envelope, EthereumHeaderExt, Hash256, Location, Transaction,
    VirtualTime, MIN_DIFFICULTY,
};

use crate::delay::DelayTables;
use crate::error::TopologyError;
use crate::listener::{EnvelopeSink, Listener};
use crate::observability::SharedPropagationLog;
use crate::outbound::send_message;
use crate::session::Session;

/// Difficulty re-target used by the real network before the difficulty bomb;
/// the simulator has no uncle count to feed the full formula, so it uses the
/// single-parent approximation spec.md gives.
const BLOCK_DIFF_FACTOR: i64 = 2048;

/// `calc_difficulty` (Ethereum-style, spec.md §4.7), integer-truncated.
fn calc_difficulty(parent: &BlockHeader, now: VirtualTime) -> i64 {
    let elapsed = now - parent.timestamp;
    let diff = parent.difficulty as f64 + (parent.difficulty as f64 / BLOCK_DIFF_FACTOR as f64) - elapsed;
    (diff.trunc() as i64).max(MIN_DIFFICULTY)
}

pub struct EthereumNodeState {
    pub location: Location,
    pub hashrate: f64,
    pub chain: ChainStore,
    pub mempool: Option<Mempool>,
    pub sessions: HashMap<Address, Session<EthereumMessage>>,
    pub temp_headers: HashMap<Hash256, BlockHeader>,
    pub peer_best_hash: HashMap<Address, Hash256>,
    pub handshake_events: HashMap<Address, EventId>,
    pub current_mining_task: Option<TaskId>,
    pub message_size_kb: EthereumMessageSizeKb,
    pub block_gas_limit: u64,
    pub tx_validation: Sampler,
    pub block_validation: Sampler,
    pub delay_tables: Rc<DelayTables>,
    pub propagation: Option<SharedPropagationLog>,
}

/// An Ethereum node handle; same `Rc`/outer-`address` shape as `BitcoinNode`.
#[derive(Clone)]
pub struct EthereumNode {
    pub address: Address,
    inner: Rc<RefCell<EthereumNodeState>>,
}

impl EthereumNode {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        address: Address,
        location: Location,
        is_miner: bool,
        hashrate: f64,
        genesis: Block,
        message_size_kb: EthereumMessageSizeKb,
        block_gas_limit: u64,
        tx_validation: &Distribution,
        block_validation: &Distribution,
        delay_tables: Rc<DelayTables>,
        propagation: Option<SharedPropagationLog>,
        kernel: &mut Kernel,
    ) -> Result<Self, ConfigError> {
        let build = |d: &Distribution, file: &str| {
            Sampler::build(d)
                .map_err(|source| ConfigError::InvalidDistribution { file: file.into(), source })
        };
        let tx_validation = build(tx_validation, "delays.json")?;
        let block_validation = build(block_validation, "delays.json")?;
        let mempool = is_miner.then(|| Mempool::new(kernel));
        let state = EthereumNodeState {
            location,
            hashrate,
            chain: ChainStore::new(genesis),
            mempool,
            sessions: HashMap::new(),
            temp_headers: HashMap::new(),
            peer_best_hash: HashMap::new(),
            handshake_events: HashMap::new(),
            current_mining_task: None,
            message_size_kb,
            block_gas_limit,
            tx_validation,
            block_validation,
            delay_tables,
            propagation,
        };
        Ok(Self { address, inner: Rc::new(RefCell::new(state)) })
    }

    pub fn chain(&self) -> std::cell::Ref<'_, ChainStore> {
        std::cell::Ref::map(self.inner.borrow(), |s| &s.chain)
    }

    pub fn forks(&self) -> u64 {
        self.inner.borrow().chain.forks()
    }

    pub fn mempool_queue_len(&self) -> u64 {
        self.inner.borrow().mempool.as_ref().map_or(0, Mempool::number_of_transactions_queue)
    }

    pub fn submit_transaction(&self, tx: Transaction, kernel: &mut Kernel) {
        let now = kernel.now();
        {
            let st = self.inner.borrow();
            if let Some(log) = &st.propagation {
                log.borrow_mut().note_tx_origin(tx.hash(), &self.address, now);
            }
        }
        self.on_transactions(vec![tx], None, kernel);
    }

    /// Peers `a` and `b`: registers sessions, starts each side's listener
    /// after a 3x-latency RTT, and sends `status` immediately both ways.
    pub fn connect(a: &EthereumNode, b: &EthereumNode, kernel: &mut Kernel) {
        let (a_loc, a_delay_tables) = {
            let s = a.inner.borrow();
            (s.location.clone(), Rc::clone(&s.delay_tables))
        };
        let b_loc = b.inner.borrow().location.clone();

        let conn_ab: SharedConnection<EthereumMessage> =
            Connection::new(kernel, a.address.clone(), a_loc.clone(), b.address.clone(), b_loc.clone());
        let conn_ba: SharedConnection<EthereumMessage> =
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

        let (a_head, a_size_kb) = {
            let s = a.inner.borrow();
            (s.chain.head_hash(), s.message_size_kb.clone())
        };
        let (b_head, b_size_kb) = {
            let s = b.inner.borrow();
            (s.chain.head_hash(), s.message_size_kb.clone())
        };
        // Both nodes start from the same genesis block, so either head
        // serves as the genesis hash before any blocks have been mined.
        let genesis_hash = a_head;
        send_message(
            &conn_ab,
            EthereumMessage::status(63, "blocksim".into(), 0.0, a_head, genesis_hash, &a_size_kb),
            &a_delay_tables,
            kernel,
        );
        send_message(
            &conn_ba,
            EthereumMessage::status(63, "blocksim".into(), 0.0, b_head, genesis_hash, &b_size_kb),
            &a_delay_tables,
            kernel,
        );
    }

    fn on_status(&self, peer: Address, best_hash: Hash256, kernel: &mut Kernel) {
        let event = {
            let mut st = self.inner.borrow_mut();
            st.peer_best_hash.insert(peer.clone(), best_hash);
            *st.handshake_events.get(&peer).unwrap_or_else(|| {
                panic!("{}", TopologyError::NoSuchSession { address: self.address.clone(), peer: peer.clone() })
            })
        };
        kernel.fire(event);
    }

    fn on_new_blocks(&self, peer: Address, blocks: Vec<(Hash256, u64)>, kernel: &mut Kernel) {
        let (conn, delay_tables, size_kb, unknown, mining_task) = {
            let st = self.inner.borrow();
            let unknown: Vec<(Hash256, u64)> =
                blocks.into_iter().filter(|(h, _)| !st.chain.contains(*h)).collect();
            let session = st.sessions.get(&peer).expect("new_blocks from a peer with no session");
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
        if let Some(lowest) = unknown.iter().map(|(_, n)| *n).min() {
            let count = unknown.len() as u32;
            send_message(&conn, EthereumMessage::get_headers(lowest, count, &size_kb), &delay_tables, kernel);
        }
    }

    /// `from_peer` is the sender when this arrived via a `transactions`
    /// message, `None` when it's locally submitted — either way it's
    /// threaded through to `rebroadcast_tx` so a network-received tx never
    /// bounces an `inv`-equivalent back to where it came from.
    fn on_transactions(&self, txs: Vec<Transaction>, from_peer: Option<Address>, kernel: &mut Kernel) {
        let now = kernel.now();
        for tx in txs {
            {
                let st = self.inner.borrow();
                if let Some(log) = &st.propagation {
                    log.borrow_mut().note_tx_delivered(tx.hash(), &self.address, now);
                }
            }
            let is_mining = self.inner.borrow().mempool.is_some();
            if is_mining {
                {
                    let mut st = self.inner.borrow_mut();
                    st.mempool.as_mut().unwrap().put(tx.clone(), kernel);
                }
                self.rebroadcast_tx(tx, from_peer.clone(), kernel);
            } else {
                let delay = {
                    let st = self.inner.borrow();
                    st.tx_validation.sample(kernel.rng())
                };
                let node = self.clone();
                let from_peer = from_peer.clone();
                kernel.schedule(delay, move |k| {
                    node.rebroadcast_tx(tx, from_peer, k);
                });
            }
        }
    }

    fn rebroadcast_tx(&self, tx: Transaction, from_peer: Option<Address>, kernel: &mut Kernel) {
        let hash = tx.hash();
        let (targets, delay_tables, size_kb) = {
            let mut st = self.inner.borrow_mut();
            if let Some(peer) = &from_peer {
                if let Some(session) = st.sessions.get_mut(peer) {
                    session.known_txs.insert(hash);
                }
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
            send_message(&conn, EthereumMessage::transactions(vec![tx.clone()], &size_kb), &delay_tables, kernel);
        }
    }

    fn on_get_headers(&self, peer: Address, block_number: u64, max_headers: u32, kernel: &mut Kernel) {
        let (conn, delay_tables, size_kb, headers) = {
            let st = self.inner.borrow();
            let mut headers = Vec::new();
            let mut n = block_number;
            while headers.len() < max_headers as usize {
                match st.chain.get_block_by_number(n) {
                    Some(block) => headers.push(block.header.clone()),
                    None => break,
                }
                n += 1;
            }
            let session = st.sessions.get(&peer).expect("get_headers from a peer with no session");
            (Rc::clone(&session.out), Rc::clone(&st.delay_tables), st.message_size_kb.clone(), headers)
        };
        send_message(&conn, EthereumMessage::block_headers(headers, &size_kb), &delay_tables, kernel);
    }

    fn on_block_headers(&self, peer: Address, headers: Vec<BlockHeader>, kernel: &mut Kernel) {
        let delay: f64 = {
            let st = self.inner.borrow();
            headers.iter().map(|_| st.block_validation.sample(kernel.rng())).sum()
        };
        let node = self.clone();
        kernel.schedule(delay, move |k| {
            let (conn, delay_tables, size_kb, hashes) = {
                let mut st = node.inner.borrow_mut();
                let mut hashes = Vec::with_capacity(headers.len());
                for h in &headers {
                    let hash = h.hash();
                    st.temp_headers.insert(hash, h.clone());
                    hashes.push(hash);
                }
                let session = st.sessions.get(&peer).expect("block_headers from a peer with no session");
                (Rc::clone(&session.out), Rc::clone(&st.delay_tables), st.message_size_kb.clone(), hashes)
            };
            send_message(&conn, EthereumMessage::get_block_bodies(hashes, &size_kb), &delay_tables, k);
        });
    }

    fn on_get_block_bodies(&self, peer: Address, hashes: Vec<Hash256>, kernel: &mut Kernel) {
        let (conn, delay_tables, size_kb, bodies) = {
            let st = self.inner.borrow();
            let bodies: Vec<(Hash256, Vec<Transaction>)> = hashes
                .iter()
                .filter_map(|h| st.chain.get_block(*h).map(|b| (*h, b.transactions.clone())))
                .collect();
            let session = st.sessions.get(&peer).expect("get_block_bodies from a peer with no session");
            (Rc::clone(&session.out), Rc::clone(&st.delay_tables), st.message_size_kb.clone(), bodies)
        };
        send_message(&conn, EthereumMessage::block_bodies(bodies, &size_kb), &delay_tables, kernel);
    }

    fn on_block_bodies(&self, bodies: Vec<(Hash256, Vec<Transaction>)>, kernel: &mut Kernel) {
        let now = kernel.now();
        let mut st = self.inner.borrow_mut();
        for (hash, txs) in bodies {
            if let Some(header) = st.temp_headers.remove(&hash) {
                let block = Block::new(header, txs);
                if let Some(log) = &st.propagation {
                    log.borrow_mut().note_block_delivered(hash, &self.address, now);
                }
                match st.chain.add_block(block, kernel.rng()) {
                    AddBlockResult::Added => tracing::debug!(node = %self.address, "assembled block"),
                    AddBlockResult::AddedReorg { old_head, new_head } => {
                        tracing::info!(node = %self.address, %old_head, %new_head, "reorg");
                    }
                    AddBlockResult::Orphaned => tracing::debug!(node = %self.address, "orphaned block queued"),
                    AddBlockResult::Rejected => {}
                }
            }
        }
    }
}

impl EnvelopeSink<EthereumMessage> for EthereumNode {
    fn handle_envelope(&self, envelope: Envelope<EthereumMessage>, kernel: &mut Kernel) {
        let Envelope { msg, origin, .. } = envelope;
        match msg {
            EthereumMessage::Status { best_hash, .. } => self.on_status(origin, best_hash, kernel),
            EthereumMessage::NewBlocks { blocks, .. } => self.on_new_blocks(origin, blocks, kernel),
            EthereumMessage::Transactions { txs, .. } => self.on_transactions(txs, Some(origin), kernel),
            EthereumMessage::GetHeaders { block_number, max_headers, .. } => {
                self.on_get_headers(origin, block_number, max_headers, kernel)
            }
            EthereumMessage::BlockHeaders { headers, .. } => self.on_block_headers(origin, headers, kernel),
            EthereumMessage::GetBlockBodies { hashes, .. } => self.on_get_block_bodies(origin, hashes, kernel),
            EthereumMessage::BlockBodies { bodies, .. } => self.on_block_bodies(bodies, kernel),
        }
    }
}

impl BuildsBlocks for EthereumNode {
    fn address(&self) -> &Address {
        &self.address
    }

    fn build_new_block(&self, kernel: &mut Kernel) {
        if self.inner.borrow().mempool.is_none() {
            panic!("{}", TopologyError::NotAMiner { address: self.address.clone() });
        }
        let gas_limit = self.inner.borrow().block_gas_limit;
        let task_id = kernel.spawn(Box::new(MiningTask::new(self.clone(), gas_limit)));
        self.inner.borrow_mut().current_mining_task = Some(task_id);
    }
}

struct MiningTask {
    node: EthereumNode,
    gas_limit: u64,
    gas_used: u64,
    drained: Vec<Transaction>,
}

impl MiningTask {
    fn new(node: EthereumNode, gas_limit: u64) -> Self {
        Self { node, gas_limit, gas_used: 0, drained: Vec::new() }
    }

    fn drain_step(&mut self, kernel: &mut Kernel) -> StepResult {
        loop {
            if self.gas_used >= self.gas_limit {
                self.finish(kernel);
                return StepResult::Finished;
            }
            let next = {
                let mut st = self.node.inner.borrow_mut();
                st.mempool.as_mut().expect("mining task on a non-miner").try_get()
            };
            match next {
                Some(tx) => {
                    self.gas_used += tx.start_gas().unwrap_or(0);
                    self.drained.push(tx);
                }
                None => {
                    let event = self.node.inner.borrow().mempool.as_ref().unwrap().not_empty_event();
                    return StepResult::Suspend(WaitSpec::Event(event));
                }
            }
        }
    }

    /// Builds the candidate header with gas accounting, adds it to the
    /// local chain, and broadcasts `new_blocks` (spec.md §4.7).
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
            ethereum: Some(EthereumHeaderExt { gas_limit: st.block_gas_limit, gas_used: self.gas_used }),
        };
        let candidate = Block::new(header, std::mem::take(&mut self.drained));
        let hash = candidate.hash();
        let number = candidate.number();
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
            send_message(&conn, EthereumMessage::new_blocks(vec![(hash, number)], &size_kb), &delay_tables, kernel);
        }
    }
}

impl Task for MiningTask {
    fn resume(&mut self, kernel: &mut Kernel, reason: WakeReason) -> StepResult {
        match reason {
            WakeReason::Started => {
                self.gas_used = 0;
                self.drained.clear();
                self.drain_step(kernel)
            }
            WakeReason::EventFired(_) => self.drain_step(kernel),
            WakeReason::Interrupted => {
                self.gas_used = 0;
                self.drained.clear();
                self.drain_step(kernel)
            }
            WakeReason::TimerFired => panic!("mining task has no timer-based wait"),
        }
    }

    fn label(&self) -> &str {
        "ethereum-mining"
    }
}
