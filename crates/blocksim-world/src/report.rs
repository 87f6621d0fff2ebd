//! The observability record (spec.md §6): per-run counters and per-node
//! snapshots, assembled once at the end of a `World::run`. No mechanism in
//! `original_source/` mirrors `tx_propagation`/`block_propagation` directly —
//! their shape here follows spec.md's own field list, fed by each node's
//! shared `PropagationLog`.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use blocksim_node::PropagationLog;
use blocksim_types::VirtualTime;
use serde::Serialize;

use crate::node::AnyNode;

#[derive(Debug, Clone, Serialize)]
pub struct ChainSnapshot {
    pub head_block_hash: String,
    pub number_of_blocks: u64,
    pub chain_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Observability {
    pub start_simulation_time: String,
    pub end_simulation_time: String,
    pub created_transactions: u64,
    pub tx_propagation: HashMap<String, HashMap<String, f64>>,
    pub block_propagation: HashMap<String, HashMap<String, f64>>,
    #[serde(flatten)]
    pub per_node: HashMap<String, serde_json::Value>,
}

/// `VirtualTime` doubles as wall-clock seconds-since-epoch in this
/// simulator (the original seeds it from `time.time()`), so formatting it
/// as an RFC 3339 timestamp is meaningful rather than arbitrary.
fn format_epoch_secs(t: VirtualTime) -> String {
    let secs = t.as_secs_f64().max(0.0);
    let when = UNIX_EPOCH + Duration::from_secs_f64(secs);
    humantime::format_rfc3339_seconds(when).to_string()
}

pub fn build(
    nodes: &[AnyNode],
    propagation: &PropagationLog,
    created_transactions: u64,
    start: VirtualTime,
    end: VirtualTime,
) -> Observability {
    let mut per_node = HashMap::new();
    for node in nodes {
        let address = node.address().as_str().to_owned();
        per_node.insert(
            format!("{address}_number_of_transactions_queue"),
            serde_json::json!(node.mempool_queue_len()),
        );
        per_node.insert(format!("forks_{address}"), serde_json::json!(node.forks()));

        let chain = node.chain();
        let head = chain.head();
        let number_of_blocks = head.number() + 1;
        let chain_list: Vec<String> = chain
            .get_blockhashes_from_hash(chain.head_hash(), number_of_blocks as usize)
            .into_iter()
            .map(|h| h.to_string())
            .collect();
        let snapshot = ChainSnapshot {
            head_block_hash: chain.head_hash().to_string(),
            number_of_blocks,
            chain_list,
        };
        drop(chain);
        per_node.insert(format!("{address}_chain"), serde_json::to_value(snapshot).expect("ChainSnapshot always serializes"));
    }

    Observability {
        start_simulation_time: format_epoch_secs(start),
        end_simulation_time: format_epoch_secs(end),
        created_transactions,
        tx_propagation: propagation.tx_propagation().clone(),
        block_propagation: propagation.block_propagation().clone(),
        per_node,
    }
}
