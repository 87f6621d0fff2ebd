//! C3: the per-node chain store. Tracks every block a node has ever seen,
//! the main chain's height index, pending orphans, and the fork counter.
//! See spec.md §4.2 for the exact `add_block` contract.

mod store;

pub use store::{AddBlockResult, ChainStore};
