//! C10: the simulation driver. Loads the input directory, builds the node
//! population and miner registry, wires the shared delay tables, optionally
//! seeds synthetic transaction load, and runs the kernel to a deadline,
//! collecting the observability record (spec.md §6).

mod factory;
mod node;
mod report;
mod seeding;
mod world;

pub use factory::{build_population, Population};
pub use node::AnyNode;
pub use report::{ChainSnapshot, Observability};
pub use seeding::TransactionFactory;
pub use world::{World, DEFAULT_DURATION_SECS};
