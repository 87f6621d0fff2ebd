//! C1: the discrete-event kernel. Virtual clock, min-heap of timed actions,
//! and cooperative tasks with explicit suspension points. See spec.md §4.1
//! and §5 for the full contract.

mod ids;
mod kernel;
mod task;

pub use ids::{EventId, TaskId};
pub use kernel::{EventHandle, Kernel};
pub use task::{StepResult, Task, TaskState, WaitSpec, WakeReason};
