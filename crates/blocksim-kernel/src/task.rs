use crate::ids::EventId;
use crate::kernel::Kernel;

/// Why a task was given control of the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// The task was just spawned; this is its first `resume`.
    Started,
    /// A `wait(delay)` suspension point elapsed.
    TimerFired,
    /// An `await_event` suspension point was woken by `fire`.
    EventFired(EventId),
    /// `interrupt` cancelled whatever the task was waiting on.
    Interrupted,
}

/// The single suspension point a task yields at between `resume` calls.
#[derive(Debug, Clone, Copy)]
pub enum WaitSpec {
    /// `wait(delay)`: resume `delay` seconds from now.
    Delay(f64),
    /// `await_event(event)`: resume when `fire(event)` runs.
    Event(EventId),
}

/// Returned by `Task::resume` to tell the kernel what to do next.
pub enum StepResult {
    Suspend(WaitSpec),
    Finished,
}

/// A cooperative unit of work with explicit suspension points. Exactly one
/// task's `resume` runs at a time; the kernel never preempts it.
pub trait Task {
    fn resume(&mut self, kernel: &mut Kernel, reason: WakeReason) -> StepResult;

    /// A human-readable label for tracing/debugging; defaults to the type name.
    fn label(&self) -> &str {
        "task"
    }
}

/// Current state of a task as observed from outside the kernel (tests,
/// diagnostics). Mirrors spec.md §3's `{scheduled, running, waiting(reason),
/// interrupted, finished}`.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Scheduled,
    Running,
    Waiting(&'static str),
    Interrupted,
    Finished,
}
