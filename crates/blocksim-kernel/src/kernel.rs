use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::rc::Rc;

use blocksim_types::VirtualTime;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::ids::{EventId, TaskId};
use crate::task::{StepResult, Task, TaskState, WaitSpec, WakeReason};

type Action = Box<dyn FnOnce(&mut Kernel)>;

/// A cancellable handle to a one-shot scheduled action.
#[derive(Clone)]
pub struct EventHandle(Rc<Cell<bool>>);

impl EventHandle {
    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

struct HeapEntry {
    when: VirtualTime,
    seq: u64,
    cancelled: Rc<Cell<bool>>,
    action: Action,
}

// BinaryHeap is a max-heap; reverse the natural (when, seq) order so the
// smallest (earliest, then first-inserted) entry sorts greatest and is
// popped first.
impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.seq == other.seq
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.when.cmp(&self.when).then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct EventSlot {
    waiters: Vec<TaskId>,
}

enum CurrentWait {
    Timer(EventHandle),
    Event(EventId),
}

struct TaskSlot {
    task: Box<dyn Task>,
    state: TaskState,
    current_wait: Option<CurrentWait>,
}

/// The discrete-event kernel (C1): virtual clock, min-heap of timed actions,
/// and the registry of cooperative tasks. Strictly single-threaded: only one
/// task's `resume` executes at a time, and only `wait`/`await_event`/reads of
/// an empty store are suspension points.
pub struct Kernel {
    now: VirtualTime,
    next_seq: u64,
    heap: BinaryHeap<HeapEntry>,
    tasks: HashMap<TaskId, TaskSlot>,
    events: HashMap<EventId, EventSlot>,
    next_task_id: u64,
    next_event_id: u64,
    rng: ChaCha8Rng,
}

impl Kernel {
    pub fn new(start: VirtualTime, seed: u64) -> Self {
        Self {
            now: start,
            next_seq: 0,
            heap: BinaryHeap::new(),
            tasks: HashMap::new(),
            events: HashMap::new(),
            next_task_id: 0,
            next_event_id: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// The kernel's single PRNG; every sampled draw in the simulation goes
    /// through this instance so that a whole run is replayable from its seed.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Schedules an arbitrary one-shot action `delay` seconds from now.
    /// Returns a handle that can cancel it before it fires. A negative delay
    /// is clamped to zero: the kernel's clock never moves backwards.
    pub fn schedule(
        &mut self,
        delay: f64,
        action: impl FnOnce(&mut Kernel) + 'static,
    ) -> EventHandle {
        let when = self.now + delay.max(0.0);
        let seq = self.next_seq();
        let cancelled = Rc::new(Cell::new(false));
        let handle = EventHandle(Rc::clone(&cancelled));
        self.heap.push(HeapEntry { when, seq, cancelled, action: Box::new(action) });
        handle
    }

    fn schedule_resume_now(&mut self, task_id: TaskId, reason: WakeReason) {
        let seq = self.next_seq();
        let when = self.now;
        let cancelled = Rc::new(Cell::new(false));
        self.heap.push(HeapEntry {
            when,
            seq,
            cancelled,
            action: Box::new(move |k: &mut Kernel| k.dispatch_resume(task_id, reason)),
        });
    }

    /// Starts a cooperative task; its first `resume(Started)` runs at the
    /// current instant (after whatever is already queued at `now`).
    pub fn spawn(&mut self, task: Box<dyn Task>) -> TaskId {
        let id = TaskId(self.next_task_id);
        self.next_task_id += 1;
        self.tasks.insert(id, TaskSlot { task, state: TaskState::Scheduled, current_wait: None });
        self.schedule_resume_now(id, WakeReason::Started);
        id
    }

    /// Allocates a fresh, unfired event for `await_event`/`fire`.
    pub fn new_event(&mut self) -> EventId {
        let id = EventId(self.next_event_id);
        self.next_event_id += 1;
        self.events.insert(id, EventSlot::default());
        id
    }

    /// Wakes every current waiter on `event`, then atomically replaces it
    /// with a fresh, unfired instance (waiters registered after this call
    /// must wait for a subsequent `fire`).
    pub fn fire(&mut self, event: EventId) {
        let waiters = std::mem::take(&mut self.events.entry(event).or_default().waiters);
        for task_id in waiters {
            self.schedule_resume_now(task_id, WakeReason::EventFired(event));
        }
    }

    /// Cancels whatever `task_id` is currently waiting on and schedules an
    /// immediate resume with `WakeReason::Interrupted`. A no-op if the task
    /// isn't registered (already finished).
    pub fn interrupt(&mut self, task_id: TaskId) {
        let had_slot = if let Some(slot) = self.tasks.get_mut(&task_id) {
            if let Some(wait) = slot.current_wait.take() {
                match wait {
                    CurrentWait::Timer(handle) => handle.cancel(),
                    CurrentWait::Event(event_id) => {
                        if let Some(es) = self.events.get_mut(&event_id) {
                            es.waiters.retain(|&t| t != task_id);
                        }
                    }
                }
            }
            slot.state = TaskState::Interrupted;
            true
        } else {
            false
        };
        if had_slot {
            self.schedule_resume_now(task_id, WakeReason::Interrupted);
        }
    }

    pub fn task_state(&self, task_id: TaskId) -> Option<&TaskState> {
        self.tasks.get(&task_id).map(|s| &s.state)
    }

    fn dispatch_resume(&mut self, task_id: TaskId, reason: WakeReason) {
        let mut slot = match self.tasks.remove(&task_id) {
            Some(s) => s,
            None => return,
        };
        slot.state = TaskState::Running;
        slot.current_wait = None;
        let result = slot.task.resume(self, reason);
        match result {
            StepResult::Suspend(wait_spec) => {
                match wait_spec {
                    WaitSpec::Delay(delay) => {
                        let handle = self.schedule(delay.max(0.0), move |k: &mut Kernel| {
                            k.dispatch_resume(task_id, WakeReason::TimerFired)
                        });
                        slot.state = TaskState::Waiting("timer");
                        slot.current_wait = Some(CurrentWait::Timer(handle));
                    }
                    WaitSpec::Event(event_id) => {
                        self.events.entry(event_id).or_default().waiters.push(task_id);
                        slot.state = TaskState::Waiting("event");
                        slot.current_wait = Some(CurrentWait::Event(event_id));
                    }
                }
                self.tasks.insert(task_id, slot);
            }
            StepResult::Finished => {
                slot.state = TaskState::Finished;
            }
        }
    }

    /// Processes events in `(when, seq)` order until none remain with
    /// `when < deadline`, then leaves the clock exactly at `deadline`.
    pub fn run_until(&mut self, deadline: VirtualTime) {
        loop {
            let ready = self.heap.peek().map_or(false, |top| top.when < deadline);
            if !ready {
                break;
            }
            let entry = self.heap.pop().expect("peeked Some above");
            if entry.cancelled.get() {
                continue;
            }
            self.now = entry.when;
            (entry.action)(self);
        }
        if self.now < deadline {
            self.now = deadline;
        }
    }

    /// True once no task remains registered. A task is dropped from the
    /// registry the instant it returns `StepResult::Finished`, so an empty
    /// registry means every spawned task has run to completion.
    pub fn all_tasks_finished(&self) -> bool {
        self.tasks.is_empty()
    }
}
