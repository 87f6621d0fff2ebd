use blocksim_kernel::{Kernel, StepResult, Task, WaitSpec, WakeReason};
use blocksim_network::SharedConnection;
use blocksim_types::{Envelope, WireSize};
use std::rc::Rc;

use crate::delay::DelayTables;

/// Implemented by a node's handle type to process one delivered envelope.
/// Runs to completion without suspending (spec.md §5: dispatch is atomic);
/// any replies it wants to send are issued through `send_message` from
/// inside this call.
pub trait EnvelopeSink<M> {
    fn handle_envelope(&self, envelope: Envelope<M>, kernel: &mut Kernel);
}

enum ListenerState<M> {
    Idle,
    AwaitingReceiveDelay(Envelope<M>),
}

/// Per-peer inbound reader (spec.md §4.5's "destination's listener"): pulls
/// one envelope at a time from the connection's ordered delivery store, pays
/// its receive delay, then dispatches to the node's handler, then loops.
/// Suspends on the connection's `inbox_ready` event only when the store is
/// genuinely empty — the simulator's one suspension point for this task.
pub struct Listener<M, S> {
    conn: SharedConnection<M>,
    sink: S,
    delay_tables: Rc<DelayTables>,
    state: ListenerState<M>,
}

impl<M, S> Listener<M, S> {
    pub fn new(conn: SharedConnection<M>, sink: S, delay_tables: Rc<DelayTables>) -> Self {
        Self { conn, sink, delay_tables, state: ListenerState::Idle }
    }
}

impl<M, S> Task for Listener<M, S>
where
    M: WireSize + 'static,
    S: EnvelopeSink<M>,
{
    fn resume(&mut self, kernel: &mut Kernel, _reason: WakeReason) -> StepResult {
        match std::mem::replace(&mut self.state, ListenerState::Idle) {
            ListenerState::Idle => match self.conn.borrow_mut().try_recv() {
                Some(envelope) => {
                    let (origin_location, destination_location) = {
                        let c = self.conn.borrow();
                        (c.origin_location.clone(), c.destination_location.clone())
                    };
                    let size_mb = envelope.msg.size_mb();
                    let delay = self
                        .delay_tables
                        .receive_delay_secs(&origin_location, &destination_location, size_mb, kernel.rng())
                        .unwrap_or_else(|e| {
                            panic!(
                                "fatal sample error on receive delay {origin_location} -> {destination_location}: {e}"
                            )
                        });
                    self.state = ListenerState::AwaitingReceiveDelay(envelope);
                    StepResult::Suspend(WaitSpec::Delay(delay))
                }
                None => {
                    let event = self.conn.borrow().inbox_ready_event();
                    StepResult::Suspend(WaitSpec::Event(event))
                }
            },
            ListenerState::AwaitingReceiveDelay(envelope) => {
                self.sink.handle_envelope(envelope, kernel);
                // Zero-delay trampoline: re-enter at the same virtual instant
                // in case the inbox already holds more envelopes.
                StepResult::Suspend(WaitSpec::Delay(0.0))
            }
        }
    }

    fn label(&self) -> &str {
        "listener"
    }
}
