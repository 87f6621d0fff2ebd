use std::rc::Rc;

use blocksim_kernel::Kernel;
use blocksim_network::SharedConnection;
use blocksim_types::WireSize;

use crate::delay::DelayTables;

/// Sends `msg` over `conn`: pays the upload delay drawn from
/// `THROUGHPUT_SENT`, then hands off to the transport, which applies the
/// latency delay before the envelope reaches the destination's delivery
/// store (spec.md §4.5). Modelled as a deferred one-shot action rather than
/// a task suspension — see DESIGN.md for why that's equivalent here.
pub fn send_message<M: WireSize + 'static>(
    conn: &SharedConnection<M>,
    msg: M,
    delay_tables: &DelayTables,
    kernel: &mut Kernel,
) {
    let (origin_location, destination_location) = {
        let c = conn.borrow();
        (c.origin_location.clone(), c.destination_location.clone())
    };
    let size_mb = msg.size_mb();
    let send_delay = delay_tables
        .send_delay_secs(&origin_location, &destination_location, size_mb, kernel.rng())
        .unwrap_or_else(|e| {
            panic!("fatal sample error on send delay {origin_location} -> {destination_location}: {e}")
        });
    let latency = delay_tables.latency_secs(&origin_location, &destination_location, kernel.rng());
    let conn = Rc::clone(conn);
    kernel.schedule(send_delay, move |k| {
        blocksim_network::send(&conn, msg, k, latency);
    });
}
