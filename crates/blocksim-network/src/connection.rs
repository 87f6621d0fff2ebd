use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use blocksim_kernel::{EventId, Kernel};
use blocksim_types::{Address, Envelope, Location};

/// A one-way transport channel (spec.md §4.5). A peering creates two of
/// these, one per direction. `put` schedules delivery after a latency delay;
/// only once that wait elapses is the envelope pushed onto the ordered
/// delivery store and the destination's listener woken — never before, so
/// the store's enqueue order is the only ordering guarantee (spec.md §5, §8).
pub struct Connection<M> {
    pub origin: Address,
    pub origin_location: Location,
    pub destination: Address,
    pub destination_location: Location,
    inbox: VecDeque<Envelope<M>>,
    inbox_ready: EventId,
}

pub type SharedConnection<M> = Rc<RefCell<Connection<M>>>;

impl<M> Connection<M> {
    pub fn new(
        kernel: &mut Kernel,
        origin: Address,
        origin_location: Location,
        destination: Address,
        destination_location: Location,
    ) -> SharedConnection<M> {
        Rc::new(RefCell::new(Connection {
            origin,
            origin_location,
            destination,
            destination_location,
            inbox: VecDeque::new(),
            inbox_ready: kernel.new_event(),
        }))
    }

    pub fn inbox_ready_event(&self) -> EventId {
        self.inbox_ready
    }

    pub fn try_recv(&mut self) -> Option<Envelope<M>> {
        self.inbox.pop_front()
    }
}

/// Schedules `msg` for delivery `latency_secs` from now. The envelope carries
/// the send-time timestamp, not the delivery time.
pub fn send<M: 'static>(conn: &SharedConnection<M>, msg: M, kernel: &mut Kernel, latency_secs: f64) {
    let conn = Rc::clone(conn);
    let (origin, destination, timestamp) = {
        let c = conn.borrow();
        (c.origin.clone(), c.destination.clone(), kernel.now())
    };
    kernel.schedule(latency_secs, move |k: &mut Kernel| {
        let envelope = Envelope::new(msg, timestamp, origin, destination);
        let event = {
            let mut c = conn.borrow_mut();
            c.inbox.push_back(envelope);
            c.inbox_ready
        };
        k.fire(event);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksim_types::VirtualTime;

    #[test]
    fn envelope_is_not_enqueued_until_the_latency_wait_elapses() {
        let mut kernel = Kernel::new(VirtualTime::ZERO, 1);
        let conn = Connection::<&'static str>::new(
            &mut kernel,
            Address::new("a"),
            Location::new("Ohio"),
            Address::new("b"),
            Location::new("Ireland"),
        );
        send(&conn, "hello", &mut kernel, 5.0);
        kernel.run_until(VirtualTime::new(4.999));
        assert!(conn.borrow_mut().try_recv().is_none());
        kernel.run_until(VirtualTime::new(5.001));
        assert_eq!(conn.borrow_mut().try_recv(), Some(Envelope {
            msg: "hello",
            timestamp: VirtualTime::ZERO,
            origin: Address::new("a"),
            destination: Address::new("b"),
        }));
    }

    #[test]
    fn multiple_sends_are_delivered_in_enqueue_order() {
        let mut kernel = Kernel::new(VirtualTime::ZERO, 1);
        let conn = Connection::<u32>::new(
            &mut kernel,
            Address::new("a"),
            Location::new("Ohio"),
            Address::new("b"),
            Location::new("Ireland"),
        );
        send(&conn, 1, &mut kernel, 3.0);
        send(&conn, 2, &mut kernel, 1.0);
        kernel.run_until(VirtualTime::new(10.0));
        let mut c = conn.borrow_mut();
        assert_eq!(c.try_recv().unwrap().msg, 2);
        assert_eq!(c.try_recv().unwrap().msg, 1);
    }
}
