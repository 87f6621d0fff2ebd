use crate::address::Address;
use crate::time::VirtualTime;

/// `(msg, timestamp, origin_addr, destination_addr)`. Generic over the
/// message catalogue so the transport layer doesn't need to know about
/// Bitcoin vs. Ethereum message shapes, only that `M: WireSize`.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<M> {
    pub msg: M,
    pub timestamp: VirtualTime,
    pub origin: Address,
    pub destination: Address,
}

impl<M> Envelope<M> {
    pub fn new(msg: M, timestamp: VirtualTime, origin: Address, destination: Address) -> Self {
        Self { msg, timestamp, origin, destination }
    }
}

/// On-wire size in megabytes, as derived from the protocol's static message
/// size table (header size plus per-item size for list-bearing messages).
pub trait WireSize {
    fn size_mb(&self) -> f64;
}
