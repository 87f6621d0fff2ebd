//! C4: the per-miner transaction pool. `get` is one of the simulator's three
//! suspension points (spec.md §5): an empty pool doesn't block the kernel, it
//! hands the caller an event to await instead.

use std::collections::BinaryHeap;

use blocksim_kernel::{EventId, Kernel};
use blocksim_types::Transaction;

/// A pending-transaction queue. Ordered highest-fee-first (Ethereum's
/// `gas_price * start_gas`, Bitcoin's `fee`) via `Transaction`'s `Ord`.
pub struct Mempool {
    queue: BinaryHeap<Transaction>,
    not_empty: EventId,
    puts_total: u64,
}

impl Mempool {
    pub fn new(kernel: &mut Kernel) -> Self {
        Self { queue: BinaryHeap::new(), not_empty: kernel.new_event(), puts_total: 0 }
    }

    /// Enqueues `tx` and wakes every task currently suspended on `get`.
    pub fn put(&mut self, tx: Transaction, kernel: &mut Kernel) {
        self.queue.push(tx);
        self.puts_total += 1;
        kernel.fire(self.not_empty);
    }

    /// Non-suspending pop. Callers that need suspend-on-empty should check
    /// this first and, on `None`, suspend on `not_empty_event()`.
    pub fn try_get(&mut self) -> Option<Transaction> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn size(&self) -> usize {
        self.queue.len()
    }

    /// Monitor counter: `{address}_number_of_transactions_queue`. Counts
    /// every `put` ever made, not the current queue length.
    pub fn number_of_transactions_queue(&self) -> u64 {
        self.puts_total
    }

    /// The event a suspended `get` should await; fired on the next `put`.
    pub fn not_empty_event(&self) -> EventId {
        self.not_empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksim_kernel::{StepResult, Task, TaskId, WaitSpec, WakeReason};
    use blocksim_types::{Address, Transaction, VirtualTime};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn bitcoin_tx(fee: u64) -> Transaction {
        Transaction::new_bitcoin(
            Address::new("to"),
            Address::new("from"),
            1,
            "sig".into(),
            fee,
        )
    }

    #[test]
    fn put_then_get_round_trips() {
        let mut kernel = Kernel::new(VirtualTime::ZERO, 1);
        let mut pool = Mempool::new(&mut kernel);
        assert!(pool.is_empty());
        pool.put(bitcoin_tx(10), &mut kernel);
        assert_eq!(pool.size(), 1);
        let tx = pool.try_get().unwrap();
        assert_eq!(tx.fee(), 10);
        assert!(pool.try_get().is_none());
    }

    #[test]
    fn get_returns_highest_fee_first() {
        let mut kernel = Kernel::new(VirtualTime::ZERO, 1);
        let mut pool = Mempool::new(&mut kernel);
        pool.put(bitcoin_tx(5), &mut kernel);
        pool.put(bitcoin_tx(50), &mut kernel);
        pool.put(bitcoin_tx(20), &mut kernel);
        assert_eq!(pool.try_get().unwrap().fee(), 50);
        assert_eq!(pool.try_get().unwrap().fee(), 20);
        assert_eq!(pool.try_get().unwrap().fee(), 5);
    }

    #[test]
    fn monitor_counter_counts_every_put_not_current_size() {
        let mut kernel = Kernel::new(VirtualTime::ZERO, 1);
        let mut pool = Mempool::new(&mut kernel);
        pool.put(bitcoin_tx(1), &mut kernel);
        pool.put(bitcoin_tx(2), &mut kernel);
        pool.try_get();
        assert_eq!(pool.number_of_transactions_queue(), 2);
        assert_eq!(pool.size(), 1);
    }

    struct Consumer {
        event: EventId,
        log: Rc<RefCell<Vec<u64>>>,
    }

    impl Task for Consumer {
        fn resume(&mut self, _kernel: &mut Kernel, reason: WakeReason) -> StepResult {
            match reason {
                WakeReason::Started => StepResult::Suspend(WaitSpec::Event(self.event)),
                WakeReason::EventFired(_) => {
                    self.log.borrow_mut().push(1);
                    StepResult::Finished
                }
                other => panic!("unexpected wake reason {other:?}"),
            }
        }
    }

    #[test]
    fn get_on_empty_pool_suspends_until_the_next_put() {
        let mut kernel = Kernel::new(VirtualTime::ZERO, 1);
        let mut pool = Mempool::new(&mut kernel);
        let log = Rc::new(RefCell::new(Vec::new()));
        let _consumer: TaskId = kernel
            .spawn(Box::new(Consumer { event: pool.not_empty_event(), log: Rc::clone(&log) }));
        kernel.run_until(VirtualTime::new(1.0));
        assert!(log.borrow().is_empty(), "consumer resumed with nothing ever put");
        pool.put(bitcoin_tx(1), &mut kernel);
        kernel.run_until(VirtualTime::new(2.0));
        assert_eq!(*log.borrow(), vec![1]);
    }
}
