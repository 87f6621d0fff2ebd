use std::cell::RefCell;
use std::rc::Rc;

use blocksim_kernel::{Kernel, StepResult, Task, WaitSpec, WakeReason};
use blocksim_sampling::Sampler;
use rand::Rng;

use crate::registry::NetworkRegistry;

/// The periodic miner-election process (spec.md §4.8): sample the
/// inter-block interval, wait it out, then elect one miner, or two when an
/// orphan fork is simulated, weighted by hashrate share.
pub struct Heartbeat {
    registry: Rc<RefCell<NetworkRegistry>>,
    time_between_blocks: Sampler,
    orphan_blocks_probability: f64,
    max_resample_attempts: u32,
}

impl Heartbeat {
    pub fn new(
        registry: Rc<RefCell<NetworkRegistry>>,
        time_between_blocks: Sampler,
        orphan_blocks_probability: f64,
    ) -> Self {
        Self { registry, time_between_blocks, orphan_blocks_probability, max_resample_attempts: 1000 }
    }

    fn next_delta(&self, kernel: &mut Kernel) -> f64 {
        self.time_between_blocks
            .sample_non_negative(kernel.rng(), "time_between_blocks_seconds", self.max_resample_attempts)
            .expect("time_between_blocks distribution keeps producing negative draws")
    }
}

impl Task for Heartbeat {
    fn resume(&mut self, kernel: &mut Kernel, reason: WakeReason) -> StepResult {
        match reason {
            WakeReason::Started => StepResult::Suspend(WaitSpec::Delay(self.next_delta(kernel))),
            WakeReason::TimerFired => {
                let simulate_orphan = kernel.rng().gen_bool(self.orphan_blocks_probability);
                let chosen = self.registry.borrow().elect(kernel.rng(), simulate_orphan);
                for miner in chosen {
                    miner.build_new_block(kernel);
                }
                StepResult::Suspend(WaitSpec::Delay(self.next_delta(kernel)))
            }
            other => panic!("heartbeat received unexpected wake reason {other:?}"),
        }
    }

    fn label(&self) -> &str {
        "heartbeat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BuildsBlocks;
    use blocksim_sampling::Distribution;
    use blocksim_types::{Address, VirtualTime};

    struct CountingMiner {
        address: Address,
        calls: RefCell<u32>,
    }

    impl BuildsBlocks for CountingMiner {
        fn address(&self) -> &Address {
            &self.address
        }
        fn build_new_block(&self, _kernel: &mut Kernel) {
            *self.calls.borrow_mut() += 1;
        }
    }

    #[test]
    fn heartbeat_elects_one_miner_per_interval() {
        let mut kernel = Kernel::new(VirtualTime::ZERO, 3);
        let registry = Rc::new(RefCell::new(NetworkRegistry::new()));
        let miner = Rc::new(CountingMiner { address: Address::new("m"), calls: RefCell::new(0) });
        registry.borrow_mut().register_miner(Rc::clone(&miner) as Rc<dyn BuildsBlocks>, 1.0);

        let dist = Distribution { name: "constant".into(), parameters: vec![10.0] };
        let sampler = Sampler::build(&dist).unwrap();
        let heartbeat = Heartbeat::new(Rc::clone(&registry), sampler, 0.0);
        kernel.spawn(Box::new(heartbeat));

        kernel.run_until(VirtualTime::new(35.0));
        assert_eq!(*miner.calls.borrow(), 3);
    }
}
