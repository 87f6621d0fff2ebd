use std::rc::Rc;

use blocksim_kernel::Kernel;
use blocksim_types::Address;
use rand::Rng;

/// Implemented by a node wrapper so the heartbeat can elect it without
/// knowing whether it's a Bitcoin or Ethereum node (spec.md's Design Note 9).
pub trait BuildsBlocks {
    fn address(&self) -> &Address;
    fn build_new_block(&self, kernel: &mut Kernel);
}

/// The registry of miners (spec.md §4.8): every registered miner's hashrate
/// share of the whole network.
#[derive(Default)]
pub struct NetworkRegistry {
    miners: Vec<(Rc<dyn BuildsBlocks>, f64)>,
    total_hashrate: f64,
}

impl NetworkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_miner(&mut self, node: Rc<dyn BuildsBlocks>, hashrate: f64) {
        self.total_hashrate += hashrate;
        self.miners.push((node, hashrate));
    }

    pub fn total_hashrate(&self) -> f64 {
        self.total_hashrate
    }

    pub fn miner_count(&self) -> usize {
        self.miners.len()
    }

    fn pick_weighted(&self, rng: &mut impl Rng, exclude: Option<usize>) -> usize {
        let total: f64 = self
            .miners
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != exclude)
            .map(|(_, (_, w))| w)
            .sum();
        let mut draw = rng.gen_range(0.0..total);
        for (i, (_, weight)) in self.miners.iter().enumerate() {
            if Some(i) == exclude {
                continue;
            }
            if draw < *weight {
                return i;
            }
            draw -= weight;
        }
        // Floating-point rounding: fall back to the last eligible miner.
        (0..self.miners.len())
            .rev()
            .find(|i| Some(*i) != exclude)
            .expect("at least one eligible miner, checked by caller")
    }

    /// Elects one miner, or two distinct miners (without replacement,
    /// weighted by hashrate share) when `simulate_orphan` is set and more
    /// than one miner is registered.
    pub fn elect(&self, rng: &mut impl Rng, simulate_orphan: bool) -> Vec<Rc<dyn BuildsBlocks>> {
        if self.miners.is_empty() {
            return Vec::new();
        }
        let first = self.pick_weighted(rng, None);
        if simulate_orphan && self.miners.len() > 1 {
            let second = self.pick_weighted(rng, Some(first));
            vec![Rc::clone(&self.miners[first].0), Rc::clone(&self.miners[second].0)]
        } else {
            vec![Rc::clone(&self.miners[first].0)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::cell::RefCell;

    struct FakeMiner {
        address: Address,
        calls: Rc<RefCell<u32>>,
    }

    impl BuildsBlocks for FakeMiner {
        fn address(&self) -> &Address {
            &self.address
        }
        fn build_new_block(&self, _kernel: &mut Kernel) {
            *self.calls.borrow_mut() += 1;
        }
    }

    #[test]
    fn election_without_orphan_picks_exactly_one_miner() {
        let mut registry = NetworkRegistry::new();
        let calls = Rc::new(RefCell::new(0));
        registry.register_miner(
            Rc::new(FakeMiner { address: Address::new("a"), calls: Rc::clone(&calls) }),
            10.0,
        );
        registry.register_miner(
            Rc::new(FakeMiner { address: Address::new("b"), calls: Rc::clone(&calls) }),
            20.0,
        );
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let chosen = registry.elect(&mut rng, false);
        assert_eq!(chosen.len(), 1);
    }

    #[test]
    fn election_with_orphan_picks_exactly_two_distinct_miners() {
        let mut registry = NetworkRegistry::new();
        let calls = Rc::new(RefCell::new(0));
        for name in ["a", "b", "c"] {
            registry.register_miner(
                Rc::new(FakeMiner { address: Address::new(name), calls: Rc::clone(&calls) }),
                10.0,
            );
        }
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let chosen = registry.elect(&mut rng, true);
        assert_eq!(chosen.len(), 2);
        assert_ne!(chosen[0].address(), chosen[1].address());
    }

    #[test]
    fn empirical_selection_share_converges_to_hashrate_share() {
        let mut registry = NetworkRegistry::new();
        let calls = Rc::new(RefCell::new(0));
        registry.register_miner(
            Rc::new(FakeMiner { address: Address::new("big"), calls: Rc::clone(&calls) }),
            90.0,
        );
        registry.register_miner(
            Rc::new(FakeMiner { address: Address::new("small"), calls: Rc::clone(&calls) }),
            10.0,
        );
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let mut big_wins = 0;
        const N: u32 = 5_000;
        for _ in 0..N {
            let chosen = registry.elect(&mut rng, false);
            if chosen[0].address() == &Address::new("big") {
                big_wins += 1;
            }
        }
        let share = big_wins as f64 / N as f64;
        assert!((share - 0.9).abs() < 0.03, "empirical share {share} should be close to 0.9");
    }
}
