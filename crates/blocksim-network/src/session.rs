use std::hash::Hash;

use indexmap::IndexSet;

/// Per-peer duplicate-suppression cap (spec.md §3's `ActiveSession`).
pub const MAX_KNOWN_TXS: usize = 30_000;
pub const MAX_KNOWN_BLOCKS: usize = 1_024;

/// A capped set used to remember which hashes a peer already knows about.
/// On overflow an arbitrary existing element is evicted, never the one being
/// inserted (spec.md §8: tests must not depend on which element is evicted).
pub struct BoundedSet<T> {
    items: IndexSet<T>,
    cap: usize,
}

impl<T: Eq + Hash + Clone> BoundedSet<T> {
    pub fn new(cap: usize) -> Self {
        Self { items: IndexSet::new(), cap }
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    /// Marks `item` known. A no-op if already present.
    pub fn insert(&mut self, item: T) {
        if self.items.contains(&item) {
            return;
        }
        if self.items.len() >= self.cap {
            self.items.shift_remove_index(0);
        }
        self.items.insert(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_happens_only_once_the_cap_is_reached() {
        let mut set = BoundedSet::new(2);
        set.insert(1);
        set.insert(2);
        assert_eq!(set.len(), 2);
        set.insert(3);
        assert_eq!(set.len(), 2, "cap must never be exceeded");
        assert!(set.contains(&3), "the newly inserted element is never the one evicted");
    }

    #[test]
    fn reinserting_a_known_element_is_a_no_op() {
        let mut set = BoundedSet::new(2);
        set.insert(1);
        set.insert(1);
        assert_eq!(set.len(), 1);
    }
}
