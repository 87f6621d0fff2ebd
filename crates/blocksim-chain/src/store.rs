use std::collections::HashMap;

use blocksim_types::{Block, Hash256};
use rand::Rng;

/// Outcome of `ChainStore::add_block`, mirroring spec.md §4.2's three paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddBlockResult {
    /// Extended the head, or extended a side branch that didn't overtake it.
    Added,
    /// A side branch's cumulative difficulty overtook the old head; the main
    /// index was rewritten down to the common ancestor.
    AddedReorg { old_head: Hash256, new_head: Hash256 },
    /// The block's parent isn't known yet; queued for later resolution.
    Orphaned,
    /// Reserved for block-level validation failures; this store never
    /// produces it itself (no-goal: no cryptographic consensus validation).
    Rejected,
}

/// A node's view of the block DAG: every block ever received, the main
/// chain's height index, and blocks still waiting on an unseen parent.
pub struct ChainStore {
    blocks: HashMap<Hash256, Block>,
    children: HashMap<Hash256, Vec<Hash256>>,
    main_index: HashMap<u64, Hash256>,
    scores: HashMap<Hash256, f64>,
    orphans: HashMap<Hash256, Vec<Block>>,
    head: Hash256,
    forks: u64,
}

impl ChainStore {
    /// Seeds the store with a genesis block at height 0 and score 0.
    pub fn new(genesis: Block) -> Self {
        let hash = genesis.hash();
        let mut blocks = HashMap::new();
        blocks.insert(hash, genesis);
        let mut main_index = HashMap::new();
        main_index.insert(0, hash);
        let mut scores = HashMap::new();
        scores.insert(hash, 0.0);
        Self {
            blocks,
            children: HashMap::new(),
            main_index,
            scores,
            orphans: HashMap::new(),
            head: hash,
            forks: 0,
        }
    }

    pub fn head(&self) -> &Block {
        self.blocks.get(&self.head).expect("head is always stored")
    }

    pub fn head_hash(&self) -> Hash256 {
        self.head
    }

    pub fn forks(&self) -> u64 {
        self.forks
    }

    pub fn get_block(&self, hash: Hash256) -> Option<&Block> {
        self.blocks.get(&hash)
    }

    pub fn get_block_by_number(&self, number: u64) -> Option<&Block> {
        self.main_index.get(&number).and_then(|hash| self.blocks.get(hash))
    }

    pub fn get_parent(&self, block: &Block) -> Option<&Block> {
        self.blocks.get(&block.prev_hash())
    }

    pub fn contains(&self, hash: Hash256) -> bool {
        self.blocks.contains_key(&hash)
    }

    /// Block hashes from `from_hash` back to (and including) genesis, in
    /// descending-height order, for `getblocks`/`get_headers`-style replies.
    pub fn get_blockhashes_from_hash(&self, from_hash: Hash256, max: usize) -> Vec<Hash256> {
        let mut out = Vec::new();
        let mut cur = from_hash;
        while out.len() < max {
            match self.blocks.get(&cur) {
                Some(block) => {
                    out.push(cur);
                    if block.prev_hash() == Hash256::ZERO {
                        break;
                    }
                    cur = block.prev_hash();
                }
                None => break,
            }
        }
        out
    }

    /// Cumulative difficulty of `block`'s chain, memoized per spec.md's Open
    /// Question #3: each block's score is its parent's score plus its own
    /// `difficulty` plus a persisted, once-drawn uniform(0, 1e6) tie-breaker.
    /// Scored lazily by walking parents back to the nearest scored ancestor.
    pub fn get_pow_difficulty(&mut self, block: &Block, rng: &mut impl Rng) -> f64 {
        let hash = block.hash();
        if let Some(score) = self.scores.get(&hash) {
            return *score;
        }
        let parent_hash = block.prev_hash();
        let parent_score = match self.scores.get(&parent_hash) {
            Some(score) => *score,
            None => match self.blocks.get(&parent_hash).cloned() {
                Some(parent_block) => self.get_pow_difficulty(&parent_block, rng),
                None => 0.0,
            },
        };
        let epsilon = rng.gen_range(0.0..=1_000_000.0);
        let score = parent_score + block.header.difficulty as f64 + epsilon;
        self.scores.insert(hash, score);
        score
    }

    fn insert_block(&mut self, block: Block, hash: Hash256) {
        let prev = block.prev_hash();
        self.children.entry(prev).or_default().push(hash);
        self.blocks.insert(hash, block);
    }

    /// Implements the three-path rule from spec.md §4.2: extend the head,
    /// extend or overtake from a known side branch, or queue as an orphan.
    /// Idempotent once `block` is already stored: a repeat call neither
    /// double-counts a fork nor re-triggers a reorg.
    pub fn add_block(&mut self, block: Block, rng: &mut impl Rng) -> AddBlockResult {
        let hash = block.hash();
        if self.blocks.contains_key(&hash) {
            return AddBlockResult::Added;
        }
        let prev = block.prev_hash();
        if prev == self.head {
            self.insert_block(block.clone(), hash);
            self.main_index.insert(block.number(), hash);
            self.head = hash;
            self.resolve_orphans(hash, rng);
            return AddBlockResult::Added;
        }
        if self.blocks.contains_key(&prev) {
            self.forks += 1;
            let head_block = self.head().clone();
            let td_new = self.get_pow_difficulty(&block, rng);
            let td_head = self.get_pow_difficulty(&head_block, rng);
            self.insert_block(block.clone(), hash);
            let result = if td_new > td_head {
                let old_head = self.head;
                self.reorg_to(hash);
                AddBlockResult::AddedReorg { old_head, new_head: hash }
            } else {
                AddBlockResult::Added
            };
            self.resolve_orphans(hash, rng);
            return result;
        }
        self.orphans.entry(prev).or_default().push(block);
        AddBlockResult::Orphaned
    }

    /// Rewrites the height index from the common ancestor forward so it
    /// follows the new tip's chain, per spec.md §4.2's reorg step.
    fn reorg_to(&mut self, new_tip: Hash256) {
        let mut new_chain: HashMap<u64, Hash256> = HashMap::new();
        let mut cur = new_tip;
        let ancestor_height = loop {
            let block = self.blocks.get(&cur).expect("walked hash is always stored").clone();
            let height = block.number();
            new_chain.insert(height, cur);
            if self.main_index.get(&height) == Some(&cur) {
                break height;
            }
            let parent = block.prev_hash();
            if parent == Hash256::ZERO || !self.blocks.contains_key(&parent) {
                break height.saturating_sub(1);
            }
            cur = parent;
        };
        let mut h = ancestor_height;
        loop {
            let new_at_h = new_chain.get(&h).copied();
            let old_existed = self.main_index.contains_key(&h);
            if new_at_h.is_none() && !old_existed {
                break;
            }
            match new_at_h {
                Some(hash) => {
                    self.main_index.insert(h, hash);
                }
                None => {
                    self.main_index.remove(&h);
                }
            }
            h += 1;
        }
        self.head = new_tip;
    }

    /// Drains and retries every block that was waiting on `parent_hash`,
    /// recursively resolving any further orphans they themselves unblock.
    fn resolve_orphans(&mut self, parent_hash: Hash256, rng: &mut impl Rng) {
        if let Some(waiting) = self.orphans.remove(&parent_hash) {
            for orphan in waiting {
                self.add_block(orphan, rng);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksim_types::{Address, BlockHeader, VirtualTime};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    fn child(prev: &Block, coinbase: &str, difficulty: i64) -> Block {
        let header = BlockHeader {
            prev_hash: prev.hash(),
            number: prev.number() + 1,
            timestamp: prev.header.timestamp + 1.0,
            coinbase: Address::new(coinbase),
            difficulty,
            nonce: 0,
            ethereum: None,
        };
        Block::new(header, Vec::new())
    }

    fn genesis() -> Block {
        Block::new(BlockHeader::genesis(Address::new("genesis")), Vec::new())
    }

    #[test]
    fn extends_head_linearly() {
        let mut rng = rng();
        let g = genesis();
        let mut store = ChainStore::new(g.clone());
        let b1 = child(&g, "a", 10);
        assert_eq!(store.add_block(b1.clone(), &mut rng), AddBlockResult::Added);
        assert_eq!(store.head_hash(), b1.hash());
        assert_eq!(store.get_block_by_number(1).unwrap(), &b1);
        assert_eq!(store.forks(), 0);
    }

    #[test]
    fn readding_a_main_chain_block_is_idempotent() {
        let mut rng = rng();
        let g = genesis();
        let mut store = ChainStore::new(g.clone());
        let b1 = child(&g, "a", 10);
        store.add_block(b1.clone(), &mut rng);
        assert_eq!(store.add_block(b1.clone(), &mut rng), AddBlockResult::Added);
        assert_eq!(store.forks(), 0);
        assert_eq!(store.head_hash(), b1.hash());
    }

    #[test]
    fn higher_difficulty_side_branch_triggers_reorg() {
        let mut rng = rng();
        let g = genesis();
        let mut store = ChainStore::new(g.clone());
        let b1 = child(&g, "a", 10);
        store.add_block(b1.clone(), &mut rng);

        let b1_rival = child(&g, "b", 10_000_000);
        let result = store.add_block(b1_rival.clone(), &mut rng);
        assert_eq!(
            result,
            AddBlockResult::AddedReorg { old_head: b1.hash(), new_head: b1_rival.hash() }
        );
        assert_eq!(store.head_hash(), b1_rival.hash());
        assert_eq!(store.get_block_by_number(1).unwrap(), &b1_rival);
        assert_eq!(store.forks(), 1);
    }

    #[test]
    fn lower_difficulty_side_branch_does_not_reorg() {
        let mut rng = rng();
        let g = genesis();
        let mut store = ChainStore::new(g.clone());
        let b1 = child(&g, "a", 10_000_000);
        store.add_block(b1.clone(), &mut rng);

        let b1_rival = child(&g, "b", 1);
        let result = store.add_block(b1_rival.clone(), &mut rng);
        assert_eq!(result, AddBlockResult::Added);
        assert_eq!(store.head_hash(), b1.hash());
        assert!(store.get_block(b1_rival.hash()).is_some());
    }

    #[test]
    fn orphan_is_queued_then_resolved_once_its_parent_arrives() {
        let mut rng = rng();
        let g = genesis();
        let mut store = ChainStore::new(g.clone());
        let b1 = child(&g, "a", 10);
        let b2 = child(&b1, "a", 10);

        assert_eq!(store.add_block(b2.clone(), &mut rng), AddBlockResult::Orphaned);
        assert_eq!(store.head_hash(), g.hash());
        assert!(store.get_block(b2.hash()).is_none());

        assert_eq!(store.add_block(b1.clone(), &mut rng), AddBlockResult::Added);
        assert_eq!(store.head_hash(), b2.hash());
        assert!(store.get_block(b2.hash()).is_some());
    }

    #[test]
    fn blockhashes_from_hash_walk_back_to_genesis() {
        let mut rng = rng();
        let g = genesis();
        let mut store = ChainStore::new(g.clone());
        let b1 = child(&g, "a", 10);
        let b2 = child(&b1, "a", 10);
        store.add_block(b1.clone(), &mut rng);
        store.add_block(b2.clone(), &mut rng);

        let hashes = store.get_blockhashes_from_hash(b2.hash(), 10);
        assert_eq!(hashes, vec![b2.hash(), b1.hash(), g.hash()]);
    }
}
