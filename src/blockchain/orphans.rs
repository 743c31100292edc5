use log::debug;
use std::collections::{HashMap, VecDeque};

use super::Block;

/// Default bound on buffered orphan blocks.
pub const DEFAULT_MAX_ORPHANS: usize = 256;

/// Blocks whose parent is not known yet, keyed by the missing parent hash.
/// Bounded; the oldest orphan is evicted first.
#[derive(Debug)]
pub struct OrphanPool {
    by_parent: HashMap<String, Vec<Block>>,
    order: VecDeque<(String, String)>, // (parent_hash, block_hash), oldest first
    capacity: usize,
}

impl OrphanPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            by_parent: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Buffer `block`. Returns false if it was already buffered or the pool
    /// has zero capacity.
    pub fn buffer(&mut self, block: Block) -> bool {
        if self.capacity == 0 || self.contains(&block.hash) {
            return false;
        }
        while self.order.len() >= self.capacity {
            self.evict_oldest();
        }
        self.order.push_back((block.parent_hash.clone(), block.hash.clone()));
        self.by_parent
            .entry(block.parent_hash.clone())
            .or_default()
            .push(block);
        true
    }

    fn evict_oldest(&mut self) {
        let Some((parent, hash)) = self.order.pop_front() else {
            return;
        };
        if let Some(list) = self.by_parent.get_mut(&parent) {
            list.retain(|b| b.hash != hash);
            if list.is_empty() {
                self.by_parent.remove(&parent);
            }
        }
        debug!("ORPHANS - evicted {hash} (waiting on {parent})");
    }

    /// Remove and return every orphan waiting on `parent_hash`.
    pub fn take_children(&mut self, parent_hash: &str) -> Vec<Block> {
        let children = self.by_parent.remove(parent_hash).unwrap_or_default();
        if !children.is_empty() {
            self.order.retain(|(p, _)| p != parent_hash);
        }
        children
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.order.iter().any(|(_, h)| h == hash)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
