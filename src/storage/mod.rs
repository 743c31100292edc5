use std::collections::HashSet;

use crate::blockchain::Block;
use crate::error::StoreError;

/// Append-only block persistence, owned by the embedding application.
pub trait BlockStore: Send {
    /// Every stored block, index-ascending so parents precede children.
    fn load_all_blocks(&self) -> Result<Vec<Block>, StoreError>;

    /// Append one block. Saving a hash twice is a no-op.
    fn save_block(&mut self, block: &Block) -> Result<(), StoreError>;
}

/// In-memory store; what the binary uses when nothing else is plugged in.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: Vec<Block>,
    hashes: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl BlockStore for MemoryStore {
    fn load_all_blocks(&self) -> Result<Vec<Block>, StoreError> {
        let mut blocks = self.blocks.clone();
        // stable: blocks at the same height keep arrival order
        blocks.sort_by_key(|b| b.index);
        Ok(blocks)
    }

    fn save_block(&mut self, block: &Block) -> Result<(), StoreError> {
        if self.hashes.insert(block.hash.clone()) {
            self.blocks.push(block.clone());
        }
        Ok(())
    }
}
