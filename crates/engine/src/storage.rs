//! In-memory block store.

use fastsync_core::{BlockStore, StoreError};
use fastsync_types::{Block, BlockHeight};

/// Block store backed by a vector; index `i` holds height `i + 1`.
#[derive(Debug, Clone, Default)]
pub struct MemBlockStore {
    blocks: Vec<Block>,
    fail_next_save: bool,
}

impl MemBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `blocks`, which must start at height 1 and be
    /// contiguous.
    pub fn with_blocks(blocks: impl IntoIterator<Item = Block>) -> Result<Self, StoreError> {
        let mut store = Self::new();
        for block in blocks {
            store.save_block(block)?;
        }
        Ok(store)
    }

    /// Make the next `save_block` fail with a backend error.
    pub fn fail_next_save(&mut self) {
        self.fail_next_save = true;
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }
}

impl BlockStore for MemBlockStore {
    fn save_block(&mut self, block: Block) -> Result<(), StoreError> {
        if std::mem::take(&mut self.fail_next_save) {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }
        let stored = self.height();
        if block.height() != stored.next() {
            return Err(StoreError::NonContiguous {
                stored,
                attempted: block.height(),
            });
        }
        self.blocks.push(block);
        Ok(())
    }

    fn load_block(&self, height: BlockHeight) -> Option<Block> {
        let index = usize::try_from(height.0.checked_sub(1)?).ok()?;
        self.blocks.get(index).cloned()
    }

    fn height(&self) -> BlockHeight {
        BlockHeight(self.blocks.len() as u64)
    }
}
