use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::{BlockError, BlockStore, check_index, check_len};

/// Ephemeral in-memory block store.
#[derive(Clone, Debug)]
pub struct MemoryBlocks {
    blocks: Arc<RwLock<HashMap<u64, Bytes>>>,
    block_size: u64,
    num_blocks: u64,
    closed: Arc<AtomicBool>,
}

impl MemoryBlocks {
    /// Creates a store holding as many blocks as fit in `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BlockError::TooSmall`] if not even one block fits.
    pub fn new(size: u64, block_size: u64) -> Result<Self, BlockError> {
        let num_blocks = size.checked_div(block_size).unwrap_or(0);
        if num_blocks == 0 {
            return Err(BlockError::TooSmall { size, block_size });
        }

        Ok(Self {
            blocks: Arc::new(RwLock::new(HashMap::new())),
            block_size,
            num_blocks,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn ensure_open(&self) -> Result<(), BlockError> {
        if self.closed.load(Ordering::Acquire) {
            Err(BlockError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BlockStore for MemoryBlocks {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn block_size(&self) -> u64 {
        self.block_size
    }

    fn num_blocks(&self) -> u64 {
        self.num_blocks
    }

    async fn read_block(&self, index: u64) -> Result<Bytes, BlockError> {
        self.ensure_open()?;
        check_index(index, self.num_blocks)?;

        let blocks = self.blocks.read().await;
        Ok(blocks.get(&index).cloned().unwrap_or_else(|| {
            #[allow(clippy::cast_possible_truncation)]
            Bytes::from(vec![0u8; self.block_size as usize])
        }))
    }

    async fn write_block(&self, index: u64, data: Bytes) -> Result<(), BlockError> {
        self.ensure_open()?;
        check_index(index, self.num_blocks)?;
        check_len(&data, self.block_size)?;

        self.blocks.write().await.insert(index, data);
        Ok(())
    }

    async fn flush(&self) -> Result<(), BlockError> {
        self.ensure_open()
    }

    async fn close(&self) -> Result<(), BlockError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(BlockError::Closed);
        }
        self.blocks.write().await.clear();
        Ok(())
    }
}
