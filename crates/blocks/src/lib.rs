//! Block storage backends for keel storage nodes.
//!
//! Every backend stores fixed-size blocks addressed by index in
//! `0..num_blocks()`. The capacity is what a node advertises when it joins
//! the ring.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod file;
mod memory;

pub use error::BlockError;
pub use file::{BLOCK_FILE_NAME, FileBlocks};
pub use memory::MemoryBlocks;

use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

/// Abstract interface for block storage.
#[async_trait]
pub trait BlockStore
where
    Self: Debug + Send + Sync + 'static,
{
    /// Name of the backend, for logs.
    fn kind(&self) -> &'static str;

    /// Size of every block in bytes.
    fn block_size(&self) -> u64;

    /// Number of blocks this store can hold.
    fn num_blocks(&self) -> u64;

    /// Read one block. Blocks never written read back as zeros.
    async fn read_block(&self, index: u64) -> Result<Bytes, BlockError>;

    /// Overwrite one block. `data` must be exactly one block long.
    async fn write_block(&self, index: u64, data: Bytes) -> Result<(), BlockError>;

    /// Persist outstanding writes.
    async fn flush(&self) -> Result<(), BlockError>;

    /// Flush and release the underlying resources. Later calls fail with
    /// [`BlockError::Closed`].
    async fn close(&self) -> Result<(), BlockError>;
}

/// Validate a block index against the store's capacity.
pub(crate) fn check_index(index: u64, num_blocks: u64) -> Result<(), BlockError> {
    if index < num_blocks {
        Ok(())
    } else {
        Err(BlockError::OutOfRange { index, num_blocks })
    }
}

/// Validate the length of a block being written.
pub(crate) fn check_len(data: &Bytes, block_size: u64) -> Result<(), BlockError> {
    if data.len() as u64 == block_size {
        Ok(())
    } else {
        Err(BlockError::BadBlockSize {
            expected: block_size,
            actual: data.len() as u64,
        })
    }
}
