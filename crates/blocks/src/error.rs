use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum BlockError {
    /// Block index is past the end of the store.
    #[error("block {index} out of range (store holds {num_blocks} blocks)")]
    OutOfRange {
        /// Requested index
        index: u64,
        /// Capacity of the store
        num_blocks: u64,
    },

    /// Written data is not exactly one block long.
    #[error("block must be {expected} bytes, got {actual}")]
    BadBlockSize {
        /// Block size of the store
        expected: u64,
        /// Length of the data given
        actual: u64,
    },

    /// The store cannot hold a single block.
    #[error("storage of {size} bytes cannot hold a block of {block_size} bytes")]
    TooSmall {
        /// Available bytes
        size: u64,
        /// Block size of the store
        block_size: u64,
    },

    /// The existing block file is larger than the requested storage size.
    #[error("{path} holds {existing} bytes, refusing to shrink it to {requested}")]
    WouldShrink {
        /// Backing file
        path: String,
        /// Current length of the file
        existing: u64,
        /// Length the new size asks for
        requested: u64,
    },

    /// The backing file is used by another process.
    #[error("{0} is locked by another process")]
    Locked(String),

    /// The store has been closed.
    #[error("block store is closed")]
    Closed,

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),
}
