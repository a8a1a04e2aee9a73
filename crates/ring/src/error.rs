//! Error types for ring operations

use thiserror::Error;

/// Ring-related errors
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum RingError {
    /// A peer being added is already a member of the ring
    #[error("peer {0} is already a member of the ring")]
    AlreadyExists(String),

    /// The placement strategy name is not recognized
    #[error("unknown placement strategy: {0}")]
    UnknownStrategy(String),

    /// Replication factor must be at least one
    #[error("invalid replication factor: {0}")]
    InvalidReplication(u32),

    /// The node identifier could not be parsed
    #[error("invalid node id '{0}'")]
    InvalidNodeId(String),
}
