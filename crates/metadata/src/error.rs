use keel_ring::RingError;
use thiserror::Error;

/// Errors returned by metadata services.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum MetadataError {
    /// The cluster has already been initialized.
    #[error("already exists")]
    AlreadyExists,

    /// The cluster has not been initialized yet.
    #[error("cluster metadata has not been initialized")]
    NotInitialized,

    /// A ring write was not based on the stored version.
    #[error("non-sequential ring update: stored version {current}, attempted {attempted}")]
    NonSequentialRing {
        /// Version currently stored
        current: u64,
        /// Version the caller tried to write
        attempted: u64,
    },

    /// Transient condition; the operation may be retried.
    #[error("try again: {0}")]
    Again(String),

    /// Stored data is not a valid ring.
    #[error(transparent)]
    Ring(#[from] RingError),

    /// Backend failure.
    #[error("metadata backend error: {0}")]
    Backend(String),
}

impl MetadataError {
    /// Whether the caller should re-read and retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NonSequentialRing { .. } | Self::Again(_))
    }
}
