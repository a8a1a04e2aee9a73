use keel_blocks::BlockError;
use keel_metadata::MetadataError;
use keel_ring::RingError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A cluster backend was requested without a metadata address.
    #[error("no metadata address configured")]
    MissingMetadataAddress,

    /// Raw block storage was requested without a device path.
    #[error("no block device configured")]
    MissingBlockDevice,

    /// Metadata service error.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// Metadata client could not be created.
    #[error(transparent)]
    MetadataClient(#[from] keel_metadata_http::Error),

    /// Block storage error.
    #[error(transparent)]
    Blocks(#[from] BlockError),

    /// Stored node identity is invalid.
    #[error("invalid node identity: {0}")]
    Identity(#[from] RingError),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),
}

impl ServerError {
    /// Whether this is the metadata service reporting an existing cluster.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::Metadata(MetadataError::AlreadyExists))
    }
}
