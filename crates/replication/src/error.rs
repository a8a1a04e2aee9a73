use keel_blocks::BlockError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// Peer address could not be parsed.
    #[error("invalid peer address {0:?}: {1}")]
    InvalidAddress(String, &'static str),

    /// Peer address names no usable socket address.
    #[error("peer address {0} did not resolve")]
    Unresolved(String),

    /// Peer closed the connection before answering.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Message could not be encoded.
    #[error("error encoding message: {0}")]
    Encode(String),

    /// Message could not be decoded.
    #[error("error decoding message: {0}")]
    Decode(String),

    /// Peer answered with an error.
    #[error("peer error: {0}")]
    Remote(String),

    /// Peer answered with the wrong kind of response.
    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),

    /// Local block storage error.
    #[error(transparent)]
    Blocks(#[from] BlockError),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),
}
