use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The server has already been started.
    #[error("The server has already been started")]
    AlreadyStarted,

    /// Failed to bind to address.
    #[error("Failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    /// The metadata address could not be parsed.
    #[error("invalid metadata address '{0}'")]
    InvalidAddress(String),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
