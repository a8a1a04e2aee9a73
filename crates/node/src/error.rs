use keel_server::ServerError;
use thiserror::Error;

use crate::autojoin::AutojoinError;
use crate::bootstrap::BootstrapError;
use crate::cli::ConfigError;
use crate::establish::EstablishError;
use crate::metrics::MetricsError;

/// Errors that stop a node.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The server could not be brought up.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    /// The node could not join the ring.
    #[error("couldn't auto-join: {0}")]
    Autojoin(#[from] AutojoinError),

    /// Replication could not be established.
    #[error("couldn't use server: {0}")]
    Establish(#[from] EstablishError),

    /// Metrics could not be set up or served.
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    /// Interrupt handlers could not be installed.
    #[error("couldn't watch for interrupts: {0}")]
    Signal(#[source] std::io::Error),

    /// The server failed to release cleanly.
    #[error("couldn't release server: {0}")]
    Release(#[source] ServerError),
}
