//! Bringing up the replication channel.

use std::sync::Arc;

use keel_replication::{PeerEndpoint, ReplicationChannel, ReplicationError};
use keel_server::Server;
use thiserror::Error;
use tracing::info;

/// Errors establishing replication.
#[derive(Debug, Error)]
pub enum EstablishError {
    /// The configured peer address is malformed. Nothing was started.
    #[error("couldn't parse peer address {0}: {1}")]
    PeerAddress(String, #[source] ReplicationError),

    /// The listener could not be started.
    #[error("couldn't listen for replication: {0}")]
    Listen(#[source] ReplicationError),
}

/// Open the server's replication channel.
///
/// With a peer address the node listens for peer sessions on it; without
/// one the channel is passive.
///
/// # Errors
///
/// Fails if the peer address is malformed or cannot be listened on.
pub async fn establish(
    server: Arc<Server>,
    peer_address: Option<&str>,
) -> Result<ReplicationChannel, EstablishError> {
    let Some(address) = peer_address.map(str::trim).filter(|a| !a.is_empty()) else {
        return Ok(ReplicationChannel::open(server));
    };

    let endpoint = PeerEndpoint::parse(address)
        .map_err(|e| EstablishError::PeerAddress(address.to_string(), e))?;
    let channel = ReplicationChannel::listen(server, &endpoint)
        .await
        .map_err(EstablishError::Listen)?;
    info!("accepting replication from peers at {endpoint}");

    Ok(channel)
}
