//! Registering the local node in the ring.

use keel_metadata::MetadataError;
use keel_ring::{PeerInfoList, PlacementStrategy, RingError};
use keel_server::Server;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Result of a successful join.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JoinOutcome {
    /// The node was added, producing ring `version`.
    Joined {
        /// Version of the ring that added this node
        version: u64,
        /// Read-modify-write rounds it took
        attempts: u64,
    },

    /// The node was already a member. Nothing was written.
    AlreadyMember {
        /// Read-modify-write rounds it took
        attempts: u64,
    },
}

impl JoinOutcome {
    /// Read-modify-write rounds the join took. Every round after the first
    /// followed a conflict.
    #[must_use]
    pub const fn attempts(self) -> u64 {
        match self {
            Self::Joined { attempts, .. } | Self::AlreadyMember { attempts } => attempts,
        }
    }
}

/// Errors joining the ring.
#[derive(Debug, Error)]
pub enum AutojoinError {
    /// The current ring cannot have peers added.
    #[error("current ring type cannot support auto-adding ({0} placement)")]
    Unsupported(PlacementStrategy),

    /// The ring could not be read.
    #[error("couldn't get ring: {0}")]
    ReadRing(#[source] MetadataError),

    /// The node could not be added to the ring.
    #[error("couldn't add peer to ring: {0}")]
    AddPeer(#[source] RingError),

    /// The new ring could not be stored.
    #[error("couldn't set ring: {0}")]
    WriteRing(#[source] MetadataError),
}

/// Add this server to the cluster ring.
///
/// Each round reads the current ring, derives a ring with this node added
/// and writes it back. A write rejected because the ring moved on, or
/// because the service asks for a retry, starts a new round from a fresh
/// read. There is no bound on the number of rounds.
///
/// # Errors
///
/// Fails if the ring cannot grow, cannot be read, or a write fails for any
/// reason other than a conflict.
pub async fn join(server: &Server) -> Result<JoinOutcome, AutojoinError> {
    let mds = server.metadata();
    let peer = server.peer_info();
    let mut attempts = 0;

    loop {
        attempts += 1;

        let ring = mds.ring().await.map_err(AutojoinError::ReadRing)?;
        let Some(adder) = ring.adder() else {
            return Err(AutojoinError::Unsupported(ring.strategy()));
        };

        let next = match adder.add_peers(PeerInfoList::from(vec![peer.clone()])) {
            Ok(next) => next,
            Err(RingError::AlreadyExists(_)) => {
                info!("node {} is already a member of {ring}", peer.node_id);
                return Ok(JoinOutcome::AlreadyMember { attempts });
            }
            Err(e) => return Err(AutojoinError::AddPeer(e)),
        };

        match mds.set_ring(&next).await {
            Ok(()) => {
                info!("node {} joined the ring: {next}", peer.node_id);
                return Ok(JoinOutcome::Joined {
                    version: next.version(),
                    attempts,
                });
            }
            Err(e) if e.is_retryable() => {
                warn!("failed to set ring, trying again: {e}");
                tokio::task::yield_now().await;
            }
            Err(e) => return Err(AutojoinError::WriteRing(e)),
        }

        debug!("autojoin attempt {attempts} conflicted");
    }
}
