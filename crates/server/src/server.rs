use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use keel_blocks::BlockStore;
use keel_metadata::MetadataService;
use keel_ring::{NodeId, PeerInfo};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::backend::{BlockBackend, MetadataBackend, open_blocks, open_metadata};
use crate::identity::load_or_create_node_id;
use crate::{Config, ServerError};

/// A storage node's server: metadata client, block storage and the scope
/// that server-lifetime tasks run in.
#[derive(Debug)]
pub struct Server {
    config: Config,
    node_id: NodeId,
    mds: Arc<dyn MetadataService>,
    blocks: Arc<dyn BlockStore>,
    closed: AtomicBool,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl Server {
    /// Opens a server on the chosen backends.
    ///
    /// Nodes backed by a shared metadata service keep their identity in the
    /// data directory. Standalone nodes get a fresh identity each start.
    ///
    /// # Errors
    ///
    /// Fails if the metadata service is unreachable or uninitialized, or the
    /// block storage cannot be opened. Anything opened before the failure is
    /// closed again.
    pub async fn open(
        config: Config,
        metadata: MetadataBackend,
        blocks: BlockBackend,
    ) -> Result<Self, ServerError> {
        let node_id = match metadata {
            MetadataBackend::Memory => NodeId::generate(),
            MetadataBackend::Http => load_or_create_node_id(&config.data_dir).await?,
        };

        let mds = open_metadata(&config, metadata, node_id)?;

        let global = match mds.global_metadata().await {
            Ok(global) => global,
            Err(e) => {
                let _ = mds.close().await;
                return Err(e.into());
            }
        };

        let store = match open_blocks(&config, blocks, global.block_size).await {
            Ok(store) => store,
            Err(e) => {
                let _ = mds.close().await;
                return Err(e);
            }
        };

        info!(
            "opened server {} with {} metadata and {} blocks ({} x {} bytes)",
            node_id,
            mds.backend(),
            store.kind(),
            store.num_blocks(),
            store.block_size()
        );

        Ok(Self::from_parts(config, mds, store))
    }

    /// Assembles a server from already opened parts. The node id is taken
    /// from the metadata client.
    #[must_use]
    pub fn from_parts(
        config: Config,
        mds: Arc<dyn MetadataService>,
        blocks: Arc<dyn BlockStore>,
    ) -> Self {
        Self {
            config,
            node_id: mds.node_id(),
            mds,
            blocks,
            closed: AtomicBool::new(false),
            shutdown_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        }
    }

    /// The configuration this server was opened with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// This node's identifier.
    #[must_use]
    pub const fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The metadata client.
    #[must_use]
    pub fn metadata(&self) -> &dyn MetadataService {
        self.mds.as_ref()
    }

    /// The block store.
    #[must_use]
    pub fn blocks(&self) -> &dyn BlockStore {
        self.blocks.as_ref()
    }

    /// This node as a ring member: identity, capacity and peer address.
    ///
    /// The address is the configured peer address as written. Nodes join
    /// the ring before their listener is bound, so an address peers cannot
    /// dial (port 0, a wildcard host) is advertised unchanged.
    #[must_use]
    pub fn peer_info(&self) -> PeerInfo {
        let peer = PeerInfo::new(self.node_id, self.blocks.num_blocks());
        match self.config.peer_address() {
            Some(address) => peer.with_address(address),
            None => peer,
        }
    }

    /// Token cancelled when the server is released.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Tracker for tasks that must finish before storage is closed.
    #[must_use]
    pub const fn task_tracker(&self) -> &TaskTracker {
        &self.task_tracker
    }

    /// Whether [`Server::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Releases the server.
    ///
    /// Stops tracked tasks and waits for them, then closes block storage and
    /// the metadata client. Only the first call does any work and returns
    /// `Ok(true)`; later calls return `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns the first error from closing the block store or the metadata
    /// client. Both are closed regardless.
    pub async fn close(&self) -> Result<bool, ServerError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("server {} already released", self.node_id);
            return Ok(false);
        }

        info!("releasing server {}", self.node_id);

        self.shutdown_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        let blocks = self.blocks.close().await;
        if let Err(ref e) = blocks {
            warn!("error closing block storage: {e}");
        }
        let mds = self.mds.close().await;
        if let Err(ref e) = mds {
            warn!("error closing metadata client: {e}");
        }

        blocks?;
        mds?;
        Ok(true)
    }
}
