//! In-memory (single process) implementation of the metadata service, for
//! standalone nodes and tests.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::sync::Arc;

use async_trait::async_trait;
use keel_metadata::{GlobalMetadata, MetadataError, MetadataService, check_sequential};
use keel_ring::{NodeId, PlacementStrategy, Ring};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct State {
    global: Option<GlobalMetadata>,
    ring: Option<Ring>,
    ring_writes: u64,
}

/// In-memory metadata service.
///
/// Clones and handles obtained through [`MemoryMetadata::client`] share the
/// same state, so several simulated nodes can contend for one ring.
#[derive(Clone, Debug)]
pub struct MemoryMetadata {
    state: Arc<Mutex<State>>,
    node_id: NodeId,
}

impl MemoryMetadata {
    /// Creates an uninitialized cluster and a handle to it for `node_id`.
    #[must_use]
    pub fn new(node_id: NodeId) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            node_id,
        }
    }

    /// Creates an already initialized single-node cluster.
    ///
    /// The ring is a fixed `single` ring, so nodes cannot join it.
    #[must_use]
    pub fn standalone(node_id: NodeId) -> Self {
        let global = GlobalMetadata {
            placement: PlacementStrategy::Single,
            ..GlobalMetadata::default()
        };
        let ring = Ring::new(PlacementStrategy::Single, 1).ok();

        Self {
            state: Arc::new(Mutex::new(State {
                global: Some(global),
                ring,
                ring_writes: 0,
            })),
            node_id,
        }
    }

    /// Returns a handle to the same cluster for another node.
    #[must_use]
    pub fn client(&self, node_id: NodeId) -> Self {
        Self {
            state: self.state.clone(),
            node_id,
        }
    }

    /// Number of ring writes accepted so far.
    pub async fn ring_writes(&self) -> u64 {
        self.state.lock().await.ring_writes
    }
}

#[async_trait]
impl MetadataService for MemoryMetadata {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn node_id(&self) -> NodeId {
        self.node_id
    }

    async fn initialize(&self, global: GlobalMetadata) -> Result<(), MetadataError> {
        let mut state = self.state.lock().await;
        if state.global.is_some() {
            return Err(MetadataError::AlreadyExists);
        }

        let ring = Ring::new(global.placement, keel_ring::DEFAULT_REPLICATION)?;
        debug!("initializing in-memory cluster with {ring}");
        state.global = Some(global);
        state.ring = Some(ring);
        Ok(())
    }

    async fn global_metadata(&self) -> Result<GlobalMetadata, MetadataError> {
        self.state
            .lock()
            .await
            .global
            .clone()
            .ok_or(MetadataError::NotInitialized)
    }

    async fn ring(&self) -> Result<Ring, MetadataError> {
        self.state
            .lock()
            .await
            .ring
            .clone()
            .ok_or(MetadataError::NotInitialized)
    }

    async fn set_ring(&self, ring: &Ring) -> Result<(), MetadataError> {
        let mut state = self.state.lock().await;
        let current = state.ring.as_ref().ok_or(MetadataError::NotInitialized)?;
        check_sequential(current, ring)?;

        debug!("node {} replaced ring with {ring}", self.node_id);
        state.ring = Some(ring.clone());
        state.ring_writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use keel_ring::{PeerInfo, RingAdder};

    fn grow(ring: &Ring, node_id: NodeId) -> Ring {
        let adder: &dyn RingAdder = ring.adder().unwrap();
        adder
            .add_peers(vec![PeerInfo::new(node_id, 16)].into())
            .unwrap()
    }

    #[tokio::test]
    async fn test_uninitialized_cluster() {
        let mds = MemoryMetadata::new(NodeId::generate());
        assert_eq!(mds.ring().await.unwrap_err(), MetadataError::NotInitialized);
        assert_eq!(
            mds.global_metadata().await.unwrap_err(),
            MetadataError::NotInitialized
        );
    }

    #[tokio::test]
    async fn test_initialize_twice_keeps_first_metadata() {
        let mds = MemoryMetadata::new(NodeId::generate());
        mds.initialize(GlobalMetadata::default()).await.unwrap();

        let other = GlobalMetadata {
            block_size: 4096,
            ..GlobalMetadata::default()
        };
        assert_eq!(
            mds.initialize(other).await.unwrap_err(),
            MetadataError::AlreadyExists
        );
        assert_eq!(
            mds.global_metadata().await.unwrap(),
            GlobalMetadata::default()
        );
        assert_eq!(mds.ring().await.unwrap().version(), 1);
    }

    #[tokio::test]
    async fn test_stale_write_rejected() {
        let mds = MemoryMetadata::new(NodeId::generate());
        mds.initialize(GlobalMetadata::default()).await.unwrap();

        let base = mds.ring().await.unwrap();
        let first = grow(&base, NodeId::generate());
        let second = grow(&base, NodeId::generate());

        mds.set_ring(&first).await.unwrap();
        let err = mds.set_ring(&second).await.unwrap_err();
        assert_eq!(
            err,
            MetadataError::NonSequentialRing {
                current: 2,
                attempted: 2
            }
        );
        assert_eq!(mds.ring().await.unwrap(), first);
        assert_eq!(mds.ring_writes().await, 1);
    }

    #[tokio::test]
    async fn test_clients_share_state() {
        let mds = MemoryMetadata::new(NodeId::generate());
        let other_id = NodeId::generate();
        let other = mds.client(other_id);
        mds.initialize(GlobalMetadata::default()).await.unwrap();

        let ring = grow(&other.ring().await.unwrap(), other_id);
        other.set_ring(&ring).await.unwrap();

        assert!(mds.ring().await.unwrap().contains(&other_id));
        assert_eq!(other.node_id(), other_id);
    }

    #[tokio::test]
    async fn test_standalone_ring_is_fixed() {
        let mds = MemoryMetadata::standalone(NodeId::generate());
        let ring = mds.ring().await.unwrap();
        assert!(ring.adder().is_none());
        assert_eq!(
            mds.initialize(GlobalMetadata::default()).await.unwrap_err(),
            MetadataError::AlreadyExists
        );
    }
}
