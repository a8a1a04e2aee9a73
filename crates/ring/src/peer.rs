//! Peer descriptors stored in the ring

use serde::{Deserialize, Serialize};

use crate::NodeId;

/// Descriptor of one storage node as recorded in the ring
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Unique node identifier
    pub node_id: NodeId,
    /// Address the node accepts replication traffic on, if it listens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Total block capacity the node contributes
    pub total_blocks: u64,
}

impl PeerInfo {
    /// Create a new peer descriptor
    #[must_use]
    pub const fn new(node_id: NodeId, total_blocks: u64) -> Self {
        Self {
            node_id,
            address: None,
            total_blocks,
        }
    }

    /// Attach an advertised replication address
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

/// Ordered list of peers, sorted by node id
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerInfoList(Vec<PeerInfo>);

impl PeerInfoList {
    /// Create an empty peer list
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Whether a node with this identifier is present
    #[must_use]
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.get(node_id).is_some()
    }

    /// Look up a peer by identifier
    #[must_use]
    pub fn get(&self, node_id: &NodeId) -> Option<&PeerInfo> {
        self.0
            .binary_search_by(|peer| peer.node_id.cmp(node_id))
            .ok()
            .map(|index| &self.0[index])
    }

    /// Number of peers
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over peers in node id order
    pub fn iter(&self) -> std::slice::Iter<'_, PeerInfo> {
        self.0.iter()
    }

    /// Identifiers of all peers in node id order
    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.0.iter().map(|peer| peer.node_id).collect()
    }

    /// Sum of the block capacity of every peer
    #[must_use]
    pub fn total_blocks(&self) -> u64 {
        self.0.iter().map(|peer| peer.total_blocks).sum()
    }

    /// Returns a new list containing the peers of both lists.
    ///
    /// The caller must have checked that the lists are disjoint.
    pub(crate) fn union(&self, other: &Self) -> Self {
        let mut peers = self.0.clone();
        peers.extend(other.0.iter().cloned());
        peers.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Self(peers)
    }
}

impl FromIterator<PeerInfo> for PeerInfoList {
    fn from_iter<I: IntoIterator<Item = PeerInfo>>(iter: I) -> Self {
        let mut peers: Vec<PeerInfo> = iter.into_iter().collect();
        peers.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        peers.dedup_by(|a, b| a.node_id == b.node_id);
        Self(peers)
    }
}

impl From<Vec<PeerInfo>> for PeerInfoList {
    fn from(peers: Vec<PeerInfo>) -> Self {
        peers.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a PeerInfoList {
    type Item = &'a PeerInfo;
    type IntoIter = std::slice::Iter<'a, PeerInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
