//! Versioned ring snapshots
//!
//! A [`Ring`] is never mutated. Growing the cluster derives a new snapshot with
//! the next version from the current one; the metadata store decides whether
//! that snapshot may replace the stored one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{NodeId, PeerInfo, PeerInfoList, RingError};

/// Version assigned to a freshly created ring
pub const INITIAL_VERSION: u64 = 1;

/// Default number of replicas kept for each block
pub const DEFAULT_REPLICATION: u32 = 2;

/// Identifier of the placement strategy a ring uses
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementStrategy {
    /// No members, no placement
    Empty,
    /// Everything on one node
    Single,
    /// Modulo placement over the member list
    Mod,
    /// Consistent hashing
    Ketama,
}

impl PlacementStrategy {
    /// Whether rings with this strategy can take new members
    #[must_use]
    pub const fn is_growable(self) -> bool {
        matches!(self, Self::Mod | Self::Ketama)
    }

    /// Strategy name as used in configuration and on the wire
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Single => "single",
            Self::Mod => "mod",
            Self::Ketama => "ketama",
        }
    }
}

impl fmt::Display for PlacementStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlacementStrategy {
    type Err = RingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "empty" => Ok(Self::Empty),
            "single" => Ok(Self::Single),
            "mod" => Ok(Self::Mod),
            "ketama" => Ok(Self::Ketama),
            other => Err(RingError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Capability of rings that can derive a snapshot with additional members
pub trait RingAdder: Send + Sync {
    /// Derive a new ring containing `peers` in addition to the current members.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::AlreadyExists`] if any of `peers` is already a member.
    fn add_peers(&self, peers: PeerInfoList) -> Result<Ring, RingError>;
}

/// A topology whose membership is fixed at creation
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FixedRing {
    strategy: PlacementStrategy,
    version: u64,
    replication: u32,
    peers: PeerInfoList,
}

/// A topology that supports adding members
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GrowableRing {
    strategy: PlacementStrategy,
    version: u64,
    replication: u32,
    peers: PeerInfoList,
}

impl RingAdder for GrowableRing {
    fn add_peers(&self, peers: PeerInfoList) -> Result<Ring, RingError> {
        if let Some(existing) = peers.iter().find(|peer| self.peers.contains(&peer.node_id)) {
            return Err(RingError::AlreadyExists(existing.node_id.to_string()));
        }

        Ok(Ring::Growable(Self {
            strategy: self.strategy,
            version: self.version + 1,
            replication: self.replication,
            peers: self.peers.union(&peers),
        }))
    }
}

/// Immutable snapshot of cluster membership and placement parameters
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(into = "RingRepr", try_from = "RingRepr")]
pub enum Ring {
    /// Membership cannot change
    Fixed(FixedRing),
    /// Membership can grow through [`RingAdder`]
    Growable(GrowableRing),
}

impl Ring {
    /// Create an initial, member-less ring for the given strategy.
    ///
    /// # Errors
    ///
    /// Fails if `replication` is zero.
    pub fn new(strategy: PlacementStrategy, replication: u32) -> Result<Self, RingError> {
        Self::from_parts(strategy, INITIAL_VERSION, replication, PeerInfoList::new())
    }

    /// Build a ring from its parts, picking the variant from the strategy.
    ///
    /// # Errors
    ///
    /// Fails if `replication` is zero.
    pub fn from_parts(
        strategy: PlacementStrategy,
        version: u64,
        replication: u32,
        peers: PeerInfoList,
    ) -> Result<Self, RingError> {
        if replication == 0 {
            return Err(RingError::InvalidReplication(replication));
        }

        Ok(if strategy.is_growable() {
            Self::Growable(GrowableRing {
                strategy,
                version,
                replication,
                peers,
            })
        } else {
            Self::Fixed(FixedRing {
                strategy,
                version,
                replication,
                peers,
            })
        })
    }

    /// The add-peer capability, if this ring has it
    #[must_use]
    pub fn adder(&self) -> Option<&dyn RingAdder> {
        match self {
            Self::Fixed(_) => None,
            Self::Growable(ring) => Some(ring),
        }
    }

    /// Version of this snapshot
    #[must_use]
    pub const fn version(&self) -> u64 {
        match self {
            Self::Fixed(ring) => ring.version,
            Self::Growable(ring) => ring.version,
        }
    }

    /// Placement strategy of this snapshot
    #[must_use]
    pub const fn strategy(&self) -> PlacementStrategy {
        match self {
            Self::Fixed(ring) => ring.strategy,
            Self::Growable(ring) => ring.strategy,
        }
    }

    /// Replication factor
    #[must_use]
    pub const fn replication(&self) -> u32 {
        match self {
            Self::Fixed(ring) => ring.replication,
            Self::Growable(ring) => ring.replication,
        }
    }

    /// Members of this snapshot
    #[must_use]
    pub const fn peers(&self) -> &PeerInfoList {
        match self {
            Self::Fixed(ring) => &ring.peers,
            Self::Growable(ring) => &ring.peers,
        }
    }

    /// Whether the node is a member of this snapshot
    #[must_use]
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.peers().contains(node_id)
    }
}

impl fmt::Display for Ring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ring v{} ({} members, replication {})",
            self.strategy(),
            self.version(),
            self.peers().len(),
            self.replication()
        )
    }
}

#[derive(Serialize, Deserialize)]
struct RingRepr {
    strategy: PlacementStrategy,
    version: u64,
    replication: u32,
    #[serde(default)]
    peers: Vec<PeerInfo>,
}

impl From<Ring> for RingRepr {
    fn from(ring: Ring) -> Self {
        let (strategy, version, replication, peers) = match ring {
            Ring::Fixed(r) => (r.strategy, r.version, r.replication, r.peers),
            Ring::Growable(r) => (r.strategy, r.version, r.replication, r.peers),
        };
        Self {
            strategy,
            version,
            replication,
            peers: peers.iter().cloned().collect(),
        }
    }
}

impl TryFrom<RingRepr> for Ring {
    type Error = RingError;

    fn try_from(repr: RingRepr) -> Result<Self, Self::Error> {
        Self::from_parts(
            repr.strategy,
            repr.version,
            repr.replication,
            repr.peers.into(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(blocks: u64) -> PeerInfo {
        PeerInfo::new(NodeId::generate(), blocks)
    }

    #[test]
    fn test_fixed_rings_have_no_adder() {
        for strategy in [PlacementStrategy::Empty, PlacementStrategy::Single] {
            let ring = Ring::new(strategy, 1).unwrap();
            assert!(ring.adder().is_none(), "{strategy} ring must not grow");
        }
    }

    #[test]
    fn test_add_peers_bumps_version_and_keeps_original() {
        let ring = Ring::new(PlacementStrategy::Ketama, DEFAULT_REPLICATION).unwrap();
        let joining = peer(100);

        let grown = ring
            .adder()
            .unwrap()
            .add_peers(vec![joining.clone()].into())
            .unwrap();

        assert_eq!(grown.version(), ring.version() + 1);
        assert!(grown.contains(&joining.node_id));
        assert!(ring.peers().is_empty());
        assert_eq!(grown.strategy(), PlacementStrategy::Ketama);
    }

    #[test]
    fn test_add_existing_peer_fails() {
        let joining = peer(100);
        let ring = Ring::new(PlacementStrategy::Mod, 1)
            .unwrap()
            .adder()
            .unwrap()
            .add_peers(vec![joining.clone()].into())
            .unwrap();

        let err = ring
            .adder()
            .unwrap()
            .add_peers(vec![joining.clone()].into())
            .unwrap_err();
        assert_eq!(err, RingError::AlreadyExists(joining.node_id.to_string()));
    }

    #[test]
    fn test_zero_replication_rejected() {
        assert_eq!(
            Ring::new(PlacementStrategy::Ketama, 0).unwrap_err(),
            RingError::InvalidReplication(0)
        );
    }

    #[test]
    fn test_json_representation_selects_variant() {
        let ring = Ring::new(PlacementStrategy::Ketama, 2)
            .unwrap()
            .adder()
            .unwrap()
            .add_peers(vec![peer(8).with_address("10.0.0.1:40000")].into())
            .unwrap();

        let json = serde_json::to_string(&ring).unwrap();
        assert!(json.contains("\"strategy\":\"ketama\""));

        let decoded: Ring = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, ring);
        assert!(matches!(decoded, Ring::Growable(_)));

        let fixed: Ring =
            serde_json::from_str(r#"{"strategy":"single","version":4,"replication":1}"#).unwrap();
        assert!(matches!(fixed, Ring::Fixed(_)));
        assert_eq!(fixed.version(), 4);
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(
            "KETAMA".parse::<PlacementStrategy>().unwrap(),
            PlacementStrategy::Ketama
        );
        assert!(matches!(
            "rendezvous".parse::<PlacementStrategy>(),
            Err(RingError::UnknownStrategy(_))
        ));
    }
}
