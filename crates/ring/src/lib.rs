//! Cluster topology types for keel storage nodes
//!
//! This crate provides:
//! - Node identity and peer descriptors (`NodeId`, `PeerInfo`, `PeerInfoList`)
//! - Versioned, immutable ring snapshots (`Ring`)
//! - The add-peer capability implemented by growable rings (`RingAdder`)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod error;
pub mod node_id;
pub mod peer;
pub mod ring;

pub use error::RingError;
pub use node_id::NodeId;
pub use peer::{PeerInfo, PeerInfoList};
pub use ring::{
    DEFAULT_REPLICATION, FixedRing, GrowableRing, INITIAL_VERSION, PlacementStrategy, Ring,
    RingAdder,
};
