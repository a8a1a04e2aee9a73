//! Replication transport between keel storage nodes.
//!
//! Nodes exchange length-delimited CBOR frames over TCP. A node with a peer
//! address runs a listener for incoming sessions; a node without one is
//! passive and only dials out.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod channel;
mod connection;
mod endpoint;
mod error;
mod message;

pub use channel::{MAX_SESSIONS, ReplicationChannel};
pub use connection::PeerConnection;
pub use endpoint::PeerEndpoint;
pub use error::ReplicationError;
pub use message::{MAX_FRAME_LENGTH, Request, Response};
