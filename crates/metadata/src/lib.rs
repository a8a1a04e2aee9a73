//! Abstract interface for the cluster metadata service.
//!
//! The metadata service holds the cluster-wide constants written once at
//! cluster creation ([`GlobalMetadata`]) and the current [`Ring`]. Rings are
//! only replaced through [`MetadataService::set_ring`], which rejects writes
//! that were not derived from the stored version.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod global;

pub use error::MetadataError;
pub use global::{BlockLayer, BlockLayerSpec, DEFAULT_BLOCK_SIZE, GlobalMetadata};

use std::fmt::Debug;

use async_trait::async_trait;
use keel_ring::{NodeId, Ring};

/// Client handle to the cluster metadata service.
#[async_trait]
pub trait MetadataService
where
    Self: Debug + Send + Sync + 'static,
{
    /// Name of the backend, for logs.
    fn backend(&self) -> &'static str;

    /// Identifier of the node this handle belongs to.
    fn node_id(&self) -> NodeId;

    /// Create the cluster's global metadata and its initial, empty ring.
    ///
    /// Fails with [`MetadataError::AlreadyExists`] if the cluster has
    /// already been initialized; existing metadata is left untouched.
    async fn initialize(&self, global: GlobalMetadata) -> Result<(), MetadataError>;

    /// Read the cluster's global metadata.
    async fn global_metadata(&self) -> Result<GlobalMetadata, MetadataError>;

    /// Read the current ring snapshot.
    async fn ring(&self) -> Result<Ring, MetadataError>;

    /// Replace the stored ring.
    ///
    /// The write is accepted only if `ring.version()` is exactly one more than
    /// the stored version; otherwise [`MetadataError::NonSequentialRing`].
    async fn set_ring(&self, ring: &Ring) -> Result<(), MetadataError>;

    /// Release the handle.
    async fn close(&self) -> Result<(), MetadataError> {
        Ok(())
    }
}

/// Check that `next` may replace `current`.
///
/// Shared by backends so that every store enforces the same ordering rule.
///
/// # Errors
///
/// Returns [`MetadataError::NonSequentialRing`] when `next` is not the
/// immediate successor of `current`.
pub fn check_sequential(current: &Ring, next: &Ring) -> Result<(), MetadataError> {
    if next.version() == current.version() + 1 {
        Ok(())
    } else {
        Err(MetadataError::NonSequentialRing {
            current: current.version(),
            attempted: next.version(),
        })
    }
}
