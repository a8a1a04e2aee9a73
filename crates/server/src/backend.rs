use std::fmt;
use std::sync::Arc;

use keel_blocks::{BlockStore, FileBlocks, MemoryBlocks};
use keel_metadata::{GlobalMetadata, MetadataService};
use keel_metadata_http::HttpMetadata;
use keel_metadata_memory::MemoryMetadata;
use keel_ring::NodeId;
use tracing::{debug, info};

use crate::{Config, ServerError};

/// Where a node keeps cluster metadata.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MetadataBackend {
    /// Process-local single-node cluster.
    Memory,

    /// Shared metadata service at the configured address.
    Http,
}

impl MetadataBackend {
    /// Short name, for logs and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for MetadataBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a node keeps its blocks.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BlockBackend {
    /// Process memory, lost on exit.
    Memory,

    /// `blocks.dat` in the data directory.
    File,

    /// The configured raw block device.
    Device,
}

impl BlockBackend {
    /// Short name, for logs and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Device => "device",
        }
    }
}

impl fmt::Display for BlockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Create a metadata client of the given kind acting for `node_id`.
///
/// The memory backend is a standalone cluster that already exists.
///
/// # Errors
///
/// Fails if the HTTP backend is requested without a valid metadata address.
pub fn open_metadata(
    config: &Config,
    backend: MetadataBackend,
    node_id: NodeId,
) -> Result<Arc<dyn MetadataService>, ServerError> {
    match backend {
        MetadataBackend::Memory => Ok(Arc::new(MemoryMetadata::standalone(node_id))),
        MetadataBackend::Http => {
            let address = config
                .metadata_address()
                .ok_or(ServerError::MissingMetadataAddress)?;
            let client = HttpMetadata::new(address, node_id)?;
            debug!("using metadata service at {}", client.base_url());
            Ok(Arc::new(client))
        }
    }
}

pub(crate) async fn open_blocks(
    config: &Config,
    backend: BlockBackend,
    block_size: u64,
) -> Result<Arc<dyn BlockStore>, ServerError> {
    let store: Arc<dyn BlockStore> = match backend {
        BlockBackend::Memory => Arc::new(MemoryBlocks::new(config.storage_size, block_size)?),
        BlockBackend::File => {
            Arc::new(FileBlocks::open(&config.data_dir, config.storage_size, block_size).await?)
        }
        BlockBackend::Device => {
            let device = config
                .block_device()
                .ok_or(ServerError::MissingBlockDevice)?;
            Arc::new(FileBlocks::open_device(device, block_size).await?)
        }
    };
    Ok(store)
}

/// Write the global metadata of a brand-new cluster.
///
/// Uses a throwaway metadata client that is closed before returning. An
/// existing cluster is reported as [`ServerError::is_already_exists`] and
/// left untouched.
///
/// # Errors
///
/// Fails if the metadata service cannot be reached or rejects the write.
pub async fn initialize_cluster(
    config: &Config,
    backend: MetadataBackend,
    global: GlobalMetadata,
) -> Result<(), ServerError> {
    let mds = open_metadata(config, backend, NodeId::generate())?;
    let block_size = global.block_size;
    let placement = global.placement;

    let result = mds.initialize(global).await;
    let closed = mds.close().await;
    result?;
    closed?;

    info!("initialized cluster with {placement} placement and {block_size} byte blocks");
    Ok(())
}
