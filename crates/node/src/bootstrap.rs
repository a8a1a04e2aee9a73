//! Startup mode selection and server construction.

use std::fmt;

use keel_metadata::GlobalMetadata;
use keel_server::{BlockBackend, Config, MetadataBackend, Server, ServerError, initialize_cluster};
use thiserror::Error;
use tracing::{info, warn};

/// How a node starts, decided once from its configuration.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StartupMode {
    /// No metadata service: single-node cluster in memory.
    Standalone,

    /// Create the cluster's global metadata, then start on `storage`.
    InitializeCluster {
        /// Block storage used after initializing
        storage: BlockBackend,
    },

    /// Shared metadata service, blocks on a raw device.
    RawDevice,

    /// Shared metadata service, blocks in a file in the data directory.
    FileBacked,
}

impl StartupMode {
    /// Pick the startup mode.
    ///
    /// In priority order: no metadata address means standalone, then the
    /// init flag, then a configured block device, then file storage.
    #[must_use]
    pub fn select(config: &Config, init_cluster: bool) -> Self {
        if config.metadata_address().is_none() {
            return Self::Standalone;
        }

        let storage = if config.block_device().is_some() {
            BlockBackend::Device
        } else {
            BlockBackend::File
        };

        if init_cluster {
            Self::InitializeCluster { storage }
        } else if storage == BlockBackend::Device {
            Self::RawDevice
        } else {
            Self::FileBacked
        }
    }

    /// Metadata backend this mode attaches to.
    #[must_use]
    pub const fn metadata_backend(self) -> MetadataBackend {
        match self {
            Self::Standalone => MetadataBackend::Memory,
            _ => MetadataBackend::Http,
        }
    }

    /// Block backend this mode attaches to.
    #[must_use]
    pub const fn block_backend(self) -> BlockBackend {
        match self {
            Self::Standalone => BlockBackend::Memory,
            Self::InitializeCluster { storage } => storage,
            Self::RawDevice => BlockBackend::Device,
            Self::FileBacked => BlockBackend::File,
        }
    }

    /// Whether this node can join a shared ring.
    #[must_use]
    pub const fn is_clustered(self) -> bool {
        !matches!(self, Self::Standalone)
    }

    /// Short name, for logs and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standalone => "standalone",
            Self::InitializeCluster { .. } => "initialize_cluster",
            Self::RawDevice => "raw_device",
            Self::FileBacked => "file_backed",
        }
    }
}

impl fmt::Display for StartupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors bringing up the server.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Creating the cluster failed for a reason other than it existing.
    #[error("couldn't initialize cluster: {0}")]
    Initialize(#[source] ServerError),

    /// The server could not be opened.
    #[error("couldn't start: {0}")]
    Start(#[source] ServerError),
}

/// Select the startup mode and open exactly one server for it.
///
/// In [`StartupMode::InitializeCluster`] the cluster is created with default
/// global metadata first; an existing cluster is logged and left alone.
///
/// # Errors
///
/// Fails if initialization fails for another reason or the server cannot be
/// opened.
pub async fn bootstrap(
    config: &Config,
    init_cluster: bool,
) -> Result<(Server, StartupMode), BootstrapError> {
    let mode = StartupMode::select(config, init_cluster);
    info!("starting in {mode} mode");

    if let StartupMode::InitializeCluster { storage } = mode {
        match initialize_cluster(config, mode.metadata_backend(), GlobalMetadata::default()).await
        {
            Ok(()) => info!("cluster initialized, continuing with {storage} storage"),
            Err(e) if e.is_already_exists() => warn!("cluster already exists, not initializing"),
            Err(e) => return Err(BootstrapError::Initialize(e)),
        }
    }

    let server = Server::open(config.clone(), mode.metadata_backend(), mode.block_backend())
        .await
        .map_err(BootstrapError::Start)?;

    Ok((server, mode))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use proptest::prelude::*;

    fn config(metadata: Option<&str>, device: Option<&str>) -> Config {
        Config {
            metadata_address: metadata.map(str::to_string),
            block_device: device.map(PathBuf::from),
            ..Config::default()
        }
    }

    #[test]
    fn test_decision_table() {
        let cases = [
            (None, None, false, StartupMode::Standalone),
            (None, Some("/dev/sdb"), true, StartupMode::Standalone),
            (Some(""), Some("/dev/sdb"), true, StartupMode::Standalone),
            (
                Some("mds:4321"),
                None,
                true,
                StartupMode::InitializeCluster {
                    storage: BlockBackend::File,
                },
            ),
            (
                Some("mds:4321"),
                Some("/dev/sdb"),
                true,
                StartupMode::InitializeCluster {
                    storage: BlockBackend::Device,
                },
            ),
            (Some("mds:4321"), Some("/dev/sdb"), false, StartupMode::RawDevice),
            (Some("mds:4321"), None, false, StartupMode::FileBacked),
        ];

        for (metadata, device, init, expected) in cases {
            assert_eq!(
                StartupMode::select(&config(metadata, device), init),
                expected,
                "metadata={metadata:?} device={device:?} init={init}"
            );
        }
    }

    #[tokio::test]
    async fn test_standalone_bootstrap() {
        let config = Config {
            storage_size: 2 * keel_metadata::DEFAULT_BLOCK_SIZE,
            ..Config::default()
        };
        let (server, mode) = bootstrap(&config, true).await.unwrap();

        assert_eq!(mode, StartupMode::Standalone);
        assert_eq!(server.metadata().backend(), "memory");
        assert_eq!(server.blocks().kind(), "memory");
        assert!(server.close().await.unwrap());
    }

    proptest! {
        #[test]
        fn no_metadata_address_is_always_standalone(
            device in proptest::option::of("/dev/[a-z]{3}"),
            init in any::<bool>(),
        ) {
            let mode = StartupMode::select(&config(None, device.as_deref()), init);
            prop_assert_eq!(mode, StartupMode::Standalone);
            prop_assert_eq!(mode.metadata_backend(), MetadataBackend::Memory);
            prop_assert_eq!(mode.block_backend(), BlockBackend::Memory);
        }

        #[test]
        fn device_with_metadata_uses_raw_device(
            address in "[a-z]{1,12}:[0-9]{2,5}",
            device in "/dev/[a-z]{3}",
            init in any::<bool>(),
        ) {
            let mode = StartupMode::select(&config(Some(&address), Some(&device)), init);
            prop_assert_eq!(mode.block_backend(), BlockBackend::Device);
            prop_assert_eq!(mode.metadata_backend(), MetadataBackend::Http);
            prop_assert_eq!(init, matches!(mode, StartupMode::InitializeCluster { .. }));
        }

        #[test]
        fn clustered_modes_never_use_memory(
            address in "[a-z]{1,12}:[0-9]{2,5}",
            device in proptest::option::of("/dev/[a-z]{3}"),
            init in any::<bool>(),
        ) {
            let mode = StartupMode::select(&config(Some(&address), device.as_deref()), init);
            prop_assert!(mode.is_clustered());
            prop_assert_ne!(mode.block_backend(), BlockBackend::Memory);
        }
    }
}
