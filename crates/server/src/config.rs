use std::path::PathBuf;

/// Data directory used when none is configured.
pub const DEFAULT_DATA_DIR: &str = "keel-data";

/// Storage contributed by a node when no size is configured (1 GiB).
pub const DEFAULT_STORAGE_SIZE: u64 = 1024 * 1024 * 1024;

/// Resolved configuration of a storage node.
///
/// Built once by the caller and read-only afterwards.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Directory holding the node identity and file-backed blocks
    pub data_dir: PathBuf,

    /// Raw block device to store blocks on
    pub block_device: Option<PathBuf>,

    /// Bytes of storage this node contributes
    pub storage_size: u64,

    /// Address of the cluster metadata service; `None` runs standalone
    pub metadata_address: Option<String>,

    /// Address to accept replication traffic on; `None` runs passive
    pub peer_address: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            block_device: None,
            storage_size: DEFAULT_STORAGE_SIZE,
            metadata_address: None,
            peer_address: None,
        }
    }
}

impl Config {
    /// Metadata address, treating an empty string as unset
    #[must_use]
    pub fn metadata_address(&self) -> Option<&str> {
        non_empty(self.metadata_address.as_deref())
    }

    /// Peer address, treating an empty string as unset
    #[must_use]
    pub fn peer_address(&self) -> Option<&str> {
        non_empty(self.peer_address.as_deref())
    }

    /// Block device, treating an empty path as unset
    #[must_use]
    pub fn block_device(&self) -> Option<&std::path::Path> {
        self.block_device
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values_are_unset() {
        let config = Config {
            metadata_address: Some(String::new()),
            peer_address: Some("  ".to_string()),
            block_device: Some(PathBuf::new()),
            ..Config::default()
        };
        assert_eq!(config.metadata_address(), None);
        assert_eq!(config.peer_address(), None);
        assert_eq!(config.block_device(), None);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.data_dir, PathBuf::from("keel-data"));
        assert_eq!(config.storage_size, 1_073_741_824);
    }
}
