//! Cluster-wide constants

use std::fmt;
use std::str::FromStr;

use keel_ring::PlacementStrategy;
use serde::{Deserialize, Serialize};

use crate::MetadataError;

/// Block size used when a cluster is created without an explicit one.
pub const DEFAULT_BLOCK_SIZE: u64 = 512 * 1024;

/// One layer of the block storage stack
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockLayer {
    /// Raw block storage; always the bottom layer
    Base,
    /// CRC integrity checking
    Crc,
    /// Replication to the given number of nodes
    Replication(u32),
}

impl fmt::Display for BlockLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => f.write_str("base"),
            Self::Crc => f.write_str("crc"),
            Self::Replication(n) => write!(f, "rep={n}"),
        }
    }
}

/// Ordered block layer stack, top layer first, e.g. `crc,base`
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlockLayerSpec(Vec<BlockLayer>);

impl BlockLayerSpec {
    /// Layers from top to bottom
    #[must_use]
    pub fn layers(&self) -> &[BlockLayer] {
        &self.0
    }
}

impl Default for BlockLayerSpec {
    fn default() -> Self {
        Self(vec![BlockLayer::Crc, BlockLayer::Base])
    }
}

impl fmt::Display for BlockLayerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&names.join(","))
    }
}

impl FromStr for BlockLayerSpec {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| MetadataError::Backend(format!("invalid block spec '{s}': {why}"));

        let mut layers = Vec::new();
        for part in s.split(',').map(str::trim) {
            let layer = match part {
                "base" => BlockLayer::Base,
                "crc" => BlockLayer::Crc,
                _ => match part.strip_prefix("rep=") {
                    Some(n) => {
                        let n: u32 = n.parse().map_err(|_| invalid("bad replication count"))?;
                        if n == 0 {
                            return Err(invalid("replication count must be positive"));
                        }
                        BlockLayer::Replication(n)
                    }
                    None => return Err(invalid(&format!("unknown layer '{part}'"))),
                },
            };
            layers.push(layer);
        }

        if layers.last() != Some(&BlockLayer::Base) {
            return Err(invalid("the last layer must be base"));
        }
        if layers.iter().filter(|l| **l == BlockLayer::Base).count() != 1 {
            return Err(invalid("base may appear only once"));
        }

        Ok(Self(layers))
    }
}

impl TryFrom<String> for BlockLayerSpec {
    type Error = MetadataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BlockLayerSpec> for String {
    fn from(spec: BlockLayerSpec) -> Self {
        spec.to_string()
    }
}

/// Constants fixed when a cluster is created
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct GlobalMetadata {
    /// Size of every block in bytes
    pub block_size: u64,
    /// Layer stack used for new volumes
    pub default_block_spec: BlockLayerSpec,
    /// Placement strategy of the cluster's ring
    pub placement: PlacementStrategy,
}

impl Default for GlobalMetadata {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            default_block_spec: BlockLayerSpec::default(),
            placement: PlacementStrategy::Ketama,
        }
    }
}
