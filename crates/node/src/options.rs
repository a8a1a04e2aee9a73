use keel_server::Config;

/// Everything a node needs to start, resolved once by the caller.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NodeOptions {
    /// Server configuration
    pub config: Config,

    /// Create the cluster's global metadata before starting
    pub init_cluster: bool,

    /// Register this node in the ring after starting
    pub autojoin: bool,

    /// Address to serve `/metrics` on. `:port` listens on all interfaces.
    pub metrics_address: Option<String>,
}
