use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use tokio::net::lookup_host;

use crate::ReplicationError;

const SCHEMES: &[&str] = &["tcp", "http"];

/// A parsed peer address: `host:port`, optionally prefixed with `tcp://` or
/// `http://`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PeerEndpoint {
    host: String,
    port: u16,
}

impl PeerEndpoint {
    /// Parse a peer address.
    ///
    /// # Errors
    ///
    /// Fails on unknown schemes, missing hosts, and missing or invalid ports.
    pub fn parse(address: &str) -> Result<Self, ReplicationError> {
        let invalid = |reason| ReplicationError::InvalidAddress(address.to_string(), reason);

        let trimmed = address.trim();
        let authority = match trimmed.split_once("://") {
            Some((scheme, rest)) => {
                if !SCHEMES.iter().any(|s| s.eq_ignore_ascii_case(scheme)) {
                    return Err(invalid("unsupported scheme"));
                }
                rest
            }
            None => trimmed,
        };
        let authority = authority.strip_suffix('/').unwrap_or(authority);
        if authority.contains('/') {
            return Err(invalid("unexpected path"));
        }

        let (host, port) = authority.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        if host.contains(':') && !authority.starts_with('[') {
            return Err(invalid("IPv6 hosts must be bracketed"));
        }
        let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Host name or IP address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Resolve to the first socket address the host names.
    ///
    /// # Errors
    ///
    /// Fails if the host cannot be resolved.
    pub async fn socket_addr(&self) -> Result<SocketAddr, ReplicationError> {
        lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| ReplicationError::Io("error resolving peer address", e))?
            .next()
            .ok_or_else(|| ReplicationError::Unresolved(self.to_string()))
    }
}

impl fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for PeerEndpoint {
    type Err = ReplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
