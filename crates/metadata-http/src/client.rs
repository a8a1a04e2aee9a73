//! `MetadataService` backed by a remote metadata service.

use std::time::Duration;

use async_trait::async_trait;
use keel_metadata::{GlobalMetadata, MetadataError, MetadataService};
use keel_ring::{NodeId, Ring};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::Error;
use crate::wire::ErrorBody;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Normalize a metadata endpoint address into a base URL.
///
/// Addresses without a scheme, such as `10.0.0.5:4321`, are taken to be
/// plain HTTP.
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] if the address is not a valid URL with a host.
pub fn endpoint_url(address: &str) -> Result<Url, Error> {
    let address = address.trim();
    let with_scheme = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };

    let mut url = Url::parse(&with_scheme).map_err(|_| Error::InvalidAddress(address.to_string()))?;
    if url.host_str().is_none() {
        return Err(Error::InvalidAddress(address.to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn transport_error(e: &reqwest::Error) -> MetadataError {
    if e.is_timeout() {
        MetadataError::Again(e.to_string())
    } else {
        MetadataError::Backend(e.to_string())
    }
}

/// HTTP client for the keel metadata service.
#[derive(Clone, Debug)]
pub struct HttpMetadata {
    client: reqwest::Client,
    base: Url,
    node_id: NodeId,
}

impl HttpMetadata {
    /// Creates a client for the service at `address`, acting for `node_id`.
    ///
    /// # Errors
    ///
    /// Fails if the address is invalid or the HTTP client cannot be built.
    pub fn new(address: &str, node_id: NodeId) -> Result<Self, Error> {
        let base = endpoint_url(address)?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base,
            node_id,
        })
    }

    /// Base URL of the service.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, MetadataError> {
        self.base
            .join(path)
            .map_err(|e| MetadataError::Backend(format!("bad request path {path}: {e}")))
    }

    async fn error_from(response: Response) -> MetadataError {
        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(body) => body.into(),
            Err(_) if status == StatusCode::SERVICE_UNAVAILABLE => {
                MetadataError::Again(format!("metadata service returned {status}"))
            }
            Err(_) => MetadataError::Backend(format!("metadata service returned {status}")),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, MetadataError> {
        let response = self
            .client
            .get(self.url(path)?)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| MetadataError::Backend(format!("invalid response for {path}: {e}")))
    }
}

#[async_trait]
impl MetadataService for HttpMetadata {
    fn backend(&self) -> &'static str {
        "http"
    }

    fn node_id(&self) -> NodeId {
        self.node_id
    }

    async fn initialize(&self, global: GlobalMetadata) -> Result<(), MetadataError> {
        let response = self
            .client
            .put(self.url("v1/global")?)
            .json(&global)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn global_metadata(&self) -> Result<GlobalMetadata, MetadataError> {
        self.get_json("v1/global").await
    }

    async fn ring(&self) -> Result<Ring, MetadataError> {
        self.get_json("v1/ring").await
    }

    async fn set_ring(&self, ring: &Ring) -> Result<(), MetadataError> {
        debug!("writing ring v{} to {}", ring.version(), self.base);
        let response = self
            .client
            .put(self.url("v1/ring")?)
            .json(ring)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }
}
