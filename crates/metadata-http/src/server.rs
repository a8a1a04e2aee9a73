//! HTTP front end over an in-memory metadata store.

use std::future::IntoFuture;
use std::net::SocketAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use keel_metadata::{GlobalMetadata, MetadataError, MetadataService};
use keel_metadata_memory::MemoryMetadata;
use keel_ring::Ring;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::Error;
use crate::wire::ErrorBody;

/// Path prefix of the metadata API.
pub const API_PREFIX: &str = "/v1";

struct ApiError(MetadataError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MetadataError::AlreadyExists | MetadataError::NonSequentialRing { .. } => {
                StatusCode::CONFLICT
            }
            MetadataError::NotInitialized => StatusCode::NOT_FOUND,
            MetadataError::Again(_) => StatusCode::SERVICE_UNAVAILABLE,
            MetadataError::Ring(_) => StatusCode::BAD_REQUEST,
            MetadataError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

impl From<MetadataError> for ApiError {
    fn from(error: MetadataError) -> Self {
        Self(error)
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn get_global(State(store): State<MemoryMetadata>) -> Result<Json<GlobalMetadata>, ApiError> {
    Ok(Json(store.global_metadata().await?))
}

async fn put_global(
    State(store): State<MemoryMetadata>,
    Json(global): Json<GlobalMetadata>,
) -> Result<StatusCode, ApiError> {
    store.initialize(global).await?;
    info!("cluster initialized");
    Ok(StatusCode::CREATED)
}

async fn get_ring(State(store): State<MemoryMetadata>) -> Result<Json<Ring>, ApiError> {
    Ok(Json(store.ring().await?))
}

async fn put_ring(
    State(store): State<MemoryMetadata>,
    Json(ring): Json<Ring>,
) -> Result<StatusCode, ApiError> {
    if let Err(e) = store.set_ring(&ring).await {
        warn!("rejected ring update to v{}: {e}", ring.version());
        return Err(e.into());
    }
    info!("ring updated: {ring}");
    Ok(StatusCode::NO_CONTENT)
}

/// Build the metadata API router over `store`.
pub fn router(store: MemoryMetadata) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            &format!("{API_PREFIX}/global"),
            get(get_global).put(put_global),
        )
        .route(&format!("{API_PREFIX}/ring"), get(get_ring).put(put_ring))
        .with_state(store)
}

/// Metadata service listening on a TCP address.
pub struct MetadataServer {
    listen_addr: SocketAddr,
    store: MemoryMetadata,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl MetadataServer {
    /// Creates a new instance of `MetadataServer`.
    #[must_use]
    pub fn new(listen_addr: SocketAddr, store: MemoryMetadata) -> Self {
        Self {
            listen_addr,
            store,
            shutdown_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        }
    }

    /// Bind and start serving. Returns the bound address and the serve task.
    ///
    /// # Errors
    ///
    /// Fails if the server was already started or the address cannot be bound.
    pub async fn start(&self) -> Result<(SocketAddr, JoinHandle<()>), Error> {
        if self.task_tracker.is_closed() {
            return Err(Error::AlreadyStarted);
        }

        let listener = tokio::net::TcpListener::bind(self.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        let router = router(self.store.clone());
        let shutdown_token = self.shutdown_token.clone();

        let handle = self.task_tracker.spawn(async move {
            tokio::select! {
                e = axum::serve(listener, router).into_future() => {
                    info!("metadata server exited {:?}", e);
                }
                () = shutdown_token.cancelled() => {}
            };
        });

        self.task_tracker.close();
        info!("metadata service listening on {local_addr}");

        Ok((local_addr, handle))
    }

    /// Stop serving and wait for the serve task to finish.
    pub async fn shutdown(&self) {
        info!("metadata server shutting down...");

        self.shutdown_token.cancel();
        self.task_tracker.wait().await;

        info!("metadata server shutdown");
    }
}
