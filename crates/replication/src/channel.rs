use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use keel_blocks::BlockStore;
use keel_server::Server;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use crate::message::{codec, decode, encode};
use crate::{PeerConnection, PeerEndpoint, ReplicationError, Request, Response};

/// Peer sessions a listener serves at once unless told otherwise.
pub const MAX_SESSIONS: usize = 100;

/// A node's replication channel.
///
/// In listener mode it accepts peer sessions until the server is released.
/// In passive mode it only dials out.
#[derive(Debug)]
pub struct ReplicationChannel {
    server: Arc<Server>,
    local_addr: Option<SocketAddr>,
}

impl ReplicationChannel {
    /// Start accepting up to [`MAX_SESSIONS`] concurrent peer sessions on
    /// `endpoint`.
    ///
    /// The accept loop and every session run on the server's task tracker
    /// and stop when the server is released.
    ///
    /// # Errors
    ///
    /// Fails if the endpoint does not resolve or cannot be bound.
    pub async fn listen(
        server: Arc<Server>,
        endpoint: &PeerEndpoint,
    ) -> Result<Self, ReplicationError> {
        Self::listen_with_limit(server, endpoint, MAX_SESSIONS).await
    }

    /// Like [`listen`](Self::listen), with at most `max_sessions` sessions
    /// open at once. Connections beyond that are closed on accept.
    ///
    /// # Errors
    ///
    /// Fails if the endpoint does not resolve or cannot be bound.
    pub async fn listen_with_limit(
        server: Arc<Server>,
        endpoint: &PeerEndpoint,
        max_sessions: usize,
    ) -> Result<Self, ReplicationError> {
        let addr = endpoint.socket_addr().await?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ReplicationError::Io("error binding peer address", e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ReplicationError::Io("error reading bound address", e))?;

        let accept_server = server.clone();
        let sessions = Arc::new(Semaphore::new(max_sessions));
        server
            .task_tracker()
            .spawn(accept_loop(accept_server, listener, sessions));

        info!("replication listening on {local_addr} for {endpoint}");

        Ok(Self {
            server,
            local_addr: Some(local_addr),
        })
    }

    /// Open a passive channel that accepts no sessions.
    #[must_use]
    pub fn open(server: Arc<Server>) -> Self {
        info!("replication channel open without a listener");
        Self {
            server,
            local_addr: None,
        }
    }

    /// Address the listener is bound to, in listener mode.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Whether this channel accepts sessions.
    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.local_addr.is_some()
    }

    /// The server this channel serves.
    #[must_use]
    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    /// Open a session with a peer.
    ///
    /// # Errors
    ///
    /// Fails if the peer cannot be reached.
    pub async fn connect(&self, peer: SocketAddr) -> Result<PeerConnection, ReplicationError> {
        PeerConnection::connect(peer).await
    }
}

async fn accept_loop(server: Arc<Server>, listener: TcpListener, sessions: Arc<Semaphore>) {
    let shutdown_token = server.shutdown_token();

    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => {
                debug!("replication listener stopping");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let Ok(permit) = sessions.clone().try_acquire_owned() else {
                        warn!("too many replication sessions, rejecting {peer}");
                        continue;
                    };
                    debug!("replication session from {peer}");
                    let session_server = server.clone();
                    server
                        .task_tracker()
                        .spawn(session(session_server, stream, peer, permit));
                }
                Err(e) => {
                    warn!("error accepting replication session: {e}");
                }
            },
        }
    }
}

async fn session(
    server: Arc<Server>,
    stream: TcpStream,
    peer: SocketAddr,
    _permit: OwnedSemaphorePermit,
) {
    let shutdown_token = server.shutdown_token();
    let mut framed = Framed::new(stream, codec());

    loop {
        let frame = tokio::select! {
            () = shutdown_token.cancelled() => break,
            frame = framed.next() => frame,
        };

        let response = match frame {
            Some(Ok(frame)) => match decode::<Request>(&frame) {
                Ok(request) => handle(&server, request).await,
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            },
            Some(Err(e)) => {
                warn!("error reading from {peer}: {e}");
                break;
            }
            None => break,
        };

        let sent = match encode(&response) {
            Ok(bytes) => framed.send(bytes).await,
            Err(e) => {
                error!("error encoding response for {peer}: {e}");
                break;
            }
        };
        if let Err(e) = sent {
            warn!("error writing to {peer}: {e}");
            break;
        }
    }

    debug!("replication session from {peer} closed");
}

async fn handle(server: &Server, request: Request) -> Response {
    let blocks = server.blocks();
    let result = match request {
        Request::Ping => Ok(Response::Pong {
            node_id: server.node_id(),
        }),
        Request::ReadBlock { index } => blocks
            .read_block(index)
            .await
            .map(|data| Response::Block { data }),
        Request::WriteBlock { index, data } => blocks
            .write_block(index, data)
            .await
            .map(|()| Response::Written),
    };

    result.unwrap_or_else(|e| Response::Error {
        message: e.to_string(),
    })
}
