use std::net::SocketAddr;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use keel_ring::NodeId;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;

use crate::message::{codec, decode, encode};
use crate::{ReplicationError, Request, Response};

/// An outgoing session with one peer. Requests are answered in order.
#[derive(Debug)]
pub struct PeerConnection {
    peer: SocketAddr,
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

impl PeerConnection {
    /// Dial a peer.
    ///
    /// # Errors
    ///
    /// Fails if the TCP connection cannot be established.
    pub async fn connect(peer: SocketAddr) -> Result<Self, ReplicationError> {
        let stream = TcpStream::connect(peer)
            .await
            .map_err(|e| ReplicationError::Io("error connecting to peer", e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| ReplicationError::Io("error configuring peer socket", e))?;
        debug!("connected to peer {peer}");

        Ok(Self {
            peer,
            framed: Framed::new(stream, codec()),
        })
    }

    /// Address of the peer.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Send one request and wait for its response.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or if the peer hangs up.
    pub async fn call(&mut self, request: &Request) -> Result<Response, ReplicationError> {
        self.framed
            .send(encode(request)?)
            .await
            .map_err(|e| ReplicationError::Io("error sending request", e))?;

        match self.framed.next().await {
            Some(Ok(frame)) => decode(&frame),
            Some(Err(e)) => Err(ReplicationError::Io("error reading response", e)),
            None => Err(ReplicationError::ConnectionClosed),
        }
    }

    /// Check the peer is alive, returning its node id.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or an unexpected answer.
    pub async fn ping(&mut self) -> Result<NodeId, ReplicationError> {
        let request = Request::Ping;
        match self.call(&request).await? {
            Response::Pong { node_id } => Ok(node_id),
            other => Err(unexpected(&request, other)),
        }
    }

    /// Read a block from the peer.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or if the peer cannot read the block.
    pub async fn read_block(&mut self, index: u64) -> Result<Bytes, ReplicationError> {
        let request = Request::ReadBlock { index };
        match self.call(&request).await? {
            Response::Block { data } => Ok(data),
            other => Err(unexpected(&request, other)),
        }
    }

    /// Write a block on the peer.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or if the peer cannot write the block.
    pub async fn write_block(&mut self, index: u64, data: Bytes) -> Result<(), ReplicationError> {
        let request = Request::WriteBlock { index, data };
        match self.call(&request).await? {
            Response::Written => Ok(()),
            other => Err(unexpected(&request, other)),
        }
    }
}

fn unexpected(request: &Request, response: Response) -> ReplicationError {
    match response {
        Response::Error { message } => ReplicationError::Remote(message),
        _ => ReplicationError::UnexpectedResponse(request.name()),
    }
}
