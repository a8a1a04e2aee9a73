use bytes::{Bytes, BytesMut};
use keel_ring::NodeId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::codec::LengthDelimitedCodec;

use crate::ReplicationError;

/// Largest frame either side accepts (16 MiB).
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Request sent to a peer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Liveness check. Answered with the peer's node id.
    Ping,

    /// Read one block from the peer's store.
    ReadBlock {
        /// Block index
        index: u64,
    },

    /// Overwrite one block in the peer's store.
    WriteBlock {
        /// Block index
        index: u64,
        /// Block contents, exactly one block long
        data: Bytes,
    },
}

impl Request {
    pub(crate) const fn name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::ReadBlock { .. } => "read_block",
            Self::WriteBlock { .. } => "write_block",
        }
    }
}

/// Response from a peer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// Answer to [`Request::Ping`].
    Pong {
        /// The answering node
        node_id: NodeId,
    },

    /// Answer to [`Request::ReadBlock`].
    Block {
        /// Block contents
        data: Bytes,
    },

    /// Answer to [`Request::WriteBlock`].
    Written,

    /// The request failed on the peer.
    Error {
        /// Description of the failure
        message: String,
    },
}

pub(crate) fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

pub(crate) fn encode<T: Serialize>(message: &T) -> Result<Bytes, ReplicationError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(message, &mut buf)
        .map_err(|e| ReplicationError::Encode(e.to_string()))?;
    Ok(Bytes::from(buf))
}

pub(crate) fn decode<T: DeserializeOwned>(frame: &BytesMut) -> Result<T, ReplicationError> {
    ciborium::de::from_reader(frame.as_ref()).map_err(|e| ReplicationError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_request_keeps_payload() {
        let request = Request::WriteBlock {
            index: 7,
            data: Bytes::from_static(&[1, 2, 3, 4]),
        };
        let frame = BytesMut::from(encode(&request).unwrap().as_ref());
        assert_eq!(decode::<Request>(&frame).unwrap(), request);
    }

    #[test]
    fn test_garbage_frame() {
        let frame = BytesMut::from(&b"\xff\x00not cbor"[..]);
        assert!(matches!(
            decode::<Response>(&frame),
            Err(ReplicationError::Decode(_))
        ));
    }
}
