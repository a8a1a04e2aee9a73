//! Error body shared by the server and the client.

use keel_metadata::MetadataError;
use serde::{Deserialize, Serialize};

pub const KIND_ALREADY_EXISTS: &str = "already_exists";
pub const KIND_NOT_INITIALIZED: &str = "not_initialized";
pub const KIND_NON_SEQUENTIAL_RING: &str = "non_sequential_ring";
pub const KIND_AGAIN: &str = "again";
pub const KIND_BACKEND: &str = "backend";

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempted: Option<u64>,
}

impl From<&MetadataError> for ErrorBody {
    fn from(error: &MetadataError) -> Self {
        let (kind, current, attempted) = match error {
            MetadataError::AlreadyExists => (KIND_ALREADY_EXISTS, None, None),
            MetadataError::NotInitialized => (KIND_NOT_INITIALIZED, None, None),
            MetadataError::NonSequentialRing { current, attempted } => {
                (KIND_NON_SEQUENTIAL_RING, Some(*current), Some(*attempted))
            }
            MetadataError::Again(_) => (KIND_AGAIN, None, None),
            MetadataError::Ring(_) | MetadataError::Backend(_) => (KIND_BACKEND, None, None),
        };

        Self {
            kind: kind.to_string(),
            message: error.to_string(),
            current,
            attempted,
        }
    }
}

impl From<ErrorBody> for MetadataError {
    fn from(body: ErrorBody) -> Self {
        match body.kind.as_str() {
            KIND_ALREADY_EXISTS => Self::AlreadyExists,
            KIND_NOT_INITIALIZED => Self::NotInitialized,
            KIND_NON_SEQUENTIAL_RING => Self::NonSequentialRing {
                current: body.current.unwrap_or_default(),
                attempted: body.attempted.unwrap_or_default(),
            },
            KIND_AGAIN => Self::Again(body.message),
            _ => Self::Backend(body.message),
        }
    }
}
