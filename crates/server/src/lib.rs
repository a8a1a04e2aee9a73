//! The keel storage server: one node's metadata client and block storage,
//! plus the lifetime scope replication runs in.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod backend;
mod config;
mod error;
mod identity;
mod server;

pub use backend::{BlockBackend, MetadataBackend, initialize_cluster, open_metadata};
pub use config::{Config, DEFAULT_DATA_DIR, DEFAULT_STORAGE_SIZE};
pub use error::ServerError;
pub use identity::{NODE_ID_FILE_NAME, load_or_create_node_id};
pub use server::Server;
