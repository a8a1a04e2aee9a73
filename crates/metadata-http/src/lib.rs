//! HTTP metadata service for keel clusters.
//!
//! [`MetadataServer`] exposes an in-memory store over HTTP so that several
//! nodes can share one ring; [`HttpMetadata`] is the matching
//! `MetadataService` client used by nodes configured with a metadata address.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod client;
mod error;
mod server;
mod wire;

pub use client::{HttpMetadata, endpoint_url};
pub use error::Error;
pub use server::{API_PREFIX, MetadataServer, router};
