//! Standalone metadata service for keel clusters.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::net::SocketAddr;

use clap::Parser;
use keel_metadata::{BlockLayerSpec, GlobalMetadata, MetadataService};
use keel_metadata_http::{Error, MetadataServer};
use keel_metadata_memory::MemoryMetadata;
use keel_ring::{NodeId, PlacementStrategy};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Clone, Debug, Parser)]
#[command(version, about = "keel metadata service", long_about = None)]
struct Args {
    /// Address to serve the metadata API on
    #[arg(long, default_value = "127.0.0.1:4321", env = "KEEL_MDS_LISTEN")]
    listen: SocketAddr,

    /// Initialize the cluster on startup instead of waiting for a node to do it
    #[arg(long)]
    init: bool,

    /// Block size used when initializing
    #[arg(long, default_value_t = keel_metadata::DEFAULT_BLOCK_SIZE)]
    block_size: u64,

    /// Block layer spec used when initializing
    #[arg(long, default_value = "crc,base")]
    block_spec: BlockLayerSpec,

    /// Placement strategy used when initializing
    #[arg(long, default_value = "ketama")]
    placement: PlacementStrategy,

    /// Turn on debug output
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    let level = if args.debug { Level::DEBUG } else { Level::INFO };
    if let Err(e) = tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(level).finish(),
    ) {
        eprintln!("could not set global default subscriber: {e}");
    }

    let store = MemoryMetadata::new(NodeId::generate());
    if args.init {
        let global = GlobalMetadata {
            block_size: args.block_size,
            default_block_spec: args.block_spec,
            placement: args.placement,
        };
        match store.initialize(global).await {
            Ok(()) => info!("cluster initialized with {} placement", args.placement),
            Err(e) => error!("failed to initialize cluster: {e}"),
        }
    }

    let server = MetadataServer::new(args.listen, store);
    let (_, handle) = server.start().await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            server.shutdown().await;
        }
        _ = handle => {
            error!("metadata server exited");
        }
    }

    Ok(())
}
