//! Server lifecycle against a live metadata service

use std::net::SocketAddr;

use keel_blocks::{BLOCK_FILE_NAME, BlockStore};
use keel_metadata::{GlobalMetadata, MetadataError};
use keel_metadata_http::MetadataServer;
use keel_metadata_memory::MemoryMetadata;
use keel_ring::NodeId;
use keel_server::{
    BlockBackend, Config, MetadataBackend, Server, ServerError, initialize_cluster,
};
use tempfile::tempdir;

async fn start_mds() -> (MetadataServer, SocketAddr) {
    let store = MemoryMetadata::new(NodeId::generate());
    let server = MetadataServer::new("127.0.0.1:0".parse().unwrap(), store);
    let (addr, _handle) = server.start().await.unwrap();
    (server, addr)
}

#[tokio::test]
async fn test_uninitialized_cluster() {
    let (mds, addr) = start_mds().await;
    let dir = tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        metadata_address: Some(addr.to_string()),
        ..Config::default()
    };

    let err = Server::open(config, MetadataBackend::Http, BlockBackend::File)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServerError::Metadata(MetadataError::NotInitialized)
    ));
    assert!(!dir.path().join(BLOCK_FILE_NAME).exists());

    mds.shutdown().await;
}

#[tokio::test]
async fn test_initialize_twice_then_open() {
    let (mds, addr) = start_mds().await;
    let dir = tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        storage_size: 8 * 1024 * 1024,
        metadata_address: Some(format!("http://{addr}")),
        ..Config::default()
    };
    let global = GlobalMetadata {
        block_size: 1024 * 1024,
        ..GlobalMetadata::default()
    };

    initialize_cluster(&config, MetadataBackend::Http, global.clone())
        .await
        .unwrap();
    let err = initialize_cluster(&config, MetadataBackend::Http, GlobalMetadata::default())
        .await
        .unwrap_err();
    assert!(err.is_already_exists());

    let server = Server::open(config.clone(), MetadataBackend::Http, BlockBackend::File)
        .await
        .unwrap();
    let node_id = server.node_id();
    assert_eq!(server.blocks().block_size(), 1024 * 1024);
    assert_eq!(server.blocks().num_blocks(), 8);
    assert!(server.close().await.unwrap());

    // Same identity on restart.
    let server = Server::open(config, MetadataBackend::Http, BlockBackend::File)
        .await
        .unwrap();
    assert_eq!(server.node_id(), node_id);
    assert!(server.close().await.unwrap());

    mds.shutdown().await;
}
