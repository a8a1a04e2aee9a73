//! Node startup against a live metadata service

use std::net::SocketAddr;
use std::time::Duration;

use keel_metadata::{DEFAULT_BLOCK_SIZE, GlobalMetadata, MetadataError, MetadataService};
use keel_metadata_http::{HttpMetadata, MetadataServer};
use keel_metadata_memory::MemoryMetadata;
use keel_node::{BootstrapError, NodeOptions, StartupMode, Supervisor, bootstrap, run_with};
use keel_ring::NodeId;
use keel_server::{BlockBackend, Config, ServerError, load_or_create_node_id};
use tempfile::{TempDir, tempdir};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

async fn start_mds() -> (MetadataServer, SocketAddr) {
    let store = MemoryMetadata::new(NodeId::generate());
    let server = MetadataServer::new("127.0.0.1:0".parse().unwrap(), store);
    let (addr, _handle) = server.start().await.unwrap();
    (server, addr)
}

fn config(dir: &TempDir, mds: SocketAddr) -> Config {
    Config {
        data_dir: dir.path().join("data"),
        storage_size: 4 * DEFAULT_BLOCK_SIZE,
        metadata_address: Some(mds.to_string()),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_initialize_twice_keeps_cluster() {
    let (mds, addr) = start_mds().await;
    let dir = tempdir().unwrap();
    let config = config(&dir, addr);

    let (server, mode) = bootstrap(&config, true).await.unwrap();
    assert_eq!(
        mode,
        StartupMode::InitializeCluster {
            storage: BlockBackend::File
        }
    );
    assert_eq!(server.blocks().num_blocks(), 4);
    let node_id = server.node_id();
    assert!(server.close().await.unwrap());

    // The cluster already exists; startup goes on as before.
    let (server, _) = bootstrap(&config, true).await.unwrap();
    assert_eq!(server.node_id(), node_id);
    assert!(server.close().await.unwrap());

    let client = HttpMetadata::new(&addr.to_string(), NodeId::generate()).unwrap();
    assert_eq!(
        client.global_metadata().await.unwrap(),
        GlobalMetadata::default()
    );
    assert_eq!(client.ring().await.unwrap().version(), 1);

    mds.shutdown().await;
}

#[tokio::test]
async fn test_uninitialized_cluster_is_fatal() {
    let (mds, addr) = start_mds().await;
    let dir = tempdir().unwrap();

    let err = bootstrap(&config(&dir, addr), false).await.unwrap_err();
    assert!(matches!(
        err,
        BootstrapError::Start(ServerError::Metadata(MetadataError::NotInitialized))
    ));
    assert!(err.to_string().starts_with("couldn't start"));

    mds.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_metadata_service() {
    let dir = tempdir().unwrap();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = bootstrap(&config(&dir, addr), true).await.unwrap_err();
    assert!(matches!(err, BootstrapError::Initialize(_)));
    assert!(err.to_string().starts_with("couldn't initialize cluster"));
}

async fn wait_for_version(client: &HttpMetadata, version: u64) {
    for _ in 0..200 {
        if let Ok(ring) = client.ring().await {
            if ring.version() == version {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("ring never reached version {version}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_node_joins_and_rejoins() {
    let (mds, addr) = start_mds().await;
    let dir = tempdir().unwrap();
    let client = HttpMetadata::new(&addr.to_string(), NodeId::generate()).unwrap();

    let options = NodeOptions {
        config: Config {
            peer_address: Some("127.0.0.1:0".to_string()),
            ..config(&dir, addr)
        },
        init_cluster: true,
        autojoin: true,
        metrics_address: Some("127.0.0.1:0".to_string()),
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let node = tokio::spawn(run_with(options.clone(), move || {
        Ok(Supervisor::arm_with(UnboundedReceiverStream::new(rx)))
    }));

    wait_for_version(&client, 2).await;
    tx.send(()).unwrap();
    tx.send(()).ok();
    node.await.unwrap().unwrap();

    let node_id = load_or_create_node_id(&options.config.data_dir)
        .await
        .unwrap();
    let ring = client.ring().await.unwrap();
    assert!(ring.contains(&node_id));
    assert_eq!(ring.peers().get(&node_id).unwrap().total_blocks, 4);

    // Restarting with the same data directory joins nothing new.
    let (tx, rx) = mpsc::unbounded_channel();
    let node = tokio::spawn(run_with(options, move || {
        Ok(Supervisor::arm_with(UnboundedReceiverStream::new(rx)))
    }));
    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(()).unwrap();
    node.await.unwrap().unwrap();

    assert_eq!(client.ring().await.unwrap().version(), 2);

    mds.shutdown().await;
}
