//! The keel storage node: decides how to start, joins the cluster ring,
//! opens replication and runs until interrupted.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

pub mod autojoin;
pub mod bootstrap;
pub mod cli;
mod error;
pub mod establish;
pub mod metrics;
mod options;
pub mod supervisor;

pub use autojoin::{AutojoinError, JoinOutcome, join};
pub use bootstrap::{BootstrapError, StartupMode, bootstrap};
pub use error::Error;
pub use establish::{EstablishError, establish};
pub use metrics::NodeMetrics;
pub use options::NodeOptions;
pub use supervisor::Supervisor;

use std::sync::Arc;

use keel_server::Server;
use tracing::{debug, info, warn};

/// Resolve command line arguments and run the node.
///
/// # Errors
///
/// Fails if the arguments do not resolve, then as [`run`].
pub async fn run_args(args: cli::Args) -> Result<(), Error> {
    let options = args.into_options()?;
    run(options).await
}

/// Run a node until the process is interrupted.
///
/// # Errors
///
/// Returns the first fatal error. The server is released on every path
/// once it has been opened.
pub async fn run(options: NodeOptions) -> Result<(), Error> {
    run_with(options, Supervisor::arm).await
}

/// Run a node, arming the lifecycle supervisor with `arm`.
///
/// `arm` is called once the node has joined the ring, so interrupts during
/// startup keep their default behavior.
///
/// # Errors
///
/// Returns the first fatal error. The server is released on every path
/// once it has been opened.
pub async fn run_with<F>(options: NodeOptions, arm: F) -> Result<(), Error>
where
    F: FnOnce() -> std::io::Result<Supervisor>,
{
    let metrics = Arc::new(NodeMetrics::new()?);

    let (server, mode) = bootstrap(&options.config, options.init_cluster).await?;
    let server = Arc::new(server);
    metrics.record_startup(mode, server.blocks().num_blocks());

    let result = run_server(&server, mode, &options, &metrics, arm).await;
    let released = server.close().await;
    if matches!(released, Ok(true)) {
        info!("released server {}", server.node_id());
    }

    result?;
    released.map_err(Error::Release)?;
    info!("node stopped");
    Ok(())
}

async fn run_server<F>(
    server: &Arc<Server>,
    mode: StartupMode,
    options: &NodeOptions,
    metrics: &Arc<NodeMetrics>,
    arm: F,
) -> Result<(), Error>
where
    F: FnOnce() -> std::io::Result<Supervisor>,
{
    if options.autojoin {
        if mode.is_clustered() {
            let outcome = join(server).await?;
            metrics.record_join(outcome);
        } else {
            warn!("auto-join requested but no metadata address is configured, staying standalone");
        }
    }

    match server.metadata().ring().await {
        Ok(ring) => {
            info!("current ring: {ring}");
            metrics.record_ring(&ring);
        }
        Err(e) => debug!("couldn't read ring for metrics: {e}"),
    }

    let supervisor = arm().map_err(Error::Signal)?;

    let _channel = establish(server.clone(), server.config().peer_address()).await?;

    let metrics_task = match options.metrics_address.as_deref() {
        Some(address) => Some(metrics::serve(address, metrics.clone(), supervisor.latch()).await?),
        None => None,
    };

    info!("node {} running", server.node_id());
    supervisor.wait().await;

    if let Some((_, handle)) = metrics_task {
        if let Err(e) = handle.await {
            warn!("metrics task failed: {e}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;
    use tracing_test::traced_test;

    use keel_server::Config;

    fn standalone() -> NodeOptions {
        NodeOptions {
            config: Config {
                storage_size: 4 * keel_metadata::DEFAULT_BLOCK_SIZE,
                ..Config::default()
            },
            ..NodeOptions::default()
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_repeated_interrupts_release_once() {
        let (tx, rx) = mpsc::unbounded_channel();
        let options = NodeOptions {
            autojoin: true,
            ..standalone()
        };

        let node = tokio::spawn(run_with(options, move || {
            Ok(Supervisor::arm_with(UnboundedReceiverStream::new(rx)))
        }));

        for _ in 0..3 {
            let _ = tx.send(());
        }
        node.await.unwrap().unwrap();

        assert!(logs_contain("staying standalone"));
        assert!(logs_contain("released server"));
        assert!(logs_contain("node stopped"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_bad_peer_address_still_releases() {
        let options = NodeOptions {
            config: Config {
                peer_address: Some("udp://10.0.0.1:40000".to_string()),
                ..standalone().config
            },
            ..standalone()
        };

        let err = run_with(options, || Ok(Supervisor::arm_with(futures::stream::pending())))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Establish(EstablishError::PeerAddress(..))));
        assert!(logs_contain("released server"));
    }

    #[tokio::test]
    async fn test_bad_size_is_config_error() {
        use clap::Parser;

        let args = cli::Args::parse_from(["keeld", "--size", "lots"]);
        let err = run_args(args).await.unwrap_err();
        assert!(matches!(err, Error::Config(cli::ConfigError::InvalidSize(_))));
        assert_eq!(err.to_string(), r#"invalid size "lots""#);
    }

    #[tokio::test]
    async fn test_signal_failure_is_fatal() {
        let err = run_with(standalone(), || Err(std::io::Error::other("no signals")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Signal(_)));
    }
}
