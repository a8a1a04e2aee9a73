//! Interrupt handling and the shutdown latch.

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Notice printed when the first interrupt arrives.
pub const INTERRUPT_NOTICE: &str = "Received an interrupt, stopping services...";

/// Watches for the first interrupt and trips a single shutdown latch.
#[derive(Debug)]
pub struct Supervisor {
    latch: CancellationToken,
    observer: JoinHandle<()>,
}

impl Supervisor {
    /// Register for process interrupts (SIGINT, and SIGTERM on unix) and
    /// start observing them.
    ///
    /// # Errors
    ///
    /// Fails if the signal handlers cannot be installed.
    pub fn arm() -> std::io::Result<Self> {
        Ok(Self::arm_with(interrupts()?))
    }

    /// Start observing an arbitrary stream of interrupts.
    ///
    /// The observer handles only the first item: it prints a notice, trips
    /// the latch and stops listening.
    #[must_use]
    pub fn arm_with<S>(interrupts: S) -> Self
    where
        S: Stream<Item = ()> + Send + 'static,
    {
        let latch = CancellationToken::new();
        let observer_latch = latch.clone();
        let mut interrupts = Box::pin(interrupts);

        let observer = tokio::spawn(async move {
            tokio::select! {
                interrupt = interrupts.next() => {
                    if interrupt.is_some() {
                        println!("\n{INTERRUPT_NOTICE}");
                        info!("interrupt received");
                        observer_latch.cancel();
                    }
                }
                () = observer_latch.cancelled() => {}
            }
        });

        Self { latch, observer }
    }

    /// The shutdown latch.
    #[must_use]
    pub fn latch(&self) -> CancellationToken {
        self.latch.clone()
    }

    /// Whether the latch has been tripped.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.latch.is_cancelled()
    }

    /// Trip the latch without an interrupt.
    pub fn trigger(&self) {
        self.latch.cancel();
    }

    /// Wait until the latch is tripped.
    pub async fn wait(&self) {
        self.latch.cancelled().await;
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.observer.abort();
    }
}

#[cfg(unix)]
fn interrupts() -> std::io::Result<BoxStream<'static, ()>> {
    use tokio::signal::unix::{SignalKind, signal};
    use tokio_stream::wrappers::SignalStream;

    let sigint = SignalStream::new(signal(SignalKind::interrupt())?);
    let sigterm = SignalStream::new(signal(SignalKind::terminate())?);

    Ok(futures::stream::select(sigint, sigterm).boxed())
}

#[cfg(not(unix))]
fn interrupts() -> std::io::Result<BoxStream<'static, ()>> {
    Ok(futures::stream::unfold((), |()| async {
        tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
    })
    .boxed())
}
