//! Shutdown coordination between the signal handler, the process registry,
//! and axum's graceful shutdown.
//!
//! Order matters here: the accept loop must stop before the kill loop
//! starts, otherwise new requests keep arriving and spawning agents for the
//! whole drain window. On a signal the coordinator resolves the
//! graceful-shutdown future first, then drains the registry while axum
//! waits out the in-flight connections; those requests see their agent
//! exit and can still write their responses. The drain also closes the
//! registry, so an agent that slips in between the signal and the snapshot
//! is killed at registration time.

use std::future::Future;
use std::time::Duration;

use drover_core::registry::ProcessRegistry;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

/// Spawn the signal watcher and return axum's graceful-shutdown future
/// together with the watcher's handle.
///
/// The future resolves as soon as a termination signal arrives; the drain
/// keeps running on the spawned task past that point. Await the handle
/// after the server returns so every agent process has been reaped before
/// the process exits.
pub fn drain_on_signal(
    registry: ProcessRegistry,
    grace: Duration,
) -> (impl Future<Output = ()>, JoinHandle<()>) {
    let (stop_tx, stop_rx) = oneshot::channel();
    let drain = tokio::spawn(async move {
        wait_for_signal().await;
        let tracked = registry.len().await;
        info!(tracked, "received shutdown signal, draining agent processes");
        // Stop accepting connections before the first SIGTERM goes out.
        let _ = stop_tx.send(());
        registry.drain(grace).await;
        info!("shutdown drain complete");
    });
    let shutdown = async move {
        // An error here means the watcher task died; shut down regardless.
        let _ = stop_rx.await;
    };
    (shutdown, drain)
}

/// Wait for SIGTERM (how container runtimes stop us) or Ctrl+C.
async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
