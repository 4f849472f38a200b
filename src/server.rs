//! Accept loop and graceful shutdown: a `select!` between `accept()`
//! and a combined ctrl-c/SIGTERM future, spawning one task per
//! connection.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, info, warn};

use crate::Cache;

/// Runs the accept loop against `listener`, spawning one task per
/// connection via [`Cache::handle`], until a shutdown signal arrives.
/// On shutdown, stops accepting and calls [`Cache::shutdown`], which
/// wakes any still-waiting followers with `Error`.
pub async fn serve(cache: Arc<Cache>, listener: TcpListener) {
    info!(addr = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(), "accepting connections");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        debug!(client_addr = %peer, "connection accepted");
                        let _ = stream.set_nodelay(true);
                        let cache = cache.clone();
                        tokio::spawn(async move {
                            cache.handle(stream).await;
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
            _ = shutdown_signal() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    cache.shutdown();
    info!("cache released, shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
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
