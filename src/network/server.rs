//! HTTP Server
//!
//! Binds the listener, serves the router and shuts down cleanly.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;

use crate::engine::Engine;
use crate::error::{LedgerError, Result};
use super::build_router;

/// Why the server stopped
#[derive(Debug, Clone, PartialEq, Eq)]
enum StopReason {
    Signal,
    Fault(String),
}

/// HTTP server for LedgerKV
pub struct Server {
    engine: Arc<Engine>,
}

impl Server {
    /// Create a new server around an opened engine
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Serve until SIGINT/SIGTERM or an appender fault, then close the engine.
    ///
    /// A fault is returned as `AppenderFailed` after shutdown so the process
    /// can exit non-zero.
    pub async fn run(self) -> Result<()> {
        let addr = self.engine.config().listen_addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| LedgerError::Network(format!("cannot bind {}: {}", addr, e)))?;
        tracing::info!("Listening on {}", addr);

        let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(None::<StopReason>);
        let stop_tx = Arc::new(stop_tx);

        // Appender faults end the process; memory and log have diverged
        let watcher_engine = Arc::clone(&self.engine);
        let fault_tx = Arc::clone(&stop_tx);
        tokio::task::spawn_blocking(move || {
            if let Some(message) = watcher_engine.wait_for_fault() {
                let _ = fault_tx.send(Some(StopReason::Fault(message)));
            }
        });

        tokio::spawn(async move {
            shutdown_signal().await;
            let _ = stop_tx.send(Some(StopReason::Signal));
        });

        let app = build_router(Arc::clone(&self.engine));
        let mut shutdown_rx = stop_rx.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                loop {
                    let stopped = shutdown_rx.borrow_and_update().is_some();
                    if stopped || shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await;

        let reason = stop_rx.borrow_and_update().clone();
        let closed = self.engine.close();
        served.map_err(|e| LedgerError::Network(e.to_string()))?;

        match reason {
            Some(StopReason::Fault(message)) => {
                tracing::error!(error = %message, "Server stopped after transaction log failure");
                Err(LedgerError::AppenderFailed(message))
            }
            _ => {
                tracing::info!("Server shut down gracefully");
                closed
            }
        }
    }
}

/// Listen for SIGTERM and SIGINT (Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
