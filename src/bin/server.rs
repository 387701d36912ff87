//! LedgerKV Server Binary
//!
//! Replays the transaction log and starts the HTTP server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use ledgerkv::network::Server;
use ledgerkv::{Config, Engine, LoggerBackend};
use tracing_subscriber::{fmt, EnvFilter};

/// Transaction log backend
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    File,
    Sqlite,
}

/// LedgerKV Server
#[derive(Parser, Debug)]
#[command(name = "ledgerkv-server")]
#[command(about = "Durable key-value store with a replayable transaction log")]
#[command(version)]
struct Args {
    /// Transaction log backend
    #[arg(short, long, value_enum, default_value = "file")]
    backend: Backend,

    /// Log file (file backend) or database file (sqlite backend)
    #[arg(long, default_value = "transaction.log")]
    log_path: PathBuf,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Pending-event queue capacity
    #[arg(short, long, default_value = "16")]
    queue_capacity: usize,

    /// Maximum value size in KiB
    #[arg(long, default_value = "1024")]
    max_value_kb: usize,
}

#[tokio::main]
async fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ledgerkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("LedgerKV Server v{}", ledgerkv::VERSION);
    tracing::info!("Backend: {:?} at {}", args.backend, args.log_path.display());
    tracing::info!("Listen address: {}", args.listen);

    let backend = match args.backend {
        Backend::File => LoggerBackend::File { path: args.log_path },
        Backend::Sqlite => LoggerBackend::Sqlite { path: args.log_path },
    };

    // Build config from args
    let config = Config::builder()
        .backend(backend)
        .listen_addr(&args.listen)
        .queue_capacity(args.queue_capacity)
        .max_value_size(args.max_value_kb * 1024)
        .build();

    // Replay happens inside open; never serve a partially rebuilt store
    let engine = match tokio::task::spawn_blocking(move || Engine::open(config)).await {
        Ok(Ok(e)) => Arc::new(e),
        Ok(Err(e)) => {
            tracing::error!("Failed to initialize transaction logger: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("Engine startup task failed: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        keys = engine.len(),
        last_sequence = engine.last_sequence(),
        "Engine initialized successfully"
    );

    if let Err(e) = Server::new(engine).run().await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
