//! # LedgerKV
//!
//! A durable key-value store with:
//! - An append-only transaction log (file or SQLite backed)
//! - Asynchronous single-writer appends with bounded backpressure
//! - Startup replay with strict sequence validation
//! - An HTTP interface
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Server                             │
//! │              PUT / GET / DELETE /v1/key/{key}                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Engine                                │
//! │        (mutate store + enqueue event under one lock)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌───────────────────┐
//!   │    Store    │          │ TransactionLogger │
//!   │  (RwLock)   │          │  queue → appender │
//!   └─────────────┘          └─────────┬─────────┘
//!                                      │
//!                              ┌───────┴───────┐
//!                              ▼               ▼
//!                          text file        SQLite
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod store;
pub mod network;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LedgerError, Result};
pub use config::{Config, LoggerBackend};
pub use engine::Engine;
pub use store::KeyValueStore;
pub use wal::{Event, EventKind, TransactionLogger};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of LedgerKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
