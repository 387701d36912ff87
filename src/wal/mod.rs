//! Transaction Log Module
//!
//! Provides durability through an append-only log of events.
//!
//! ## Responsibilities
//! - Record every Put/Delete as an [`Event`] with a sequence number
//! - Persist events asynchronously through a single appender thread
//! - Replay persisted events in sequence order on startup
//! - Surface the first append failure on a one-slot error channel
//!
//! ## Backends
//! ```text
//!               write_put / write_delete
//!                         │
//!                         ▼
//!             ┌───────────────────────┐
//!             │ bounded queue (FIFO)  │  blocks callers when full
//!             └───────────┬───────────┘
//!                         │
//!                         ▼
//!             ┌───────────────────────┐
//!             │   appender thread     │──► errors() (first failure)
//!             └───────────┬───────────┘
//!                  ┌──────┴──────┐
//!                  ▼             ▼
//!           ┌───────────┐  ┌───────────┐
//!           │ text file │  │  SQLite   │
//!           └───────────┘  └───────────┘
//! ```

mod appender;
mod event;
mod file;
mod recovery;
mod sqlite;

pub use event::{Event, EventKind};
pub use file::FileTransactionLogger;
pub use recovery::{replay, verify, RecoveryResult};
pub use sqlite::SqliteTransactionLogger;

use crossbeam::channel::Receiver;

use crate::config::{Config, LoggerBackend};
use crate::error::{LedgerError, Result};

/// Lazy, forward-only stream of persisted events in ascending sequence order.
///
/// The first `Err` ends the stream.
pub type EventIter<'a> = Box<dyn Iterator<Item = Result<Event>> + 'a>;

/// A durable, replayable log of store mutations
pub trait TransactionLogger: Send {
    /// Queue a Put event. Blocks while the pending queue is full.
    fn write_put(&mut self, key: &str, value: &str) -> Result<()>;

    /// Queue a Delete event. Blocks while the pending queue is full.
    fn write_delete(&mut self, key: &str) -> Result<()>;

    /// Receiver for the first fatal append error.
    ///
    /// At most one error is ever delivered; the channel disconnects once the
    /// appender has stopped.
    fn errors(&self) -> Receiver<LedgerError>;

    /// Start the background appender
    fn run(&mut self) -> Result<()>;

    /// Read every persisted event in order. Only valid before [`run`].
    ///
    /// [`run`]: TransactionLogger::run
    fn read_events(&mut self) -> Result<EventIter<'_>>;

    /// Highest sequence number observed by replay or assigned by an append
    fn last_sequence(&self) -> u64;

    /// Stop accepting events, wait for queued ones to be persisted and flush
    /// the backing resource. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Open the transaction logger selected by `config`
pub fn open_logger(config: &Config) -> Result<Box<dyn TransactionLogger>> {
    let logger: Box<dyn TransactionLogger> = match &config.backend {
        LoggerBackend::File { path } => {
            Box::new(FileTransactionLogger::open(path, config.queue_capacity)?)
        }
        LoggerBackend::Sqlite { path } => {
            Box::new(SqliteTransactionLogger::open(path, config.queue_capacity)?)
        }
    };

    tracing::info!(backend = config.backend.name(), "Transaction logger opened");
    Ok(logger)
}

/// Keys must be non-empty
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(LedgerError::InvalidKey("key must not be empty".to_string()));
    }
    Ok(())
}
