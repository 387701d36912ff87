//! SQLite-backed transaction logger
//!
//! Events live in an `events` table whose auto-increment primary key is the
//! sequence number. The database, not the appender, assigns sequences, so
//! replay trusts `ORDER BY sequence` and performs no local monotonicity check.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use rusqlite::{params, Connection};

use crate::error::{LedgerError, Result};
use super::appender::{Appender, EventSink};
use super::{validate_key, Event, EventIter, EventKind, TransactionLogger};

const TABLE_EXISTS: &str =
    "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'events')";

const CREATE_TABLE: &str = "CREATE TABLE events (
    sequence   INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type SMALLINT NOT NULL,
    key        TEXT NOT NULL,
    value      TEXT
)";

const INSERT_EVENT: &str = "INSERT INTO events (event_type, key, value) VALUES (?1, ?2, ?3)";

const SELECT_PAGE: &str = "SELECT sequence, event_type, key, value FROM events
    WHERE sequence > ?1 ORDER BY sequence LIMIT ?2";

/// Rows fetched per replay query
const REPLAY_PAGE_SIZE: usize = 512;

/// Transaction logger persisting to a SQLite database
pub struct SqliteTransactionLogger {
    path: PathBuf,

    /// Handed to the appender by `run`
    conn: Option<Connection>,

    capacity: usize,
    last_sequence: Arc<AtomicU64>,
    appender: Option<Appender>,
    error_tx: Option<Sender<LedgerError>>,
    error_rx: Receiver<LedgerError>,
}

impl SqliteTransactionLogger {
    /// Open the database at `path` and make sure the events table exists.
    ///
    /// Any connectivity or schema failure is returned here; the logger is
    /// never constructed half-initialized.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        Self::ensure_table(&conn)?;

        let (error_tx, error_rx) = channel::bounded(1);

        tracing::debug!(path = %path.display(), "Opened SQLite transaction log");

        Ok(Self {
            path,
            conn: Some(conn),
            capacity,
            last_sequence: Arc::new(AtomicU64::new(0)),
            appender: None,
            error_tx: Some(error_tx),
            error_rx,
        })
    }

    /// Database location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the events table if it is missing. Returns whether it existed.
    fn ensure_table(conn: &Connection) -> Result<bool> {
        let exists: bool = conn.query_row(TABLE_EXISTS, [], |row| row.get(0))?;
        if !exists {
            conn.execute(CREATE_TABLE, [])?;
            tracing::info!("Created events table");
        }
        Ok(exists)
    }

    fn enqueue(&self, event: Event) -> Result<()> {
        validate_key(&event.key)?;
        self.appender
            .as_ref()
            .ok_or(LedgerError::LoggerNotRunning)?
            .enqueue(event)
    }
}

impl TransactionLogger for SqliteTransactionLogger {
    fn write_put(&mut self, key: &str, value: &str) -> Result<()> {
        self.enqueue(Event::put(key, value))
    }

    fn write_delete(&mut self, key: &str) -> Result<()> {
        self.enqueue(Event::delete(key))
    }

    fn errors(&self) -> Receiver<LedgerError> {
        self.error_rx.clone()
    }

    fn run(&mut self) -> Result<()> {
        if self.appender.is_some() {
            return Err(LedgerError::LoggerAlreadyRunning);
        }
        let (Some(conn), Some(errors)) = (self.conn.take(), self.error_tx.take()) else {
            return Err(LedgerError::LoggerAlreadyRunning);
        };

        self.appender = Some(Appender::spawn(
            "sqlite-log",
            SqliteSink { conn },
            self.capacity,
            errors,
            Arc::clone(&self.last_sequence),
        )?);

        tracing::info!(
            path = %self.path.display(),
            last_sequence = self.last_sequence(),
            "SQLite transaction log accepting appends"
        );
        Ok(())
    }

    fn read_events(&mut self) -> Result<EventIter<'_>> {
        let conn = self.conn.as_ref().ok_or(LedgerError::ReplayAfterRun)?;
        // Each read validates the whole history from scratch
        self.last_sequence.store(0, Ordering::SeqCst);

        Ok(Box::new(SqliteEventIter {
            conn,
            after: 0,
            page: VecDeque::new(),
            deferred: None,
            last_sequence: &self.last_sequence,
            done: false,
        }))
    }

    fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::SeqCst)
    }

    fn close(&mut self) -> Result<()> {
        self.conn = None;
        self.error_tx = None;
        match self.appender.take() {
            Some(appender) => {
                tracing::debug!(pending = appender.pending(), "Closing SQLite transaction log");
                appender.shutdown()
            }
            None => Ok(()),
        }
    }
}

impl Drop for SqliteTransactionLogger {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "SQLite transaction log closed with error");
        }
    }
}

// =============================================================================
// Appender Sink
// =============================================================================

struct SqliteSink {
    conn: Connection,
}

impl EventSink for SqliteSink {
    fn append(&mut self, event: &Event) -> Result<u64> {
        let value = match event.kind {
            EventKind::Put => Some(event.value.as_str()),
            EventKind::Delete => None,
        };

        self.conn
            .prepare_cached(INSERT_EVENT)?
            .execute(params![event.kind.code(), event.key, value])?;

        let rowid = self.conn.last_insert_rowid();
        u64::try_from(rowid)
            .map_err(|_| LedgerError::WalWrite(format!("negative sequence {}", rowid)))
    }

    // Each INSERT commits on its own
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Replay Iterator
// =============================================================================

/// Streams rows in pages keyed on the last sequence seen
struct SqliteEventIter<'a> {
    conn: &'a Connection,
    after: i64,
    page: VecDeque<Event>,
    /// Failure hit mid-page; reported after the rows before it
    deferred: Option<LedgerError>,
    last_sequence: &'a AtomicU64,
    done: bool,
}

impl SqliteEventIter<'_> {
    fn fetch_page(&mut self) -> Result<()> {
        let conn = self.conn;
        let mut stmt = conn.prepare_cached(SELECT_PAGE)?;
        let mut rows = stmt.query(params![self.after, REPLAY_PAGE_SIZE as i64])?;

        while let Some(row) = rows.next()? {
            match row_to_event(row) {
                Ok(event) => {
                    self.after = event.sequence as i64;
                    self.page.push_back(event);
                }
                Err(e) => {
                    self.deferred = Some(e);
                    break;
                }
            }
        }
        Ok(())
    }
}

fn row_to_event(row: &rusqlite::Row<'_>) -> Result<Event> {
    let sequence: i64 = row.get(0)?;
    let code: i64 = row.get(1)?;
    let key: String = row.get(2)?;
    let value: Option<String> = row.get(3)?;

    let sequence = u64::try_from(sequence)
        .map_err(|_| LedgerError::WalCorruption(format!("negative sequence {}", sequence)))?;
    let code = u8::try_from(code)
        .map_err(|_| LedgerError::WalCorruption(format!("event_type {} out of range", code)))?;
    if key.is_empty() {
        return Err(LedgerError::WalCorruption(format!("empty key at sequence {}", sequence)));
    }

    Ok(Event {
        sequence,
        kind: EventKind::try_from(code)?,
        key,
        value: value.unwrap_or_default(),
    })
}

impl Iterator for SqliteEventIter<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.page.is_empty() && self.deferred.is_none() {
            if let Err(e) = self.fetch_page() {
                self.done = true;
                return Some(Err(e));
            }
        }

        match self.page.pop_front() {
            Some(event) => {
                self.last_sequence.fetch_max(event.sequence, Ordering::SeqCst);
                Some(Ok(event))
            }
            None => {
                self.done = true;
                self.deferred.take().map(Err)
            }
        }
    }
}
