//! File-backed transaction logger
//!
//! Appends one tab-separated line per event and replays them in file order.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Lines, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::{LedgerError, Result};
use super::appender::{Appender, EventSink};
use super::{validate_key, Event, EventIter, TransactionLogger};

/// Transaction logger writing to a plain-text file
pub struct FileTransactionLogger {
    /// Location of the log, for diagnostics
    path: PathBuf,

    /// Log file; handed to the appender by `run`
    file: Option<File>,

    /// Pending-queue capacity
    capacity: usize,

    /// Highest sequence replayed or appended
    last_sequence: Arc<AtomicU64>,

    /// Present while the appender is running
    appender: Option<Appender>,

    /// Consumed by `run`
    error_tx: Option<Sender<LedgerError>>,
    error_rx: Receiver<LedgerError>,
}

impl FileTransactionLogger {
    /// Open or create the log file at `path`
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                LedgerError::Io(std::io::Error::new(
                    e.kind(),
                    format!("cannot open transaction log {}: {}", path.display(), e),
                ))
            })?;

        let (error_tx, error_rx) = channel::bounded(1);

        tracing::debug!(path = %path.display(), "Opened file transaction log");

        Ok(Self {
            path,
            file: Some(file),
            capacity,
            last_sequence: Arc::new(AtomicU64::new(0)),
            appender: None,
            error_tx: Some(error_tx),
            error_rx,
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn enqueue(&self, event: Event) -> Result<()> {
        validate_key(&event.key)?;
        self.appender
            .as_ref()
            .ok_or(LedgerError::LoggerNotRunning)?
            .enqueue(event)
    }
}

impl TransactionLogger for FileTransactionLogger {
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
        let (Some(file), Some(errors)) = (self.file.take(), self.error_tx.take()) else {
            // Closed loggers cannot be restarted
            return Err(LedgerError::LoggerAlreadyRunning);
        };

        let sink = FileSink {
            writer: BufWriter::new(file),
            last_sequence: self.last_sequence.load(Ordering::SeqCst),
        };
        self.appender = Some(Appender::spawn(
            "file-log",
            sink,
            self.capacity,
            errors,
            Arc::clone(&self.last_sequence),
        )?);

        tracing::info!(
            path = %self.path.display(),
            last_sequence = self.last_sequence(),
            "File transaction log accepting appends"
        );
        Ok(())
    }

    fn read_events(&mut self) -> Result<EventIter<'_>> {
        let file = self.file.as_mut().ok_or(LedgerError::ReplayAfterRun)?;
        file.seek(SeekFrom::Start(0))?;
        // Each read validates the whole history from scratch
        self.last_sequence.store(0, Ordering::SeqCst);

        Ok(Box::new(FileEventIter {
            lines: BufReader::new(&*file).lines(),
            line_number: 0,
            last_sequence: &self.last_sequence,
            done: false,
        }))
    }

    fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::SeqCst)
    }

    fn close(&mut self) -> Result<()> {
        self.file = None;
        self.error_tx = None;
        match self.appender.take() {
            Some(appender) => {
                tracing::debug!(pending = appender.pending(), "Closing file transaction log");
                appender.shutdown()
            }
            None => Ok(()),
        }
    }
}

impl Drop for FileTransactionLogger {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "File transaction log closed with error");
        }
    }
}

// =============================================================================
// Appender Sink
// =============================================================================

/// Writes events as lines, numbering them densely from the last sequence
struct FileSink {
    writer: BufWriter<File>,
    last_sequence: u64,
}

impl EventSink for FileSink {
    fn append(&mut self, event: &Event) -> Result<u64> {
        let sequence = self
            .last_sequence
            .checked_add(1)
            .ok_or_else(|| LedgerError::WalWrite("sequence space exhausted".to_string()))?;
        self.writer
            .write_all(event.encode_line(sequence).as_bytes())
            .map_err(|e| LedgerError::WalWrite(format!("sequence {}: {}", sequence, e)))?;
        self.last_sequence = sequence;
        Ok(sequence)
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| LedgerError::WalWrite(format!("flush: {}", e)))
    }

    fn finish(&mut self) -> Result<()> {
        self.flush()?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| LedgerError::WalWrite(format!("sync: {}", e)))
    }
}

// =============================================================================
// Replay Iterator
// =============================================================================

/// Parses lines lazily, enforcing strictly increasing sequence numbers
struct FileEventIter<'a> {
    lines: Lines<BufReader<&'a File>>,
    line_number: u64,
    last_sequence: &'a AtomicU64,
    done: bool,
}

impl FileEventIter<'_> {
    fn fail(&mut self, err: LedgerError) -> Option<Result<Event>> {
        self.done = true;
        Some(Err(err))
    }
}

impl Iterator for FileEventIter<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let line = match self.lines.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(e)) => return self.fail(LedgerError::Io(e)),
                Some(Ok(line)) => line,
            };
            self.line_number += 1;

            if line.trim().is_empty() {
                continue;
            }

            let event = match Event::parse_line(&line) {
                Ok(event) => event,
                Err(e) => {
                    return self.fail(LedgerError::WalCorruption(format!(
                        "line {}: {}",
                        self.line_number, e
                    )))
                }
            };

            let previous = self.last_sequence.load(Ordering::SeqCst);
            if event.sequence <= previous {
                return self.fail(LedgerError::WalCorruption(format!(
                    "line {}: sequence {} not greater than {}",
                    self.line_number, event.sequence, previous
                )));
            }
            self.last_sequence.store(event.sequence, Ordering::SeqCst);

            return Some(Ok(event));
        }
    }
}
