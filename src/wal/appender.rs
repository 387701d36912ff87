//! Appender
//!
//! The single-writer pipeline shared by every backend: a bounded queue
//! feeding one background thread that persists events in FIFO order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::{LedgerError, Result};
use super::Event;

/// Durable destination for appended events.
///
/// Owned exclusively by the appender thread.
pub(crate) trait EventSink: Send + 'static {
    /// Persist one event, returning the sequence number it was stored under
    fn append(&mut self, event: &Event) -> Result<u64>;

    /// Push buffered output to the backing resource
    fn flush(&mut self) -> Result<()>;

    /// Called once after the queue closes cleanly
    fn finish(&mut self) -> Result<()> {
        self.flush()
    }
}

/// Handle to a running appender thread
pub(crate) struct Appender {
    /// Producer side of the pending-event queue
    events: Sender<Event>,

    /// Background writer; yields its terminal status
    handle: JoinHandle<Result<()>>,
}

impl Appender {
    /// Start the appender thread.
    ///
    /// `errors` is the one-slot channel on which the first failure is
    /// published; `last_sequence` is advanced after each durable append.
    pub(crate) fn spawn<S: EventSink>(
        name: &str,
        mut sink: S,
        capacity: usize,
        errors: Sender<LedgerError>,
        last_sequence: Arc<AtomicU64>,
    ) -> Result<Self> {
        let (tx, rx) = channel::bounded(capacity.max(1));

        let handle = thread::Builder::new()
            .name(format!("{}-appender", name))
            .spawn(move || {
                tracing::debug!("Appender started");
                // A panicking sink must still publish a fault
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    drain(&mut sink, &rx, &last_sequence)
                }))
                .unwrap_or_else(|_| Err(LedgerError::WalWrite("event sink panicked".to_string())));
                // Later enqueues must fail rather than block on a dead queue
                drop(rx);

                match outcome {
                    Ok(()) => {
                        tracing::debug!(
                            last_sequence = last_sequence.load(Ordering::SeqCst),
                            "Appender drained and stopped"
                        );
                        Ok(())
                    }
                    Err(e) => {
                        let message = e.to_string();
                        tracing::error!(error = %message, "Appender failed, transaction log is no longer trustworthy");
                        let _ = errors.try_send(e);
                        Err(LedgerError::AppenderFailed(message))
                    }
                }
            })?;

        Ok(Self { events: tx, handle })
    }

    /// Queue an event, blocking while the queue is full
    pub(crate) fn enqueue(&self, event: Event) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| LedgerError::AppenderStopped)
    }

    /// Number of events waiting to be persisted
    pub(crate) fn pending(&self) -> usize {
        self.events.len()
    }

    /// Close the queue and wait for every queued event to be written
    pub(crate) fn shutdown(self) -> Result<()> {
        let Appender { events, handle } = self;
        drop(events);

        handle
            .join()
            .map_err(|_| LedgerError::AppenderFailed("appender thread panicked".to_string()))?
    }
}

fn drain<S: EventSink>(
    sink: &mut S,
    rx: &Receiver<Event>,
    last_sequence: &AtomicU64,
) -> Result<()> {
    while let Ok(event) = rx.recv() {
        let sequence = sink.append(&event)?;
        last_sequence.store(sequence, Ordering::SeqCst);
        tracing::trace!(sequence, kind = %event.kind, key = %event.key, "Event appended");

        // Batch writes while producers keep the queue busy
        if rx.is_empty() {
            sink.flush()?;
        }
    }

    sink.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records appended keys; fails on the configured key and panics on "boom"
    struct MemorySink {
        written: Arc<Mutex<Vec<String>>>,
        fail_on: Option<String>,
        next: u64,
    }

    impl EventSink for MemorySink {
        fn append(&mut self, event: &Event) -> Result<u64> {
            if self.fail_on.as_deref() == Some(event.key.as_str()) {
                return Err(LedgerError::WalWrite("disk full".to_string()));
            }
            if event.key == "boom" {
                panic!("sink exploded");
            }
            self.next += 1;
            self.written.lock().push(event.key.clone());
            Ok(self.next)
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn sink(fail_on: Option<&str>) -> (MemorySink, Arc<Mutex<Vec<String>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let sink = MemorySink {
            written: Arc::clone(&written),
            fail_on: fail_on.map(str::to_string),
            next: 0,
        };
        (sink, written)
    }

    #[test]
    fn test_drains_in_fifo_order() {
        let (sink, written) = sink(None);
        let (err_tx, err_rx) = channel::bounded(1);
        let last = Arc::new(AtomicU64::new(0));
        let appender = Appender::spawn("test", sink, 2, err_tx, Arc::clone(&last)).unwrap();

        for i in 0..50 {
            appender.enqueue(Event::put(format!("k{}", i), "v")).unwrap();
        }
        appender.shutdown().unwrap();

        let expected: Vec<String> = (0..50).map(|i| format!("k{}", i)).collect();
        assert_eq!(*written.lock(), expected);
        assert_eq!(last.load(Ordering::SeqCst), 50);
        assert!(err_rx.try_recv().is_err());
    }

    #[test]
    fn test_failure_published_once_and_fences_writes() {
        let (sink, written) = sink(Some("bad"));
        let (err_tx, err_rx) = channel::bounded(1);
        let last = Arc::new(AtomicU64::new(0));
        let appender = Appender::spawn("test", sink, 4, err_tx, last).unwrap();

        appender.enqueue(Event::put("good", "v")).unwrap();
        appender.enqueue(Event::put("bad", "v")).unwrap();

        let err = err_rx.recv().unwrap();
        assert!(matches!(err, LedgerError::WalWrite(_)));

        // Once the thread exits the queue is closed
        let mut fenced = false;
        for _ in 0..100 {
            if appender.enqueue(Event::put("late", "v")).is_err() {
                fenced = true;
                break;
            }
            thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(fenced);
        assert!(err_rx.recv().is_err());

        assert!(matches!(appender.shutdown(), Err(LedgerError::AppenderFailed(_))));
        assert_eq!(*written.lock(), vec!["good".to_string()]);
    }

    #[test]
    fn test_panicking_sink_publishes_fault() {
        let (sink, written) = sink(None);
        let (err_tx, err_rx) = channel::bounded(1);
        let last = Arc::new(AtomicU64::new(0));
        let appender = Appender::spawn("test", sink, 4, err_tx, Arc::clone(&last)).unwrap();

        appender.enqueue(Event::put("good", "v")).unwrap();
        appender.enqueue(Event::put("boom", "v")).unwrap();

        let err = err_rx.recv().unwrap();
        assert!(err.to_string().contains("panicked"));
        assert!(matches!(appender.shutdown(), Err(LedgerError::AppenderFailed(_))));
        assert_eq!(*written.lock(), vec!["good".to_string()]);
        assert_eq!(last.load(Ordering::SeqCst), 1);
    }
}
