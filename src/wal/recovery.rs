//! Replay
//!
//! Rebuilds store state from the transaction log on startup.

use crate::error::Result;
use crate::store::KeyValueStore;
use super::{EventKind, TransactionLogger};

/// Outcome of reading a transaction log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of events read
    pub events_replayed: u64,

    /// Put events among them
    pub puts: u64,

    /// Delete events among them
    pub deletes: u64,

    /// Highest sequence number seen
    pub last_sequence: u64,
}

impl RecoveryResult {
    fn record(&mut self, kind: EventKind, sequence: u64) {
        self.events_replayed += 1;
        self.last_sequence = self.last_sequence.max(sequence);
        match kind {
            EventKind::Put => self.puts += 1,
            EventKind::Delete => self.deletes += 1,
        }
    }
}

/// Apply every persisted event to `store`, in order.
///
/// Puts are upserts; Deletes of absent keys are ignored. The first read error
/// aborts replay and is returned as-is. Events applied before the error stay
/// applied, so a failed replay leaves the store unusable.
///
/// The logger is not started here; callers invoke `run()` once this returns
/// `Ok`.
pub fn replay(logger: &mut dyn TransactionLogger, store: &KeyValueStore) -> Result<RecoveryResult> {
    let mut result = RecoveryResult::default();

    for event in logger.read_events()? {
        let event = event?;
        match event.kind {
            EventKind::Put => store.put(event.key, event.value),
            EventKind::Delete => {
                // Absent keys are expected when history deletes twice
                let _ = store.delete(&event.key);
            }
        }
        result.record(event.kind, event.sequence);
    }

    tracing::info!(
        events = result.events_replayed,
        puts = result.puts,
        deletes = result.deletes,
        last_sequence = result.last_sequence,
        keys = store.len(),
        "Transaction log replayed"
    );
    Ok(result)
}

/// Read the whole log and validate it without touching any store
pub fn verify(logger: &mut dyn TransactionLogger) -> Result<RecoveryResult> {
    let mut result = RecoveryResult::default();

    for event in logger.read_events()? {
        let event = event?;
        result.record(event.kind, event.sequence);
    }

    Ok(result)
}
