//! Tests for the transaction loggers
//!
//! These tests verify:
//! - Appends are persisted in enqueue order with increasing sequences
//! - Replay yields exactly what was appended
//! - Corrupt or out-of-order records stop replay
//! - Queue saturation never drops events
//! - Both backends honour the same lifecycle

use std::fs;
use std::path::PathBuf;

use ledgerkv::wal::{self, FileTransactionLogger, SqliteTransactionLogger};
use ledgerkv::{Event, EventKind, KeyValueStore, LedgerError, TransactionLogger};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_log(name: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(name);
    (temp_dir, path)
}

fn open_file(path: &PathBuf, capacity: usize) -> Box<dyn TransactionLogger> {
    Box::new(FileTransactionLogger::open(path, capacity).unwrap())
}

fn open_sqlite(path: &PathBuf, capacity: usize) -> Box<dyn TransactionLogger> {
    Box::new(SqliteTransactionLogger::open(path, capacity).unwrap())
}

fn read_all(logger: &mut dyn TransactionLogger) -> Vec<Event> {
    logger
        .read_events()
        .unwrap()
        .collect::<ledgerkv::Result<Vec<_>>>()
        .unwrap()
}

/// Write a mix of events and close the logger
fn write_sample(mut logger: Box<dyn TransactionLogger>) {
    logger.run().unwrap();
    logger.write_put("a", "1").unwrap();
    logger.write_put("b", "hello world").unwrap();
    logger.write_delete("a").unwrap();
    logger.write_put("c", "tab\there").unwrap();
    logger.close().unwrap();
}

// =============================================================================
// Round-Trip Tests
// =============================================================================

fn check_round_trip(mut reopened: Box<dyn TransactionLogger>) {
    let events = read_all(reopened.as_mut());

    let shape: Vec<(EventKind, &str, &str)> = events
        .iter()
        .map(|e| (e.kind, e.key.as_str(), e.value.as_str()))
        .collect();
    assert_eq!(
        shape,
        vec![
            (EventKind::Put, "a", "1"),
            (EventKind::Put, "b", "hello world"),
            (EventKind::Delete, "a", ""),
            (EventKind::Put, "c", "tab\there"),
        ]
    );
    assert!(events.windows(2).all(|w| w[0].sequence < w[1].sequence));
    assert_eq!(reopened.last_sequence(), events.last().unwrap().sequence);
}

#[test]
fn test_file_round_trip() {
    let (_temp, path) = setup_temp_log("t.log");
    write_sample(open_file(&path, 16));
    check_round_trip(open_file(&path, 16));
}

#[test]
fn test_sqlite_round_trip() {
    let (_temp, path) = setup_temp_log("events.db");
    write_sample(open_sqlite(&path, 16));
    check_round_trip(open_sqlite(&path, 16));
}

#[test]
fn test_file_sequences_are_dense() {
    let (_temp, path) = setup_temp_log("t.log");
    write_sample(open_file(&path, 16));

    let mut logger = open_file(&path, 16);
    let sequences: Vec<u64> = read_all(logger.as_mut()).iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);
}

#[test]
fn test_sequences_continue_across_restarts() {
    for sqlite in [false, true] {
        let (_temp, path) = setup_temp_log("log");
        let open = |p: &PathBuf| if sqlite { open_sqlite(p, 4) } else { open_file(p, 4) };

        write_sample(open(&path));

        let mut logger = open(&path);
        assert_eq!(read_all(logger.as_mut()).len(), 4);
        logger.run().unwrap();
        logger.write_put("d", "4").unwrap();
        logger.close().unwrap();
        assert_eq!(logger.last_sequence(), 5);

        let mut logger = open(&path);
        let events = read_all(logger.as_mut());
        assert_eq!(events.len(), 5);
        assert_eq!(events[4].key, "d");
        assert!(events.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_out_of_order_sequence_aborts_replay() {
    let (_temp, path) = setup_temp_log("t.log");
    fs::write(&path, "2\t2\ta\t1\n1\t2\tb\t2\n").unwrap();

    let mut logger = open_file(&path, 16);
    let store = KeyValueStore::new();
    let err = wal::replay(logger.as_mut(), &store).unwrap_err();

    assert!(matches!(err, LedgerError::WalCorruption(_)));
    assert!(err.to_string().contains("line 2"));
    // Records before the corruption stay applied
    assert_eq!(store.get("a").unwrap(), "1");
    assert!(store.get("b").is_err());
}

#[test]
fn test_unparseable_line_aborts_replay() {
    let (_temp, path) = setup_temp_log("t.log");
    fs::write(&path, "1\t2\ta\t1\nthis is not a record\n3\t2\tc\t3\n").unwrap();

    let mut logger = open_file(&path, 16);
    let store = KeyValueStore::new();
    let err = wal::replay(logger.as_mut(), &store).unwrap_err();

    assert!(matches!(err, LedgerError::WalCorruption(_)));
    assert!(store.get("c").is_err());
}

#[test]
fn test_zero_kind_aborts_replay() {
    let (_temp, path) = setup_temp_log("t.log");
    fs::write(&path, "1\t0\ta\t1\n").unwrap();

    let mut logger = open_file(&path, 16);
    let err = wal::verify(logger.as_mut()).unwrap_err();
    assert!(matches!(err, LedgerError::WalCorruption(_)));
}

#[test]
fn test_empty_log_replays_nothing() {
    let (_temp, path) = setup_temp_log("t.log");

    let mut logger = open_file(&path, 16);
    let result = wal::verify(logger.as_mut()).unwrap();
    assert_eq!(result.events_replayed, 0);
    assert_eq!(result.last_sequence, 0);
    assert!(path.exists());
}

// =============================================================================
// Backpressure Tests
// =============================================================================

#[test]
fn test_saturated_queue_drops_nothing() {
    for sqlite in [false, true] {
        let (_temp, path) = setup_temp_log("log");
        let open = |p: &PathBuf| if sqlite { open_sqlite(p, 2) } else { open_file(p, 2) };

        let mut logger = open(&path);
        logger.run().unwrap();
        for i in 0..200 {
            logger.write_put(&format!("key{}", i), &i.to_string()).unwrap();
        }
        logger.close().unwrap();

        let mut logger = open(&path);
        let events = read_all(logger.as_mut());
        assert_eq!(events.len(), 200);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.key, format!("key{}", i));
            assert_eq!(event.value, i.to_string());
        }
    }
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_writes_after_close_are_rejected() {
    let (_temp, path) = setup_temp_log("events.db");
    let mut logger = open_sqlite(&path, 16);
    logger.run().unwrap();
    logger.close().unwrap();

    assert!(matches!(logger.write_put("a", "1"), Err(LedgerError::LoggerNotRunning)));
    assert!(logger.close().is_ok());
    assert!(matches!(logger.run(), Err(LedgerError::LoggerAlreadyRunning)));
}

#[test]
fn test_empty_key_is_rejected() {
    let (_temp, path) = setup_temp_log("t.log");
    let mut logger = open_file(&path, 16);
    logger.run().unwrap();

    assert!(matches!(logger.write_delete(""), Err(LedgerError::InvalidKey(_))));
}

#[test]
fn test_clean_close_reports_no_error() {
    let (_temp, path) = setup_temp_log("t.log");
    let mut logger = open_file(&path, 16);
    let errors = logger.errors();
    logger.run().unwrap();
    logger.write_put("a", "1").unwrap();
    logger.close().unwrap();

    // Disconnected without a message
    assert!(errors.recv().is_err());
}
