//! Engine Module
//!
//! Couples the in-memory store with its transaction log.
//!
//! ## Responsibilities
//! - Replay the log into a fresh store before serving anything
//! - Apply every mutation to memory and to the log as one step
//! - Fence mutations once the appender has failed
//! - Close and flush the log on shutdown

use crossbeam::channel::Receiver;
use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{LedgerError, Result};
use crate::store::KeyValueStore;
use crate::wal::{self, RecoveryResult, TransactionLogger};

/// The store plus its durable log
///
/// ## Concurrency Model
///
/// - **Writes** (put/delete): serialized by the `logger` mutex. The store is
///   mutated and the event enqueued while it is held, so memory order always
///   equals log order.
/// - **Reads** (get): go straight to the store's read lock; never blocked by
///   a writer waiting on a full append queue.
pub struct Engine {
    /// Configuration the engine was opened with
    config: Config,

    /// Authoritative in-memory state
    store: KeyValueStore,

    /// Durable log; its mutex is the write lock
    logger: Mutex<Box<dyn TransactionLogger>>,

    /// First append failure, once observed
    fault: RwLock<Option<String>>,

    /// One-slot channel carrying the appender's failure
    errors: Receiver<LedgerError>,

    /// Stats from startup replay
    recovery: RecoveryResult,
}

impl Engine {
    /// Open the configured logger, replay it and start appending
    ///
    /// Any corrupt or unreachable log aborts here.
    pub fn open(config: Config) -> Result<Self> {
        let logger = wal::open_logger(&config)?;
        Self::with_logger(config, logger)
    }

    /// Same as [`Engine::open`] with a logger built by the caller
    pub fn with_logger(config: Config, mut logger: Box<dyn TransactionLogger>) -> Result<Self> {
        let store = KeyValueStore::new();

        let recovery = wal::replay(logger.as_mut(), &store).map_err(|e| {
            tracing::error!(error = %e, "Replay failed, refusing to start");
            e
        })?;

        logger.run()?;
        let errors = logger.errors();

        Ok(Self {
            config,
            store,
            logger: Mutex::new(logger),
            fault: RwLock::new(None),
            errors,
            recovery,
        })
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Result<String> {
        self.store.get(key)
    }

    /// Log the Put, then store the value
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        wal::validate_key(key)?;
        let mut logger = self.logger.lock();
        self.check_fault()?;

        // Memory only changes once the event is queued
        logger.write_put(key, value).map_err(|e| self.record_fault(e))?;
        self.store.put(key, value);
        Ok(())
    }

    /// Log the Delete, then remove the key.
    ///
    /// Absent keys return `KeyNotFound` and nothing is logged.
    pub fn delete(&self, key: &str) -> Result<()> {
        wal::validate_key(key)?;
        let mut logger = self.logger.lock();
        self.check_fault()?;

        // Writers are serialized by the logger lock, so presence cannot change
        // between this check and the removal
        if !self.store.contains_key(key) {
            return Err(LedgerError::KeyNotFound);
        }
        logger.write_delete(key).map_err(|e| self.record_fault(e))?;
        self.store.delete(key)
    }

    /// Block until the appender stops.
    ///
    /// Returns the failure message if it died, `None` after a clean close.
    pub fn wait_for_fault(&self) -> Option<String> {
        if let Ok(e) = self.errors.recv() {
            Self::remember(&mut self.fault.write(), &e);
        }
        // A writer that took the failure first holds the write lock until
        // it has stored it
        self.fault.read().clone()
    }

    /// Stop the appender after it has persisted every queued event
    pub fn close(&self) -> Result<()> {
        let result = self.logger.lock().close();
        match &result {
            Ok(()) => tracing::info!(last_sequence = self.last_sequence(), "Engine closed"),
            Err(e) => tracing::error!(error = %e, "Engine closed with error"),
        }
        result
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of keys in the store
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Highest sequence replayed or appended
    pub fn last_sequence(&self) -> u64 {
        self.logger.lock().last_sequence()
    }

    /// Replay statistics from startup
    pub fn recovery(&self) -> &RecoveryResult {
        &self.recovery
    }

    /// Direct access to the store (read-only use)
    pub fn store(&self) -> &KeyValueStore {
        &self.store
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Fail fast if the appender has died
    fn check_fault(&self) -> Result<()> {
        match self.observe_fault() {
            Some(message) => Err(LedgerError::AppenderFailed(message)),
            None => Ok(()),
        }
    }

    /// Move a published failure into `fault` and return the recorded one.
    ///
    /// The channel is only drained under the write lock.
    fn observe_fault(&self) -> Option<String> {
        let mut fault = self.fault.write();
        if let Ok(e) = self.errors.try_recv() {
            Self::remember(&mut fault, &e);
        }
        fault.clone()
    }

    /// Remember the first failure and convert it to `AppenderFailed`.
    ///
    /// Lifecycle errors (a closed logger) are passed through untouched.
    fn record_fault(&self, err: LedgerError) -> LedgerError {
        match err {
            LedgerError::LoggerNotRunning | LedgerError::InvalidKey(_) => err,
            // Queue closed under us; the real cause is on the error channel
            LedgerError::AppenderStopped => match self.observe_fault() {
                Some(message) => LedgerError::AppenderFailed(message),
                None => err,
            },
            other => LedgerError::AppenderFailed(Self::remember(&mut self.fault.write(), &other)),
        }
    }

    fn remember(fault: &mut Option<String>, err: &LedgerError) -> String {
        if fault.is_none() {
            tracing::error!(error = %err, "Transaction log fault, rejecting further writes");
        }
        fault.get_or_insert_with(|| err.to_string()).clone()
    }
}
