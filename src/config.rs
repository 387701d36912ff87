//! Configuration for LedgerKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for a LedgerKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Transaction Log Configuration
    // -------------------------------------------------------------------------
    /// Which durable backend persists the event log
    pub backend: LoggerBackend,

    /// Capacity of the pending-event queue feeding the appender.
    /// Writers block once this many events are waiting.
    pub queue_capacity: usize,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// HTTP listen address
    pub listen_addr: String,

    /// Largest accepted request body (bytes)
    pub max_value_size: usize,
}

/// Durable backend for the transaction log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggerBackend {
    /// Tab-separated text file, one event per line
    File { path: PathBuf },

    /// SQLite database with an `events` table
    Sqlite { path: PathBuf },
}

impl LoggerBackend {
    /// Short name used in logs and CLI output
    pub fn name(&self) -> &'static str {
        match self {
            LoggerBackend::File { .. } => "file",
            LoggerBackend::Sqlite { .. } => "sqlite",
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: LoggerBackend::File {
                path: PathBuf::from("transaction.log"),
            },
            queue_capacity: 16,
            listen_addr: "127.0.0.1:8080".to_string(),
            max_value_size: 1024 * 1024, // 1 MiB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Use a file-backed transaction log at `path`
    pub fn file_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.backend = LoggerBackend::File { path: path.into() };
        self
    }

    /// Use a SQLite-backed transaction log at `path`
    pub fn sqlite_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.backend = LoggerBackend::Sqlite { path: path.into() };
        self
    }

    /// Set the backend directly
    pub fn backend(mut self, backend: LoggerBackend) -> Self {
        self.config.backend = backend;
        self
    }

    /// Set the pending-event queue capacity (minimum 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity.max(1);
        self
    }

    /// Set the HTTP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum request body size (in bytes)
    pub fn max_value_size(mut self, size: usize) -> Self {
        self.config.max_value_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.backend.name(), "file");
    }

    #[test]
    fn test_builder_clamps_capacity() {
        let config = Config::builder().queue_capacity(0).sqlite_log("db.sqlite").build();
        assert_eq!(config.queue_capacity, 1);
        assert_eq!(
            config.backend,
            LoggerBackend::Sqlite { path: PathBuf::from("db.sqlite") }
        );
    }
}
