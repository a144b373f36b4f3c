//! Session configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for opening a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum connections open at once (0 = unlimited).
    pub max_open_connections: usize,

    /// Maximum idle connections kept in the pool.
    pub max_idle_connections: usize,

    /// Prepared statements cached per connection (0 = no caching).
    pub statement_cache_size: usize,

    /// Rows buffered between a batch producer and its consumer.
    pub batch_queue_capacity: usize,

    /// How long to wait for a free connection (zero = wait indefinitely).
    pub acquire_timeout: Duration,

    /// Whether to retry once on a fresh connection after a broken one.
    pub retry_on_broken_connection: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_open_connections: 10,
            max_idle_connections: 4,
            statement_cache_size: 128,
            batch_queue_capacity: 64,
            acquire_timeout: Duration::ZERO, // wait for the caller's context
            retry_on_broken_connection: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of open connections.
    #[must_use]
    pub const fn max_open_connections(mut self, value: usize) -> Self {
        self.max_open_connections = value;
        self
    }

    /// Sets the maximum number of idle connections.
    #[must_use]
    pub const fn max_idle_connections(mut self, value: usize) -> Self {
        self.max_idle_connections = value;
        self
    }

    /// Sets the per-connection prepared statement cache size.
    #[must_use]
    pub const fn statement_cache_size(mut self, value: usize) -> Self {
        self.statement_cache_size = value;
        self
    }

    /// Sets the batch queue capacity.
    #[must_use]
    pub const fn batch_queue_capacity(mut self, value: usize) -> Self {
        self.batch_queue_capacity = value;
        self
    }

    /// Sets the connection acquire timeout.
    #[must_use]
    pub const fn acquire_timeout(mut self, value: Duration) -> Self {
        self.acquire_timeout = value;
        self
    }

    /// Sets whether broken connections are retried once.
    #[must_use]
    pub const fn retry_on_broken_connection(mut self, value: bool) -> Self {
        self.retry_on_broken_connection = value;
        self
    }
}
