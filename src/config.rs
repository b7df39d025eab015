use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::statement::Placeholder;

/// Connection pool limits, handed to the pool builder as they are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound of open connections. Must be positive.
    pub max_open_connections: u32,
    /// Idle connections kept ready. Extra idle connections close after
    /// `idle_timeout_ms`. `None` keeps up to `max_open_connections`.
    pub max_idle_connections: Option<u32>,
    pub idle_timeout_ms: Option<u64>,
    /// Connections older than this are closed instead of reused.
    pub connection_max_lifetime_ms: Option<u64>,
    /// How long a checkout waits for a free connection.
    pub connection_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open_connections: 10,
            max_idle_connections: Some(2),
            idle_timeout_ms: Some(600_000),
            connection_max_lifetime_ms: None,
            connection_timeout_ms: 30_000,
        }
    }
}

impl PoolConfig {
    /// Limits of a pool that owns exactly one long-lived connection.
    pub(crate) fn pinned(&self) -> Self {
        Self {
            max_open_connections: 1,
            max_idle_connections: Some(1),
            idle_timeout_ms: None,
            connection_max_lifetime_ms: None,
            connection_timeout_ms: self.connection_timeout_ms,
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    pub fn connection_max_lifetime(&self) -> Option<Duration> {
        self.connection_max_lifetime_ms.map(Duration::from_millis)
    }

    /// `None` or a zero duration means connections never expire. Durations
    /// below one millisecond round up.
    pub fn set_connection_max_lifetime(&mut self, lifetime: Option<Duration>) {
        self.connection_max_lifetime_ms = lifetime
            .filter(|d| !d.is_zero())
            .map(|d| (d.as_millis() as u64).max(1));
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

/// Database configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `:memory:`, a file path, or a SQLite `file:` URI
    pub dsn: String,
    pub pool: PoolConfig,
    pub placeholder: Placeholder,
    /// How long a connection waits on a locked database file.
    pub busy_timeout_ms: Option<u64>,
}

impl DatabaseConfig {
    /// Create a new config for `dsn` with default pool limits
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            ..Default::default()
        }
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_placeholder(mut self, placeholder: Placeholder) -> Self {
        self.placeholder = placeholder;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Whether the DSN names an in-memory database: `:memory:`,
    /// `file::memory:` or a `file:` URI with `mode=memory`. Shared-cache
    /// variants count too, since they vanish with their last connection.
    pub fn is_memory(&self) -> bool {
        let dsn = self.dsn.trim();
        if dsn == ":memory:" {
            return true;
        }
        let Some(uri) = dsn.strip_prefix("file:") else {
            return false;
        };
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        path == ":memory:" || query.split('&').any(|param| param == "mode=memory")
    }
}
