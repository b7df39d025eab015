//! Connection pooling on top of `r2d2`.
//!
//! In-memory databases live and die with their connection, so an in-memory
//! DSN gets a pool pinned to exactly one connection. That connection is held
//! by any open cursor; other calls wait for it until the connection timeout.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use r2d2_sqlite::SqliteConnectionManager;

use crate::config::{DatabaseConfig, PoolConfig};
use crate::error::{Error, Result};

/// A connection checked out of the pool, returned on drop.
pub(crate) type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub open: u32,
    pub idle: u32,
}

struct Inner {
    limits: PoolConfig,
    pool: Option<r2d2::Pool<SqliteConnectionManager>>,
}

pub(crate) struct Pool {
    config: DatabaseConfig,
    memory: bool,
    inner: RwLock<Inner>,
}

impl Pool {
    /// Validates the DSN, builds the pool and health-checks one connection.
    pub(crate) fn open(config: DatabaseConfig) -> Result<Self> {
        if config.dsn.trim().is_empty() {
            return Err(Error::invalid_argument("invalid db connection string"));
        }

        let memory = config.is_memory();
        let limits = if memory {
            if config.pool.pinned() != config.pool {
                tracing::warn!(dsn = %config.dsn, "pool limits are fixed for in-memory databases");
            }
            config.pool.pinned()
        } else {
            config.pool.clone()
        };

        let pool = build(&config, &limits)?;
        pool.get()?
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        tracing::debug!(dsn = %config.dsn, memory, "database opened");

        Ok(Self {
            config,
            memory,
            inner: RwLock::new(Inner {
                limits,
                pool: Some(pool),
            }),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Checks out a connection, waiting up to the connection timeout while
    /// the pool is at its limit.
    pub(crate) fn get(&self) -> Result<PooledConnection> {
        let pool = self.read().pool.clone().ok_or(Error::NotOpen)?;
        Ok(pool.get()?)
    }

    /// Drops the pool. Idle connections close now, connections in use close
    /// when they are returned. Idempotent.
    pub(crate) fn close(&self) {
        if self.write().pool.take().is_some() {
            tracing::debug!(dsn = %self.config.dsn, "database closed");
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.read().pool.is_none()
    }

    pub(crate) fn stats(&self) -> PoolStats {
        self.read()
            .pool
            .as_ref()
            .map(|pool| {
                let state = pool.state();
                PoolStats {
                    open: state.connections,
                    idle: state.idle_connections,
                }
            })
            .unwrap_or_default()
    }

    /// Rebuilds the pool with changed limits. Connections of the previous
    /// pool close as they are returned.
    fn reconfigure(&self, apply: impl FnOnce(&mut PoolConfig)) -> Result<()> {
        if self.memory {
            tracing::warn!(dsn = %self.config.dsn, "pool limits are fixed for in-memory databases");
            return Ok(());
        }

        let mut inner = self.write();
        if inner.pool.is_none() {
            return Err(Error::NotOpen);
        }
        let mut limits = inner.limits.clone();
        apply(&mut limits);

        inner.pool = Some(build(&self.config, &limits)?);
        inner.limits = limits;
        Ok(())
    }

    pub(crate) fn set_max_open_connections(&self, n: u32) -> Result<()> {
        self.reconfigure(|limits| limits.max_open_connections = n)
    }

    pub(crate) fn set_max_idle_connections(&self, n: u32) -> Result<()> {
        self.reconfigure(|limits| limits.max_idle_connections = Some(n))
    }

    pub(crate) fn set_connection_max_lifetime(&self, lifetime: Option<Duration>) -> Result<()> {
        self.reconfigure(|limits| limits.set_connection_max_lifetime(lifetime))
    }
}

fn manager(config: &DatabaseConfig) -> SqliteConnectionManager {
    let dsn = config.dsn.trim();
    let manager = if dsn == ":memory:" {
        SqliteConnectionManager::memory()
    } else {
        SqliteConnectionManager::file(dsn)
    };

    let busy_timeout = config.busy_timeout_ms.map(Duration::from_millis);
    manager.with_init(move |conn| {
        if let Some(timeout) = busy_timeout {
            conn.busy_timeout(timeout)?;
        }
        Ok(())
    })
}

fn validate(limits: &PoolConfig) -> Result<()> {
    if limits.max_open_connections == 0 {
        return Err(Error::invalid_argument("max_open_connections must be positive"));
    }
    if limits.connection_timeout_ms == 0
        || limits.idle_timeout_ms == Some(0)
        || limits.connection_max_lifetime_ms == Some(0)
    {
        return Err(Error::invalid_argument("pool durations must be positive"));
    }
    Ok(())
}

fn build(
    config: &DatabaseConfig,
    limits: &PoolConfig,
) -> Result<r2d2::Pool<SqliteConnectionManager>> {
    validate(limits)?;
    let max_open = limits.max_open_connections;
    let pool = r2d2::Pool::builder()
        .max_size(max_open)
        .min_idle(limits.max_idle_connections.map(|n| n.min(max_open)))
        .idle_timeout(limits.idle_timeout())
        .max_lifetime(limits.connection_max_lifetime())
        .connection_timeout(limits.connection_timeout())
        .build(manager(config))?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn file_pool(pool: PoolConfig) -> (Pool, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let config = DatabaseConfig::new(file.path().to_str().unwrap()).with_pool(pool);
        (Pool::open(config).unwrap(), file)
    }

    #[test]
    fn test_empty_dsn_is_rejected() {
        let err = Pool::open(DatabaseConfig::new("  ")).err().unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_invalid_limits_are_rejected() {
        let file = NamedTempFile::new().unwrap();
        let config = DatabaseConfig::new(file.path().to_str().unwrap()).with_pool(PoolConfig {
            max_open_connections: 0,
            ..Default::default()
        });
        let err = Pool::open(config).err().unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_memory_pool_keeps_its_single_connection() {
        let pool = Pool::open(DatabaseConfig::new(":memory:")).unwrap();
        pool.get()
            .unwrap()
            .execute_batch("CREATE TABLE t(id INTEGER)")
            .unwrap();

        pool.set_max_idle_connections(0).unwrap();
        pool.set_connection_max_lifetime(Some(Duration::from_millis(1)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));

        pool.get()
            .unwrap()
            .execute("INSERT INTO t VALUES(1)", [])
            .unwrap();
        assert_eq!(pool.stats(), PoolStats { open: 1, idle: 1 });
    }

    #[test]
    fn test_memory_uri_is_pinned() {
        let config = DatabaseConfig::new("file::memory:").with_pool(PoolConfig {
            max_open_connections: 4,
            max_idle_connections: Some(0),
            ..Default::default()
        });
        let pool = Pool::open(config).unwrap();
        pool.get()
            .unwrap()
            .execute_batch("CREATE TABLE t(id INTEGER)")
            .unwrap();
        pool.get()
            .unwrap()
            .execute("INSERT INTO t VALUES(1)", [])
            .unwrap();
        assert_eq!(pool.stats().open, 1);
    }

    #[test]
    fn test_max_open_bounds_checkouts() {
        let (pool, _file) = file_pool(PoolConfig {
            max_open_connections: 1,
            max_idle_connections: Some(1),
            connection_timeout_ms: 100,
            ..Default::default()
        });
        let held = pool.get().unwrap();
        assert!(matches!(pool.get().err().unwrap(), Error::Pool(_)));
        drop(held);
        pool.get().unwrap();
        assert_eq!(pool.stats().open, 1);
    }

    #[test]
    fn test_sub_second_lifetime_keeps_connections_idle() {
        let (pool, _file) = file_pool(PoolConfig::default());
        pool.set_connection_max_lifetime(Some(Duration::from_millis(900)))
            .unwrap();
        pool.get().unwrap().execute_batch("SELECT 1").unwrap();
        assert!(pool.stats().idle >= 1);
    }

    #[test]
    fn test_closed_pool_refuses_checkout() {
        let (pool, _file) = file_pool(PoolConfig::default());
        pool.close();
        pool.close();
        assert!(pool.is_closed());
        assert!(matches!(pool.get().err().unwrap(), Error::NotOpen));
        assert_eq!(pool.stats(), PoolStats::default());
    }
}
