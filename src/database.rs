use std::sync::{Arc, Weak};
use std::time::Duration;

use rusqlite::Params;

use crate::config::DatabaseConfig;
use crate::debug;
use crate::error::{Error, Result};
use crate::pool::{Pool, PoolStats};
use crate::query::Query;
use crate::scan::Destination;
use crate::statement::{Placeholder, Statement};
use crate::table::Table;

/// Raw outcome of a mutating statement, as reported by SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: usize,
    /// Rowid of the most recent successful INSERT on the connection.
    pub last_insert_id: i64,
}

pub(crate) struct Shared {
    pub(crate) pool: Pool,
    pub(crate) placeholder: Placeholder,
}

impl Shared {
    /// Resolves a non-owning handle, failing once the database is closed or
    /// dropped.
    pub(crate) fn upgrade(db: &Weak<Shared>) -> Result<Arc<Shared>> {
        let shared = db.upgrade().ok_or(Error::NotOpen)?;
        if shared.pool.is_closed() {
            return Err(Error::NotOpen);
        }
        Ok(shared)
    }

    fn exec<P: Params>(&self, op: &'static str, sql: &str, params: P) -> Result<ExecResult> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let result = stmt.execute(params);
        debug::bound(op, &stmt);
        Ok(ExecResult {
            rows_affected: result?,
            last_insert_id: conn.last_insert_rowid(),
        })
    }

    pub(crate) fn exec_statement(&self, op: &'static str, stmt: &Statement) -> Result<ExecResult> {
        self.exec(op, &stmt.sql, rusqlite::params_from_iter(stmt.args.iter()))
    }
}

/// Handle owning the connection pool.
///
/// An in-memory database has a single connection, and an open query cursor
/// holds it until the cursor is exhausted or closed.
///
/// Tables and queries created from it hold non-owning references and fail
/// with [`Error::NotOpen`] once it is closed or dropped. Safe to share
/// between threads.
pub struct Database {
    shared: Arc<Shared>,
}

impl Database {
    /// Opens `dsn` (`:memory:`, a file path or a `file:` URI) with default
    /// pool limits.
    pub fn open(dsn: &str) -> Result<Self> {
        Self::open_with_config(DatabaseConfig::new(dsn))
    }

    pub fn open_with_config(config: DatabaseConfig) -> Result<Self> {
        let placeholder = config.placeholder;
        let pool = Pool::open(config)?;
        Ok(Self {
            shared: Arc::new(Shared { pool, placeholder }),
        })
    }

    fn live(&self) -> Result<&Shared> {
        if self.shared.pool.is_closed() {
            return Err(Error::NotOpen);
        }
        Ok(&self.shared)
    }

    pub fn placeholder(&self) -> Placeholder {
        self.shared.placeholder
    }

    /// Executes one statement that returns no rows.
    pub fn exec<P: Params>(&self, sql: &str, params: P) -> Result<ExecResult> {
        self.live()?.exec("exec", sql, params)
    }

    /// Executes a `;`-separated script without arguments.
    pub fn exec_batch(&self, sql: &str) -> Result<()> {
        let shared = self.live()?;
        debug::script("exec_batch", sql);
        shared.pool.get()?.execute_batch(sql)?;
        Ok(())
    }

    pub fn create_query(&self, sql: &str) -> Result<Query> {
        self.live()?;
        Query::prepare(&self.shared, sql.to_string())
    }

    /// Binds `name` after checking that the table can be selected from.
    pub fn bind_table(&self, name: &str) -> Result<Table> {
        self.live()?;
        if name.trim().is_empty() {
            return Err(Error::invalid_argument("table name is empty"));
        }
        {
            let conn = self.shared.pool.get()?;
            conn.prepare_cached(&format!("SELECT * FROM {name}"))?;
        }
        Ok(Table::new(name, Arc::downgrade(&self.shared)))
    }

    /// Fills `dest` from the first row, or fails with
    /// [`Error::EndOfResults`] when there is none.
    pub fn query_row<P: Params>(&self, sql: &str, params: P, dest: Destination<'_>) -> Result<()> {
        let mut query = self.create_query(sql)?;
        if query.execute(params)?.next(dest)? {
            Ok(())
        } else {
            Err(Error::EndOfResults)
        }
    }

    /// Closes the pool. Idempotent.
    ///
    /// Tables and queries created from this handle fail with
    /// [`Error::NotOpen`] afterwards.
    pub fn close(&self) {
        self.shared.pool.close();
    }

    pub fn is_open(&self) -> bool {
        !self.shared.pool.is_closed()
    }

    /// Rebuilds the pool with a new open-connection limit. Ignored for
    /// in-memory databases.
    pub fn set_max_open_connections(&self, n: u32) -> Result<()> {
        self.shared.pool.set_max_open_connections(n)
    }

    pub fn set_max_idle_connections(&self, n: u32) -> Result<()> {
        self.shared.pool.set_max_idle_connections(n)
    }

    /// `None` or zero disables expiry.
    pub fn set_connection_max_lifetime(&self, lifetime: Option<Duration>) -> Result<()> {
        self.shared.pool.set_connection_max_lifetime(lifetime)
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.shared.pool.stats()
    }
}
