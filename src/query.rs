//! Prepared queries and their result cursors.
//!
//! An executing query keeps its statement stepping on a checked-out
//! connection, so rows are read from SQLite one `next` at a time.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use rusqlite::types::Value as SqlValue;
use rusqlite::{CachedStatement, Connection, ErrorCode, Params, Rows};

use crate::database::Shared;
use crate::debug;
use crate::error::{Error, Result};
use crate::meta::Record;
use crate::pool::PooledConnection;
use crate::scan::{self, Destination, ScanTarget};
use crate::sqlite::Field;

/// SQLite VM instructions between two cancellation checks.
const PROGRESS_OPS: i32 = 1_000;

/// Cooperative cancellation shared between a query and other threads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Default)]
struct Interrupt {
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl Interrupt {
    fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(Error::DeadlineExceeded);
        }
        Ok(())
    }

    /// Runs `f` with a progress handler on `conn` that aborts the running
    /// statement once the token is cancelled or the deadline passes.
    fn run<T>(&self, conn: &Connection, f: impl FnOnce() -> rusqlite::Result<T>) -> Result<T> {
        self.check()?;

        let flag = self.cancel.0.clone();
        let deadline = self.deadline;
        conn.progress_handler(
            PROGRESS_OPS,
            Some(move || {
                flag.load(Ordering::Relaxed)
                    || deadline.is_some_and(|deadline| Instant::now() >= deadline)
            }),
        );
        let result = f();
        conn.progress_handler(0, None::<fn() -> bool>);

        match result {
            Ok(value) => Ok(value),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::OperationInterrupted =>
            {
                Err(self.check().err().unwrap_or(Error::Cancelled))
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Observable lifecycle of a [`Query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    /// Statement compiled, nothing executed yet.
    Created,
    /// Cursor open, rows may remain.
    Executing,
    /// Cursor consumed.
    Exhausted,
    Closed,
}

/// A statement stepping on a connection it owns.
///
/// `rows` borrows `stmt`, which borrows `conn`. Both are boxed and leaked in
/// `open` so their addresses stay fixed, and `Drop` frees them in reverse.
struct LiveRows {
    rows: Option<Rows<'static>>,
    stmt: Option<NonNull<CachedStatement<'static>>>,
    conn: NonNull<PooledConnection>,
}

impl LiveRows {
    /// Binds `params` and positions the statement before its first row.
    fn open<P: Params>(conn: PooledConnection, sql: &str, params: P) -> Result<(Self, Vec<String>)> {
        let mut live = LiveRows {
            rows: None,
            stmt: None,
            conn: NonNull::from(Box::leak(Box::new(conn))),
        };

        // SAFETY: the connection is freed only in `drop`, after the statement.
        let conn: &'static Connection = unsafe { live.conn.as_ref() };
        let mut stmt = NonNull::from(Box::leak(Box::new(conn.prepare_cached(sql)?)));
        live.stmt = Some(stmt);

        // SAFETY: the statement is freed only in `drop`, after the rows, and
        // is not touched through any other path while they are alive.
        let stmt: &'static mut CachedStatement<'static> = unsafe { stmt.as_mut() };
        let columns = stmt.column_names().into_iter().map(String::from).collect();
        let rows = live.rows.insert(stmt.query(params)?);
        if let Some(stmt) = Rows::as_ref(rows) {
            debug::bound("query", stmt);
        }
        Ok((live, columns))
    }

    /// Steps once and copies the first `width` columns of the row.
    fn step(&mut self, width: usize, interrupt: &Interrupt) -> Result<Option<Vec<SqlValue>>> {
        // SAFETY: see `open`; `self` owns the connection.
        let conn: &Connection = unsafe { self.conn.as_ref() };
        let Some(rows) = self.rows.as_mut() else {
            return Ok(None);
        };
        interrupt.run(conn, || match rows.next()? {
            Some(row) => (0..width)
                .map(|i| row.get::<_, SqlValue>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map(Some),
            None => Ok(None),
        })
    }
}

impl Drop for LiveRows {
    fn drop(&mut self) {
        // Resets the statement.
        self.rows = None;
        // SAFETY: both pointers come from `Box::leak` in `open` and are freed
        // exactly once here, the statement before the connection it borrows.
        unsafe {
            if let Some(stmt) = self.stmt.take() {
                drop(Box::from_raw(stmt.as_ptr()));
            }
            drop(Box::from_raw(self.conn.as_ptr()));
        }
    }
}

struct Cursor {
    columns: Vec<String>,
    rows: LiveRows,
}

impl Cursor {
    fn fetch(&mut self, interrupt: &Interrupt) -> Result<Option<Vec<SqlValue>>> {
        self.rows.step(self.columns.len(), interrupt)
    }
}

enum State {
    Created,
    Executing(Cursor),
    Exhausted(Vec<String>),
    Closed,
}

/// A compiled statement owning at most one open cursor.
///
/// Each [`execute`](Query::execute) replaces the previous cursor, so one
/// query can be reused with different arguments. Every call that touches the
/// cursor takes `&mut self`.
///
/// An open cursor holds a pooled connection until it is exhausted, fails,
/// or is closed. An in-memory database has a single connection, so other
/// calls on it wait for the cursor and fail with [`Error::Pool`] once the
/// connection timeout passes. A `Query` stays on the thread that created it;
/// hand its [`CancelToken`] to other threads instead.
pub struct Query {
    db: Weak<Shared>,
    sql: String,
    state: State,
    interrupt: Interrupt,
}

impl Query {
    /// Compiles `sql` once so syntax errors surface before execution.
    pub(crate) fn prepare(shared: &Arc<Shared>, sql: String) -> Result<Self> {
        {
            let conn = shared.pool.get()?;
            conn.prepare_cached(&sql)?;
        }
        Ok(Self {
            db: Arc::downgrade(shared),
            sql,
            state: State::Created,
            interrupt: Interrupt::default(),
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn state(&self) -> QueryState {
        match self.state {
            State::Created => QueryState::Created,
            State::Executing(_) => QueryState::Executing,
            State::Exhausted(_) => QueryState::Exhausted,
            State::Closed => QueryState::Closed,
        }
    }

    /// Bounds execution and row fetching. `None` removes the bound. Applies
    /// to an open cursor from its next fetch on.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.interrupt.deadline = deadline;
    }

    /// Token that aborts this query's current and future work when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.interrupt.cancel.clone()
    }

    /// Binds `params` and opens a new cursor, closing the previous one.
    ///
    /// No row is read yet; the statement runs as [`next`](Query::next) or
    /// [`all`](Query::all) step through it.
    pub fn execute<P: Params>(&mut self, params: P) -> Result<&mut Self> {
        if let State::Closed = self.state {
            return Err(Error::InvalidState("query is closed"));
        }
        let shared = Shared::upgrade(&self.db)?;
        // The old cursor may hold the only connection.
        self.state = State::Created;
        self.interrupt.check()?;

        let conn = shared.pool.get()?;
        let (rows, columns) = LiveRows::open(conn, &self.sql, params)?;
        tracing::trace!(sql = %self.sql, "cursor opened");
        self.state = State::Executing(Cursor { columns, rows });
        Ok(self)
    }

    /// Column names of the current cursor, in result order.
    pub fn columns(&self) -> Result<&[String]> {
        match &self.state {
            State::Executing(cursor) => Ok(&cursor.columns),
            State::Exhausted(columns) => Ok(columns),
            State::Created => Err(Error::InvalidState("query has not been executed")),
            State::Closed => Err(Error::InvalidState("query is closed")),
        }
    }

    /// Fills `dest` from the next row.
    ///
    /// Returns `Ok(false)` once the rows are exhausted; the cursor is closed at
    /// that point and further calls keep returning `Ok(false)`. A destination
    /// that does not fit the columns is rejected without consuming a row. A
    /// failed fetch closes the cursor.
    pub fn next(&mut self, dest: Destination<'_>) -> Result<bool> {
        Shared::upgrade(&self.db)?;
        let cursor = match &mut self.state {
            State::Created => return Err(Error::InvalidState("query has not been executed")),
            State::Closed => return Err(Error::InvalidState("query is closed")),
            State::Exhausted(_) => return Ok(false),
            State::Executing(cursor) => cursor,
        };

        let targets = dest.resolve(&cursor.columns)?;
        match cursor.fetch(&self.interrupt) {
            Ok(Some(row)) => {
                scan::fill(targets, &cursor.columns, &row)?;
                Ok(true)
            }
            Ok(None) => {
                self.finish();
                Ok(false)
            }
            Err(err) => {
                self.finish();
                Err(err)
            }
        }
    }

    /// Appends every remaining row to `out` as a record.
    ///
    /// The cursor is closed afterwards, also on error. Rows materialized
    /// before an error stay in `out`.
    pub fn all<R: Record + Default>(&mut self, out: &mut Vec<R>) -> Result<()> {
        self.drain(out, record_targets::<R>)
    }

    /// Appends every remaining row of a single-column result to `out`.
    pub fn all_scalar<T: Field + Default>(&mut self, out: &mut Vec<T>) -> Result<()> {
        self.drain(out, scalar_targets::<T>)
    }

    fn drain<T: Default>(
        &mut self,
        out: &mut Vec<T>,
        targets: impl for<'a> Fn(&'a mut T, &[String]) -> Result<Vec<ScanTarget<'a>>>,
    ) -> Result<()> {
        Shared::upgrade(&self.db)?;
        let cursor = match &mut self.state {
            State::Executing(cursor) => cursor,
            State::Exhausted(_) => return Ok(()),
            State::Created => return Err(Error::InvalidState("query has not been executed")),
            State::Closed => return Err(Error::InvalidState("query is closed")),
        };

        let result = materialize(cursor, out, &self.interrupt, targets);
        self.finish();
        result
    }

    /// Drops the live cursor and returns its connection, keeping the columns.
    fn finish(&mut self) {
        self.state = match std::mem::replace(&mut self.state, State::Closed) {
            State::Executing(Cursor { columns, rows }) => {
                drop(rows);
                State::Exhausted(columns)
            }
            state => state,
        };
    }

    /// Releases the cursor. Valid in every state; repeated calls do nothing.
    pub fn close(&mut self) {
        if !matches!(self.state, State::Closed) {
            tracing::trace!(sql = %self.sql, "query closed");
            self.state = State::Closed;
        }
    }
}

fn record_targets<'a, R: Record>(item: &'a mut R, columns: &[String]) -> Result<Vec<ScanTarget<'a>>> {
    Destination::record(item).resolve(columns)
}

fn scalar_targets<'a, T: Field>(item: &'a mut T, columns: &[String]) -> Result<Vec<ScanTarget<'a>>> {
    Destination::scalar(item).resolve(columns)
}

fn materialize<T: Default>(
    cursor: &mut Cursor,
    out: &mut Vec<T>,
    interrupt: &Interrupt,
    targets: impl for<'a> Fn(&'a mut T, &[String]) -> Result<Vec<ScanTarget<'a>>>,
) -> Result<()> {
    while let Some(row) = cursor.fetch(interrupt)? {
        let mut item = T::default();
        scan::fill(targets(&mut item, &cursor.columns)?, &cursor.columns, &row)?;
        out.push(item);
    }
    Ok(())
}
