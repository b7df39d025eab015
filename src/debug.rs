//! Process-wide echo of executed SQL.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::Level;

static PRINT_SQL: AtomicBool = AtomicBool::new(false);

/// Turns statement echo at `info` level on or off. Off by default.
pub fn set_print_sql(enabled: bool) {
    PRINT_SQL.store(enabled, Ordering::Relaxed);
}

pub fn print_sql() -> bool {
    PRINT_SQL.load(Ordering::Relaxed)
}

/// Logs a script that takes no arguments.
pub(crate) fn script(op: &'static str, sql: &str) {
    if print_sql() {
        tracing::info!(op, sql, "executing statement");
    } else {
        tracing::trace!(op, sql = %sql, "executing statement");
    }
}

/// Logs a prepared statement with its bound arguments expanded in place.
/// Call after binding.
pub(crate) fn bound(op: &'static str, stmt: &rusqlite::Statement<'_>) {
    if print_sql() {
        tracing::info!(op, sql = %expanded(stmt), "executing statement");
    } else if tracing::enabled!(Level::TRACE) {
        tracing::trace!(op, sql = %expanded(stmt), "executing statement");
    }
}

fn expanded(stmt: &rusqlite::Statement<'_>) -> String {
    stmt.expanded_sql().unwrap_or_default()
}
