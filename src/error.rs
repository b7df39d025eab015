use rusqlite::types::FromSqlError;
use thiserror::Error;

/// Errors returned by every operation of the mapping layer.
///
/// Nothing is retried internally; driver failures pass through unchanged as
/// [`Error::Sqlite`].
#[derive(Debug, Error)]
pub enum Error {
    /// Empty DSN, a record with no mappable fields, or an unsupported input shape.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A scalar destination was handed a result set with a different column count.
    #[error("statement returns {columns} column(s) but the destination accepts {expected}")]
    StatementShapeMismatch { columns: usize, expected: usize },

    /// The database handle was closed or dropped.
    #[error("database is not open")]
    NotOpen,

    /// A query was driven outside of the states that allow the call.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("record `{record}` has no primary key field")]
    NoPrimaryKey { record: &'static str },

    /// No (more) rows. Only single-row helpers surface this as an error.
    #[error("end of query results")]
    EndOfResults,

    #[error("cannot convert column `{column}`: {source}")]
    Conversion {
        column: String,
        #[source]
        source: FromSqlError,
    },

    #[error("query deadline exceeded")]
    DeadlineExceeded,

    #[error("query cancelled")]
    Cancelled,

    /// No connection became available in time, or the pool could not open
    /// its connections.
    #[error("connection pool: {0}")]
    Pool(#[from] r2d2::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub(crate) fn no_fields() -> Self {
        Error::invalid_argument("no valid fields found in the object")
    }

    /// Returns `true` for the expected end-of-results condition.
    pub fn is_end_of_results(&self) -> bool {
        matches!(self, Error::EndOfResults)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
