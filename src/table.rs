use std::sync::{Arc, Weak};

use crate::database::{ExecResult, Shared};
use crate::error::Result;
use crate::filter::Filter;
use crate::meta::Record;
use crate::query::Query;
use crate::statement::{Source, Synthesizer};

/// CRUD access to one table.
///
/// Holds only the table name and a non-owning database reference; SQL text
/// and field metadata are derived again on every call. Filters given as text
/// are pasted into the statement verbatim, see [`Filter`].
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    db: Weak<Shared>,
}

impl Table {
    pub(crate) fn new(name: &str, db: Weak<Shared>) -> Self {
        Self {
            name: name.to_string(),
            db,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn with_synthesizer<T>(
        &self,
        build: impl FnOnce(&Arc<Shared>, Synthesizer<'_>) -> Result<T>,
    ) -> Result<T> {
        let shared = Shared::upgrade(&self.db)?;
        build(&shared, Synthesizer::new(&self.name, shared.placeholder))
    }

    /// Inserts a record, a column map, or values in table column order.
    pub fn insert(&self, source: Source<'_>) -> Result<ExecResult> {
        self.with_synthesizer(|shared, synth| {
            shared.exec_statement("insert", &synth.insert(&source)?)
        })
    }

    /// Updates matching rows. With an empty filter a record updates the row
    /// with its primary key, failing if it has none, and a map updates every
    /// row.
    pub fn update(&self, filter: impl Into<Filter>, source: Source<'_>) -> Result<ExecResult> {
        let filter = filter.into();
        self.with_synthesizer(|shared, synth| {
            shared.exec_statement("update", &synth.update(&filter, &source)?)
        })
    }

    /// Deletes matching rows; an empty filter deletes every row.
    pub fn delete(&self, filter: impl Into<Filter>) -> Result<ExecResult> {
        let filter = filter.into();
        self.with_synthesizer(|shared, synth| shared.exec_statement("delete", &synth.delete(&filter)))
    }

    /// Deletes the row with the primary key of `record`.
    pub fn delete_record<R: Record>(&self, record: &R) -> Result<ExecResult> {
        self.with_synthesizer(|shared, synth| {
            shared.exec_statement("delete", &synth.delete_by_key(&Source::record(record))?)
        })
    }

    /// Selects every column of the matching rows into a fresh cursor.
    pub fn query(&self, filter: impl Into<Filter>) -> Result<Query> {
        let filter = filter.into();
        self.with_synthesizer(|shared, synth| {
            let stmt = synth.select(&filter);
            let mut query = Query::prepare(shared, stmt.sql)?;
            query.execute(rusqlite::params_from_iter(stmt.args.iter()))?;
            Ok(query)
        })
    }
}
