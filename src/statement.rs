//! INSERT/UPDATE/DELETE/SELECT synthesis from record metadata.

use std::any::type_name;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::filter::{Filter, QueryOperator};
use crate::meta::{self, FieldMap, Record};
use crate::scan::ColumnMap;
use crate::sqlite::{Field, Value};

/// Bind parameter syntax of generated statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placeholder {
    /// `?`
    #[default]
    Question,
    /// `?1`, `?2`, ...
    Numbered,
}

impl Placeholder {
    /// Renders the placeholder of the 1-based argument `index`.
    pub fn render(self, index: usize) -> String {
        match self {
            Placeholder::Question => "?".to_string(),
            Placeholder::Numbered => format!("?{index}"),
        }
    }
}

/// SQL text plus its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

/// Input of INSERT and UPDATE.
pub enum Source<'a> {
    Record {
        fields: FieldMap<&'a dyn Field>,
        record: &'static str,
    },
    Map(Vec<(&'a str, &'a dyn Field)>),
    /// Values for every column in table definition order. INSERT only.
    Values(Vec<Value>),
}

impl<'a> Source<'a> {
    pub fn record<R: Record>(record: &'a R) -> Self {
        Source::Record {
            fields: meta::resolve(record),
            record: type_name::<R>(),
        }
    }

    pub fn map<M: ColumnMap + ?Sized>(map: &'a M) -> Self {
        Source::Map(map.entries())
    }

    pub fn values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Source::Values(values.into_iter().map(Into::into).collect())
    }

    /// Column/value pairs in iteration order. Errors on an empty set.
    fn assignments(&self) -> Result<Vec<(&str, Value)>> {
        let pairs: Vec<(&str, &dyn Field)> = match self {
            Source::Record { fields, .. } => fields
                .values()
                .map(|meta| (meta.column.as_str(), meta.storage))
                .collect(),
            Source::Map(entries) => entries.clone(),
            Source::Values(_) => {
                return Err(Error::invalid_argument(
                    "ordered values carry no column names, pass a record or a map",
                ))
            }
        };
        if pairs.is_empty() {
            return Err(Error::no_fields());
        }
        pairs
            .into_iter()
            .map(|(column, field)| Ok((column, field.to_value()?)))
            .collect()
    }

    /// Equality conditions on every primary-key column of a record source.
    fn primary_key_filter(&self) -> Result<Filter> {
        let Source::Record { fields, record } = self else {
            return Err(Error::invalid_argument(
                "primary key lookup needs a record",
            ));
        };

        let mut filter = Filter::new();
        for meta in fields.values().filter(|meta| meta.primary_key) {
            filter = filter.with_condition(&meta.column, QueryOperator::Equal(meta.storage.to_value()?));
        }
        if filter.is_all() {
            return Err(Error::NoPrimaryKey { record: *record });
        }
        Ok(filter)
    }
}

/// Builds statements against one table.
///
/// Table and column names are emitted as given; they are not quoted.
#[derive(Debug, Clone, Copy)]
pub struct Synthesizer<'t> {
    table: &'t str,
    placeholder: Placeholder,
}

impl<'t> Synthesizer<'t> {
    pub fn new(table: &'t str, placeholder: Placeholder) -> Self {
        Self { table, placeholder }
    }

    fn placeholders(&self, count: usize, first: usize) -> String {
        (first + 1..=first + count)
            .map(|i| self.placeholder.render(i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn push_filter(&self, sql: &mut String, args: &mut Vec<Value>, filter: &Filter) {
        if let Some((expr, filter_args)) = filter.render(self.placeholder, args.len()) {
            sql.push_str(" WHERE ");
            sql.push_str(&expr);
            args.extend(filter_args);
        }
    }

    pub fn insert(&self, source: &Source<'_>) -> Result<Statement> {
        if let Source::Values(values) = source {
            if values.is_empty() {
                return Err(Error::invalid_argument("insert needs at least one value"));
            }
            return Ok(Statement {
                sql: format!(
                    "INSERT INTO {} VALUES({})",
                    self.table,
                    self.placeholders(values.len(), 0)
                ),
                args: values.clone(),
            });
        }

        let (columns, args): (Vec<&str>, Vec<Value>) = source.assignments()?.into_iter().unzip();
        Ok(Statement {
            sql: format!(
                "INSERT INTO {}({}) VALUES({})",
                self.table,
                columns.join(", "),
                self.placeholders(columns.len(), 0)
            ),
            args,
        })
    }

    /// `UPDATE ... SET`. An empty filter on a record source targets the
    /// record's primary key; on a map source it targets every row.
    pub fn update(&self, filter: &Filter, source: &Source<'_>) -> Result<Statement> {
        let assignments = source.assignments()?;

        let derived;
        let filter = match source {
            Source::Record { .. } if filter.is_all() => {
                derived = source.primary_key_filter()?;
                &derived
            }
            _ => filter,
        };

        let mut args = Vec::with_capacity(assignments.len());
        let mut sets = Vec::with_capacity(assignments.len());
        for (column, value) in assignments {
            args.push(value);
            sets.push(format!("{column} = {}", self.placeholder.render(args.len())));
        }

        let mut sql = format!("UPDATE {} SET {}", self.table, sets.join(", "));
        self.push_filter(&mut sql, &mut args, filter);
        Ok(Statement { sql, args })
    }

    pub fn delete(&self, filter: &Filter) -> Statement {
        let mut sql = format!("DELETE FROM {}", self.table);
        let mut args = Vec::new();
        self.push_filter(&mut sql, &mut args, filter);
        Statement { sql, args }
    }

    /// DELETE matching the primary key of a record source.
    pub fn delete_by_key(&self, source: &Source<'_>) -> Result<Statement> {
        if let Source::Record { fields, .. } = source {
            if fields.is_empty() {
                return Err(Error::no_fields());
            }
        }
        Ok(self.delete(&source.primary_key_filter()?))
    }

    pub fn select(&self, filter: &Filter) -> Statement {
        let mut sql = format!("SELECT * FROM {}", self.table);
        let mut args = Vec::new();
        self.push_filter(&mut sql, &mut args, filter);
        Statement { sql, args }
    }
}
