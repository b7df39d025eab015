//! Resolution of query destinations into per-column scan targets.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use rusqlite::types::{Value as SqlValue, ValueRef};

use crate::error::{Error, Result};
use crate::meta::{self, FieldMap, Record};
use crate::sqlite::Field;

/// Writable destination of exactly one column of a fetched row.
pub enum ScanTarget<'a> {
    Field(&'a mut dyn Field),
    /// Absorbs a column nothing asked for.
    Discard,
}

impl ScanTarget<'_> {
    pub fn is_discard(&self) -> bool {
        matches!(self, ScanTarget::Discard)
    }
}

/// What a caller hands in to receive one row.
pub enum Destination<'a> {
    /// Single out-parameter. The result must have exactly one column.
    Scalar(&'a mut dyn Field),
    /// Out-parameters matched to columns by position.
    OrderedScalars(Vec<&'a mut dyn Field>),
    /// Out-parameters matched to columns by name.
    KeyValueMap(Vec<(&'a str, &'a mut dyn Field)>),
    /// Record fields matched to columns by their mapped names.
    Record(FieldMap<&'a mut dyn Field>),
}

impl<'a> Destination<'a> {
    pub fn scalar<T: Field>(value: &'a mut T) -> Self {
        Destination::Scalar(value)
    }

    pub fn scalars(values: Vec<&'a mut dyn Field>) -> Self {
        Destination::OrderedScalars(values)
    }

    /// Existing entries of `map` receive same-named columns; no entry is added.
    pub fn map<M: ColumnMap + ?Sized>(map: &'a mut M) -> Self {
        Destination::KeyValueMap(map.slots_mut())
    }

    pub fn record<R: Record>(record: &'a mut R) -> Self {
        Destination::Record(meta::resolve_mut(record))
    }

    /// Produces one target per column, in column order.
    ///
    /// Columns without a matching name get [`ScanTarget::Discard`]. So do
    /// positions past the end of an ordered list and repeated column names.
    pub fn resolve(self, columns: &[String]) -> Result<Vec<ScanTarget<'a>>> {
        match self {
            Destination::Scalar(field) => {
                if columns.len() != 1 {
                    return Err(Error::StatementShapeMismatch {
                        columns: columns.len(),
                        expected: 1,
                    });
                }
                Ok(vec![ScanTarget::Field(field)])
            }
            Destination::OrderedScalars(fields) => {
                let mut fields = fields.into_iter();
                Ok(columns
                    .iter()
                    .map(|_| fields.next().map_or(ScanTarget::Discard, ScanTarget::Field))
                    .collect())
            }
            Destination::KeyValueMap(slots) => {
                let mut slots: HashMap<&str, &mut dyn Field> = slots.into_iter().collect();
                Ok(columns
                    .iter()
                    .map(|column| {
                        slots
                            .remove(column.as_str())
                            .map_or(ScanTarget::Discard, ScanTarget::Field)
                    })
                    .collect())
            }
            Destination::Record(mut fields) => {
                if fields.is_empty() {
                    return Err(Error::no_fields());
                }
                Ok(columns
                    .iter()
                    .map(|column| {
                        fields
                            .swap_remove(column.as_str())
                            .map_or(ScanTarget::Discard, |meta| ScanTarget::Field(meta.storage))
                    })
                    .collect())
            }
        }
    }
}

/// Builds a [`Destination::OrderedScalars`] from mutable references of
/// mixed field types.
///
/// ```
/// let (mut id, mut name) = (0i64, String::new());
/// let dest = rust_sorm::scalars![&mut id, &mut name];
/// # drop(dest);
/// ```
#[macro_export]
macro_rules! scalars {
    ($($target:expr),* $(,)?) => {
        $crate::Destination::OrderedScalars(vec![$($target as &mut dyn $crate::Field),*])
    };
}

/// Writes one fetched row through resolved targets.
pub(crate) fn fill(targets: Vec<ScanTarget<'_>>, columns: &[String], row: &[SqlValue]) -> Result<()> {
    for ((target, column), value) in targets.into_iter().zip(columns).zip(row) {
        if let ScanTarget::Field(field) = target {
            field
                .set_from(ValueRef::from(value))
                .map_err(|source| Error::Conversion {
                    column: column.clone(),
                    source,
                })?;
        }
    }
    Ok(())
}

/// A key/value mapping usable as a destination or as statement input.
pub trait ColumnMap {
    fn entries(&self) -> Vec<(&str, &dyn Field)>;

    fn slots_mut(&mut self) -> Vec<(&str, &mut dyn Field)>;
}

impl<V: Field> ColumnMap for HashMap<String, V> {
    fn entries(&self) -> Vec<(&str, &dyn Field)> {
        self.iter().map(|(k, v)| (k.as_str(), v as &dyn Field)).collect()
    }

    fn slots_mut(&mut self) -> Vec<(&str, &mut dyn Field)> {
        self.iter_mut()
            .map(|(k, v)| (k.as_str(), v as &mut dyn Field))
            .collect()
    }
}

impl<V: Field> ColumnMap for BTreeMap<String, V> {
    fn entries(&self) -> Vec<(&str, &dyn Field)> {
        self.iter().map(|(k, v)| (k.as_str(), v as &dyn Field)).collect()
    }

    fn slots_mut(&mut self) -> Vec<(&str, &mut dyn Field)> {
        self.iter_mut()
            .map(|(k, v)| (k.as_str(), v as &mut dyn Field))
            .collect()
    }
}

impl<V: Field> ColumnMap for IndexMap<String, V> {
    fn entries(&self) -> Vec<(&str, &dyn Field)> {
        self.iter().map(|(k, v)| (k.as_str(), v as &dyn Field)).collect()
    }

    fn slots_mut(&mut self) -> Vec<(&str, &mut dyn Field)> {
        self.iter_mut()
            .map(|(k, v)| (k.as_str(), v as &mut dyn Field))
            .collect()
    }
}
