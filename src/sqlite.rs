//! Bridge between mapped fields and SQLite storage classes.

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, Value as SqlValue, ValueRef};

/// Core value type for bind arguments and untyped column reads.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn from_output(output: ToSqlOutput<'_>) -> rusqlite::Result<Self> {
        match output {
            ToSqlOutput::Borrowed(value) => Ok(value.into()),
            ToSqlOutput::Owned(value) => Ok(value.into()),
            #[allow(unreachable_patterns)]
            _ => Err(rusqlite::Error::ToSqlConversionFailure(
                "unsupported sqlite output kind".into(),
            )),
        }
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(v) => Value::Blob(v.to_vec()),
        }
    }
}

impl From<SqlValue> for Value {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(v) => Value::Integer(v),
            SqlValue::Real(v) => Value::Real(v),
            SqlValue::Text(v) => Value::Text(v),
            SqlValue::Blob(v) => Value::Blob(v),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(&v[..])),
            Value::Boolean(v) => ToSqlOutput::Owned(SqlValue::Integer(*v as i64)),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(value.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A storage location that can be bound as an argument and written by a scan.
///
/// Implemented for every type SQLite can both encode and decode, including
/// `Option<T>` for nullable columns and [`Value`] for untyped slots.
pub trait Field {
    /// Reads the current contents as a bind argument.
    fn to_value(&self) -> rusqlite::Result<Value>;

    /// Overwrites the contents with one column of a fetched row.
    fn set_from(&mut self, value: ValueRef<'_>) -> FromSqlResult<()>;
}

impl<T: ToSql + FromSql> Field for T {
    fn to_value(&self) -> rusqlite::Result<Value> {
        Value::from_output(self.to_sql()?)
    }

    fn set_from(&mut self, value: ValueRef<'_>) -> FromSqlResult<()> {
        *self = T::column_result(value)?;
        Ok(())
    }
}
