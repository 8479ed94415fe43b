//! Relational Adapter Layer
//!
//! Compiles queries to a dialect-free statement tree, renders that tree to
//! SQL text with named parameters, and runs it against SQLite.

pub mod compiler;
pub mod dialect;
pub mod expr;
pub mod render;
pub mod sqlite;

pub use compiler::RelationalCompiler;
pub use dialect::SqlDialect;
pub use render::{CompiledSql, Params, SqlRenderer};
pub use sqlite::SqliteAdapter;

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde_json::Value;

/// SQL value for parameterized queries
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl From<&Value> for SqlValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            // Structured values are stored as their JSON text
            other => SqlValue::Text(other.to_string()),
        }
    }
}

impl SqlValue {
    /// Convert a column value read back from SQLite
    pub fn to_json(value: ValueRef<'_>) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::from(i),
            ValueRef::Real(f) => Value::from(f),
            ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).to_string()),
            ValueRef::Blob(b) => Value::String(hex::encode(b)),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Bool(b) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(i64::from(*b))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_to_sql_value() {
        assert_eq!(SqlValue::from(&json!(3)), SqlValue::Integer(3));
        assert_eq!(SqlValue::from(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(SqlValue::from(&json!(true)), SqlValue::Bool(true));
        assert_eq!(SqlValue::from(&json!(null)), SqlValue::Null);
        assert_eq!(
            SqlValue::from(&json!({"a": 1})),
            SqlValue::Text("{\"a\":1}".to_string())
        );
        assert_eq!(SqlValue::from(&json!([1, 2])), SqlValue::Text("[1,2]".to_string()));
    }

    #[test]
    fn test_read_back() {
        assert_eq!(SqlValue::to_json(ValueRef::Integer(7)), json!(7));
        assert_eq!(SqlValue::to_json(ValueRef::Text(b"hi")), json!("hi"));
        assert_eq!(SqlValue::to_json(ValueRef::Blob(&[0xab])), json!("ab"));
    }
}
