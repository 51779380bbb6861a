use std::path::Path;
use std::sync::Mutex;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::ToSql;
use schemaless_query::Value;

use crate::connection::{Connection, Row};
use crate::error::StoreError;

/// `Connection` backed by an embedded sqlite database. One physical
/// connection, guarded by a mutex so the type is `Send + Sync`; the core is
/// single-connection and synchronous, and the mutex just lets an
/// `Engine<SqliteConnection>` be shared across threads that still take turns.
pub struct SqliteConnection {
    inner: Mutex<rusqlite::Connection>,
}

impl SqliteConnection {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(SqliteConnection {
            inner: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn =
            rusqlite::Connection::open_in_memory().map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(SqliteConnection {
            inner: Mutex::new(conn),
        })
    }
}

fn value_to_sql(value: &Value) -> Result<SqlValue, StoreError> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(if *b { 1 } else { 0 }),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Str(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::List(_) | Value::Map(_) => {
            return Err(StoreError::TypeMismatch(
                "lists/maps cannot be bound as a SQL parameter".to_string(),
            ));
        }
    })
}

fn sql_to_value(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Str(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

fn bind(params: &[Value]) -> Result<Vec<SqlValue>, StoreError> {
    params.iter().map(value_to_sql).collect()
}

fn row_from_statement(row: &rusqlite::Row<'_>, columns: &[String]) -> rusqlite::Result<Row> {
    let mut values = Vec::with_capacity(columns.len());
    for (idx, _) in columns.iter().enumerate() {
        values.push(sql_to_value(row.get_ref(idx)?));
    }
    Ok(Row::new(columns.to_vec(), values))
}

impl Connection for SqliteConnection {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, StoreError> {
        let bound = bind(params)?;
        let refs: Vec<&dyn ToSql> = bound.iter().map(|v| v as &dyn ToSql).collect();
        let conn = self.inner.lock().unwrap();
        let affected = conn
            .execute(sql, refs.as_slice())
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(affected as u64)
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        let bound = bind(params)?;
        let refs: Vec<&dyn ToSql> = bound.iter().map(|v| v as &dyn ToSql).collect();
        let conn = self.inner.lock().unwrap();
        let mut stmt = conn.prepare(sql).map_err(|e| StoreError::Backend(e.to_string()))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let rows = stmt
            .query_map(refs.as_slice(), |r| row_from_statement(r, &columns))
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn query_row(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, StoreError> {
        let mut rows = self.query(sql, params)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(Some(rows.remove(0))),
            n => Err(StoreError::Backend(format!(
                "expected at most one row, got {n}"
            ))),
        }
    }

    fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let row = self.query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[Value::Str(table.to_string())],
        )?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_insert_select_roundtrip() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (a INTEGER, b TEXT)", &[]).unwrap();
        conn.execute(
            "INSERT INTO t (a, b) VALUES (?, ?)",
            &[Value::Int(1), Value::Str("x".to_string())],
        )
        .unwrap();
        let rows = conn.query("SELECT a, b FROM t", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("a"), Some(&Value::Int(1)));
        assert_eq!(rows[0].get("b"), Some(&Value::Str("x".to_string())));
    }

    #[test]
    fn table_exists_reflects_schema() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        assert!(!conn.table_exists("entities").unwrap());
        conn.execute("CREATE TABLE entities (id INTEGER)", &[]).unwrap();
        assert!(conn.table_exists("entities").unwrap());
    }
}
