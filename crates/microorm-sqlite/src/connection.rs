//! `Connection` over a rusqlite handle
//!
//! Parameters are bound by their `@name` placeholder. Result rows are keyed
//! by column name; when a join yields the same name twice the first column
//! wins.

use crate::db;
use crate::errors::{from_rusqlite, unreadable_column};
use microorm_core::connection::{Command, Connection, Row};
use microorm_core::value::DATETIME_FORMAT;
use microorm_core::{Result, Value};
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::Statement;
use std::path::Path;

pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Wrap a connection the caller already configured
    pub fn new(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// # Errors
    ///
    /// Returns a persistence error when the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(db::open(path)?))
    }

    /// # Errors
    ///
    /// Returns a persistence error when SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(db::open_in_memory()?))
    }

    /// Run a script of statements, e.g. schema DDL
    ///
    /// # Errors
    ///
    /// Returns a persistence error when any statement fails.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql).map_err(from_rusqlite)?;
        Ok(())
    }

    /// The underlying rusqlite handle
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }

    fn prepare(&self, command: &Command) -> Result<Statement<'_>> {
        let mut stmt = self.conn.prepare(command.text()).map_err(from_rusqlite)?;
        bind(&mut stmt, command)?;
        Ok(stmt)
    }
}

impl From<rusqlite::Connection> for SqliteConnection {
    fn from(conn: rusqlite::Connection) -> Self {
        Self::new(conn)
    }
}

impl Connection for SqliteConnection {
    fn query(&self, command: &Command) -> Result<Vec<Row>> {
        let mut stmt = self.prepare(command)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.raw_query();
        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(from_rusqlite)? {
            let mut cells = Row::with_capacity(names.len());
            for (index, name) in names.iter().enumerate() {
                let cell = row.get_ref(index).map_err(from_rusqlite)?;
                if !cells.contains_key(name) {
                    cells.insert(name.clone(), read_value(name, cell)?);
                }
            }
            result.push(cells);
        }
        tracing::trace!(rows = result.len(), "sqlite query");
        Ok(result)
    }

    fn query_scalar(&self, command: &Command) -> Result<Value> {
        let mut stmt = self.prepare(command)?;
        let name = stmt.column_name(0).map(String::from).unwrap_or_default();

        let mut rows = stmt.raw_query();
        match rows.next().map_err(from_rusqlite)? {
            Some(row) => read_value(&name, row.get_ref(0).map_err(from_rusqlite)?),
            None => Ok(Value::Null),
        }
    }

    fn execute(&self, command: &Command) -> Result<usize> {
        let mut stmt = self.prepare(command)?;
        let changed = stmt.raw_execute().map_err(from_rusqlite)?;
        Ok(changed)
    }

    fn begin(&self) -> Result<()> {
        self.execute_batch("BEGIN")
    }

    fn commit(&self) -> Result<()> {
        self.execute_batch("COMMIT")
    }

    fn rollback(&self) -> Result<()> {
        self.execute_batch("ROLLBACK")
    }
}

/// Bind each parameter to its `@name` placeholder; unused names are skipped
fn bind(stmt: &mut Statement<'_>, command: &Command) -> Result<()> {
    for parameter in command.parameters() {
        let placeholder = format!("@{}", parameter.name);
        let Some(index) = stmt.parameter_index(&placeholder).map_err(from_rusqlite)? else {
            tracing::debug!(parameter = %parameter.name, "parameter not used by statement");
            continue;
        };
        stmt.raw_bind_parameter(index, to_sqlite(&parameter.value))
            .map_err(from_rusqlite)?;
    }
    Ok(())
}

/// Storage representation: guids and date-times are stored as text
pub(crate) fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int16(v) => SqliteValue::Integer(i64::from(*v)),
        Value::Int32(v) => SqliteValue::Integer(i64::from(*v)),
        Value::Int64(v) => SqliteValue::Integer(*v),
        Value::Double(v) => SqliteValue::Real(*v),
        Value::Text(s) => SqliteValue::Text(s.clone()),
        Value::Guid(g) => SqliteValue::Text(g.hyphenated().to_string()),
        Value::DateTime(d) => SqliteValue::Text(d.format(DATETIME_FORMAT).to_string()),
        Value::Binary(bytes) => SqliteValue::Blob(bytes.clone()),
    }
}

pub(crate) fn read_value(column: &str, cell: ValueRef<'_>) -> Result<Value> {
    Ok(match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int64(v),
        ValueRef::Real(v) => Value::Double(v),
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Value::Text(text.to_string()),
            Err(e) => return Err(unreadable_column(column, &e.to_string()).into()),
        },
        ValueRef::Blob(bytes) => Value::Binary(bytes.to_vec()),
    })
}
