//! Database connection management
//!
//! Opens and configures raw SQLite connections

use crate::errors::{from_rusqlite, Result};
use rusqlite::Connection;
use std::path::Path;

/// Connection string that selects a private in-memory database
pub const IN_MEMORY: &str = ":memory:";

/// Open a SQLite database at the given path
///
/// # Errors
///
/// Returns a persistence error when the file cannot be opened.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open(path).map_err(from_rusqlite)?;
    configure(&conn)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .map_err(from_rusqlite)?;
    Ok(conn)
}

/// Open an in-memory SQLite database
///
/// # Errors
///
/// Returns a persistence error when SQLite cannot allocate the database.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(from_rusqlite)?;
    configure(&conn)?;
    Ok(conn)
}

/// Open by connection string: `:memory:` or a file path
///
/// # Errors
///
/// Returns a persistence error when the database cannot be opened.
pub fn open_connection_string(connection_string: &str) -> Result<Connection> {
    let target = connection_string.trim();
    if target == IN_MEMORY {
        open_in_memory()
    } else {
        open(target)
    }
}

/// Settings applied to every connection
///
/// # Errors
///
/// Returns a persistence error when a pragma is rejected.
pub fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(from_rusqlite)?;
    Ok(())
}
