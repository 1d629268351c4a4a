//! microorm-sqlite - SQLite dialect for microorm
//!
//! Provides:
//! - `SqliteConnection`, the core's connection collaborator over rusqlite
//! - `SqliteDialect` with `RETURNING` identities and a procedure catalog
//! - One-call session factory construction from a `Configuration`

pub mod connection;
pub mod db;
pub mod dialect;
pub mod errors;

pub use connection::SqliteConnection;
pub use dialect::SqliteDialect;

use microorm_core::{Configuration, SessionFactory, SessionFactoryBuilder};
use std::sync::Arc;

/// Builder wired to SQLite, for registering entities and interceptors
///
/// Procedures come from the configuration's `[procedures]` table.
///
/// # Errors
///
/// Returns a configuration error when the configuration names another
/// dialect.
pub fn session_factory_builder(configuration: Configuration) -> microorm_core::Result<SessionFactoryBuilder> {
    if !configuration.dialect.trim().eq_ignore_ascii_case("sqlite") {
        return Err(errors::wrong_dialect(&configuration.dialect).into());
    }
    let dialect = SqliteDialect::new(configuration.procedures.clone());
    Ok(SessionFactory::builder(configuration, Arc::new(dialect)))
}

/// Session factory for a SQLite configuration
///
/// Entity maps register on first use.
///
/// # Errors
///
/// Returns a configuration error when the configuration names another
/// dialect or fails validation.
pub fn session_factory(configuration: Configuration) -> microorm_core::Result<SessionFactory> {
    session_factory_builder(configuration)?.build()
}
