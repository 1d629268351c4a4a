use crate::connection::SqliteConnection;
use microorm_core::metadata::quote;
use microorm_core::{ColumnInfo, Connection, Dialect, OrmError, Result};
use std::collections::BTreeMap;

/// SQLite statement strategy
///
/// Integer keys come back through `RETURNING`, limits are a `LIMIT` suffix
/// and procedures resolve from a name to statement text catalog.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect {
    procedures: BTreeMap<String, String>,
}

impl SqliteDialect {
    pub fn new(procedures: BTreeMap<String, String>) -> Self {
        Self { procedures }
    }

    pub fn with_procedure(mut self, name: impl Into<String>, statement: impl Into<String>) -> Self {
        self.procedures.insert(name.into(), statement.into());
        self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn create_connection(&self, connection_string: &str) -> Result<Box<dyn Connection>> {
        let connection = SqliteConnection::new(crate::db::open_connection_string(connection_string)?);
        tracing::debug!(connection_string, "sqlite connection opened");
        Ok(Box::new(connection))
    }

    fn identity_statement(&self, primary_key: &ColumnInfo) -> Option<String> {
        primary_key
            .is_generated()
            .then(|| format!(" RETURNING {}", quote(primary_key.column())))
    }

    fn procedure_statement(&self, name: &str) -> Result<String> {
        self.procedures
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::UnknownProcedure {
                name: name.to_string(),
            })
    }
}
