//! Pluggable database-specific statement strategy

use crate::connection::Connection;
use crate::errors::{OrmError, Result};
use crate::metadata::ColumnInfo;

/// Where a row cap goes in a SELECT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitPlacement {
    /// `SELECT TOP n ...`
    Top,
    /// `... LIMIT n`
    Suffix,
}

pub trait Dialect: Send + Sync {
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Returns a persistence error when the driver cannot open the connection.
    fn create_connection(&self, connection_string: &str) -> Result<Box<dyn Connection>>;

    /// Text appended to an INSERT that makes it return the generated key
    ///
    /// `None` when the key is assigned by the application.
    fn identity_statement(&self, primary_key: &ColumnInfo) -> Option<String>;

    fn limit_placement(&self) -> LimitPlacement {
        LimitPlacement::Suffix
    }

    /// Statement text for a named procedure
    ///
    /// # Errors
    ///
    /// Returns `UnknownProcedure` when the name is not known.
    fn procedure_statement(&self, name: &str) -> Result<String> {
        Err(OrmError::UnknownProcedure {
            name: name.to_string(),
        })
    }
}
