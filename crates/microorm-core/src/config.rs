//! Session factory configuration
//!
//! Loaded from TOML or built in code, then frozen inside the factory.
//!
//! ```toml
//! connection_string = "bank.db"
//! dialect = "sqlite"
//! show_sql = true
//! max_results = 50
//!
//! [aliases]
//! reporting = "reporting.db"
//!
//! [procedures]
//! accounts_by_name = "SELECT * FROM [Account] WHERE [Name] = @name"
//! ```

use crate::errors::{ExError, ExErrorKind, OrmError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_CONNECTION_STRING: &str = ":memory:";
pub const DEFAULT_DIALECT: &str = "sqlite";
pub const DEFAULT_MAX_RESULTS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Configuration {
    /// Used by `open_session()`
    pub connection_string: String,
    pub dialect: String,
    /// Emit a debug event with SQL text and parameters for every statement
    pub show_sql: bool,
    /// `false` materializes every relation while hydrating
    pub lazy_loading: bool,
    /// Row cap applied by `Query::to_list`; 0 disables it
    pub max_results: usize,
    pub aliases: BTreeMap<String, String>,
    /// Procedure name to statement text
    pub procedures: BTreeMap<String, String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            connection_string: DEFAULT_CONNECTION_STRING.to_string(),
            dialect: DEFAULT_DIALECT.to_string(),
            show_sql: false,
            lazy_loading: true,
            max_results: DEFAULT_MAX_RESULTS,
            aliases: BTreeMap::new(),
            procedures: BTreeMap::new(),
        }
    }
}

impl Configuration {
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` when the text is not valid TOML for
    /// this struct or fails validation.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let configuration: Self = toml::from_str(text).map_err(|e| OrmError::InvalidConfiguration {
            reason: e.to_string(),
        })?;
        configuration.validate()?;
        Ok(configuration)
    }

    /// # Errors
    ///
    /// Returns an `Io` persistence error when the file cannot be read, or
    /// `InvalidConfiguration` when its content is rejected.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ExError::new(ExErrorKind::Io)
                .with_op("load_configuration")
                .with_message(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for an empty connection string,
    /// dialect, alias target or procedure body.
    pub fn validate(&self) -> Result<()> {
        if self.connection_string.trim().is_empty() {
            return Err(invalid("connection_string must not be empty"));
        }
        if self.dialect.trim().is_empty() {
            return Err(invalid("dialect must not be empty"));
        }
        if let Some((alias, _)) = self.aliases.iter().find(|(_, cs)| cs.trim().is_empty()) {
            return Err(invalid(&format!("alias '{}' has an empty connection string", alias)));
        }
        if let Some((name, _)) = self.procedures.iter().find(|(_, sql)| sql.trim().is_empty()) {
            return Err(invalid(&format!("procedure '{}' has no statement text", name)));
        }
        Ok(())
    }

    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = connection_string.into();
        self
    }

    pub fn with_show_sql(mut self, show_sql: bool) -> Self {
        self.show_sql = show_sql;
        self
    }

    pub fn with_lazy_loading(mut self, lazy_loading: bool) -> Self {
        self.lazy_loading = lazy_loading;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>, connection_string: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), connection_string.into());
        self
    }

    pub fn with_procedure(mut self, name: impl Into<String>, statement: impl Into<String>) -> Self {
        self.procedures.insert(name.into(), statement.into());
        self
    }

    /// Connection string registered under `alias`
    ///
    /// # Errors
    ///
    /// Returns `UnknownAlias` when no such alias is configured.
    pub fn alias(&self, alias: &str) -> Result<&str> {
        self.aliases
            .get(alias)
            .map(String::as_str)
            .ok_or_else(|| OrmError::UnknownAlias {
                alias: alias.to_string(),
            })
    }
}

fn invalid(reason: &str) -> OrmError {
    OrmError::InvalidConfiguration {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Configuration::default();
        assert_eq!(config.connection_string, ":memory:");
        assert_eq!(config.dialect, "sqlite");
        assert!(!config.show_sql);
        assert!(config.lazy_loading);
        assert_eq!(config.max_results, 100);
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = Configuration::from_toml_str("").unwrap();
        assert_eq!(config, Configuration::default());
    }

    #[test]
    fn test_unknown_alias_is_error() {
        let config = Configuration::default().with_alias("reporting", "reporting.db");
        assert_eq!(config.alias("reporting").unwrap(), "reporting.db");
        assert!(matches!(
            config.alias("archive"),
            Err(OrmError::UnknownAlias { .. })
        ));
    }

    #[test]
    fn test_blank_connection_string_rejected() {
        let err = Configuration::from_toml_str("connection_string = \"  \"").unwrap_err();
        assert!(matches!(err, OrmError::InvalidConfiguration { .. }));
    }
}
