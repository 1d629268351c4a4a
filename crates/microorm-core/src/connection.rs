//! Connection collaborator consumed by the statement actions
//!
//! The core never talks to a driver directly. A dialect crate implements
//! [`Connection`] over its driver and hands boxed connections to sessions.

use crate::errors::Result;
use crate::value::{SqlType, Value};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// One result row, keyed by column name
pub type Row = HashMap<String, Value>;

/// A named parameter with its declared type tag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub sql_type: Option<SqlType>,
    pub value: Value,
}

impl Parameter {
    pub fn new(name: impl Into<String>, sql_type: Option<SqlType>, value: Value) -> Self {
        Self {
            name: name.into(),
            sql_type,
            value,
        }
    }
}

/// SQL text plus bound parameters; names in the text carry an `@` prefix
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    text: String,
    parameters: Vec<Parameter>,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_parameters(mut self, parameters: impl IntoIterator<Item = Parameter>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    /// JSON object of parameter names to values, for SQL tracing
    pub fn parameter_dump(&self) -> String {
        let values: BTreeMap<&str, &Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.as_str(), &p.value))
            .collect();
        serde_json::to_string(&values).unwrap_or_default()
    }
}

/// Opaque connection capability
///
/// Implementations propagate driver failures as `OrmError::Persistence`.
pub trait Connection {
    /// Execute and return every row
    fn query(&self, command: &Command) -> Result<Vec<Row>>;

    /// Execute and return the first column of the first row, or null
    fn query_scalar(&self, command: &Command) -> Result<Value>;

    /// Execute without reading results; returns affected rows
    fn execute(&self, command: &Command) -> Result<usize>;

    fn begin(&self) -> Result<()>;
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;
}
