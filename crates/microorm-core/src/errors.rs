use crate::value::SqlType;
use thiserror::Error;

/// Result type alias using OrmError
pub type Result<T> = std::result::Result<T, OrmError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that can be used for programmatic
/// error handling and testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Mapping/Configuration
    Configuration,
    MissingPrimaryKey,
    MissingSelection,
    InvalidProjection,
    InvalidMapping,
    UnknownProperty,
    UnknownProcedure,
    UnknownAlias,

    // Type checking
    TypeMismatch,
    Conversion,

    // Session state
    NotInSession,
    TransactionState,
    LazyLoadDisabled,

    // Structural/Validation
    InvalidInput,
    NotFound,

    // Integration/IO
    Io,
    Serialization,
    Persistence,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::Configuration => "ERR_CONFIGURATION",
            ExErrorKind::MissingPrimaryKey => "ERR_MISSING_PRIMARY_KEY",
            ExErrorKind::MissingSelection => "ERR_MISSING_SELECTION",
            ExErrorKind::InvalidProjection => "ERR_INVALID_PROJECTION",
            ExErrorKind::InvalidMapping => "ERR_INVALID_MAPPING",
            ExErrorKind::UnknownProperty => "ERR_UNKNOWN_PROPERTY",
            ExErrorKind::UnknownProcedure => "ERR_UNKNOWN_PROCEDURE",
            ExErrorKind::UnknownAlias => "ERR_UNKNOWN_ALIAS",
            ExErrorKind::TypeMismatch => "ERR_TYPE_MISMATCH",
            ExErrorKind::Conversion => "ERR_CONVERSION",
            ExErrorKind::NotInSession => "ERR_NOT_IN_SESSION",
            ExErrorKind::TransactionState => "ERR_TRANSACTION_STATE",
            ExErrorKind::LazyLoadDisabled => "ERR_LAZY_LOAD_DISABLED",
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether this kind is raised before any database round trip
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ExErrorKind::Configuration
                | ExErrorKind::MissingPrimaryKey
                | ExErrorKind::MissingSelection
                | ExErrorKind::InvalidProjection
                | ExErrorKind::InvalidMapping
                | ExErrorKind::UnknownAlias
        )
    }
}

/// Canonical structured error type
///
/// Carries a stable classification plus optional context for debugging.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity: Option<String>,
    table: Option<String>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity: None,
            table: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity type context
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Add table context
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the entity type context, if any
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// Get the table context, if any
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity) = &self.entity {
            write!(f, " (entity: {})", entity)?;
        }
        if let Some(table) = &self.table {
            write!(f, " (table: {})", table)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Failures raised by the mapper
#[derive(Error, Debug, Clone)]
pub enum OrmError {
    // ===== Configuration Errors =====
    /// An operation needs a primary key the entity map does not declare
    #[error("Entity {entity} has no primary key mapped")]
    MissingPrimaryKey { entity: String },

    /// A query was executed without any selection
    #[error("No selection specified for query on {entity}")]
    NoSelection { entity: String },

    /// A projection was requested onto the queried type itself
    #[error("Cannot project {entity} onto itself; use the non-projecting overload")]
    SameTypeProjection { entity: String },

    /// The entity map is malformed
    #[error("Invalid mapping for {entity}: {reason}")]
    InvalidMapping { entity: String, reason: String },

    /// A property name that the entity map does not know
    #[error("Unknown property {property} on {entity}")]
    UnknownProperty { entity: String, property: String },

    /// Stored procedure name not present in the dialect catalog
    #[error("Unknown procedure: {name}")]
    UnknownProcedure { name: String },

    /// Connection alias not present in the configuration
    #[error("Unknown connection alias: {alias}")]
    UnknownAlias { alias: String },

    /// Configuration could not be loaded or is inconsistent
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    // ===== Type Errors =====
    /// Query parameter value does not match the property's declared type
    #[error("Type check violation on {entity}.{property}: expected {expected}, got {actual}")]
    TypeMismatch {
        entity: String,
        property: String,
        expected: SqlType,
        actual: SqlType,
    },

    /// Get-by-id argument does not match the primary key's declared type
    #[error("Id for {entity} must be {expected}, got {actual}")]
    IdTypeMismatch {
        entity: String,
        expected: SqlType,
        actual: SqlType,
    },

    /// A stored value could not be decoded into the field type
    #[error("Cannot convert {found} to {expected}")]
    Conversion { expected: SqlType, found: String },

    /// Caller supplied an argument the mapper cannot use
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    // ===== Session Errors =====
    /// Load of an identity that no prior get placed in the session
    #[error("{entity} with id {id} is not in the session")]
    NotInSession { entity: String, id: String },

    /// Commit or begin in the wrong unit-of-work state
    #[error("Transaction error: {reason}")]
    TransactionState { reason: String },

    /// Mutable access to a relation whose loading is switched off
    #[error("Lazy loading is disabled for {entity}.{property}")]
    LazyLoadingDisabled { entity: String, property: String },

    // ===== Data Access =====
    /// Connection or command failure, propagated unchanged
    #[error(transparent)]
    Persistence(#[from] ExError),
}

impl OrmError {
    /// Stable classification of this error
    pub fn kind(&self) -> ExErrorKind {
        match self {
            OrmError::MissingPrimaryKey { .. } => ExErrorKind::MissingPrimaryKey,
            OrmError::NoSelection { .. } => ExErrorKind::MissingSelection,
            OrmError::SameTypeProjection { .. } => ExErrorKind::InvalidProjection,
            OrmError::InvalidMapping { .. } => ExErrorKind::InvalidMapping,
            OrmError::UnknownProperty { .. } => ExErrorKind::UnknownProperty,
            OrmError::UnknownProcedure { .. } => ExErrorKind::UnknownProcedure,
            OrmError::UnknownAlias { .. } => ExErrorKind::UnknownAlias,
            OrmError::InvalidConfiguration { .. } => ExErrorKind::Configuration,
            OrmError::TypeMismatch { .. } | OrmError::IdTypeMismatch { .. } => {
                ExErrorKind::TypeMismatch
            }
            OrmError::Conversion { .. } => ExErrorKind::Conversion,
            OrmError::InvalidInput { .. } => ExErrorKind::InvalidInput,
            OrmError::NotInSession { .. } => ExErrorKind::NotInSession,
            OrmError::TransactionState { .. } => ExErrorKind::TransactionState,
            OrmError::LazyLoadingDisabled { .. } => ExErrorKind::LazyLoadDisabled,
            OrmError::Persistence(err) => err.kind(),
        }
    }
}

impl From<OrmError> for ExError {
    fn from(err: OrmError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        match err {
            OrmError::Persistence(inner) => inner,
            OrmError::MissingPrimaryKey { entity }
            | OrmError::NoSelection { entity }
            | OrmError::SameTypeProjection { entity }
            | OrmError::InvalidMapping { entity, .. }
            | OrmError::UnknownProperty { entity, .. }
            | OrmError::TypeMismatch { entity, .. }
            | OrmError::IdTypeMismatch { entity, .. }
            | OrmError::LazyLoadingDisabled { entity, .. } => ExError::new(kind)
                .with_entity(entity)
                .with_message(message),
            OrmError::NotInSession { entity, .. } => ExError::new(kind)
                .with_op("load")
                .with_entity(entity)
                .with_message(message),
            OrmError::UnknownProcedure { .. } => ExError::new(kind)
                .with_op("procedure")
                .with_message(message),
            OrmError::UnknownAlias { .. } => ExError::new(kind)
                .with_op("open_session")
                .with_message(message),
            OrmError::TransactionState { .. } => ExError::new(kind)
                .with_op("commit")
                .with_message(message),
            OrmError::InvalidConfiguration { .. }
            | OrmError::Conversion { .. }
            | OrmError::InvalidInput { .. } => ExError::new(kind).with_message(message),
        }
    }
}
