//! Table descriptor: compiled SQL fragments for one entity type

use crate::connection::Parameter;
use crate::errors::{OrmError, Result};
use crate::mapping::{ComponentAccess, FieldAccess};
use crate::metadata::MetadataStore;
use crate::relation::RelationAccess;
use crate::value::{SqlType, Value};
use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Bracket-quote an identifier
pub fn quote(identifier: &str) -> String {
    format!("[{}]", identifier.replace(']', "]]"))
}

/// Parameter name derived from a column name
pub fn parameter_name(column: &str) -> String {
    column
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// One persisted attribute
#[derive(Clone)]
pub struct ColumnInfo {
    property: String,
    column: String,
    sql_type: SqlType,
    nullable: bool,
    access: Arc<dyn FieldAccess>,
}

impl ColumnInfo {
    pub(crate) fn new(
        property: &str,
        column: &str,
        sql_type: SqlType,
        nullable: bool,
        access: Arc<dyn FieldAccess>,
    ) -> Self {
        Self {
            property: property.to_string(),
            column: column.to_string(),
            sql_type,
            nullable,
            access,
        }
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    /// Keys of integer type are generated by the database
    pub fn is_generated(&self) -> bool {
        self.sql_type.is_numeric()
    }

    pub(crate) fn rename(&mut self, column: &str) {
        self.column = column.to_string();
    }

    pub(crate) fn read(&self, owner: &dyn Any) -> Result<Value> {
        self.access
            .read(owner)
            .ok_or_else(|| self.wrong_owner())
    }

    pub(crate) fn write(&self, owner: &mut dyn Any, value: Value) -> Result<()> {
        match self.access.write(owner, value) {
            Some(result) => result,
            None => Err(self.wrong_owner()),
        }
    }

    fn wrong_owner(&self) -> OrmError {
        OrmError::InvalidMapping {
            entity: self.property.clone(),
            reason: "field accessor applied to an instance of another type".to_string(),
        }
    }
}

impl fmt::Debug for ColumnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnInfo")
            .field("property", &self.property)
            .field("column", &self.column)
            .field("sql_type", &self.sql_type)
            .field("nullable", &self.nullable)
            .finish()
    }
}

/// Embedded value object flattened into the owner's row
pub struct ComponentInfo {
    property: String,
    columns: Vec<ColumnInfo>,
    pub(crate) access: Arc<dyn ComponentAccess>,
}

impl ComponentInfo {
    pub(crate) fn new(property: &str, columns: Vec<ColumnInfo>, access: Arc<dyn ComponentAccess>) -> Self {
        Self {
            property: property.to_string(),
            columns,
            access,
        }
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("property", &self.property)
            .field("columns", &self.columns)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Reference,
    Collection,
}

/// A single reference or a child collection
pub struct RelationInfo {
    property: String,
    kind: RelationKind,
    target: &'static str,
    target_type: TypeId,
    column: Option<String>,
    deferred: bool,
    pub(crate) access: Arc<dyn RelationAccess>,
}

impl RelationInfo {
    pub(crate) fn new(
        property: &str,
        kind: RelationKind,
        target: &'static str,
        target_type: TypeId,
        column: Option<String>,
        access: Arc<dyn RelationAccess>,
    ) -> Self {
        Self {
            property: property.to_string(),
            kind,
            target,
            target_type,
            column,
            deferred: true,
            access,
        }
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Entity name of the related type
    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn target_type(&self) -> TypeId {
        self.target_type
    }

    /// Explicit foreign-key column, if declared
    pub fn column_override(&self) -> Option<&str> {
        self.column.as_deref()
    }

    /// Whether the relation waits for first access before fetching
    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    pub(crate) fn set_deferred(&mut self, deferred: bool) {
        self.deferred = deferred;
    }
}

impl fmt::Debug for RelationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationInfo")
            .field("property", &self.property)
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("column", &self.column)
            .field("deferred", &self.deferred)
            .finish()
    }
}

/// Column a property resolves to, with the type its values must carry
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedColumn {
    pub column: String,
    pub sql_type: SqlType,
    pub nullable: bool,
}

#[derive(Default)]
struct FragmentCache {
    fields: OnceLock<Vec<String>>,
    select: OnceLock<String>,
    insert: OnceLock<String>,
    update: OnceLock<String>,
    delete: OnceLock<String>,
}

fn memo(cell: &OnceLock<String>, build: impl FnOnce() -> Result<String>) -> Result<String> {
    if let Some(text) = cell.get() {
        return Ok(text.clone());
    }
    let built = build()?;
    Ok(cell.get_or_init(|| built).clone())
}

struct BoundField {
    column: String,
    sql_type: Option<SqlType>,
    value: Value,
}

/// Per-entity compiled view of the mapping
pub struct TableInfo {
    entity: &'static str,
    type_id: TypeId,
    table: String,
    primary_key: Option<ColumnInfo>,
    columns: Vec<ColumnInfo>,
    components: Vec<ComponentInfo>,
    relations: Vec<RelationInfo>,
    fragments: FragmentCache,
}

impl TableInfo {
    pub(crate) fn new(
        entity: &'static str,
        type_id: TypeId,
        table: String,
        primary_key: Option<ColumnInfo>,
        columns: Vec<ColumnInfo>,
        components: Vec<ComponentInfo>,
        relations: Vec<RelationInfo>,
    ) -> Self {
        Self {
            entity,
            type_id,
            table,
            primary_key,
            columns,
            components,
            relations,
            fragments: FragmentCache::default(),
        }
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> Option<&ColumnInfo> {
        self.primary_key.as_ref()
    }

    /// # Errors
    ///
    /// Returns `MissingPrimaryKey` for projection types.
    pub fn require_primary_key(&self) -> Result<&ColumnInfo> {
        self.primary_key
            .as_ref()
            .ok_or_else(|| OrmError::MissingPrimaryKey {
                entity: self.entity.to_string(),
            })
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn components(&self) -> &[ComponentInfo] {
        &self.components
    }

    pub fn relations(&self) -> &[RelationInfo] {
        &self.relations
    }

    pub fn references(&self) -> impl Iterator<Item = &RelationInfo> {
        self.relations
            .iter()
            .filter(|r| r.kind == RelationKind::Reference)
    }

    pub fn collections(&self) -> impl Iterator<Item = &RelationInfo> {
        self.relations
            .iter()
            .filter(|r| r.kind == RelationKind::Collection)
    }

    /// A type without a primary key is a read-only projection
    pub fn is_projection(&self) -> bool {
        self.primary_key.is_none()
    }

    pub fn has_deferred_relations(&self) -> bool {
        self.relations.iter().any(RelationInfo::is_deferred)
    }

    /// Persisted column name of a property, when it is mapped
    pub fn column_name(&self, property: &str) -> Option<&str> {
        if let Some(column) = self.find_column_for_property(property) {
            return Some(column.column());
        }
        self.references()
            .find(|r| r.property == property)
            .and_then(RelationInfo::column_override)
    }

    /// Primary key or simple column, or `component.field` for component columns
    pub fn find_column_for_property(&self, property: &str) -> Option<&ColumnInfo> {
        if let Some((component, field)) = property.split_once('.') {
            return self
                .components
                .iter()
                .find(|c| c.property == component)
                .and_then(|c| c.columns.iter().find(|col| col.property == field));
        }
        self.primary_key
            .iter()
            .chain(self.columns.iter())
            .find(|c| c.property == property)
    }

    /// Resolve a property used in criteria, ordering or selection
    ///
    /// # Errors
    ///
    /// Returns `UnknownProperty` when nothing in the mapping matches.
    pub fn resolve_column(&self, property: &str, store: &MetadataStore) -> Result<ResolvedColumn> {
        if let Some(column) = self.find_column_for_property(property) {
            return Ok(ResolvedColumn {
                column: column.column.clone(),
                sql_type: column.sql_type,
                nullable: column.nullable,
            });
        }
        if let Some(reference) = self.references().find(|r| r.property == property) {
            let target = reference.access.target_table(store)?;
            let key = target.require_primary_key()?;
            return Ok(ResolvedColumn {
                column: self.reference_column(reference, store)?,
                sql_type: key.sql_type,
                nullable: true,
            });
        }
        Err(OrmError::UnknownProperty {
            entity: self.entity.to_string(),
            property: property.to_string(),
        })
    }

    /// Foreign-key column on this table that stores a reference
    ///
    /// # Errors
    ///
    /// Returns `MissingPrimaryKey` when the target is a projection.
    pub fn reference_column(&self, reference: &RelationInfo, store: &MetadataStore) -> Result<String> {
        if let Some(column) = &reference.column {
            return Ok(column.clone());
        }
        let target = reference.access.target_table(store)?;
        Ok(target.require_primary_key()?.column.clone())
    }

    /// Every reference must own a foreign-key column no other mapping uses
    ///
    /// # Errors
    ///
    /// Returns `InvalidMapping` when a reference column repeats the key, a
    /// simple column, a component column or another reference.
    pub fn check_reference_columns(&self, store: &MetadataStore) -> Result<()> {
        let taken: HashSet<&str> = self
            .primary_key
            .iter()
            .chain(self.columns.iter())
            .chain(self.components.iter().flat_map(|c| c.columns.iter()))
            .map(ColumnInfo::column)
            .collect();
        let mut referenced = HashSet::new();
        for reference in self.references() {
            let column = self.reference_column(reference, store)?;
            if taken.contains(column.as_str()) || !referenced.insert(column.clone()) {
                return Err(OrmError::InvalidMapping {
                    entity: self.entity.to_string(),
                    reason: format!(
                        "reference {} resolves to column {} which is already mapped; \
                         name its foreign-key column with reference_as",
                        reference.property, column
                    ),
                });
            }
        }
        Ok(())
    }

    /// Column on the child table that points back at this table
    ///
    /// # Errors
    ///
    /// Returns `MissingPrimaryKey` for projection types.
    pub fn collection_column(&self, collection: &RelationInfo) -> Result<String> {
        match &collection.column {
            Some(column) => Ok(column.clone()),
            None => Ok(self.require_primary_key()?.column.clone()),
        }
    }

    /// Logical field names to retrieve, primary key first, no duplicates
    ///
    /// # Errors
    ///
    /// Returns an error when a referenced type cannot be mapped.
    pub fn fields_for_select(&self, store: &MetadataStore) -> Result<&[String]> {
        if let Some(fields) = self.fragments.fields.get() {
            return Ok(fields);
        }

        let mut fields = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |name: &str| {
            if seen.insert(name.to_string()) {
                fields.push(name.to_string());
            }
        };

        if let Some(pk) = &self.primary_key {
            push(&pk.column);
        }
        for column in &self.columns {
            push(&column.column);
        }
        for component in &self.components {
            for column in &component.columns {
                push(&column.column);
            }
        }
        for reference in self.references() {
            push(&self.reference_column(reference, store)?);
        }

        Ok(self.fragments.fields.get_or_init(|| fields))
    }

    /// # Errors
    ///
    /// Returns an error when a referenced type cannot be mapped.
    pub fn select_statement_for_all_fields(&self, store: &MetadataStore) -> Result<String> {
        memo(&self.fragments.select, || {
            let table = quote(&self.table);
            let fields = self
                .fields_for_select(store)?
                .iter()
                .map(|f| format!("{}.{}", table, quote(f)))
                .collect::<Vec<_>>()
                .join(", ");
            Ok(format!("SELECT {} FROM {}", fields, table))
        })
    }

    /// INSERT without the primary key when the database generates it
    ///
    /// A generated key with nothing else to write inserts `DEFAULT VALUES`.
    ///
    /// # Errors
    ///
    /// Returns `MissingPrimaryKey` for projection types.
    pub fn insert_statement(&self, store: &MetadataStore) -> Result<String> {
        memo(&self.fragments.insert, || {
            let columns = self.insert_columns(store)?;
            if columns.is_empty() {
                return Ok(format!("INSERT INTO {} DEFAULT VALUES", quote(&self.table)));
            }
            let names = columns.iter().map(|c| quote(c)).collect::<Vec<_>>();
            let params = columns
                .iter()
                .map(|c| format!("@{}", parameter_name(c)))
                .collect::<Vec<_>>();
            Ok(format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(&self.table),
                names.join(", "),
                params.join(", ")
            ))
        })
    }

    /// Whether an UPDATE would assign anything besides the key
    ///
    /// # Errors
    ///
    /// Returns `MissingPrimaryKey` for projection types.
    pub fn has_writable_columns(&self, store: &MetadataStore) -> Result<bool> {
        Ok(!self.writable_columns(store)?.is_empty())
    }

    /// UPDATE assignment list; the WHERE clause is appended separately
    ///
    /// # Errors
    ///
    /// Returns `MissingPrimaryKey` for projection types.
    pub fn update_statement(&self, store: &MetadataStore) -> Result<String> {
        memo(&self.fragments.update, || {
            let assignments = self
                .writable_columns(store)?
                .iter()
                .map(|c| format!("{} = @{}", quote(c), parameter_name(c)))
                .collect::<Vec<_>>();
            Ok(format!(
                "UPDATE {} SET {}",
                quote(&self.table),
                assignments.join(", ")
            ))
        })
    }

    /// # Errors
    ///
    /// Returns `MissingPrimaryKey` for projection types.
    pub fn delete_statement(&self) -> Result<String> {
        memo(&self.fragments.delete, || {
            self.require_primary_key()?;
            Ok(format!("DELETE FROM {}", quote(&self.table)))
        })
    }

    /// # Errors
    ///
    /// Returns `MissingPrimaryKey` for projection types.
    pub fn add_where_clause_by_id(&self, statement: &str) -> Result<String> {
        let pk = self.require_primary_key()?;
        Ok(format!(
            "{} WHERE {}.{} = @{}",
            statement,
            quote(&self.table),
            quote(&pk.column),
            parameter_name(&pk.column)
        ))
    }

    /// Scope a statement to the rows whose `column` holds the parent's key
    pub fn add_where_clause_for_parent(&self, statement: &str, column: &str) -> String {
        format!(
            "{} WHERE {}.{} = @{}",
            statement,
            quote(&self.table),
            quote(column),
            parameter_name(column)
        )
    }

    /// Literal rendering for non-parameterized contexts
    pub fn coalesce_value(&self, value: &Value) -> String {
        value.to_sql_literal()
    }

    /// # Errors
    ///
    /// Returns `MissingPrimaryKey` for projection types.
    pub fn primary_key_value(&self, entity: &dyn Any) -> Result<Value> {
        self.require_primary_key()?.read(entity)
    }

    /// Decides insert versus update
    ///
    /// Integer keys are set when positive, string keys when non-empty.
    /// Guid keys never count as set, so saving a Guid-keyed entity inserts.
    ///
    /// # Errors
    ///
    /// Returns `MissingPrimaryKey` for projection types.
    pub fn is_primary_key_set(&self, entity: &dyn Any) -> Result<bool> {
        let value = self.primary_key_value(entity)?;
        Ok(match value {
            Value::Int16(_) | Value::Int32(_) | Value::Int64(_) => {
                value.as_i64().is_some_and(|v| v > 0)
            }
            Value::Text(s) => !s.is_empty(),
            _ => false,
        })
    }

    /// Arm or disarm lazy loading on every relation of `entity`
    pub fn set_lazy_loading(&self, entity: &mut dyn Any, enabled: bool) {
        for relation in &self.relations {
            relation.access.set_armed(entity, enabled);
        }
    }

    pub(crate) fn insert_parameters(&self, entity: &dyn Any, store: &MetadataStore) -> Result<Vec<Parameter>> {
        let columns = self.insert_columns(store)?;
        self.parameters_for(entity, store, &columns)
    }

    pub(crate) fn update_parameters(&self, entity: &dyn Any, store: &MetadataStore) -> Result<Vec<Parameter>> {
        let pk = self.require_primary_key()?;
        let mut columns = self.writable_columns(store)?;
        columns.push(pk.column.clone());
        self.parameters_for(entity, store, &columns)
    }

    fn writable_columns(&self, store: &MetadataStore) -> Result<Vec<String>> {
        let pk = self.require_primary_key()?;
        Ok(self
            .fields_for_select(store)?
            .iter()
            .filter(|f| **f != pk.column)
            .cloned()
            .collect())
    }

    fn insert_columns(&self, store: &MetadataStore) -> Result<Vec<String>> {
        let pk = self.require_primary_key()?;
        if pk.is_generated() {
            self.writable_columns(store)
        } else {
            Ok(self.fields_for_select(store)?.to_vec())
        }
    }

    fn parameters_for(&self, entity: &dyn Any, store: &MetadataStore, columns: &[String]) -> Result<Vec<Parameter>> {
        let bound = self.bound_fields(entity, store)?;
        Ok(columns
            .iter()
            .filter_map(|column| bound.iter().find(|b| &b.column == column))
            .map(|b| Parameter::new(parameter_name(&b.column), b.sql_type, b.value.clone()))
            .collect())
    }

    /// Current values of every persisted column, first mapping wins
    fn bound_fields(&self, entity: &dyn Any, store: &MetadataStore) -> Result<Vec<BoundField>> {
        let mut bound: Vec<BoundField> = Vec::new();
        let mut push = |column: &str, sql_type: Option<SqlType>, value: Value| {
            if !bound.iter().any(|b| b.column == column) {
                bound.push(BoundField {
                    column: column.to_string(),
                    sql_type,
                    value,
                });
            }
        };

        for column in self.primary_key.iter().chain(self.columns.iter()) {
            push(&column.column, Some(column.sql_type), column.read(entity)?);
        }
        for component in &self.components {
            let Some(instance) = component.access.get(entity) else {
                continue;
            };
            for column in &component.columns {
                push(&column.column, Some(column.sql_type), column.read(instance)?);
            }
        }
        for reference in self.references() {
            let column = self.reference_column(reference, store)?;
            let key = reference.access.key(entity, store)?;
            push(&column, key.sql_type(), key);
        }
        Ok(bound)
    }
}

impl fmt::Debug for TableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableInfo")
            .field("entity", &self.entity)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("columns", &self.columns)
            .field("components", &self.components)
            .field("relations", &self.relations)
            .finish()
    }
}
