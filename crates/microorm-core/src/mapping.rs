//! Declarative entity mapping
//!
//! Each persisted type implements [`Entity`] and describes itself through an
//! [`EntityMap`]: table name, primary key, simple columns, embedded
//! components, single references and child collections. Field access is
//! captured as plain function pointers, so classification is a pure function
//! over the declaration and needs no runtime type inspection.
//!
//! ```
//! use microorm_core::{Entity, EntityMap};
//!
//! #[derive(Debug, Default)]
//! struct Account {
//!     id: i32,
//!     number: String,
//! }
//!
//! impl Entity for Account {
//!     fn map(map: &mut EntityMap<Self>) {
//!         map.table("Account")
//!             .primary_key_as("id", "AccountId", |a| &a.id, |a| &mut a.id)
//!             .column_as("number", "AccountNumber", |a| &a.number, |a| &mut a.number);
//!     }
//! }
//! ```

use crate::errors::{OrmError, Result};
use crate::metadata::table_info::{ColumnInfo, ComponentInfo, RelationInfo, RelationKind, TableInfo};
use crate::relation::{Collection, CollectionField, Reference, ReferenceField};
use crate::value::{ColumnValue, SqlType, Value};
use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

/// A type persisted to its own table
pub trait Entity: Default + 'static {
    /// Describe the persistence mapping of this type
    fn map(map: &mut EntityMap<Self>);

    /// Short type name used in errors and logs
    fn entity_name() -> &'static str {
        type_name_of::<Self>()
    }
}

/// A value object whose fields flatten into the owning entity's row
pub trait Component: Default + 'static {
    fn map(map: &mut ComponentMap<Self>);
}

/// Last path segment of a type name, without generic arguments
pub fn type_name_of<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

// ===== Erased field access =====

pub(crate) trait FieldAccess: Send + Sync {
    fn read(&self, owner: &dyn Any) -> Option<Value>;
    fn write(&self, owner: &mut dyn Any, value: Value) -> Option<Result<()>>;
}

struct TypedField<T, F> {
    get: fn(&T) -> &F,
    get_mut: fn(&mut T) -> &mut F,
}

impl<T: 'static, F: ColumnValue> FieldAccess for TypedField<T, F> {
    fn read(&self, owner: &dyn Any) -> Option<Value> {
        owner.downcast_ref::<T>().map(|t| (self.get)(t).to_value())
    }

    fn write(&self, owner: &mut dyn Any, value: Value) -> Option<Result<()>> {
        let target = owner.downcast_mut::<T>()?;
        Some(F::from_value(value).map(|decoded| *(self.get_mut)(target) = decoded))
    }
}

pub(crate) trait ComponentAccess: Send + Sync {
    fn get<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Any>;
    fn get_mut<'a>(&self, owner: &'a mut dyn Any) -> Option<&'a mut dyn Any>;
}

struct TypedComponent<T, C> {
    get: fn(&T) -> &C,
    get_mut: fn(&mut T) -> &mut C,
}

impl<T: 'static, C: Component> ComponentAccess for TypedComponent<T, C> {
    fn get<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Any> {
        owner.downcast_ref::<T>().map(|t| (self.get)(t) as &dyn Any)
    }

    fn get_mut<'a>(&self, owner: &'a mut dyn Any) -> Option<&'a mut dyn Any> {
        owner
            .downcast_mut::<T>()
            .map(|t| (self.get_mut)(t) as &mut dyn Any)
    }
}

fn column_info<T: 'static, F: ColumnValue>(
    property: &str,
    column: &str,
    get: fn(&T) -> &F,
    get_mut: fn(&mut T) -> &mut F,
) -> ColumnInfo {
    ColumnInfo::new(
        property,
        column,
        F::SQL_TYPE,
        F::NULLABLE,
        Arc::new(TypedField { get, get_mut }),
    )
}

// ===== Builders =====

/// Fluent mapping declaration for one entity type
pub struct EntityMap<T> {
    table: Option<String>,
    primary_key: Option<ColumnInfo>,
    columns: Vec<ColumnInfo>,
    components: Vec<ComponentInfo>,
    relations: Vec<RelationInfo>,
    errors: Vec<String>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> EntityMap<T> {
    pub(crate) fn new() -> Self {
        Self {
            table: None,
            primary_key: None,
            columns: Vec::new(),
            components: Vec::new(),
            relations: Vec::new(),
            errors: Vec::new(),
            _entity: PhantomData,
        }
    }

    /// Override the table name (defaults to the type name)
    pub fn table(&mut self, name: &str) -> &mut Self {
        self.table = Some(name.to_string());
        self
    }

    pub fn primary_key<F: ColumnValue>(
        &mut self,
        property: &str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> &mut Self {
        self.primary_key_as(property, property, get, get_mut)
    }

    pub fn primary_key_as<F: ColumnValue>(
        &mut self,
        property: &str,
        column: &str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> &mut Self {
        if self.primary_key.is_some() {
            self.errors
                .push(format!("primary key declared twice ({})", property));
        }
        self.primary_key = Some(column_info(property, column, get, get_mut));
        self
    }

    pub fn column<F: ColumnValue>(
        &mut self,
        property: &str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> &mut Self {
        self.column_as(property, property, get, get_mut)
    }

    pub fn column_as<F: ColumnValue>(
        &mut self,
        property: &str,
        column: &str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> &mut Self {
        self.columns
            .push(column_info(property, column, get, get_mut));
        self
    }

    pub fn component<C: Component>(
        &mut self,
        property: &str,
        get: fn(&T) -> &C,
        get_mut: fn(&mut T) -> &mut C,
    ) -> &mut Self {
        self.component_with(property, get, get_mut, &[])
    }

    /// Embed a component, renaming some of its columns
    ///
    /// `overrides` pairs a component property with the column name it is
    /// stored under in this entity's table.
    pub fn component_with<C: Component>(
        &mut self,
        property: &str,
        get: fn(&T) -> &C,
        get_mut: fn(&mut T) -> &mut C,
        overrides: &[(&str, &str)],
    ) -> &mut Self {
        let mut component = ComponentMap::<C>::new();
        C::map(&mut component);
        let mut columns = component.columns;
        for (field, column) in overrides {
            match columns.iter_mut().find(|c| c.property() == *field) {
                Some(info) => info.rename(column),
                None => self.errors.push(format!(
                    "component {} has no property {}",
                    property, field
                )),
            }
        }
        self.components.push(ComponentInfo::new(
            property,
            columns,
            Arc::new(TypedComponent { get, get_mut }),
        ));
        self
    }

    /// Many-to-one link stored as the target's primary-key column
    pub fn reference<D: Entity>(
        &mut self,
        property: &str,
        get: fn(&T) -> &Reference<D>,
        get_mut: fn(&mut T) -> &mut Reference<D>,
    ) -> &mut Self {
        self.push_relation::<D>(
            property,
            RelationKind::Reference,
            None,
            Arc::new(ReferenceField { get, get_mut }),
        )
    }

    /// Many-to-one link stored under an explicit foreign-key column
    pub fn reference_as<D: Entity>(
        &mut self,
        property: &str,
        column: &str,
        get: fn(&T) -> &Reference<D>,
        get_mut: fn(&mut T) -> &mut Reference<D>,
    ) -> &mut Self {
        self.push_relation::<D>(
            property,
            RelationKind::Reference,
            Some(column),
            Arc::new(ReferenceField { get, get_mut }),
        )
    }

    /// One-to-many children keyed by this entity's primary-key column
    pub fn collection<C: Entity>(
        &mut self,
        property: &str,
        get: fn(&T) -> &Collection<C>,
        get_mut: fn(&mut T) -> &mut Collection<C>,
    ) -> &mut Self {
        self.push_relation::<C>(
            property,
            RelationKind::Collection,
            None,
            Arc::new(CollectionField { get, get_mut }),
        )
    }

    /// One-to-many children keyed by an explicit column on the child table
    pub fn collection_as<C: Entity>(
        &mut self,
        property: &str,
        child_column: &str,
        get: fn(&T) -> &Collection<C>,
        get_mut: fn(&mut T) -> &mut Collection<C>,
    ) -> &mut Self {
        self.push_relation::<C>(
            property,
            RelationKind::Collection,
            Some(child_column),
            Arc::new(CollectionField { get, get_mut }),
        )
    }

    /// Materialize a relation right after hydration instead of on first access
    pub fn eager(&mut self, property: &str) -> &mut Self {
        match self.relations.iter_mut().find(|r| r.property() == property) {
            Some(relation) => relation.set_deferred(false),
            None => self
                .errors
                .push(format!("eager: no relation named {}", property)),
        }
        self
    }

    fn push_relation<D: Entity>(
        &mut self,
        property: &str,
        kind: RelationKind,
        column: Option<&str>,
        access: Arc<dyn crate::relation::RelationAccess>,
    ) -> &mut Self {
        self.relations.push(RelationInfo::new(
            property,
            kind,
            D::entity_name(),
            TypeId::of::<D>(),
            column.map(str::to_string),
            access,
        ));
        self
    }

    /// Classify the declaration into a table descriptor
    pub(crate) fn build(self) -> Result<TableInfo> {
        let entity = T::entity_name();
        let invalid = |reason: String| OrmError::InvalidMapping {
            entity: entity.to_string(),
            reason,
        };

        if let Some(reason) = self.errors.into_iter().next() {
            return Err(invalid(reason));
        }

        let mut seen = HashSet::new();
        let properties = self
            .primary_key
            .iter()
            .chain(self.columns.iter())
            .map(ColumnInfo::property)
            .chain(self.components.iter().map(ComponentInfo::property))
            .chain(self.relations.iter().map(RelationInfo::property));
        for property in properties {
            if !seen.insert(property.to_string()) {
                return Err(invalid(format!("property {} mapped twice", property)));
            }
        }

        if let Some(pk) = &self.primary_key {
            if pk.nullable() {
                return Err(invalid("primary key cannot be nullable".to_string()));
            }
            if !matches!(
                pk.sql_type(),
                SqlType::Int16 | SqlType::Int32 | SqlType::Int64 | SqlType::String | SqlType::Guid
            ) {
                return Err(invalid(format!(
                    "primary key type {} is not supported",
                    pk.sql_type()
                )));
            }
        }

        let mut relations = self.relations;
        if self.primary_key.is_none() && !relations.is_empty() {
            tracing::warn!(
                entity,
                dropped = relations.len(),
                "projection type declares relations; they are ignored"
            );
            relations.clear();
        }

        Ok(TableInfo::new(
            entity,
            TypeId::of::<T>(),
            self.table.unwrap_or_else(|| entity.to_string()),
            self.primary_key,
            self.columns,
            self.components,
            relations,
        ))
    }
}

/// Fluent mapping declaration for a component type
pub struct ComponentMap<C> {
    columns: Vec<ColumnInfo>,
    _component: PhantomData<fn() -> C>,
}

impl<C: Component> ComponentMap<C> {
    fn new() -> Self {
        Self {
            columns: Vec::new(),
            _component: PhantomData,
        }
    }

    pub fn column<F: ColumnValue>(
        &mut self,
        property: &str,
        get: fn(&C) -> &F,
        get_mut: fn(&mut C) -> &mut F,
    ) -> &mut Self {
        self.column_as(property, property, get, get_mut)
    }

    pub fn column_as<F: ColumnValue>(
        &mut self,
        property: &str,
        column: &str,
        get: fn(&C) -> &F,
        get_mut: fn(&mut C) -> &mut F,
    ) -> &mut Self {
        self.columns
            .push(column_info(property, column, get, get_mut));
        self
    }
}
