//! Per-type persistence metadata
//!
//! The store builds a [`TableInfo`] the first time a type is encountered and
//! hands out the same `Arc` for the rest of the process. Reads take a shared
//! lock; a build happens outside any lock and the first writer wins.

pub mod table_info;

use crate::errors::Result;
use crate::mapping::{Entity, EntityMap};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub use table_info::{
    parameter_name, quote, ColumnInfo, ComponentInfo, RelationInfo, RelationKind, ResolvedColumn,
    TableInfo,
};

/// Cache of table descriptors keyed by entity type
#[derive(Default)]
pub struct MetadataStore {
    tables: RwLock<HashMap<TypeId, Arc<TableInfo>>>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`; a no-op when it is already known
    ///
    /// # Errors
    ///
    /// Returns `InvalidMapping` when the entity map is malformed.
    pub fn add_entity<T: Entity>(&self) -> Result<Arc<TableInfo>> {
        if let Some(info) = self.lookup(TypeId::of::<T>()) {
            return Ok(info);
        }

        let mut map = EntityMap::<T>::new();
        T::map(&mut map);
        let built = Arc::new(map.build()?);

        // Registered before the reference check so that cyclic references
        // find this type instead of building it again.
        let info = {
            let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
            Arc::clone(tables.entry(TypeId::of::<T>()).or_insert(built))
        };
        if let Err(err) = info.check_reference_columns(self) {
            let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
            tables.remove(&TypeId::of::<T>());
            tracing::warn!(entity = info.entity(), error = %err, "entity rejected");
            return Err(err);
        }
        tracing::debug!(entity = info.entity(), table = info.table(), "entity registered");
        Ok(info)
    }

    /// Descriptor for `T`, registering it on first use
    ///
    /// # Errors
    ///
    /// Returns `InvalidMapping` when the entity map is malformed.
    pub fn table_info<T: Entity>(&self) -> Result<Arc<TableInfo>> {
        self.add_entity::<T>()
    }

    /// Persisted column name of `property`, defaulting to the property name
    ///
    /// # Errors
    ///
    /// Returns `InvalidMapping` when the entity map is malformed.
    pub fn column_name<T: Entity>(&self, property: &str) -> Result<String> {
        let info = self.table_info::<T>()?;
        Ok(info
            .column_name(property)
            .unwrap_or(property)
            .to_string())
    }

    pub fn is_registered<T: Entity>(&self) -> bool {
        self.lookup(TypeId::of::<T>()).is_some()
    }

    pub fn len(&self) -> usize {
        self.tables.read().map(|t| t.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, type_id: TypeId) -> Option<Arc<TableInfo>> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables.get(&type_id).cloned()
    }
}

/// Erased handle on an entity type, resolvable through a store
#[derive(Clone, Copy)]
pub struct EntityRef {
    type_id: TypeId,
    name: &'static str,
    resolve: fn(&MetadataStore) -> Result<Arc<TableInfo>>,
}

impl EntityRef {
    pub fn of<T: Entity>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: T::entity_name(),
            resolve: MetadataStore::table_info::<T>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// # Errors
    ///
    /// Returns `InvalidMapping` when the entity map is malformed.
    pub fn table_info(&self, store: &MetadataStore) -> Result<Arc<TableInfo>> {
        (self.resolve)(store)
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl std::fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}
