//! Session: the unit of work over one connection
//!
//! A session owns a connection, an identity cache and an optional queue of
//! pending mutations. It is single-threaded; open one per unit of work from
//! a shared [`SessionFactory`].

pub mod cache;
pub mod factory;
mod unit_of_work;

pub use cache::{shared, Shared};
pub use factory::{SessionFactory, SessionFactoryBuilder};

use crate::actions::{self, lazy_load, ActionContext};
use crate::config::Configuration;
use crate::connection::Connection;
use crate::dialect::Dialect;
use crate::errors::{OrmError, Result};
use crate::interception::InterceptorPipeline;
use crate::mapping::Entity;
use crate::metadata::{MetadataStore, TableInfo};
use crate::query::{ProcedureQuery, Query};
use crate::relation::{LazyTarget, ParentLink};
use crate::value::Value;
use crate::{log_op_end, log_op_error, log_op_start};
use cache::SessionCache;
use microorm_core_types::OpName;
use std::any::TypeId;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;
use unit_of_work::UnitOfWork;
use uuid::Uuid;

/// Run `f` between start and end/end_error events for `op`
pub(crate) fn instrumented<R>(op: OpName, entity: &str, f: impl FnOnce() -> Result<R>) -> Result<R> {
    let start = Instant::now();
    log_op_start!(op, entity = entity);
    let result = f();
    let duration_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => {
            log_op_end!(op, duration_ms = duration_ms, entity = entity);
        }
        Err(err) => {
            log_op_error!(op, err.clone(), duration_ms = duration_ms, entity = entity);
        }
    }
    result
}

pub struct Session {
    id: Uuid,
    store: Arc<MetadataStore>,
    dialect: Arc<dyn Dialect>,
    configuration: Arc<Configuration>,
    interceptors: Arc<InterceptorPipeline>,
    connection: Box<dyn Connection>,
    cache: SessionCache,
    unit_of_work: Option<UnitOfWork>,
}

impl Session {
    pub(crate) fn new(
        store: Arc<MetadataStore>,
        dialect: Arc<dyn Dialect>,
        configuration: Arc<Configuration>,
        interceptors: Arc<InterceptorPipeline>,
        connection: Box<dyn Connection>,
    ) -> Self {
        let id = Uuid::now_v7();
        tracing::debug!(session = %id, dialect = dialect.name(), "session opened");
        Self {
            id,
            store,
            dialect,
            configuration,
            interceptors,
            connection,
            cache: SessionCache::default(),
            unit_of_work: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Number of instances in the identity cache
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    pub(crate) fn context(&self) -> ActionContext<'_> {
        ActionContext {
            store: &self.store,
            connection: self.connection.as_ref(),
            dialect: self.dialect.as_ref(),
            show_sql: self.configuration.show_sql,
            lazy_loading: self.configuration.lazy_loading,
            eager_depth: 0,
        }
    }

    // ===== Reads =====

    /// Entity by primary key, from the identity cache when already present
    ///
    /// # Errors
    ///
    /// Returns `IdTypeMismatch` when `id` does not carry the key's declared
    /// type, otherwise propagates connection failures.
    pub fn get<T: Entity>(&mut self, id: impl Into<Value>) -> Result<Option<Shared<T>>> {
        let id = id.into();
        instrumented(OpName::Get, T::entity_name(), || {
            let table = self.store.table_info::<T>()?;
            actions::get_by_id::check_id(&table, &id)?;
            if let Some(cached) = self.cache.get::<T>(&id) {
                return Ok(Some(cached));
            }
            let Some(entity) = actions::get_by_id::execute::<T>(&self.context(), &id)? else {
                return Ok(None);
            };
            let entity = shared(entity);
            self.cache.insert(&id, &entity);
            Ok(Some(entity))
        })
    }

    /// Instance a prior `get` or save placed in this session
    ///
    /// # Errors
    ///
    /// Returns `NotInSession` when the identity is not cached.
    pub fn load<T: Entity>(&self, id: impl Into<Value>) -> Result<Shared<T>> {
        let id = id.into();
        instrumented(OpName::Load, T::entity_name(), || {
            self.cache
                .get::<T>(&id)
                .ok_or_else(|| OrmError::NotInSession {
                    entity: T::entity_name().to_string(),
                    id: id.to_string(),
                })
        })
    }

    pub fn create_query_for<T: Entity>(&self) -> Query<'_, T> {
        Query::new(self)
    }

    pub fn execute_procedure(&self, name: &str) -> ProcedureQuery<'_> {
        ProcedureQuery::new(self, name)
    }

    /// Follow-up query behind a deferred relation
    pub(crate) fn fetch_related<D: Entity>(&self, target: &LazyTarget) -> Result<Vec<D>> {
        instrumented(OpName::LazyLoad, D::entity_name(), || {
            lazy_load::fetch_related::<D>(&self.context(), target)
        })
    }

    // ===== Writes =====

    /// INSERT the entity and its unsaved related entities
    ///
    /// Queued instead when a transaction is open.
    ///
    /// # Errors
    ///
    /// Returns `MissingPrimaryKey` for projection types, otherwise
    /// propagates connection failures.
    pub fn save<T: Entity>(&mut self, entity: &Shared<T>) -> Result<()> {
        if let Some(queue) = self.unit_of_work.as_mut() {
            let entity = Rc::clone(entity);
            queue.enqueue("save", move |session| session.save(&entity));
            return Ok(());
        }
        instrumented(OpName::Save, T::entity_name(), || {
            let table = self.store.table_info::<T>()?;
            let proceeded = {
                let mut instance = entity.borrow_mut();
                self.write_graph(&table, &mut *instance, true)?
            };
            if proceeded {
                self.track(&table, entity)?;
            }
            Ok(())
        })
    }

    /// INSERT when the primary key is unset, UPDATE otherwise
    ///
    /// # Errors
    ///
    /// Returns `MissingPrimaryKey` for projection types, otherwise
    /// propagates connection failures.
    pub fn save_or_update<T: Entity>(&mut self, entity: &Shared<T>) -> Result<()> {
        if let Some(queue) = self.unit_of_work.as_mut() {
            let entity = Rc::clone(entity);
            queue.enqueue("save_or_update", move |session| session.save_or_update(&entity));
            return Ok(());
        }
        instrumented(OpName::Save, T::entity_name(), || {
            let table = self.store.table_info::<T>()?;
            let proceeded = {
                let mut instance = entity.borrow_mut();
                let insert = !table.is_primary_key_set(&*instance)?;
                self.write_graph(&table, &mut *instance, insert)?
            };
            if proceeded {
                self.track(&table, entity)?;
            }
            Ok(())
        })
    }

    /// DELETE the entity's row; an entity without a key is left alone
    ///
    /// Guid keys never count as set, so deleting a Guid-keyed entity issues
    /// no statement and leaves its row in place.
    ///
    /// # Errors
    ///
    /// Returns `MissingPrimaryKey` for projection types, otherwise
    /// propagates connection failures.
    pub fn delete<T: Entity>(&mut self, entity: &Shared<T>) -> Result<()> {
        if let Some(queue) = self.unit_of_work.as_mut() {
            let entity = Rc::clone(entity);
            queue.enqueue("delete", move |session| session.delete(&entity));
            return Ok(());
        }
        instrumented(OpName::Delete, T::entity_name(), || {
            let table = self.store.table_info::<T>()?;
            let mut instance = entity.borrow_mut();
            if !table.is_primary_key_set(&*instance)? {
                tracing::debug!(entity = table.entity(), "delete skipped: primary key not set");
                return Ok(());
            }
            let key = table.primary_key_value(&*instance)?;
            let interceptors = Arc::clone(&self.interceptors);
            let proceeded = interceptors.delete(&table, &mut *instance, |e| {
                actions::delete::execute::<T>(&self.context(), e).map(|_| ())
            })?;
            if proceeded {
                self.cache.remove::<T>(&key);
            }
            Ok(())
        })
    }

    /// Insert or update a related entity during a cascade
    pub(crate) fn upsert<T: Entity>(&mut self, entity: &mut T) -> Result<()> {
        let table = self.store.table_info::<T>()?;
        let insert = !table.is_primary_key_set(&*entity)?;
        self.write_graph(&table, entity, insert).map(|_| ())
    }

    /// Write `entity` with lazy loading disarmed, then re-arm it
    fn write_graph<T: Entity>(&mut self, table: &TableInfo, entity: &mut T, insert: bool) -> Result<bool> {
        table.set_lazy_loading(entity, false);
        let result = self.write_disarmed(table, entity, insert);
        table.set_lazy_loading(entity, true);
        result
    }

    /// References first, then the row itself, then child collections
    fn write_disarmed<T: Entity>(&mut self, table: &TableInfo, entity: &mut T, insert: bool) -> Result<bool> {
        for reference in table.references() {
            reference.access.save_loaded(entity, self, None)?;
        }

        let interceptors = Arc::clone(&self.interceptors);
        let proceeded = if insert {
            interceptors.insert(table, entity, |e| actions::insert::execute(&self.context(), e))?
        } else {
            interceptors.update(table, entity, |e| actions::update::execute(&self.context(), e))?
        };
        if !proceeded {
            return Ok(false);
        }

        let key = table.primary_key_value(entity)?;
        for collection in table.collections() {
            let parent = ParentLink {
                type_id: TypeId::of::<T>(),
                key: key.clone(),
                column: table.collection_column(collection)?,
            };
            collection.access.save_loaded(entity, self, Some(&parent))?;
        }
        Ok(true)
    }

    fn track<T: Entity>(&mut self, table: &TableInfo, entity: &Shared<T>) -> Result<()> {
        let key = table.primary_key_value(&*entity.borrow())?;
        if !key.is_null() {
            self.cache.insert(&key, entity);
        }
        Ok(())
    }

    // ===== Transactions =====

    pub fn in_transaction(&self) -> bool {
        self.unit_of_work.is_some()
    }

    /// Start queueing mutations
    ///
    /// # Errors
    ///
    /// Returns `TransactionState` when a transaction is already open.
    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.unit_of_work.is_some() {
            return Err(OrmError::TransactionState {
                reason: "a transaction is already open".to_string(),
            });
        }
        self.unit_of_work = Some(UnitOfWork::default());
        Ok(())
    }

    /// Flush queued mutations in order inside a database transaction
    ///
    /// # Errors
    ///
    /// Returns `TransactionState` when no transaction is open. A failing
    /// mutation rolls the database transaction back and is returned.
    pub fn commit(&mut self) -> Result<()> {
        let Some(queue) = self.unit_of_work.take() else {
            return Err(OrmError::TransactionState {
                reason: "no transaction is open".to_string(),
            });
        };
        let pending = queue.len();
        instrumented(OpName::Commit, "", || {
            tracing::debug!(pending, "committing unit of work");
            self.connection.begin()?;
            if let Err(err) = queue.flush(self) {
                if let Err(rollback) = self.connection.rollback() {
                    tracing::warn!(error = %rollback, "rollback after failed flush also failed");
                }
                return Err(err);
            }
            self.connection.commit()
        })
    }

    /// Discard queued mutations without applying them
    ///
    /// # Errors
    ///
    /// Returns `TransactionState` when no transaction is open.
    pub fn rollback(&mut self) -> Result<()> {
        match self.unit_of_work.take() {
            Some(queue) => {
                tracing::debug!(discarded = queue.len(), "unit of work rolled back");
                Ok(())
            }
            None => Err(OrmError::TransactionState {
                reason: "no transaction is open".to_string(),
            }),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(queue) = self.unit_of_work.take() {
            if !queue.is_empty() {
                tracing::warn!(
                    session = %self.id,
                    discarded = queue.len(),
                    "session dropped with uncommitted operations"
                );
            }
        }
        self.cache.clear();
    }
}
