//! Deferred relations
//!
//! A relation field is either [`Reference<T>`] (many-to-one) or
//! [`Collection<T>`] (one-to-many). Hydration leaves it `NotLoaded` with the
//! key needed to fetch it; the first accessor call given a session runs the
//! follow-up query and keeps the result, so each relation is fetched at most
//! once per instance.

use crate::actions::{lazy_load, ActionContext};
use crate::errors::{OrmError, Result};
use crate::mapping::Entity;
use crate::metadata::{MetadataStore, TableInfo};
use crate::session::Session;
use crate::value::Value;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Where a deferred relation's rows live
///
/// `column` is the column on the related table to match against `key`;
/// `None` means the related table's primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct LazyTarget {
    pub column: Option<String>,
    pub key: Value,
}

impl LazyTarget {
    pub fn by_primary_key(key: Value) -> Self {
        Self { column: None, key }
    }

    pub fn by_column(column: impl Into<String>, key: Value) -> Self {
        Self {
            column: Some(column.into()),
            key,
        }
    }
}

#[derive(Debug, Clone)]
enum RelationState<T> {
    NotLoaded(LazyTarget),
    Loaded(T),
}

/// Many-to-one link, persisted as the target's primary-key value
#[derive(Clone)]
pub struct Reference<T> {
    key: Value,
    state: RelationState<Option<T>>,
    armed: bool,
}

impl<T> Reference<T> {
    /// A link to an in-memory entity
    pub fn new(entity: T) -> Self {
        Self {
            key: Value::Null,
            state: RelationState::Loaded(Some(entity)),
            armed: true,
        }
    }

    /// No related entity
    pub fn none() -> Self {
        Self {
            key: Value::Null,
            state: RelationState::Loaded(None),
            armed: true,
        }
    }

    /// A link known only by key, fetched on first access
    pub fn from_key(key: impl Into<Value>) -> Self {
        let key = key.into();
        if key.is_null() {
            return Self::none();
        }
        Self {
            key: key.clone(),
            state: RelationState::NotLoaded(LazyTarget::by_primary_key(key)),
            armed: true,
        }
    }

    /// Foreign-key value as read from the row
    pub fn key(&self) -> &Value {
        &self.key
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, RelationState::Loaded(_))
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// The related entity if already materialized; never fetches
    pub fn loaded(&self) -> Option<&T> {
        match &self.state {
            RelationState::Loaded(entity) => entity.as_ref(),
            RelationState::NotLoaded(_) => None,
        }
    }

    pub fn loaded_mut(&mut self) -> Option<&mut T> {
        match &mut self.state {
            RelationState::Loaded(entity) => entity.as_mut(),
            RelationState::NotLoaded(_) => None,
        }
    }

    pub fn set(&mut self, entity: Option<T>) {
        if entity.is_none() {
            self.key = Value::Null;
        }
        self.state = RelationState::Loaded(entity);
    }
}

impl<T: Entity> Reference<T> {
    /// The related entity, fetching it through `session` on first access
    ///
    /// # Errors
    ///
    /// Propagates failures of the follow-up query.
    pub fn get(&mut self, session: &Session) -> Result<Option<&T>> {
        self.ensure_loaded(session)?;
        Ok(self.loaded())
    }

    /// # Errors
    ///
    /// Propagates failures of the follow-up query.
    pub fn get_mut(&mut self, session: &Session) -> Result<Option<&mut T>> {
        self.ensure_loaded(session)?;
        Ok(self.loaded_mut())
    }

    fn ensure_loaded(&mut self, session: &Session) -> Result<()> {
        let RelationState::NotLoaded(target) = &self.state else {
            return Ok(());
        };
        if !self.armed {
            return Ok(());
        }
        let target = target.clone();
        let mut fetched = session.fetch_related::<T>(&target)?;
        let first = if fetched.is_empty() {
            None
        } else {
            Some(fetched.swap_remove(0))
        };
        self.state = RelationState::Loaded(first);
        Ok(())
    }
}

impl<T> Default for Reference<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T: PartialEq> PartialEq for Reference<T> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.state, &other.state) {
            (RelationState::Loaded(a), RelationState::Loaded(b)) => a == b,
            (RelationState::NotLoaded(a), RelationState::NotLoaded(b)) => a == b,
            _ => false,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Reference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            RelationState::Loaded(entity) => f.debug_tuple("Reference").field(entity).finish(),
            RelationState::NotLoaded(_) => write!(f, "Reference(<not loaded: {}>)", self.key),
        }
    }
}

/// One-to-many children, fetched by the parent's key
#[derive(Clone)]
pub struct Collection<T> {
    state: RelationState<Vec<T>>,
    armed: bool,
}

impl<T> Collection<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            state: RelationState::Loaded(items),
            armed: true,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, RelationState::Loaded(_))
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// The children if already materialized; never fetches
    pub fn loaded(&self) -> Option<&[T]> {
        match &self.state {
            RelationState::Loaded(items) => Some(items),
            RelationState::NotLoaded(_) => None,
        }
    }

    pub fn loaded_mut(&mut self) -> Option<&mut Vec<T>> {
        match &mut self.state {
            RelationState::Loaded(items) => Some(items),
            RelationState::NotLoaded(_) => None,
        }
    }
}

impl<T: Entity> Collection<T> {
    /// The children, fetching them through `session` on first access
    ///
    /// # Errors
    ///
    /// Returns `LazyLoadingDisabled` when the collection is disarmed and
    /// unloaded, otherwise propagates failures of the follow-up query.
    pub fn get(&mut self, session: &Session) -> Result<&[T]> {
        self.ensure_loaded(session)?;
        match &self.state {
            RelationState::Loaded(items) => Ok(items),
            RelationState::NotLoaded(_) => Err(Self::disabled()),
        }
    }

    /// # Errors
    ///
    /// Returns `LazyLoadingDisabled` when the collection is disarmed and
    /// unloaded, otherwise propagates failures of the follow-up query.
    pub fn get_mut(&mut self, session: &Session) -> Result<&mut Vec<T>> {
        self.ensure_loaded(session)?;
        match &mut self.state {
            RelationState::Loaded(items) => Ok(items),
            RelationState::NotLoaded(_) => Err(Self::disabled()),
        }
    }

    fn disabled() -> OrmError {
        OrmError::LazyLoadingDisabled {
            entity: T::entity_name().to_string(),
            property: "collection".to_string(),
        }
    }

    fn ensure_loaded(&mut self, session: &Session) -> Result<()> {
        let RelationState::NotLoaded(target) = &self.state else {
            return Ok(());
        };
        if !self.armed {
            return Ok(());
        }
        let target = target.clone();
        let items = session.fetch_related::<T>(&target)?;
        self.state = RelationState::Loaded(items);
        Ok(())
    }
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> From<Vec<T>> for Collection<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

impl<T: PartialEq> PartialEq for Collection<T> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.state, &other.state) {
            (RelationState::Loaded(a), RelationState::Loaded(b)) => a == b,
            (RelationState::NotLoaded(a), RelationState::NotLoaded(b)) => a == b,
            _ => false,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            RelationState::Loaded(items) => f.debug_list().entries(items).finish(),
            RelationState::NotLoaded(target) => {
                write!(f, "Collection(<not loaded: {}>)", target.key)
            }
        }
    }
}

// ===== Erased access used by the mapping layer =====

/// The parent a collection's children point back to
pub(crate) struct ParentLink {
    pub type_id: TypeId,
    pub key: Value,
    pub column: String,
}

pub(crate) trait RelationAccess: Send + Sync {
    fn target_table(&self, store: &MetadataStore) -> Result<Arc<TableInfo>>;
    fn set_armed(&self, owner: &mut dyn Any, armed: bool);
    /// Install a not-loaded placeholder
    fn defer(&self, owner: &mut dyn Any, target: LazyTarget);
    /// Fetch now and store the result, bypassing the arming guard
    fn materialize(&self, owner: &mut dyn Any, ctx: &ActionContext<'_>, target: LazyTarget) -> Result<()>;
    /// Foreign-key value to bind; null for collections
    fn key(&self, owner: &dyn Any, store: &MetadataStore) -> Result<Value>;
    fn assign_key(&self, owner: &mut dyn Any, key: Value);
    /// Save loaded related entities that need it
    fn save_loaded(&self, owner: &mut dyn Any, session: &mut Session, parent: Option<&ParentLink>) -> Result<()>;
}

fn is_key_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Text(s) => s.is_empty(),
        Value::Guid(g) => g.is_nil(),
        other => other.as_i64().is_some_and(|v| v <= 0),
    }
}

pub(crate) struct ReferenceField<T, D> {
    pub get: fn(&T) -> &Reference<D>,
    pub get_mut: fn(&mut T) -> &mut Reference<D>,
}

impl<T: 'static, D: Entity> ReferenceField<T, D> {
    fn field<'a>(&self, owner: &'a dyn Any) -> Option<&'a Reference<D>> {
        owner.downcast_ref::<T>().map(self.get)
    }

    fn field_mut<'a>(&self, owner: &'a mut dyn Any) -> Option<&'a mut Reference<D>> {
        owner.downcast_mut::<T>().map(self.get_mut)
    }
}

impl<T: 'static, D: Entity> RelationAccess for ReferenceField<T, D> {
    fn target_table(&self, store: &MetadataStore) -> Result<Arc<TableInfo>> {
        store.table_info::<D>()
    }

    fn set_armed(&self, owner: &mut dyn Any, armed: bool) {
        if let Some(reference) = self.field_mut(owner) {
            reference.armed = armed;
        }
    }

    fn defer(&self, owner: &mut dyn Any, target: LazyTarget) {
        if let Some(reference) = self.field_mut(owner) {
            *reference = Reference::from_key(target.key);
            reference.armed = false;
        }
    }

    fn materialize(&self, owner: &mut dyn Any, ctx: &ActionContext<'_>, target: LazyTarget) -> Result<()> {
        let key = target.key.clone();
        let entity = if key.is_null() {
            None
        } else {
            let mut fetched = lazy_load::fetch_related::<D>(ctx, &target)?;
            if fetched.is_empty() {
                None
            } else {
                Some(fetched.swap_remove(0))
            }
        };
        if let Some(reference) = self.field_mut(owner) {
            reference.key = key;
            reference.state = RelationState::Loaded(entity);
        }
        Ok(())
    }

    fn key(&self, owner: &dyn Any, store: &MetadataStore) -> Result<Value> {
        let Some(reference) = self.field(owner) else {
            return Ok(Value::Null);
        };
        if let Some(entity) = reference.loaded() {
            let target = store.table_info::<D>()?;
            let key = target.primary_key_value(entity)?;
            if !is_key_blank(&key) {
                return Ok(key);
            }
        }
        Ok(reference.key.clone())
    }

    fn assign_key(&self, owner: &mut dyn Any, key: Value) {
        if let Some(reference) = self.field_mut(owner) {
            reference.key = key;
        }
    }

    fn save_loaded(&self, owner: &mut dyn Any, session: &mut Session, _parent: Option<&ParentLink>) -> Result<()> {
        let target = session.store().table_info::<D>()?;
        let Some(entity) = self.field_mut(owner).and_then(Reference::loaded_mut) else {
            return Ok(());
        };
        if is_key_blank(&target.primary_key_value(entity)?) {
            session.upsert(entity)?;
        }
        Ok(())
    }
}

pub(crate) struct CollectionField<T, C> {
    pub get: fn(&T) -> &Collection<C>,
    pub get_mut: fn(&mut T) -> &mut Collection<C>,
}

impl<T: 'static, C: Entity> CollectionField<T, C> {
    fn field<'a>(&self, owner: &'a dyn Any) -> Option<&'a Collection<C>> {
        owner.downcast_ref::<T>().map(self.get)
    }

    fn field_mut<'a>(&self, owner: &'a mut dyn Any) -> Option<&'a mut Collection<C>> {
        owner.downcast_mut::<T>().map(self.get_mut)
    }
}

impl<T: 'static, C: Entity> RelationAccess for CollectionField<T, C> {
    fn target_table(&self, store: &MetadataStore) -> Result<Arc<TableInfo>> {
        store.table_info::<C>()
    }

    fn set_armed(&self, owner: &mut dyn Any, armed: bool) {
        if let Some(collection) = self.field_mut(owner) {
            collection.armed = armed;
        }
    }

    fn defer(&self, owner: &mut dyn Any, target: LazyTarget) {
        if let Some(collection) = self.field_mut(owner) {
            collection.state = RelationState::NotLoaded(target);
            collection.armed = false;
        }
    }

    fn materialize(&self, owner: &mut dyn Any, ctx: &ActionContext<'_>, target: LazyTarget) -> Result<()> {
        let items = lazy_load::fetch_related::<C>(ctx, &target)?;
        if let Some(collection) = self.field_mut(owner) {
            collection.state = RelationState::Loaded(items);
        }
        Ok(())
    }

    fn key(&self, _owner: &dyn Any, _store: &MetadataStore) -> Result<Value> {
        Ok(Value::Null)
    }

    fn assign_key(&self, _owner: &mut dyn Any, _key: Value) {}

    fn save_loaded(&self, owner: &mut dyn Any, session: &mut Session, parent: Option<&ParentLink>) -> Result<()> {
        let Some(parent) = parent else {
            return Ok(());
        };
        if !self.field(owner).is_some_and(Collection::is_loaded) {
            return Ok(());
        }
        let child_table = session.store().table_info::<C>()?;
        let Some(children) = self.field_mut(owner).and_then(Collection::loaded_mut) else {
            return Ok(());
        };
        for child in children.iter_mut() {
            link_child(&child_table, child, parent)?;
            session.upsert(child)?;
        }
        Ok(())
    }
}

/// Point a child at its parent, through a back-reference or a plain column
fn link_child(child_table: &TableInfo, child: &mut dyn Any, parent: &ParentLink) -> Result<()> {
    if let Some(back) = child_table
        .references()
        .find(|r| r.target_type() == parent.type_id)
    {
        back.access.assign_key(child, parent.key.clone());
        return Ok(());
    }
    if let Some(column) = child_table
        .columns()
        .iter()
        .find(|c| c.column() == parent.column)
    {
        column.write(child, parent.key.clone())?;
    }
    Ok(())
}
