//! Pre/post hooks around insert, update and delete
//!
//! Pre-hooks run in registration order. The first one returning `false`
//! halts the write and every remaining hook; post-hooks only run when the
//! write happened.

use crate::errors::Result;
use crate::metadata::TableInfo;
use std::any::Any;
use std::sync::Arc;

/// The entity a hook is invoked for
pub struct DataInvocation<'a> {
    entity: &'a mut dyn Any,
    entity_name: &'static str,
    table: &'a str,
}

impl<'a> DataInvocation<'a> {
    pub fn entity_name(&self) -> &'static str {
        self.entity_name
    }

    pub fn table(&self) -> &str {
        self.table
    }

    pub fn entity<T: 'static>(&self) -> Option<&T> {
        self.entity.downcast_ref::<T>()
    }

    pub fn entity_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.entity.downcast_mut::<T>()
    }
}

pub trait InsertInterceptor: Send + Sync {
    /// Return `false` to skip the insert
    fn on_pre_insert(&self, invocation: &mut DataInvocation<'_>) -> bool;
    fn on_post_insert(&self, _invocation: &mut DataInvocation<'_>) {}
}

pub trait UpdateInterceptor: Send + Sync {
    /// Return `false` to skip the update
    fn on_pre_update(&self, invocation: &mut DataInvocation<'_>) -> bool;
    fn on_post_update(&self, _invocation: &mut DataInvocation<'_>) {}
}

pub trait DeleteInterceptor: Send + Sync {
    /// Return `false` to skip the delete
    fn on_pre_delete(&self, invocation: &mut DataInvocation<'_>) -> bool;
    fn on_post_delete(&self, _invocation: &mut DataInvocation<'_>) {}
}

/// Registered interceptors, shared by every session of a factory
#[derive(Default, Clone)]
pub struct InterceptorPipeline {
    inserts: Vec<Arc<dyn InsertInterceptor>>,
    updates: Vec<Arc<dyn UpdateInterceptor>>,
    deletes: Vec<Arc<dyn DeleteInterceptor>>,
}

impl InterceptorPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_insert(&mut self, interceptor: Arc<dyn InsertInterceptor>) {
        self.inserts.push(interceptor);
    }

    pub fn add_update(&mut self, interceptor: Arc<dyn UpdateInterceptor>) {
        self.updates.push(interceptor);
    }

    pub fn add_delete(&mut self, interceptor: Arc<dyn DeleteInterceptor>) {
        self.deletes.push(interceptor);
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Returns whether the insert ran
    pub(crate) fn insert<T: Any>(
        &self,
        table: &TableInfo,
        entity: &mut T,
        proceed: impl FnOnce(&mut T) -> Result<()>,
    ) -> Result<bool> {
        run(
            &self.inserts,
            table,
            entity,
            |i, inv| i.on_pre_insert(inv),
            |i, inv| i.on_post_insert(inv),
            proceed,
        )
    }

    /// Returns whether the update ran
    pub(crate) fn update<T: Any>(
        &self,
        table: &TableInfo,
        entity: &mut T,
        proceed: impl FnOnce(&mut T) -> Result<()>,
    ) -> Result<bool> {
        run(
            &self.updates,
            table,
            entity,
            |i, inv| i.on_pre_update(inv),
            |i, inv| i.on_post_update(inv),
            proceed,
        )
    }

    /// Returns whether the delete ran
    pub(crate) fn delete<T: Any>(
        &self,
        table: &TableInfo,
        entity: &mut T,
        proceed: impl FnOnce(&mut T) -> Result<()>,
    ) -> Result<bool> {
        run(
            &self.deletes,
            table,
            entity,
            |i, inv| i.on_pre_delete(inv),
            |i, inv| i.on_post_delete(inv),
            proceed,
        )
    }
}

fn run<I: ?Sized, T: Any>(
    interceptors: &[Arc<I>],
    table: &TableInfo,
    entity: &mut T,
    pre: impl Fn(&I, &mut DataInvocation<'_>) -> bool,
    post: impl Fn(&I, &mut DataInvocation<'_>),
    proceed: impl FnOnce(&mut T) -> Result<()>,
) -> Result<bool> {
    for interceptor in interceptors {
        let mut invocation = DataInvocation {
            entity: &mut *entity,
            entity_name: table.entity(),
            table: table.table(),
        };
        if !pre(interceptor, &mut invocation) {
            tracing::debug!(entity = table.entity(), "write halted by interceptor");
            return Ok(false);
        }
    }

    proceed(entity)?;

    for interceptor in interceptors {
        let mut invocation = DataInvocation {
            entity: &mut *entity,
            entity_name: table.entity(),
            table: table.table(),
        };
        post(interceptor, &mut invocation);
    }
    Ok(true)
}
