//! Session factory: shared metadata, dialect, configuration and hooks

use crate::config::Configuration;
use crate::connection::Connection;
use crate::dialect::Dialect;
use crate::errors::Result;
use crate::interception::{DeleteInterceptor, InsertInterceptor, InterceptorPipeline, UpdateInterceptor};
use crate::mapping::Entity;
use crate::metadata::MetadataStore;
use crate::session::{instrumented, Session};
use microorm_core_types::OpName;
use std::sync::Arc;

/// Process-wide entry point; cheap to share across threads
pub struct SessionFactory {
    store: Arc<MetadataStore>,
    dialect: Arc<dyn Dialect>,
    configuration: Arc<Configuration>,
    interceptors: Arc<InterceptorPipeline>,
}

impl SessionFactory {
    pub fn builder(configuration: Configuration, dialect: Arc<dyn Dialect>) -> SessionFactoryBuilder {
        SessionFactoryBuilder {
            configuration,
            dialect,
            store: MetadataStore::new(),
            interceptors: InterceptorPipeline::new(),
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Session on the configured connection string
    ///
    /// # Errors
    ///
    /// Propagates the dialect's connection failure.
    pub fn open_session(&self) -> Result<Session> {
        self.open_session_with(&self.configuration.connection_string)
    }

    /// # Errors
    ///
    /// Propagates the dialect's connection failure.
    pub fn open_session_with(&self, connection_string: &str) -> Result<Session> {
        instrumented(OpName::OpenSession, "", || {
            let connection = self.dialect.create_connection(connection_string)?;
            Ok(self.open_session_on(connection))
        })
    }

    /// Session on the connection string registered under `alias`
    ///
    /// # Errors
    ///
    /// Returns `UnknownAlias` when the alias is not configured.
    pub fn open_session_via_alias(&self, alias: &str) -> Result<Session> {
        let connection_string = self.configuration.alias(alias)?.to_string();
        self.open_session_with(&connection_string)
    }

    /// Session over a connection the caller already holds
    pub fn open_session_on(&self, connection: Box<dyn Connection>) -> Session {
        Session::new(
            Arc::clone(&self.store),
            Arc::clone(&self.dialect),
            Arc::clone(&self.configuration),
            Arc::clone(&self.interceptors),
            connection,
        )
    }
}

pub struct SessionFactoryBuilder {
    configuration: Configuration,
    dialect: Arc<dyn Dialect>,
    store: MetadataStore,
    interceptors: InterceptorPipeline,
}

impl SessionFactoryBuilder {
    /// Build and cache the mapping of `T` up front
    ///
    /// A malformed map is logged and skipped; the type then fails on first use.
    pub fn register<T: Entity>(self) -> Self {
        let start = std::time::Instant::now();
        if let Err(err) = self.store.add_entity::<T>() {
            crate::log_op_error!(
                OpName::Register,
                err,
                duration_ms = start.elapsed().as_millis() as u64,
                entity = T::entity_name()
            );
            tracing::warn!(entity = T::entity_name(), "entity map skipped");
        }
        self
    }

    pub fn insert_interceptor(mut self, interceptor: impl InsertInterceptor + 'static) -> Self {
        self.interceptors.add_insert(Arc::new(interceptor));
        self
    }

    pub fn update_interceptor(mut self, interceptor: impl UpdateInterceptor + 'static) -> Self {
        self.interceptors.add_update(Arc::new(interceptor));
        self
    }

    pub fn delete_interceptor(mut self, interceptor: impl DeleteInterceptor + 'static) -> Self {
        self.interceptors.add_delete(Arc::new(interceptor));
        self
    }

    /// # Errors
    ///
    /// Returns `InvalidConfiguration` when the configuration fails validation.
    pub fn build(self) -> Result<SessionFactory> {
        self.configuration.validate()?;
        tracing::info!(
            dialect = self.dialect.name(),
            entities = self.store.len(),
            "session factory built"
        );
        Ok(SessionFactory {
            store: Arc::new(self.store),
            dialect: self.dialect,
            configuration: Arc::new(self.configuration),
            interceptors: Arc::new(self.interceptors),
        })
    }
}
