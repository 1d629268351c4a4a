//! microorm core: metadata-driven SQL generation and entity hydration
//!
//! - Declarative entity mappings ([`Entity`], [`EntityMap`]) compiled into
//!   cached table descriptors
//! - Statement actions for get, insert, update, delete, lists and procedures
//! - Row hydration with deferred [`Reference`] and [`Collection`] relations
//! - A fluent [`Query`] builder with typed restrictions
//! - Sessions with an identity cache, interceptors and a unit of work
//!
//! The crate links no database driver. A dialect crate implements
//! [`Connection`] and [`Dialect`] and hands them to a [`SessionFactory`].

pub(crate) mod actions;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod errors;
pub(crate) mod hydrator;
pub mod interception;
pub mod logging_facility;
pub mod mapping;
pub mod metadata;
pub mod query;
pub mod relation;
pub mod session;
pub mod value;

pub use microorm_core_types;

pub use config::Configuration;
pub use connection::{Command, Connection, Parameter, Row};
pub use dialect::{Dialect, LimitPlacement};
pub use errors::{ExError, ExErrorKind, OrmError, Result};
pub use interception::{DataInvocation, DeleteInterceptor, InsertInterceptor, UpdateInterceptor};
pub use mapping::{Component, ComponentMap, Entity, EntityMap};
pub use metadata::{ColumnInfo, MetadataStore, TableInfo};
pub use query::{Criterion, Query, Restrictions};
pub use relation::{Collection, Reference};
pub use session::{shared, Session, SessionFactory, SessionFactoryBuilder, Shared};
pub use value::{ColumnValue, SqlType, Value};
