//! Statement actions
//!
//! One function per operation. Each call builds exactly one command, binds
//! it, executes it through the session's connection and returns typed
//! results; nothing is reused across calls.

pub mod delete;
pub mod get_by_id;
pub mod insert;
pub mod lazy_load;
pub mod list;
pub mod procedure;
pub mod update;

use crate::connection::{Command, Connection};
use crate::dialect::Dialect;
use crate::metadata::MetadataStore;
use microorm_core_types::schema::EVENT_SQL;

/// Everything an action needs for one round trip
#[derive(Clone, Copy)]
pub(crate) struct ActionContext<'a> {
    pub store: &'a MetadataStore,
    pub connection: &'a dyn Connection,
    pub dialect: &'a dyn Dialect,
    pub show_sql: bool,
    pub lazy_loading: bool,
    pub eager_depth: usize,
}

impl<'a> ActionContext<'a> {
    /// Context for relations materialized while hydrating this level
    pub fn nested(&self) -> Self {
        Self {
            eager_depth: self.eager_depth + 1,
            ..*self
        }
    }
}

/// Debug trace of the final SQL text and parameters
pub(crate) fn trace(ctx: &ActionContext<'_>, action: &'static str, command: &Command) {
    if ctx.show_sql {
        tracing::debug!(
            component = module_path!(),
            event = EVENT_SQL,
            action,
            sql = command.text(),
            params = %command.parameter_dump(),
        );
    }
}
