use crate::actions::{trace, ActionContext};
use crate::connection::{Command, Parameter};
use crate::errors::Result;
use crate::mapping::Entity;
use crate::metadata::parameter_name;

/// DELETE the row identified by the entity's key
///
/// Returns `false` without touching the database when the key is unset, so
/// a fresh entity can never turn into an unscoped delete.
pub(crate) fn execute<T: Entity>(ctx: &ActionContext<'_>, entity: &T) -> Result<bool> {
    let table = ctx.store.table_info::<T>()?;
    let pk = table.require_primary_key()?;

    if !table.is_primary_key_set(entity)? {
        tracing::debug!(entity = table.entity(), "delete skipped: primary key not set");
        return Ok(false);
    }

    let command = Command::new(table.add_where_clause_by_id(&table.delete_statement()?)?).with_parameter(
        Parameter::new(
            parameter_name(pk.column()),
            Some(pk.sql_type()),
            table.primary_key_value(entity)?,
        ),
    );

    trace(ctx, "delete", &command);
    ctx.connection.execute(&command)?;
    Ok(true)
}
