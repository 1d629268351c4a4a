use crate::actions::{trace, ActionContext};
use crate::connection::Command;
use crate::errors::Result;
use crate::hydrator;
use crate::mapping::Entity;

/// UPDATE every writable column of the row identified by the entity's key
///
/// A row returned by the statement (computed or defaulted columns) is
/// copied back onto the entity. An entity with nothing but its key has
/// nothing to update and issues no statement.
pub(crate) fn execute<T: Entity>(ctx: &ActionContext<'_>, entity: &mut T) -> Result<()> {
    let table = ctx.store.table_info::<T>()?;
    if !table.has_writable_columns(ctx.store)? {
        tracing::debug!(entity = table.entity(), "update skipped: no writable columns");
        return Ok(());
    }
    let update = table.update_statement(ctx.store)?;
    let command = Command::new(table.add_where_clause_by_id(&update)?)
        .with_parameters(table.update_parameters(entity, ctx.store)?);

    trace(ctx, "update", &command);
    let rows = ctx.connection.query(&command)?;
    if let Some(row) = rows.first() {
        hydrator::hydrate_into(&table, entity, row)?;
    }
    Ok(())
}
