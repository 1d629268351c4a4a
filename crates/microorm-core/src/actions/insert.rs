use crate::actions::{trace, ActionContext};
use crate::connection::Command;
use crate::errors::Result;
use crate::hydrator;
use crate::mapping::Entity;
use crate::value::{SqlType, Value};
use uuid::Uuid;

/// INSERT the entity and write the generated key back onto it
///
/// Integer keys come back through the dialect's identity statement in the
/// same round trip. Guid keys are assigned here when nil.
pub(crate) fn execute<T: Entity>(ctx: &ActionContext<'_>, entity: &mut T) -> Result<()> {
    let table = ctx.store.table_info::<T>()?;
    let pk = table.require_primary_key()?;

    if pk.sql_type() == SqlType::Guid && table.primary_key_value(entity)? == Value::Guid(Uuid::nil()) {
        pk.write(entity, Value::Guid(Uuid::new_v4()))?;
    }

    let identity = ctx.dialect.identity_statement(pk);
    let mut text = table.insert_statement(ctx.store)?;
    if let Some(identity) = &identity {
        text.push_str(identity);
    }
    let command = Command::new(text).with_parameters(table.insert_parameters(entity, ctx.store)?);

    if identity.is_some() {
        hydrator::insert_entity(ctx, &table, entity, &command)
    } else {
        trace(ctx, "insert", &command);
        ctx.connection.execute(&command).map(|_| ())
    }
}
