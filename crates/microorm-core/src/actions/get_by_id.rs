use crate::actions::ActionContext;
use crate::connection::{Command, Parameter};
use crate::errors::{OrmError, Result};
use crate::hydrator;
use crate::mapping::Entity;
use crate::metadata::{parameter_name, TableInfo};
use crate::value::Value;

/// Fetch one entity by primary key
///
/// The id must carry exactly the primary key's declared type; a mismatch
/// fails before any statement runs.
pub(crate) fn execute<T: Entity>(ctx: &ActionContext<'_>, id: &Value) -> Result<Option<T>> {
    let table = ctx.store.table_info::<T>()?;
    let pk = table.require_primary_key()?;
    check_id(&table, id)?;

    let select = table.select_statement_for_all_fields(ctx.store)?;
    let command = Command::new(table.add_where_clause_by_id(&select)?).with_parameter(Parameter::new(
        parameter_name(pk.column()),
        Some(pk.sql_type()),
        id.clone(),
    ));

    let mut entity = hydrator::hydrate_entity::<T>(ctx, "get_by_id", &command)?;
    if let Some(entity) = entity.as_mut() {
        table.set_lazy_loading(entity, true);
    }
    Ok(entity)
}

/// Reject a null id or one whose type differs from the key's declared type
pub(crate) fn check_id(table: &TableInfo, id: &Value) -> Result<()> {
    let pk = table.require_primary_key()?;
    let Some(actual) = id.sql_type() else {
        return Err(OrmError::InvalidInput {
            reason: format!("id for {} cannot be null", table.entity()),
        });
    };
    if actual != pk.sql_type() {
        return Err(OrmError::IdTypeMismatch {
            entity: table.entity().to_string(),
            expected: pk.sql_type(),
            actual,
        });
    }
    Ok(())
}
