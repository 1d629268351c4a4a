use crate::actions::ActionContext;
use crate::connection::{Command, Parameter};
use crate::errors::Result;
use crate::hydrator;
use crate::mapping::Entity;
use crate::metadata::parameter_name;
use crate::relation::LazyTarget;

/// Fetch the rows of `D` matching a deferred relation's key
pub(crate) fn fetch_related<D: Entity>(ctx: &ActionContext<'_>, target: &LazyTarget) -> Result<Vec<D>> {
    let table = ctx.store.table_info::<D>()?;
    let (column, sql_type) = match &target.column {
        Some(column) => (column.clone(), target.key.sql_type()),
        None => {
            let pk = table.require_primary_key()?;
            (pk.column().to_string(), Some(pk.sql_type()))
        }
    };

    let select = table.select_statement_for_all_fields(ctx.store)?;
    let command = Command::new(table.add_where_clause_for_parent(&select, &column)).with_parameter(
        Parameter::new(parameter_name(&column), sql_type, target.key.clone()),
    );

    let mut related = hydrator::hydrate_entities::<D>(ctx, "lazy_load", &command)?;
    for entity in related.iter_mut() {
        table.set_lazy_loading(entity, true);
    }
    Ok(related)
}
