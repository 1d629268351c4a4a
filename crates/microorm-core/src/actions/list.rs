use crate::actions::ActionContext;
use crate::connection::Command;
use crate::errors::Result;
use crate::hydrator;
use crate::mapping::Entity;

/// Hydrate every row of an ad hoc statement and arm lazy loading on each
pub(crate) fn list<T: Entity>(ctx: &ActionContext<'_>, command: &Command) -> Result<Vec<T>> {
    let table = ctx.store.table_info::<T>()?;
    let mut entities = hydrator::hydrate_entities::<T>(ctx, "list", command)?;
    for entity in entities.iter_mut() {
        table.set_lazy_loading(entity, true);
    }
    Ok(entities)
}

/// Hydrate the first row of an ad hoc statement, if any
pub(crate) fn unique<T: Entity>(ctx: &ActionContext<'_>, command: &Command) -> Result<Option<T>> {
    let table = ctx.store.table_info::<T>()?;
    let mut entity = hydrator::hydrate_entity::<T>(ctx, "unique", command)?;
    if let Some(entity) = entity.as_mut() {
        table.set_lazy_loading(entity, true);
    }
    Ok(entity)
}
