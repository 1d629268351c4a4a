//! Row-to-entity materialization
//!
//! Rows are read completely before any entity is built. Each entity starts
//! from `Default`, then receives its primary key, simple columns and
//! component columns in descriptor order. Relations get a not-loaded
//! placeholder, or are fetched right away when declared eager or when lazy
//! loading is switched off for the session.

use crate::actions::{trace, ActionContext};
use crate::connection::{Command, Row};
use crate::errors::Result;
use crate::mapping::Entity;
use crate::metadata::{ColumnInfo, RelationInfo, RelationKind, TableInfo};
use crate::relation::LazyTarget;
use std::any::Any;

/// Eager relations nested deeper than this are left deferred
const MAX_EAGER_DEPTH: usize = 4;

pub(crate) fn read_rows(ctx: &ActionContext<'_>, action: &'static str, command: &Command) -> Result<Vec<Row>> {
    trace(ctx, action, command);
    ctx.connection.query(command)
}

pub(crate) fn hydrate_entity<T: Entity>(
    ctx: &ActionContext<'_>,
    action: &'static str,
    command: &Command,
) -> Result<Option<T>> {
    let table = ctx.store.table_info::<T>()?;
    let rows = read_rows(ctx, action, command)?;
    rows.first()
        .map(|row| create_entity::<T>(ctx, &table, row))
        .transpose()
}

pub(crate) fn hydrate_entities<T: Entity>(
    ctx: &ActionContext<'_>,
    action: &'static str,
    command: &Command,
) -> Result<Vec<T>> {
    let table = ctx.store.table_info::<T>()?;
    let rows = read_rows(ctx, action, command)?;
    rows.iter()
        .map(|row| create_entity::<T>(ctx, &table, row))
        .collect()
}

pub(crate) fn create_entity<T: Entity>(ctx: &ActionContext<'_>, table: &TableInfo, row: &Row) -> Result<T> {
    let mut entity = T::default();
    hydrate_into(table, &mut entity, row)?;
    if !table.is_projection() {
        install_relations(ctx, table, &mut entity, row)?;
    }
    Ok(entity)
}

/// Copy row values onto an existing instance
///
/// Columns missing from the row are left untouched, as are nulls read for
/// non-nullable columns.
pub(crate) fn hydrate_into(table: &TableInfo, entity: &mut dyn Any, row: &Row) -> Result<()> {
    for column in table.primary_key().into_iter().chain(table.columns()) {
        set_column(column, entity, row)?;
    }
    for component in table.components() {
        let Some(instance) = component.access.get_mut(entity) else {
            continue;
        };
        for column in component.columns() {
            set_column(column, instance, row)?;
        }
    }
    Ok(())
}

fn set_column(column: &ColumnInfo, target: &mut dyn Any, row: &Row) -> Result<()> {
    let Some(value) = row.get(column.column()) else {
        return Ok(());
    };
    if value.is_null() && !column.nullable() {
        return Ok(());
    }
    column.write(target, value.clone())
}

fn install_relations(ctx: &ActionContext<'_>, table: &TableInfo, entity: &mut dyn Any, row: &Row) -> Result<()> {
    for relation in table.relations() {
        let target = match relation.kind() {
            RelationKind::Reference => {
                let column = table.reference_column(relation, ctx.store)?;
                LazyTarget::by_primary_key(row.get(&column).cloned().unwrap_or_default())
            }
            RelationKind::Collection => LazyTarget::by_column(
                table.collection_column(relation)?,
                table.primary_key_value(entity)?,
            ),
        };

        let eager = !relation.is_deferred() || !ctx.lazy_loading;
        if eager && ctx.eager_depth < MAX_EAGER_DEPTH {
            update_entity(&ctx.nested(), relation, entity, target)?;
        } else {
            relation.access.defer(entity, target);
        }
    }
    Ok(())
}

/// Run the INSERT and assign a positive returned identity to the key
pub(crate) fn insert_entity(
    ctx: &ActionContext<'_>,
    table: &TableInfo,
    entity: &mut dyn Any,
    command: &Command,
) -> Result<()> {
    trace(ctx, "insert", command);
    let identity = ctx.connection.query_scalar(command)?;
    if identity.as_i64().is_some_and(|v| v > 0) {
        table.require_primary_key()?.write(entity, identity)?;
    }
    Ok(())
}

/// Fetch one relation of `entity` and store it on the field directly
pub(crate) fn update_entity(
    ctx: &ActionContext<'_>,
    relation: &RelationInfo,
    entity: &mut dyn Any,
    target: LazyTarget,
) -> Result<()> {
    relation.access.materialize(entity, ctx, target)
}
