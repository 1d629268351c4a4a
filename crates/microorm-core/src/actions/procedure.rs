//! Stored procedure execution
//!
//! The dialect turns a procedure name into statement text; parameters come
//! from a name→value dictionary and are bound by name.

use crate::actions::{list, ActionContext};
use crate::connection::{Command, Parameter};
use crate::errors::Result;
use crate::mapping::Entity;
use crate::value::Value;

pub(crate) fn command(ctx: &ActionContext<'_>, name: &str, parameters: &[(String, Value)]) -> Result<Command> {
    let text = ctx.dialect.procedure_statement(name)?;
    Ok(Command::new(text).with_parameters(
        parameters
            .iter()
            .map(|(key, value)| Parameter::new(key.clone(), value.sql_type(), value.clone())),
    ))
}

pub(crate) fn to_list<T: Entity>(
    ctx: &ActionContext<'_>,
    name: &str,
    parameters: &[(String, Value)],
) -> Result<Vec<T>> {
    list::list::<T>(ctx, &command(ctx, name, parameters)?)
}

pub(crate) fn unique_result<T: Entity>(
    ctx: &ActionContext<'_>,
    name: &str,
    parameters: &[(String, Value)],
) -> Result<Option<T>> {
    list::unique::<T>(ctx, &command(ctx, name, parameters)?)
}
