use crate::actions::procedure;
use crate::errors::Result;
use crate::mapping::Entity;
use crate::session::{instrumented, Session};
use crate::value::Value;
use microorm_core_types::OpName;

/// Named statement from the dialect's procedure catalog
///
/// Parameters are bound by name; a later `with` for the same name replaces
/// the earlier value.
pub struct ProcedureQuery<'s> {
    session: &'s Session,
    name: String,
    parameters: Vec<(String, Value)>,
}

impl<'s> ProcedureQuery<'s> {
    pub(crate) fn new(session: &'s Session, name: &str) -> Self {
        Self {
            session,
            name: name.to_string(),
            parameters: Vec::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        let name = name.trim_start_matches('@').to_string();
        let value = value.into();
        match self.parameters.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = value,
            None => self.parameters.push((name, value)),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// # Errors
    ///
    /// Returns `UnknownProcedure` when the dialect does not know the name,
    /// otherwise propagates connection failures.
    pub fn to_list<T: Entity>(&self) -> Result<Vec<T>> {
        instrumented(OpName::Procedure, T::entity_name(), || {
            procedure::to_list::<T>(&self.session.context(), &self.name, &self.parameters)
        })
    }

    /// # Errors
    ///
    /// Returns `UnknownProcedure` when the dialect does not know the name,
    /// otherwise propagates connection failures.
    pub fn unique_result<T: Entity>(&self) -> Result<Option<T>> {
        instrumented(OpName::Procedure, T::entity_name(), || {
            procedure::unique_result::<T>(&self.session.context(), &self.name, &self.parameters)
        })
    }
}
