//! Queued mutations awaiting commit

use crate::errors::Result;
use crate::session::Session;

type Operation = Box<dyn FnOnce(&mut Session) -> Result<()>>;

/// Mutations issued while a transaction is open, in enqueue order
#[derive(Default)]
pub(crate) struct UnitOfWork {
    operations: Vec<(&'static str, Operation)>,
}

impl UnitOfWork {
    pub fn enqueue(&mut self, label: &'static str, operation: impl FnOnce(&mut Session) -> Result<()> + 'static) {
        self.operations.push((label, Box::new(operation)));
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Run every queued operation in order, stopping at the first failure
    pub fn flush(self, session: &mut Session) -> Result<()> {
        for (label, operation) in self.operations {
            tracing::debug!(operation = label, "flushing queued operation");
            operation(session)?;
        }
        Ok(())
    }
}
