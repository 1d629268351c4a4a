//! Fluent query builder
//!
//! A [`Query`] accumulates joins, criteria groups, selections, grouping and
//! ordering, then compiles them into one statement:
//!
//! `SELECT [TOP n] <fields> FROM [root] <joins> WHERE <groups> GROUP BY .. ORDER BY .. [LIMIT n]`
//!
//! Every value is bound as a parameter named after its column plus a
//! position suffix, so names never collide within a statement.

pub mod builder;
pub mod criteria;
pub mod options;
pub mod procedure;

pub use builder::{CompiledQuery, Query};
pub use criteria::{Criterion, Operator, Restriction, Restrictions};
pub use options::{
    Aggregate, Direction, GroupByOptions, Join, JoinKind, OrderOptions, Selection, SelectionOptions,
};
pub use procedure::ProcedureQuery;
