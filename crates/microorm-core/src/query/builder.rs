use crate::actions::list;
use crate::connection::{Command, Parameter};
use crate::dialect::LimitPlacement;
use crate::errors::{OrmError, Result};
use crate::mapping::Entity;
use crate::metadata::{quote, EntityRef};
use crate::query::criteria::Criterion;
use crate::query::options::{GroupByOptions, Join, JoinKind, OrderOptions, SelectionOptions};
use crate::session::{instrumented, Session};
use microorm_core_types::OpName;
use std::any::TypeId;
use std::marker::PhantomData;

/// SQL text and parameters produced from a query definition
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub parameters: Vec<Parameter>,
}

impl CompiledQuery {
    pub fn into_command(self) -> Command {
        Command::new(self.sql).with_parameters(self.parameters)
    }
}

/// Fluent query rooted at entity `T`
///
/// ```ignore
/// let accounts = session
///     .create_query_for::<Account>()
///     .join_on::<Account, AccountTransaction>("id", "account")
///     .create_criteria(Restrictions::gt::<AccountTransaction>("amount", 100.0))?
///     .select(|s| s.all_from::<Account>())
///     .add_order(|o| o.asc::<Account>("number"))
///     .to_list()?;
/// ```
pub struct Query<'s, T> {
    session: &'s Session,
    joins: Vec<Join>,
    criteria: Vec<Criterion>,
    selection: SelectionOptions,
    group_by: GroupByOptions,
    order: OrderOptions,
    max_results: Option<usize>,
    _entity: PhantomData<fn() -> T>,
}

impl<'s, T: Entity> Query<'s, T> {
    pub(crate) fn new(session: &'s Session) -> Self {
        Self {
            session,
            joins: Vec::new(),
            criteria: Vec::new(),
            selection: SelectionOptions::default(),
            group_by: GroupByOptions::default(),
            order: OrderOptions::default(),
            max_results: None,
            _entity: PhantomData,
        }
    }

    pub fn join_on<P: Entity, C: Entity>(self, parent_property: &str, child_property: &str) -> Self {
        self.join::<P, C>(JoinKind::Inner, parent_property, child_property)
    }

    pub fn left_join_on<P: Entity, C: Entity>(self, parent_property: &str, child_property: &str) -> Self {
        self.join::<P, C>(JoinKind::Left, parent_property, child_property)
    }

    pub fn right_join_on<P: Entity, C: Entity>(self, parent_property: &str, child_property: &str) -> Self {
        self.join::<P, C>(JoinKind::Right, parent_property, child_property)
    }

    pub fn outer_join_on<P: Entity, C: Entity>(self, parent_property: &str, child_property: &str) -> Self {
        self.join::<P, C>(JoinKind::FullOuter, parent_property, child_property)
    }

    fn join<P: Entity, C: Entity>(mut self, kind: JoinKind, parent_property: &str, child_property: &str) -> Self {
        self.joins.push(Join {
            kind,
            parent: EntityRef::of::<P>(),
            parent_property: parent_property.to_string(),
            child: EntityRef::of::<C>(),
            child_property: child_property.to_string(),
        });
        self
    }

    /// Add a top-level criteria group
    ///
    /// A bare restriction becomes a single-member AND group. A group equal
    /// to one already present is ignored.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` when a value's type differs from its property's
    /// declared type, or `UnknownProperty` for an unmapped property.
    pub fn create_criteria(mut self, criterion: Criterion) -> Result<Self> {
        let group = match criterion {
            Criterion::Restriction(_) => Criterion::And(vec![criterion]),
            group => group,
        };
        group.validate(self.session.store())?;
        if !self.criteria.contains(&group) {
            self.criteria.push(group);
        }
        Ok(self)
    }

    pub fn select(mut self, selection: impl FnOnce(&mut SelectionOptions) -> &mut SelectionOptions) -> Self {
        selection(&mut self.selection);
        self
    }

    pub fn add_order(mut self, order: impl FnOnce(&mut OrderOptions) -> &mut OrderOptions) -> Self {
        order(&mut self.order);
        self
    }

    pub fn group_by(mut self, group_by: impl FnOnce(&mut GroupByOptions) -> &mut GroupByOptions) -> Self {
        group_by(&mut self.group_by);
        self
    }

    /// Row cap for `to_list`, overriding the configured default; 0 disables it
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// The statement `to_list` would run
    ///
    /// # Errors
    ///
    /// Returns `NoSelection` when nothing was selected, or any mapping error
    /// raised while resolving properties.
    pub fn build_sql(&self) -> Result<CompiledQuery> {
        self.compile(self.list_limit())
    }

    /// # Errors
    ///
    /// Returns `NoSelection` when nothing was selected, otherwise propagates
    /// mapping and connection failures.
    pub fn to_list(&self) -> Result<Vec<T>> {
        instrumented(OpName::Query, T::entity_name(), || {
            let command = self.compile(self.list_limit())?.into_command();
            list::list::<T>(&self.session.context(), &command)
        })
    }

    /// Hydrate the rows as `P` instead of `T`
    ///
    /// # Errors
    ///
    /// Returns `SameTypeProjection` when `P` is `T`; use `to_list` instead.
    pub fn to_list_as<P: Entity>(&self) -> Result<Vec<P>> {
        self.require_projection::<P>()?;
        instrumented(OpName::Query, P::entity_name(), || {
            let command = self.compile(self.list_limit())?.into_command();
            list::list::<P>(&self.session.context(), &command)
        })
    }

    /// First row, if any
    ///
    /// # Errors
    ///
    /// Returns `NoSelection` when nothing was selected, otherwise propagates
    /// mapping and connection failures.
    pub fn single_or_default(&self) -> Result<Option<T>> {
        instrumented(OpName::Query, T::entity_name(), || {
            let command = self.compile(None)?.into_command();
            list::unique::<T>(&self.session.context(), &command)
        })
    }

    /// # Errors
    ///
    /// Returns `SameTypeProjection` when `P` is `T`.
    pub fn single_or_default_as<P: Entity>(&self) -> Result<Option<P>> {
        self.require_projection::<P>()?;
        instrumented(OpName::Query, P::entity_name(), || {
            let command = self.compile(None)?.into_command();
            list::unique::<P>(&self.session.context(), &command)
        })
    }

    fn require_projection<P: Entity>(&self) -> Result<()> {
        if TypeId::of::<P>() == TypeId::of::<T>() {
            return Err(OrmError::SameTypeProjection {
                entity: T::entity_name().to_string(),
            });
        }
        Ok(())
    }

    fn list_limit(&self) -> Option<usize> {
        let limit = self
            .max_results
            .unwrap_or(self.session.configuration().max_results);
        (limit > 0).then_some(limit)
    }

    fn compile(&self, limit: Option<usize>) -> Result<CompiledQuery> {
        if self.selection.is_empty() {
            return Err(OrmError::NoSelection {
                entity: T::entity_name().to_string(),
            });
        }

        let store = self.session.store();
        let placement = self.session.dialect().limit_placement();
        let root = store.table_info::<T>()?;

        let mut sql = String::from("SELECT ");
        if let (Some(n), LimitPlacement::Top) = (limit, placement) {
            sql.push_str(&format!("TOP {} ", n));
        }
        sql.push_str(&self.selection.build(store)?);
        sql.push_str(" FROM ");
        sql.push_str(&quote(root.table()));

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.build(store)?);
        }

        let mut parameters = Vec::new();
        let mut clause = String::new();
        for group in &self.criteria {
            let text = group.build(store, &mut parameters)?;
            if !text.is_empty() {
                clause.push_str(&format!(" {} {}", group.connective(), text));
            }
        }
        let clause = clause.trim_start();
        let clause = clause
            .strip_prefix("and ")
            .or_else(|| clause.strip_prefix("or "))
            .unwrap_or(clause);
        if !clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(clause);
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.build(store)?);
        }
        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order.build(store)?);
        }
        if let (Some(n), LimitPlacement::Suffix) = (limit, placement) {
            sql.push_str(&format!(" LIMIT {}", n));
        }

        Ok(CompiledQuery { sql, parameters })
    }
}
