//! Sub-builders for joins, selections, grouping and ordering

use crate::errors::Result;
use crate::mapping::Entity;
use crate::metadata::{quote, EntityRef, MetadataStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    FullOuter,
}

impl JoinKind {
    fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "inner join",
            JoinKind::Left => "left join",
            JoinKind::Right => "right join",
            JoinKind::FullOuter => "full outer join",
        }
    }
}

/// Equality join between a parent property and a child property
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub parent: EntityRef,
    pub parent_property: String,
    pub child: EntityRef,
    pub child_property: String,
}

impl Join {
    pub(crate) fn build(&self, store: &MetadataStore) -> Result<String> {
        let parent = self.parent.table_info(store)?;
        let child = self.child.table_info(store)?;
        let parent_column = parent.resolve_column(&self.parent_property, store)?;
        let child_column = child.resolve_column(&self.child_property, store)?;
        Ok(format!(
            "{} {} on {}.{} = {}.{}",
            self.kind.keyword(),
            quote(child.table()),
            quote(child.table()),
            quote(&child_column.column),
            quote(parent.table()),
            quote(&parent_column.column)
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Max,
    Min,
    Sum,
    Avg,
}

impl Aggregate {
    fn function(&self) -> &'static str {
        match self {
            Aggregate::Count => "count",
            Aggregate::Max => "max",
            Aggregate::Min => "min",
            Aggregate::Sum => "sum",
            Aggregate::Avg => "avg",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Every mapped column of an entity
    All(EntityRef),
    Field {
        entity: EntityRef,
        property: String,
    },
    Aggregate {
        function: Aggregate,
        entity: EntityRef,
        property: String,
        alias: String,
    },
}

impl Selection {
    fn build(&self, store: &MetadataStore) -> Result<Vec<String>> {
        match self {
            Selection::All(entity) => {
                let table = entity.table_info(store)?;
                let name = quote(table.table());
                Ok(table
                    .fields_for_select(store)?
                    .iter()
                    .map(|f| format!("{}.{}", name, quote(f)))
                    .collect())
            }
            Selection::Field { entity, property } => {
                let table = entity.table_info(store)?;
                let column = table.resolve_column(property, store)?;
                Ok(vec![format!("{}.{}", quote(table.table()), quote(&column.column))])
            }
            Selection::Aggregate {
                function,
                entity,
                property,
                alias,
            } => {
                let table = entity.table_info(store)?;
                let column = table.resolve_column(property, store)?;
                Ok(vec![format!(
                    "{}({}.{}) as {}",
                    function.function(),
                    quote(table.table()),
                    quote(&column.column),
                    quote(alias)
                )])
            }
        }
    }
}

/// Output columns of a query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionOptions {
    selections: Vec<Selection>,
}

impl SelectionOptions {
    pub fn all_from<T: Entity>(&mut self) -> &mut Self {
        self.push(Selection::All(EntityRef::of::<T>()))
    }

    pub fn field_from<T: Entity>(&mut self, property: &str) -> &mut Self {
        self.push(Selection::Field {
            entity: EntityRef::of::<T>(),
            property: property.to_string(),
        })
    }

    pub fn count_on_field_from<T: Entity>(&mut self, property: &str, alias: &str) -> &mut Self {
        self.aggregate::<T>(Aggregate::Count, property, alias)
    }

    pub fn max_on_field_from<T: Entity>(&mut self, property: &str, alias: &str) -> &mut Self {
        self.aggregate::<T>(Aggregate::Max, property, alias)
    }

    pub fn min_on_field_from<T: Entity>(&mut self, property: &str, alias: &str) -> &mut Self {
        self.aggregate::<T>(Aggregate::Min, property, alias)
    }

    pub fn sum_on_field_from<T: Entity>(&mut self, property: &str, alias: &str) -> &mut Self {
        self.aggregate::<T>(Aggregate::Sum, property, alias)
    }

    pub fn avg_on_field_from<T: Entity>(&mut self, property: &str, alias: &str) -> &mut Self {
        self.aggregate::<T>(Aggregate::Avg, property, alias)
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }

    fn aggregate<T: Entity>(&mut self, function: Aggregate, property: &str, alias: &str) -> &mut Self {
        self.push(Selection::Aggregate {
            function,
            entity: EntityRef::of::<T>(),
            property: property.to_string(),
            alias: alias.to_string(),
        })
    }

    fn push(&mut self, selection: Selection) -> &mut Self {
        if !self.selections.contains(&selection) {
            self.selections.push(selection);
        }
        self
    }

    /// Comma-separated select list with duplicate columns removed
    pub(crate) fn build(&self, store: &MetadataStore) -> Result<String> {
        let mut fields: Vec<String> = Vec::new();
        for selection in &self.selections {
            for field in selection.build(store)? {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
        Ok(fields.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
struct OrderItem {
    entity: EntityRef,
    property: String,
    direction: Direction,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderOptions {
    items: Vec<OrderItem>,
}

impl OrderOptions {
    pub fn asc<T: Entity>(&mut self, property: &str) -> &mut Self {
        self.push::<T>(property, Direction::Asc)
    }

    pub fn desc<T: Entity>(&mut self, property: &str) -> &mut Self {
        self.push::<T>(property, Direction::Desc)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn push<T: Entity>(&mut self, property: &str, direction: Direction) -> &mut Self {
        self.items.push(OrderItem {
            entity: EntityRef::of::<T>(),
            property: property.to_string(),
            direction,
        });
        self
    }

    pub(crate) fn build(&self, store: &MetadataStore) -> Result<String> {
        let mut parts = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let table = item.entity.table_info(store)?;
            let column = table.resolve_column(&item.property, store)?;
            let direction = match item.direction {
                Direction::Asc => "asc",
                Direction::Desc => "desc",
            };
            parts.push(format!(
                "{}.{} {}",
                quote(table.table()),
                quote(&column.column),
                direction
            ));
        }
        Ok(parts.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum GroupItem {
    Field { entity: EntityRef, property: String },
    /// An alias introduced by an aggregate selection
    Alias(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupByOptions {
    items: Vec<GroupItem>,
}

impl GroupByOptions {
    pub fn field<T: Entity>(&mut self, property: &str) -> &mut Self {
        self.items.push(GroupItem::Field {
            entity: EntityRef::of::<T>(),
            property: property.to_string(),
        });
        self
    }

    pub fn alias(&mut self, alias: &str) -> &mut Self {
        self.items.push(GroupItem::Alias(alias.to_string()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn build(&self, store: &MetadataStore) -> Result<String> {
        let mut parts = Vec::with_capacity(self.items.len());
        for item in &self.items {
            parts.push(match item {
                GroupItem::Field { entity, property } => {
                    let table = entity.table_info(store)?;
                    let column = table.resolve_column(property, store)?;
                    format!("{}.{}", quote(table.table()), quote(&column.column))
                }
                GroupItem::Alias(alias) => quote(alias),
            });
        }
        Ok(parts.join(", "))
    }
}
