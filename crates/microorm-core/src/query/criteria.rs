//! Filter restrictions and their AND/OR groups

use crate::connection::Parameter;
use crate::errors::{OrmError, Result};
use crate::mapping::Entity;
use crate::metadata::{parameter_name, quote, EntityRef, MetadataStore, ResolvedColumn};
use crate::value::{SqlType, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl Operator {
    fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "like",
        }
    }
}

/// One comparison of an entity property against a value
#[derive(Debug, Clone, PartialEq)]
pub struct Restriction {
    entity: EntityRef,
    property: String,
    operator: Operator,
    value: Value,
}

impl Restriction {
    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    Restriction(Restriction),
    /// Every child must hold
    And(Vec<Criterion>),
    /// At least one child must hold
    Or(Vec<Criterion>),
}

impl Criterion {
    /// Connective placed in front of this group at the top level
    pub(crate) fn connective(&self) -> &'static str {
        match self {
            Criterion::Or(_) => "or",
            _ => "and",
        }
    }

    /// Check every restriction against its target property's declared type
    pub(crate) fn validate(&self, store: &MetadataStore) -> Result<()> {
        match self {
            Criterion::Restriction(r) => r.resolve(store).map(|_| ()),
            Criterion::And(children) | Criterion::Or(children) => {
                children.iter().try_for_each(|c| c.validate(store))
            }
        }
    }

    /// Expression text, with parameters appended to `params` in order
    pub(crate) fn build(&self, store: &MetadataStore, params: &mut Vec<Parameter>) -> Result<String> {
        match self {
            Criterion::Restriction(r) => r.build(store, params),
            Criterion::And(children) => build_group(children, " and ", store, params),
            Criterion::Or(children) => build_group(children, " or ", store, params),
        }
    }
}

fn build_group(
    children: &[Criterion],
    connective: &str,
    store: &MetadataStore,
    params: &mut Vec<Parameter>,
) -> Result<String> {
    let mut parts = Vec::with_capacity(children.len());
    for child in children {
        let text = child.build(store, params)?;
        if !text.is_empty() {
            parts.push(text);
        }
    }
    Ok(match parts.len() {
        0 => String::new(),
        1 => parts.concat(),
        _ => format!("({})", parts.join(connective)),
    })
}

impl Restriction {
    fn resolve(&self, store: &MetadataStore) -> Result<(String, ResolvedColumn)> {
        let table = self.entity.table_info(store)?;
        let column = table.resolve_column(&self.property, store)?;

        let mismatch = |actual: SqlType| OrmError::TypeMismatch {
            entity: table.entity().to_string(),
            property: self.property.clone(),
            expected: column.sql_type,
            actual,
        };

        match (self.operator, self.value.sql_type()) {
            (Operator::Eq | Operator::Ne, None) => {}
            (_, None) => {
                return Err(OrmError::InvalidInput {
                    reason: format!(
                        "{}.{} cannot be compared to null with '{}'",
                        table.entity(),
                        self.property,
                        self.operator.symbol()
                    ),
                })
            }
            (Operator::Like, Some(actual)) if column.sql_type != SqlType::String => {
                return Err(mismatch(actual))
            }
            (_, Some(actual)) if actual != column.sql_type => return Err(mismatch(actual)),
            _ => {}
        }
        Ok((table.table().to_string(), column))
    }

    fn build(&self, store: &MetadataStore, params: &mut Vec<Parameter>) -> Result<String> {
        let (table, column) = self.resolve(store)?;
        let target = format!("{}.{}", quote(&table), quote(&column.column));

        if self.value.is_null() {
            let test = if self.operator == Operator::Eq { "is null" } else { "is not null" };
            return Ok(format!("{} {}", target, test));
        }

        let name = format!("{}_{}", parameter_name(&column.column), params.len() + 1);
        let value = match (&self.operator, &self.value) {
            (Operator::Like, Value::Text(text)) => Value::Text(format!("%{}%", text)),
            (_, value) => value.clone(),
        };
        let text = format!("{} {} @{}", target, self.operator.symbol(), name);
        params.push(Parameter::new(name, Some(column.sql_type), value));
        Ok(text)
    }
}

/// Constructors for criteria
///
/// Values are checked against the property's declared type when the
/// criterion is added to a query; no implicit conversion takes place.
pub struct Restrictions;

impl Restrictions {
    pub fn eq<T: Entity>(property: &str, value: impl Into<Value>) -> Criterion {
        restriction::<T>(property, Operator::Eq, value.into())
    }

    pub fn ne<T: Entity>(property: &str, value: impl Into<Value>) -> Criterion {
        restriction::<T>(property, Operator::Ne, value.into())
    }

    pub fn lt<T: Entity>(property: &str, value: impl Into<Value>) -> Criterion {
        restriction::<T>(property, Operator::Lt, value.into())
    }

    pub fn le<T: Entity>(property: &str, value: impl Into<Value>) -> Criterion {
        restriction::<T>(property, Operator::Le, value.into())
    }

    pub fn gt<T: Entity>(property: &str, value: impl Into<Value>) -> Criterion {
        restriction::<T>(property, Operator::Gt, value.into())
    }

    pub fn ge<T: Entity>(property: &str, value: impl Into<Value>) -> Criterion {
        restriction::<T>(property, Operator::Ge, value.into())
    }

    /// Substring match, bound as `%value%`
    pub fn like<T: Entity>(property: &str, value: impl Into<String>) -> Criterion {
        restriction::<T>(property, Operator::Like, Value::Text(value.into()))
    }

    /// AND group
    pub fn including(criteria: impl IntoIterator<Item = Criterion>) -> Criterion {
        Criterion::And(criteria.into_iter().collect())
    }

    /// OR group
    pub fn create_disjunction_on(criteria: impl IntoIterator<Item = Criterion>) -> Criterion {
        Criterion::Or(criteria.into_iter().collect())
    }
}

fn restriction<T: Entity>(property: &str, operator: Operator, value: Value) -> Criterion {
    Criterion::Restriction(Restriction {
        entity: EntityRef::of::<T>(),
        property: property.to_string(),
        operator,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::EntityMap;

    #[derive(Debug, Default)]
    struct Invoice {
        id: i64,
        number: String,
        total: f64,
        note: Option<String>,
    }

    impl Entity for Invoice {
        fn map(map: &mut EntityMap<Self>) {
            map.table("Invoice")
                .primary_key_as("id", "InvoiceId", |i| &i.id, |i| &mut i.id)
                .column("number", |i| &i.number, |i| &mut i.number)
                .column("total", |i| &i.total, |i| &mut i.total)
                .column("note", |i| &i.note, |i| &mut i.note);
        }
    }

    fn build(criterion: &Criterion) -> Result<(String, Vec<Parameter>)> {
        let store = MetadataStore::new();
        let mut params = Vec::new();
        let text = criterion.build(&store, &mut params)?;
        Ok((text, params))
    }

    #[test]
    fn test_restriction_binds_numbered_parameter() {
        let (text, params) = build(&Restrictions::eq::<Invoice>("number", "A-1")).unwrap();
        assert_eq!(text, "[Invoice].[number] = @number_1");
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "number_1");
        assert_eq!(params[0].value, Value::Text("A-1".to_string()));
    }

    #[test]
    fn test_and_group_is_parenthesized() {
        let group = Restrictions::including([
            Restrictions::ge::<Invoice>("total", 10.0),
            Restrictions::lt::<Invoice>("total", 20.0),
        ]);
        let (text, params) = build(&group).unwrap();
        assert_eq!(text, "([Invoice].[total] >= @total_1 and [Invoice].[total] < @total_2)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_like_is_parameterized_with_wildcards() {
        let (text, params) = build(&Restrictions::like::<Invoice>("number", "O'Brien")).unwrap();
        assert_eq!(text, "[Invoice].[number] like @number_1");
        assert_eq!(params[0].value, Value::Text("%O'Brien%".to_string()));
    }

    #[test]
    fn test_null_equality_renders_is_null() {
        let (text, params) = build(&Restrictions::eq::<Invoice>("note", Value::Null)).unwrap();
        assert_eq!(text, "[Invoice].[note] is null");
        assert!(params.is_empty());

        let (text, _) = build(&Restrictions::ne::<Invoice>("note", Value::Null)).unwrap();
        assert_eq!(text, "[Invoice].[note] is not null");
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let err = build(&Restrictions::eq::<Invoice>("number", 123456)).unwrap_err();
        assert!(matches!(
            err,
            OrmError::TypeMismatch {
                expected: SqlType::String,
                actual: SqlType::Int32,
                ..
            }
        ));
    }

    #[test]
    fn test_ordering_against_null_is_invalid() {
        let err = build(&Restrictions::gt::<Invoice>("total", Value::Null)).unwrap_err();
        assert!(matches!(err, OrmError::InvalidInput { .. }));
    }

    #[test]
    fn test_unknown_property() {
        let err = build(&Restrictions::eq::<Invoice>("missing", 1)).unwrap_err();
        assert!(matches!(err, OrmError::UnknownProperty { .. }));
    }
}
