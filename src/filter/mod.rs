//! Composable SELECT/DELETE builder.
//!
//! A [`Filter`] is bound to one base table of a [`Schema`] and accumulates
//! joins, predicates, sub-query membership tests, ordering, paging and a
//! distinct-on list. Nothing is rendered until [`Filter::render`] is called,
//! so one filter can produce a row select, a count and a delete from the same
//! state. Every builder method validates its arguments immediately and
//! returns a validation error instead of producing SQL the store would
//! reject.
//!
//! ```rust
//! use relstore::filter::{Filter, StatementKind};
//! use relstore::schema::{FieldType, SchemaBuilder, TableDef};
//!
//! let schema = SchemaBuilder::new()
//!     .table(
//!         TableDef::new("user")
//!             .serial_id("id")
//!             .field("name", FieldType::Text)
//!             .field("lastname", FieldType::Text),
//!     )
//!     .build()
//!     .unwrap();
//! let user = schema.require_table("user").unwrap().id();
//! let name = schema.require_field("user", "name").unwrap().id();
//!
//! let mut filter = Filter::new(&schema, user);
//! filter.field_equals(name, "Pieter").unwrap();
//! let statement = filter.render(StatementKind::Select).unwrap();
//! assert_eq!(statement.sql, "SELECT id, name, lastname FROM user WHERE name = ?");
//! ```

mod execute;
mod joins;
mod predicates;
mod render;
mod subquery;

pub use execute::RecordRow;
pub use render::{RenderedStatement, StatementKind};

use crate::schema::{Field, FieldId, FieldType, Schema, TableId};
use crate::value::{self, SqlValue, Value};
use crate::{DataAccessError, Dialect};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Like,
    /// `ILIKE` on PostgreSQL, `LIKE` on SQLite (which already ignores ASCII case).
    CaseInsensitiveLike,
}

impl Operator {
    pub fn sql(self, dialect: Dialect) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "<>",
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::Like => "LIKE",
            Operator::CaseInsensitiveLike => dialect.case_insensitive_like(),
        }
    }

    fn is_pattern(self) -> bool {
        matches!(self, Operator::Like | Operator::CaseInsensitiveLike)
    }
}

/// `INNER JOIN target ON left = right`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Join {
    pub target: TableId,
    pub left: FieldId,
    pub right: FieldId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: FieldId,
    pub ascending: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Paging {
    pub limit: u64,
    pub offset: u64,
}

#[derive(Clone, Debug)]
enum Predicate {
    Compare {
        field: FieldId,
        op: Operator,
        value: SqlValue,
    },
    AnyOf {
        field: FieldId,
        op: Operator,
        values: Vec<SqlValue>,
    },
    Null {
        field: FieldId,
        negated: bool,
    },
    Weekday {
        field: FieldId,
        day: u32,
    },
}

#[derive(Clone, Debug)]
struct SubqueryTest<'s> {
    own: FieldId,
    sub: Box<Filter<'s>>,
    sub_field: FieldId,
    negated: bool,
}

#[derive(Clone, Debug)]
pub struct Filter<'s> {
    schema: &'s Schema,
    base: TableId,
    dialect: Dialect,
    joins: Vec<Join>,
    predicates: Vec<Predicate>,
    subqueries: Vec<SubqueryTest<'s>>,
    order: Option<OrderBy>,
    paging: Option<Paging>,
    distinct: Vec<FieldId>,
    inverted: bool,
}

impl<'s> Filter<'s> {
    /// Empty filter on `base`.
    ///
    /// `base` must come from `schema`; a foreign id panics when the filter is
    /// rendered. [`Filter::try_new`] checks it.
    pub fn new(schema: &'s Schema, base: TableId) -> Self {
        Self {
            schema,
            base,
            dialect: Dialect::default(),
            joins: Vec::new(),
            predicates: Vec::new(),
            subqueries: Vec::new(),
            order: None,
            paging: None,
            distinct: Vec::new(),
            inverted: false,
        }
    }

    /// [`Filter::new`] for a table id that may not belong to `schema`.
    pub fn try_new(schema: &'s Schema, base: TableId) -> Result<Self, DataAccessError> {
        if base.index() >= schema.len() {
            return Err(DataAccessError::validation(
                "unregistered table",
                format!("{base:?}"),
            ));
        }
        Ok(Self::new(schema, base))
    }

    /// Filter on the table called `table`.
    pub fn on(schema: &'s Schema, table: &str) -> Result<Self, DataAccessError> {
        Ok(Self::new(schema, schema.require_table(table)?.id()))
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn set_dialect(&mut self, dialect: Dialect) -> &mut Self {
        self.dialect = dialect;
        self
    }

    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    pub fn base(&self) -> TableId {
        self.base
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn order(&self) -> Option<OrderBy> {
        self.order
    }

    pub fn paging(&self) -> Option<Paging> {
        self.paging
    }

    pub fn distinct_on(&self) -> &[FieldId] {
        &self.distinct
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// Base table followed by joined tables in join order.
    pub fn tables(&self) -> Vec<TableId> {
        let mut tables = Vec::with_capacity(self.joins.len() + 1);
        tables.push(self.base);
        tables.extend(self.joins.iter().map(|j| j.target));
        tables
    }

    pub fn contains_table(&self, table: TableId) -> bool {
        self.base == table || self.joins.iter().any(|j| j.target == table)
    }

    /// Resolves `field`, requiring it to belong to a table of this filter.
    fn present_field(&self, field: FieldId) -> Result<&'s Field, DataAccessError> {
        if !self.schema.contains_field(field) {
            return Err(DataAccessError::validation(
                "unregistered field",
                format!("{field:?}"),
            ));
        }
        let resolved = self.schema.field(field);
        if !self.contains_table(field.table()) {
            return Err(DataAccessError::validation(
                format!(
                    "field is not part of the filter on {}",
                    self.schema.table(self.base).name()
                ),
                resolved.qualified_name(),
            ));
        }
        Ok(resolved)
    }

    /// Appends `field operator ?`, ANDed with the other predicates.
    pub fn add_predicate<V: Into<Value>>(
        &mut self,
        field: FieldId,
        op: Operator,
        value: V,
    ) -> Result<&mut Self, DataAccessError> {
        let resolved = self.present_field(field)?;
        check_operator(resolved, op)?;
        let value = bind(resolved, op, value.into())?;
        self.predicates.push(Predicate::Compare { field, op, value });
        Ok(self)
    }

    /// Appends `(field op ? OR field op ? ...)` with one parameter per value.
    pub fn or_predicate_over_values<I, V>(
        &mut self,
        field: FieldId,
        op: Operator,
        values: I,
    ) -> Result<&mut Self, DataAccessError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let resolved = self.present_field(field)?;
        check_operator(resolved, op)?;
        let values = values
            .into_iter()
            .map(|v| bind(resolved, op, v.into()))
            .collect::<Result<Vec<_>, _>>()?;
        if values.is_empty() {
            return Err(DataAccessError::validation(
                "empty value list",
                format!("({} {} ?)", resolved.qualified_name(), op.sql(self.dialect)),
            ));
        }
        self.predicates
            .push(Predicate::AnyOf { field, op, values });
        Ok(self)
    }

    pub fn field_is_null(&mut self, field: FieldId) -> Result<&mut Self, DataAccessError> {
        self.present_field(field)?;
        self.predicates.push(Predicate::Null {
            field,
            negated: false,
        });
        Ok(self)
    }

    pub fn field_is_not_null(&mut self, field: FieldId) -> Result<&mut Self, DataAccessError> {
        self.present_field(field)?;
        self.predicates.push(Predicate::Null {
            field,
            negated: true,
        });
        Ok(self)
    }

    /// Matches dates falling on `weekday`.
    pub fn field_weekday_equals(
        &mut self,
        field: FieldId,
        weekday: chrono::Weekday,
    ) -> Result<&mut Self, DataAccessError> {
        let resolved = self.present_field(field)?;
        if !matches!(
            resolved.field_type(),
            FieldType::Date | FieldType::Timestamp
        ) {
            return Err(DataAccessError::validation(
                "weekday test needs a date or timestamp field",
                resolved.qualified_name(),
            ));
        }
        self.predicates.push(Predicate::Weekday {
            field,
            day: weekday.num_days_from_sunday(),
        });
        Ok(self)
    }

    pub fn set_order(
        &mut self,
        field: FieldId,
        ascending: bool,
    ) -> Result<&mut Self, DataAccessError> {
        self.present_field(field)?;
        self.order = Some(OrderBy { field, ascending });
        Ok(self)
    }

    pub fn clear_order(&mut self) -> &mut Self {
        self.order = None;
        self
    }

    pub fn set_paging(&mut self, limit: u64, offset: u64) -> &mut Self {
        self.paging = Some(Paging { limit, offset });
        self
    }

    pub fn clear_paging(&mut self) -> &mut Self {
        self.paging = None;
        self
    }

    /// Replaces the distinct-on list.
    pub fn set_distinct_on<I>(&mut self, fields: I) -> Result<&mut Self, DataAccessError>
    where
        I: IntoIterator<Item = FieldId>,
    {
        let fields: Vec<FieldId> = fields.into_iter().collect();
        for field in &fields {
            self.present_field(*field)?;
        }
        self.distinct = fields;
        Ok(self)
    }

    pub fn add_distinct(&mut self, field: FieldId) -> Result<&mut Self, DataAccessError> {
        self.present_field(field)?;
        if !self.distinct.contains(&field) {
            self.distinct.push(field);
        }
        Ok(self)
    }

    /// Negates the predicate set. Sub-query tests are never negated.
    /// Repeated calls keep the filter inverted; see [`Filter::set_inverted`].
    pub fn invert(&mut self) -> &mut Self {
        self.inverted = true;
        self
    }

    pub fn set_inverted(&mut self, inverted: bool) -> &mut Self {
        self.inverted = inverted;
        self
    }

    /// Number of parameters the next rendering binds.
    pub fn parameter_count(&self) -> usize {
        let own: usize = self
            .predicates
            .iter()
            .map(|p| match p {
                Predicate::Compare { .. } | Predicate::Weekday { .. } => 1,
                Predicate::AnyOf { values, .. } => values.len(),
                Predicate::Null { .. } => 0,
            })
            .sum();
        own + self
            .subqueries
            .iter()
            .map(|s| s.sub.parameter_count())
            .sum::<usize>()
    }
}

fn check_operator(field: &Field, op: Operator) -> Result<(), DataAccessError> {
    if op.is_pattern() && !matches!(field.field_type(), FieldType::Text | FieldType::Char) {
        return Err(DataAccessError::validation(
            "pattern match needs a text field",
            field.qualified_name(),
        ));
    }
    Ok(())
}

/// Patterns are bound as given: a `%A%` pattern is wider than the single
/// character a char column holds.
fn bind(field: &Field, op: Operator, given: Value) -> Result<SqlValue, DataAccessError> {
    match given {
        Value::Text(pattern) if op.is_pattern() => Ok(SqlValue::Text(pattern)),
        other => value::to_parameter(field, &other),
    }
}
