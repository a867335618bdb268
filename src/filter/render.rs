use super::{Filter, Predicate};
use crate::schema::FieldId;
use crate::value::SqlValue;
use crate::{DataAccessError, Dialect};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatementKind {
    /// The base table's columns.
    Select,
    /// Columns of the base table and every joined table.
    SelectFull,
    /// One column, which may be an oid column.
    SelectField(FieldId),
    Count,
    Delete,
}

/// SQL text, its positional parameters and the fields of each result column.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub columns: Vec<FieldId>,
}

impl<'s> Filter<'s> {
    pub fn render(&self, kind: StatementKind) -> Result<RenderedStatement, DataAccessError> {
        self.render_as(kind, self.dialect)
    }

    fn render_as(
        &self,
        kind: StatementKind,
        dialect: Dialect,
    ) -> Result<RenderedStatement, DataAccessError> {
        let mut params = Vec::with_capacity(self.parameter_count());
        let (sql, columns) = match kind {
            StatementKind::Select => {
                let columns = self.plain_columns(&[self.base]);
                (self.select_sql(&columns, dialect, &mut params)?, columns)
            }
            StatementKind::SelectFull => {
                let columns = self.plain_columns(&self.tables());
                (self.select_sql(&columns, dialect, &mut params)?, columns)
            }
            StatementKind::SelectField(field) => {
                self.present_field(field)?;
                let columns = vec![field];
                (self.select_sql(&columns, dialect, &mut params)?, columns)
            }
            StatementKind::Count => (self.count_sql(dialect, &mut params)?, Vec::new()),
            StatementKind::Delete => (self.delete_sql(dialect, &mut params)?, Vec::new()),
        };
        Ok(RenderedStatement {
            sql,
            params,
            columns,
        })
    }

    /// Bare column names without joins, `table.column` with them.
    fn column(&self, field: FieldId) -> &'s str {
        let field = self.schema.field(field);
        if self.joins.is_empty() {
            field.sql_name()
        } else {
            field.sql_qualified_name()
        }
    }

    fn column_list(&self, fields: &[FieldId]) -> String {
        fields
            .iter()
            .map(|f| self.column(*f))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// All non-oid fields of `tables`, in table then declaration order.
    fn plain_columns(&self, tables: &[crate::schema::TableId]) -> Vec<FieldId> {
        tables
            .iter()
            .flat_map(|t| self.schema.table(*t).fields())
            .filter(|f| !f.is_oid())
            .map(|f| f.id())
            .collect()
    }

    fn from_clause(&self) -> String {
        let mut sql = self.schema.table(self.base).sql_name().to_string();
        for join in &self.joins {
            sql.push_str(" INNER JOIN ");
            sql.push_str(self.schema.table(join.target).sql_name());
            sql.push_str(" ON ");
            sql.push_str(self.column(join.left));
            sql.push_str(" = ");
            sql.push_str(self.column(join.right));
        }
        sql
    }

    fn predicate_sql(
        &self,
        predicate: &Predicate,
        dialect: Dialect,
        params: &mut Vec<SqlValue>,
    ) -> String {
        match predicate {
            Predicate::Compare { field, op, value } => {
                params.push(value.clone());
                format!("{} {} ?", self.column(*field), op.sql(dialect))
            }
            Predicate::AnyOf { field, op, values } => {
                let term = format!("{} {} ?", self.column(*field), op.sql(dialect));
                params.extend(values.iter().cloned());
                format!("( {} )", vec![term.as_str(); values.len()].join(" OR "))
            }
            Predicate::Null { field, negated } => {
                let not = if *negated { "NOT " } else { "" };
                format!("{} IS {not}NULL", self.column(*field))
            }
            Predicate::Weekday { field, day } => {
                params.push(SqlValue::Integer(i64::from(*day)));
                format!("{} = ?", dialect.weekday_of(self.column(*field)))
            }
        }
    }

    /// Predicates (wrapped in `NOT(...)` when inverted) followed by the
    /// sub-query tests, which are never inverted.
    fn condition(
        &self,
        dialect: Dialect,
        params: &mut Vec<SqlValue>,
    ) -> Result<Option<String>, DataAccessError> {
        let mut parts = Vec::with_capacity(self.subqueries.len() + 1);
        if !self.predicates.is_empty() {
            let body = self
                .predicates
                .iter()
                .map(|p| self.predicate_sql(p, dialect, params))
                .collect::<Vec<_>>()
                .join(" AND ");
            parts.push(if self.inverted {
                format!("NOT({body})")
            } else {
                body
            });
        }
        for test in &self.subqueries {
            let inner = test
                .sub
                .render_as(StatementKind::SelectField(test.sub_field), dialect)?;
            let not = if test.negated { "NOT " } else { "" };
            parts.push(format!("{} {not}IN ({})", self.column(test.own), inner.sql));
            params.extend(inner.params);
        }
        Ok((!parts.is_empty()).then(|| parts.join(" AND ")))
    }

    fn select_sql(
        &self,
        columns: &[FieldId],
        dialect: Dialect,
        params: &mut Vec<SqlValue>,
    ) -> Result<String, DataAccessError> {
        let mut sql = String::from("SELECT ");
        if !self.distinct.is_empty() && dialect.supports_distinct_on() {
            sql.push_str(&format!("DISTINCT ON ({}) ", self.column_list(&self.distinct)));
        }
        sql.push_str(&self.column_list(columns));
        sql.push_str(" FROM ");
        sql.push_str(&self.from_clause());
        if let Some(condition) = self.condition(dialect, params)? {
            sql.push_str(" WHERE ");
            sql.push_str(&condition);
        }
        if !self.distinct.is_empty() && !dialect.supports_distinct_on() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.column_list(&self.distinct));
        }
        if let Some(order) = self.order {
            sql.push_str(&format!(
                " ORDER BY {} {}",
                self.column(order.field),
                if order.ascending { "ASC" } else { "DESC" }
            ));
        }
        if let Some(paging) = self.paging {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", paging.limit, paging.offset));
        }
        Ok(sql)
    }

    /// Ordering and paging do not apply to counts. A distinct-on set is
    /// counted through a sub-select.
    fn count_sql(
        &self,
        dialect: Dialect,
        params: &mut Vec<SqlValue>,
    ) -> Result<String, DataAccessError> {
        let mut inner = String::new();
        inner.push_str(" FROM ");
        inner.push_str(&self.from_clause());
        if let Some(condition) = self.condition(dialect, params)? {
            inner.push_str(" WHERE ");
            inner.push_str(&condition);
        }
        if self.distinct.is_empty() {
            return Ok(format!("SELECT COUNT(*){inner}"));
        }
        let distinct = self.column_list(&self.distinct);
        Ok(if dialect.supports_distinct_on() {
            format!("SELECT COUNT(*) FROM (SELECT DISTINCT ON ({distinct}) {distinct}{inner}) AS distinct_rows")
        } else {
            format!("SELECT COUNT(*) FROM (SELECT {distinct}{inner} GROUP BY {distinct}) AS distinct_rows")
        })
    }

    fn delete_sql(
        &self,
        dialect: Dialect,
        params: &mut Vec<SqlValue>,
    ) -> Result<String, DataAccessError> {
        let base = self.schema.table(self.base).sql_name();
        let condition = self.condition(dialect, params)?;
        if self.joins.is_empty() {
            return Ok(match condition {
                Some(condition) => format!("DELETE FROM {base} WHERE {condition}"),
                None => format!("DELETE FROM {base}"),
            });
        }

        if dialect.supports_delete_using() {
            let using: Vec<&str> = self
                .joins
                .iter()
                .map(|j| self.schema.table(j.target).sql_name())
                .collect();
            let mut clauses: Vec<String> = self
                .joins
                .iter()
                .map(|j| format!("{} = {}", self.column(j.left), self.column(j.right)))
                .collect();
            clauses.extend(condition);
            Ok(format!(
                "DELETE FROM {base} USING {} WHERE {}",
                using.join(", "),
                clauses.join(" AND ")
            ))
        } else {
            let mut inner = format!("SELECT {base}.rowid FROM {}", self.from_clause());
            if let Some(condition) = condition {
                inner.push_str(" WHERE ");
                inner.push_str(&condition);
            }
            Ok(format!("DELETE FROM {base} WHERE rowid IN ({inner})"))
        }
    }
}
