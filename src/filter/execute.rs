//! Running rendered filters through a [`DataAccessContext`].

use std::sync::Arc;

use super::{Filter, RenderedStatement, StatementKind};
use crate::schema::{FieldId, FieldType, Schema};
use crate::value::{self, Value};
use crate::{DataAccessContext, DataAccessError};

#[derive(Debug)]
struct Column {
    field: FieldId,
    name: String,
    qualified: String,
}

/// One decoded result row.
#[derive(Clone, Debug)]
pub struct RecordRow {
    columns: Arc<[Column]>,
    values: Vec<Value>,
}

impl RecordRow {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.columns.iter().map(|c| c.field)
    }

    pub fn value(&self, field: FieldId) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.field == field)
            .map(|i| &self.values[i])
    }

    /// Value of the first column called `column` (`name` or `table.name`).
    pub fn get(&self, column: &str) -> Result<&Value, DataAccessError> {
        self.columns
            .iter()
            .position(|c| c.name == column || c.qualified == column)
            .map(|i| &self.values[i])
            .ok_or_else(|| DataAccessError::not_found(format!("column {column} in result row")))
    }
}

impl PartialEq for RecordRow {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values && self.fields().eq(other.fields())
    }
}

fn describe_columns(schema: &Schema, fields: &[FieldId]) -> Arc<[Column]> {
    fields
        .iter()
        .map(|id| {
            let field = schema.field(*id);
            Column {
                field: *id,
                name: field.name().to_string(),
                qualified: field.qualified_name().to_string(),
            }
        })
        .collect()
}

impl DataAccessContext {
    fn check_filter(&self, filter: &Filter<'_>) -> Result<(), DataAccessError> {
        if std::ptr::eq(filter.schema(), self.schema()) {
            Ok(())
        } else {
            Err(DataAccessError::invalid_input(
                "filter was built against a different schema",
            ))
        }
    }

    /// Streams the rows of a rendered select through `on_row`.
    pub fn for_each_row<F>(
        &self,
        statement: &RenderedStatement,
        mut on_row: F,
    ) -> Result<usize, DataAccessError>
    where
        F: FnMut(RecordRow) -> Result<(), DataAccessError>,
    {
        let schema = self.schema();
        let columns = describe_columns(schema, &statement.columns);
        self.connection()
            .query(&statement.sql, &statement.params, |row| {
                let mut values = Vec::with_capacity(columns.len());
                for (index, column) in columns.iter().enumerate() {
                    values.push(value::from_row(row, index, schema.field(column.field))?);
                }
                on_row(RecordRow {
                    columns: Arc::clone(&columns),
                    values,
                })
            })
    }

    pub fn query_rows(
        &self,
        statement: &RenderedStatement,
    ) -> Result<Vec<RecordRow>, DataAccessError> {
        let mut rows = Vec::new();
        self.for_each_row(statement, |row| {
            rows.push(row);
            Ok(())
        })?;
        Ok(rows)
    }

    /// Rows of the filter's base table.
    pub fn execute_filter(&self, filter: &Filter<'_>) -> Result<Vec<RecordRow>, DataAccessError> {
        self.check_filter(filter)?;
        self.query_rows(&filter.render(StatementKind::Select)?)
    }

    /// Rows including the columns of joined tables.
    pub fn execute_full(&self, filter: &Filter<'_>) -> Result<Vec<RecordRow>, DataAccessError> {
        self.check_filter(filter)?;
        self.query_rows(&filter.render(StatementKind::SelectFull)?)
    }

    /// The only row matching `filter`.
    pub fn execute_singleton(&self, filter: &Filter<'_>) -> Result<RecordRow, DataAccessError> {
        self.check_filter(filter)?;
        let statement = filter.render(StatementKind::Select)?;
        let mut rows = self.query_rows(&statement)?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            0 => Err(DataAccessError::not_found(format!(
                "no elements match {}",
                statement.sql
            ))),
            n => Err(DataAccessError::invalid_input(format!(
                "multiple elements ({n}) match {}",
                statement.sql
            ))),
        }
    }

    pub fn execute_count(&self, filter: &Filter<'_>) -> Result<i64, DataAccessError> {
        self.check_filter(filter)?;
        let statement = filter.render(StatementKind::Count)?;
        self.connection().query_i64(&statement.sql, &statement.params)
    }

    /// Deletes the matching base-table rows; returns how many were removed.
    pub fn execute_delete(&self, filter: &Filter<'_>) -> Result<usize, DataAccessError> {
        self.check_filter(filter)?;
        let statement = filter.render(StatementKind::Delete)?;
        self.connection().execute(&statement.sql, &statement.params)
    }

    /// Values of one column, in row order.
    pub fn execute_field(
        &self,
        filter: &Filter<'_>,
        field: FieldId,
    ) -> Result<Vec<Value>, DataAccessError> {
        self.check_filter(filter)?;
        let rows = self.query_rows(&filter.render(StatementKind::SelectField(field))?)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_values().into_iter().next())
            .collect())
    }

    fn typed_field<T>(
        &self,
        filter: &Filter<'_>,
        field: FieldId,
        accepted: &[FieldType],
        extract: impl Fn(&Value) -> Option<T>,
    ) -> Result<Vec<T>, DataAccessError> {
        if !self.schema().contains_field(field) {
            return Err(DataAccessError::validation("unregistered field", format!("{field:?}")));
        }
        let resolved = self.schema().field(field);
        if !accepted.contains(&resolved.field_type()) {
            return Err(DataAccessError::validation(
                format!("{} column cannot be read as {:?}", resolved.field_type(), accepted),
                resolved.qualified_name(),
            ));
        }
        Ok(self
            .execute_field(filter, field)?
            .iter()
            .filter_map(extract)
            .collect())
    }

    /// Text values of `field`; NULLs are skipped.
    pub fn execute_strings(
        &self,
        filter: &Filter<'_>,
        field: FieldId,
    ) -> Result<Vec<String>, DataAccessError> {
        self.typed_field(filter, field, &[FieldType::Text, FieldType::Char], |v| {
            v.as_text().map(str::to_string)
        })
    }

    pub fn execute_integers(
        &self,
        filter: &Filter<'_>,
        field: FieldId,
    ) -> Result<Vec<i64>, DataAccessError> {
        self.typed_field(
            filter,
            field,
            &[FieldType::Integer, FieldType::Currency],
            Value::as_i64,
        )
    }

    pub fn execute_reals(
        &self,
        filter: &Filter<'_>,
        field: FieldId,
    ) -> Result<Vec<f64>, DataAccessError> {
        self.typed_field(
            filter,
            field,
            &[FieldType::Real, FieldType::Integer, FieldType::Currency],
            Value::as_f64,
        )
    }

    pub fn execute_bools(
        &self,
        filter: &Filter<'_>,
        field: FieldId,
    ) -> Result<Vec<bool>, DataAccessError> {
        self.typed_field(filter, field, &[FieldType::Boolean], Value::as_bool)
    }
}
