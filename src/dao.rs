//! Generic create/read/update/delete over [`Record`] types.

use std::marker::PhantomData;

use crate::filter::Filter;
use crate::record::Record;
use crate::schema::{FieldId, SqlGenerator, TableId};
use crate::value::{self, SqlValue};
use crate::{DataAccessContext, DataAccessError, Dialect};

/// Data access for a record type whose table has a generated integer id.
pub struct IdDao<'c, R> {
    ctx: &'c DataAccessContext,
    table: TableId,
    id_field: FieldId,
    _record: PhantomData<fn() -> R>,
}

impl<R> std::fmt::Debug for IdDao<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdDao")
            .field("ctx", &self.ctx)
            .field("table", &self.table)
            .field("id_field", &self.id_field)
            .finish()
    }
}

impl<'c, R: Record> IdDao<'c, R> {
    pub fn new(ctx: &'c DataAccessContext) -> Result<Self, DataAccessError> {
        let schema = ctx.schema();
        let table = schema.require_table(R::table_name())?.id();
        let generator = SqlGenerator::new(schema, table, Dialect::Sqlite);
        let id_field = generator.serial_id().ok_or_else(|| {
            DataAccessError::validation("table needs a generated integer id", R::table_name())
        })?;
        Ok(Self {
            ctx,
            table,
            id_field,
            _record: PhantomData,
        })
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn id_field(&self) -> FieldId {
        self.id_field
    }

    /// An empty filter on the record's table.
    pub fn filter(&self) -> Filter<'c> {
        Filter::new(self.ctx.schema(), self.table)
    }

    fn parameter(&self, field: FieldId, record: &R) -> Result<SqlValue, DataAccessError> {
        if field == self.id_field {
            return Ok(SqlValue::Integer(record.id()));
        }
        let field = self.ctx.schema().field(field);
        value::to_parameter(field, &record.value_of(field.name())?)
    }

    /// Inserts `record` and stores the generated id in it.
    pub fn add(&self, record: &mut R) -> Result<i64, DataAccessError> {
        record.check_no_id()?;
        let generator = SqlGenerator::new(self.ctx.schema(), self.table, Dialect::Sqlite);
        let columns = generator.insert_columns(false);
        let conn = self.ctx.connection();
        if columns.is_empty() {
            conn.execute(
                &format!(
                    "INSERT INTO {} DEFAULT VALUES",
                    generator.table().sql_name()
                ),
                &[],
            )?;
        } else {
            let params = columns
                .iter()
                .map(|f| self.parameter(*f, record))
                .collect::<Result<Vec<_>, _>>()?;
            conn.execute(&generator.insert(&columns, 1)?, &params)?;
        }
        let id = conn.last_insert_rowid();
        record.set_id(id);
        Ok(id)
    }

    /// Writes every non-id column of a stored record.
    pub fn update(&self, record: &R) -> Result<(), DataAccessError> {
        record.check_id()?;
        let generator = SqlGenerator::new(self.ctx.schema(), self.table, Dialect::Sqlite);
        let (sql, order) = generator.update()?;
        let params = order
            .iter()
            .map(|f| self.parameter(*f, record))
            .collect::<Result<Vec<_>, _>>()?;
        match self.ctx.connection().execute(&sql, &params)? {
            1 => Ok(()),
            0 => Err(DataAccessError::not_found(format!(
                "{}#{}",
                R::table_name(),
                record.id()
            ))),
            n => Err(DataAccessError::invalid_input(format!(
                "update of {}#{} touched {n} rows",
                R::table_name(),
                record.id()
            ))),
        }
    }

    /// Deletes a stored record and resets its id to `0`.
    pub fn delete(&self, record: &mut R) -> Result<(), DataAccessError> {
        record.check_id()?;
        self.delete_by_id(record.id())?;
        record.invalidate_id();
        Ok(())
    }

    /// Returns the number of deleted rows.
    pub fn delete_by_id(&self, id: i64) -> Result<usize, DataAccessError> {
        if id < 0 {
            return Err(DataAccessError::invalid_input(format!(
                "cannot delete {} with id {id}",
                R::table_name()
            )));
        }
        let mut filter = self.filter();
        filter.field_equals(self.id_field, id)?;
        self.ctx.execute_delete(&filter)
    }

    pub fn get_by_id(&self, id: i64) -> Result<R, DataAccessError> {
        if id < 1 {
            return Err(DataAccessError::invalid_input(format!(
                "invalid {} id {id}",
                R::table_name()
            )));
        }
        let mut filter = self.filter();
        filter.field_equals(self.id_field, id)?;
        R::from_row(&self.ctx.execute_singleton(&filter)?)
    }

    /// Every record, by ascending id.
    pub fn get_all(&self) -> Result<Vec<R>, DataAccessError> {
        let mut filter = self.filter();
        filter.set_order(self.id_field, true)?;
        self.execute_filter(&filter)
    }

    pub fn count(&self) -> Result<i64, DataAccessError> {
        self.ctx.execute_count(&self.filter())
    }

    pub fn is_empty(&self) -> Result<bool, DataAccessError> {
        Ok(self.count()? == 0)
    }

    /// Records matching `filter`, which must be based on the record's table.
    pub fn execute_filter(&self, filter: &Filter<'_>) -> Result<Vec<R>, DataAccessError> {
        if std::ptr::eq(filter.schema(), self.ctx.schema()) && filter.base() != self.table {
            return Err(DataAccessError::validation(
                "filter is based on another table",
                self.ctx.schema().table(filter.base()).name(),
            ));
        }
        self.ctx
            .execute_filter(filter)?
            .iter()
            .map(R::from_row)
            .collect()
    }
}
