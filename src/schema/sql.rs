//! DDL and DML text for a single table.

use super::{FieldId, FieldType, Schema, Table, TableId};
use crate::{DataAccessError, Dialect};

pub struct SqlGenerator<'s> {
    schema: &'s Schema,
    table: &'s Table,
    dialect: Dialect,
}

impl<'s> SqlGenerator<'s> {
    pub fn new(schema: &'s Schema, table: TableId, dialect: Dialect) -> Self {
        Self {
            schema,
            table: schema.table(table),
            dialect,
        }
    }

    pub fn table(&self) -> &'s Table {
        self.table
    }

    /// The id the store generates: a lone integer id that is not a reference.
    pub fn serial_id(&self) -> Option<FieldId> {
        let id = self.table.single_id()?;
        let field = self.schema.field(id);
        (field.ty == FieldType::Integer && field.reference.is_none()).then_some(id)
    }

    pub fn create_table(&self) -> String {
        let serial = self.serial_id();
        let mut columns = Vec::with_capacity(self.table.fields.len() + 1);
        for field in &self.table.fields {
            let mut column = format!("{} ", field.sql_name);
            if serial == Some(field.id) {
                column.push_str(match self.dialect {
                    Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
                    Dialect::Postgres => "SERIAL",
                });
            } else {
                column.push_str(match self.dialect {
                    Dialect::Sqlite => field.ty.sqlite_name(),
                    Dialect::Postgres => field.ty.sql_name(),
                });
            }
            if let Some(target) = field.reference {
                column.push_str(" REFERENCES ");
                column.push_str(&self.schema.table(target).sql_name);
                column.push_str(" ON DELETE CASCADE");
            }
            columns.push(column);
        }
        if serial.is_none() || self.dialect == Dialect::Postgres {
            let keys: Vec<&str> = self
                .table
                .id_fields
                .iter()
                .map(|id| self.schema.field(*id).sql_name.as_str())
                .collect();
            columns.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }
        format!("CREATE TABLE {} ({})", self.table.sql_name, columns.join(", "))
    }

    pub fn drop_table(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.table.sql_name)
    }

    /// Columns written by an INSERT. Oid columns are never included and the
    /// serial id only when `include_serial_id` is set.
    pub fn insert_columns(&self, include_serial_id: bool) -> Vec<FieldId> {
        let serial = self.serial_id();
        self.table
            .fields
            .iter()
            .filter(|f| !f.is_oid())
            .filter(|f| include_serial_id || serial != Some(f.id))
            .map(|f| f.id)
            .collect()
    }

    /// Multi-row INSERT over `columns` with one placeholder group per row.
    pub fn insert(&self, columns: &[FieldId], rows: usize) -> Result<String, DataAccessError> {
        if rows == 0 || columns.is_empty() {
            return Err(DataAccessError::invalid_input(format!(
                "insert into {} needs at least one row and one column",
                self.table.name
            )));
        }
        let names = self.column_names(columns)?;
        let group = format!("({})", vec!["?"; columns.len()].join(", "));
        let values = vec![group.as_str(); rows].join(", ");
        Ok(format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table.sql_name,
            names.join(", "),
            values
        ))
    }

    /// UPDATE of every non-id, non-oid column keyed on the id fields.
    /// Returns the statement and the fields in parameter order.
    pub fn update(&self) -> Result<(String, Vec<FieldId>), DataAccessError> {
        let values: Vec<FieldId> = self
            .table
            .fields
            .iter()
            .filter(|f| !f.is_id && !f.is_oid())
            .map(|f| f.id)
            .collect();
        if values.is_empty() {
            return Err(DataAccessError::invalid_input(format!(
                "table {} has no updatable columns",
                self.table.name
            )));
        }
        let assignments: Vec<String> = values
            .iter()
            .map(|id| format!("{} = ?", self.schema.field(*id).sql_name))
            .collect();
        let mut order = values;
        order.extend_from_slice(&self.table.id_fields);
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.table.sql_name,
            assignments.join(", "),
            self.key_condition()
        );
        Ok((sql, order))
    }

    /// UPDATE of one column keyed on the id fields.
    pub fn update_field(&self, field: FieldId) -> Result<String, DataAccessError> {
        let name = &self.column_names(&[field])?[0];
        Ok(format!(
            "UPDATE {} SET {} = ? WHERE {}",
            self.table.sql_name,
            name,
            self.key_condition()
        ))
    }

    /// Statements moving the auto-increment counter so the next id is
    /// `max(id) + 1`. Empty for tables without a serial id.
    pub fn resync_sequence(&self) -> Vec<String> {
        let Some(serial) = self.serial_id() else {
            return Vec::new();
        };
        let name = &self.table.name;
        let table = &self.table.sql_name;
        let column = &self.schema.field(serial).sql_name;
        match self.dialect {
            Dialect::Sqlite => vec![
                format!(
                    "UPDATE sqlite_sequence SET seq = (SELECT COALESCE(MAX({column}), 0) FROM {table}) WHERE name = '{name}'"
                ),
                format!(
                    "INSERT INTO sqlite_sequence (name, seq) SELECT '{name}', COALESCE(MAX({column}), 0) FROM {table} WHERE NOT EXISTS (SELECT 1 FROM sqlite_sequence WHERE name = '{name}')"
                ),
            ],
            // The table argument is parsed as an identifier, the column argument is not.
            Dialect::Postgres => vec![format!(
                "SELECT setval(pg_get_serial_sequence('{table}', '{}'), COALESCE(MAX({column}), 0) + 1, false) FROM {table}",
                self.schema.field(serial).name
            )],
        }
    }

    fn key_condition(&self) -> String {
        self.table
            .id_fields
            .iter()
            .map(|id| format!("{} = ?", self.schema.field(*id).sql_name))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn column_names(&self, columns: &[FieldId]) -> Result<Vec<String>, DataAccessError> {
        columns
            .iter()
            .map(|id| {
                self.table
                    .field(*id)
                    .map(|f| f.sql_name.clone())
                    .ok_or_else(|| {
                        DataAccessError::validation(
                            "field does not belong to table",
                            self.table.name.clone(),
                        )
                    })
            })
            .collect()
    }
}
