//! Immutable schema registry: tables, typed fields and foreign-key references.
//!
//! A [`Schema`] is built once through [`SchemaBuilder`] (or from JSON) and then
//! shared read-only, usually as `Arc<Schema>`. Tables and fields are addressed
//! by the copyable handles [`TableId`] and [`FieldId`]; name lookups go through
//! maps built during [`SchemaBuilder::build`].

pub mod builder;
pub mod docs;
pub mod sql;
pub mod table;
pub mod types;

use ahash::AHashMap;

pub use builder::{FieldDef, SchemaBuilder, SchemaDescription, TableDef};
pub use sql::SqlGenerator;
pub use table::{Field, FieldId, Table, TableId};
pub use types::FieldType;

use crate::DataAccessError;

#[derive(Debug)]
pub struct Schema {
    tables: Vec<Table>,
    by_name: AHashMap<String, TableId>,
    referenced_by: Vec<Vec<TableId>>,
}

impl Schema {
    pub(crate) fn from_parts(tables: Vec<Table>, by_name: AHashMap<String, TableId>) -> Self {
        let mut referenced_by = vec![Vec::new(); tables.len()];
        for table in &tables {
            for target in &table.references {
                referenced_by[target.0].push(table.id);
            }
        }
        Self {
            tables,
            by_name,
            referenced_by,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, DataAccessError> {
        let description: SchemaDescription = serde_json::from_str(json)
            .map_err(|e| DataAccessError::schema(format!("invalid schema description: {e}")))?;
        SchemaBuilder::from_description(description).build()
    }

    /// Tables in declaration order.
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table_ids(&self) -> impl Iterator<Item = TableId> + '_ {
        self.tables.iter().map(|t| t.id)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// # Panics
    ///
    /// When `id` was handed out by another schema with more tables. Use
    /// [`Schema::require_table`] or [`Schema::contains_field`] for ids of
    /// unknown origin.
    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id.0]
    }

    /// # Panics
    ///
    /// Like [`Schema::table`], for field ids from another schema.
    pub fn field(&self, id: FieldId) -> &Field {
        &self.tables[id.table.0].fields[id.index]
    }

    pub fn contains_field(&self, id: FieldId) -> bool {
        self.tables
            .get(id.table.0)
            .is_some_and(|table| id.index < table.fields.len())
    }

    pub fn table_named(&self, name: &str) -> Option<&Table> {
        self.by_name.get(name).map(|id| &self.tables[id.0])
    }

    pub fn field_named(&self, table: &str, column: &str) -> Option<&Field> {
        self.table_named(table)?.field_named(column)
    }

    pub fn require_table(&self, name: &str) -> Result<&Table, DataAccessError> {
        self.table_named(name)
            .ok_or_else(|| DataAccessError::not_found(format!("table {name}")))
    }

    pub fn require_field(&self, table: &str, column: &str) -> Result<&Field, DataAccessError> {
        self.require_table(table)?
            .field_named(column)
            .ok_or_else(|| DataAccessError::not_found(format!("field {table}.{column}")))
    }

    /// Tables holding a reference to `table`.
    pub fn referenced_by(&self, table: TableId) -> &[TableId] {
        &self.referenced_by[table.0]
    }

    /// The single id field of `table`, or a validation error naming it.
    pub fn single_id(&self, table: TableId) -> Result<FieldId, DataAccessError> {
        let table = self.table(table);
        table.single_id().ok_or_else(|| {
            DataAccessError::validation(
                format!("{} id fields where one is required", table.id_fields.len()),
                table.name.clone(),
            )
        })
    }
}
