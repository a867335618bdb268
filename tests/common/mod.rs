#![allow(dead_code)]

use std::sync::Arc;

use relstore::record::{Record, UNSET_ID, required_i64, text_or_empty};
use relstore::value::SqlValue;
use relstore::{
    AccessConfig, DataAccessContext, DataAccessError, FieldId, FieldType, RecordRow, Schema,
    SchemaBuilder, TableDef, TableId, Value, open_in_memory_context,
};

/// user <- orders <- line, user <- transfer (twice), tag standalone.
pub fn sample_schema() -> Arc<Schema> {
    let schema = SchemaBuilder::new()
        .table(
            TableDef::new("user")
                .docs("People placing orders")
                .serial_id("id")
                .field("name", FieldType::Text)
                .field("lastname", FieldType::Text)
                .field("photo", FieldType::Oid),
        )
        .table(
            TableDef::new("orders")
                .serial_id("id")
                .reference("owner", "user")
                .field("placed", FieldType::Date)
                .field("total", FieldType::Currency)
                .field("paid", FieldType::Boolean),
        )
        .table(
            TableDef::new("line")
                .serial_id("id")
                .reference("order_id", "orders")
                .field("product", FieldType::Text)
                .field("quantity", FieldType::Integer)
                .field("price", FieldType::Real),
        )
        .table(
            TableDef::new("transfer")
                .serial_id("id")
                .reference("sender", "user")
                .reference("receiver", "user")
                .field("amount", FieldType::Currency),
        )
        .table(
            TableDef::new("tag")
                .serial_id("id")
                .field("label", FieldType::Text)
                .field("grade", FieldType::Char),
        )
        .build()
        .expect("sample schema is valid");
    Arc::new(schema)
}

pub fn open_with(schema: Arc<Schema>, cfg: &AccessConfig) -> DataAccessContext {
    let ctx = open_in_memory_context(schema, cfg).expect("open context");
    ctx.reset().expect("reset schema");
    ctx
}

pub fn open() -> DataAccessContext {
    open_with(sample_schema(), &AccessConfig::default())
}

pub fn table(ctx: &DataAccessContext, name: &str) -> TableId {
    ctx.schema().require_table(name).unwrap().id()
}

pub fn field(ctx: &DataAccessContext, table: &str, column: &str) -> FieldId {
    ctx.schema().require_field(table, column).unwrap().id()
}

pub fn insert_user(ctx: &DataAccessContext, name: &str, lastname: &str) -> i64 {
    ctx.connection()
        .execute(
            "INSERT INTO user (name, lastname) VALUES (?, ?)",
            &[
                SqlValue::Text(name.to_string()),
                SqlValue::Text(lastname.to_string()),
            ],
        )
        .unwrap();
    ctx.connection().last_insert_rowid()
}

pub fn insert_order(ctx: &DataAccessContext, owner: i64, placed: &str, total: i64, paid: bool) -> i64 {
    ctx.connection()
        .execute(
            "INSERT INTO orders (owner, placed, total, paid) VALUES (?, ?, ?, ?)",
            &[
                SqlValue::Integer(owner),
                SqlValue::Text(placed.to_string()),
                SqlValue::Integer(total),
                SqlValue::Integer(i64::from(paid)),
            ],
        )
        .unwrap();
    ctx.connection().last_insert_rowid()
}

pub fn insert_tag(ctx: &DataAccessContext, label: &str, grade: &str) -> i64 {
    ctx.connection()
        .execute(
            "INSERT INTO tag (label, grade) VALUES (?, ?)",
            &[
                SqlValue::Text(label.to_string()),
                SqlValue::Text(grade.to_string()),
            ],
        )
        .unwrap();
    ctx.connection().last_insert_rowid()
}

pub fn count_rows(ctx: &DataAccessContext, table: &str) -> i64 {
    ctx.connection()
        .query_i64(&format!("SELECT COUNT(*) FROM {table}"), &[])
        .unwrap()
}

#[derive(Clone, Debug, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub lastname: String,
}

impl User {
    pub fn new(name: &str, lastname: &str) -> Self {
        Self {
            id: UNSET_ID,
            name: name.to_string(),
            lastname: lastname.to_string(),
        }
    }
}

impl Record for User {
    fn table_name() -> &'static str {
        "user"
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn from_row(row: &RecordRow) -> Result<Self, DataAccessError> {
        Ok(Self {
            id: required_i64(row, "id")?,
            name: text_or_empty(row, "name")?,
            lastname: text_or_empty(row, "lastname")?,
        })
    }

    fn value_of(&self, column: &str) -> Result<Value, DataAccessError> {
        match column {
            "name" => Ok(Value::from(self.name.as_str())),
            "lastname" => Ok(Value::from(self.lastname.as_str())),
            other => Err(DataAccessError::not_found(format!("user.{other}"))),
        }
    }
}
