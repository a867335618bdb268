//! Table creation order and the full drop-and-recreate of a schema.

use std::collections::VecDeque;

use ahash::AHashSet;
use tracing::{debug, info};

use crate::blob;
use crate::connection::{LoggingConnection, transactional};
use crate::fault_injection::{FaultPoint, check_fault};
use crate::progress::GlobalStatus;
use crate::schema::{Schema, SqlGenerator, TableId};
use crate::{DataAccessError, Dialect};

/// Every table of `schema`, each placed after the tables it references.
pub fn creation_order(schema: &Schema) -> Result<Vec<TableId>, DataAccessError> {
    creation_order_from(schema, schema.table_ids())
}

/// Orders `tables` so that no table precedes one it references.
///
/// References to tables outside `tables` count as already created, and
/// duplicates in the input are ignored.
pub fn creation_order_from<I>(schema: &Schema, tables: I) -> Result<Vec<TableId>, DataAccessError>
where
    I: IntoIterator<Item = TableId>,
{
    let mut pending = AHashSet::new();
    let mut worklist = VecDeque::new();
    for table in tables {
        if table.index() >= schema.len() {
            return Err(DataAccessError::not_found(format!("table #{}", table.index())));
        }
        if pending.insert(table) {
            worklist.push_back(table);
        }
    }

    let mut initialized = AHashSet::with_capacity(worklist.len());
    let mut order = Vec::with_capacity(worklist.len());
    // Consecutive requeues; a whole pass of them means no table can move.
    let mut stalled = 0;
    while let Some(table) = worklist.pop_front() {
        let ready = schema
            .table(table)
            .references()
            .iter()
            .all(|target| initialized.contains(target) || !pending.contains(target));
        if ready {
            initialized.insert(table);
            order.push(table);
            stalled = 0;
        } else {
            worklist.push_back(table);
            stalled += 1;
            if stalled > worklist.len() {
                let stuck: Vec<&str> = worklist.iter().map(|t| schema.table(*t).name()).collect();
                return Err(DataAccessError::schema(format!(
                    "cannot order tables with unresolved references: {}",
                    stuck.join(", ")
                )));
            }
        }
    }
    Ok(order)
}

/// Drops every table of `schema` and the large-object store, then recreates
/// them in creation order, all inside one transaction.
///
/// Foreign-key enforcement is switched off for the duration and set back to
/// `foreign_keys` afterwards, whether or not the reset succeeded.
pub fn reset_schema(
    conn: LoggingConnection<'_>,
    schema: &Schema,
    foreign_keys: bool,
    status: &mut GlobalStatus,
) -> Result<(), DataAccessError> {
    let order = creation_order(schema)?;
    conn.execute_batch("PRAGMA foreign_keys = OFF")?;

    let outcome = transactional(conn, |tx| {
        let conn = tx.conn();
        for table in schema.tables() {
            conn.execute_batch(&SqlGenerator::new(schema, table.id(), Dialect::Sqlite).drop_table())?;
        }
        blob::drop_store(conn)?;
        blob::ensure_store(conn)?;

        status.set_total(order.len());
        for table in &order {
            let generator = SqlGenerator::new(schema, *table, Dialect::Sqlite);
            status.begin_relation(generator.table().name());
            debug!(table = generator.table().name(), "creating table");
            conn.execute_batch(&generator.create_table())?;
        }
        check_fault(FaultPoint::ResetBeforeCommit)
    });

    let restore = conn.execute_batch(if foreign_keys {
        "PRAGMA foreign_keys = ON"
    } else {
        "PRAGMA foreign_keys = OFF"
    });
    outcome?;
    restore?;
    info!(tables = order.len(), "schema reset complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, SchemaBuilder, TableDef};

    fn names(schema: &Schema, order: &[TableId]) -> Vec<String> {
        order
            .iter()
            .map(|t| schema.table(*t).name().to_string())
            .collect()
    }

    #[test]
    fn subset_treats_outside_references_as_created() {
        let schema = SchemaBuilder::new()
            .table(TableDef::new("user").serial_id("id"))
            .table(
                TableDef::new("orders")
                    .serial_id("id")
                    .reference("owner", "user"),
            )
            .table(
                TableDef::new("line")
                    .serial_id("id")
                    .reference("order_id", "orders")
                    .field("amount", FieldType::Currency),
            )
            .build()
            .unwrap();
        let line = schema.require_table("line").unwrap().id();
        let orders = schema.require_table("orders").unwrap().id();
        let order = creation_order_from(&schema, [line, orders, line]).unwrap();
        assert_eq!(names(&schema, &order), vec!["orders", "line"]);
    }
}
