mod common;

use std::cell::RefCell;
use std::io::Cursor;
use std::rc::Rc;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use relstore::resolver::{creation_order, creation_order_from};
use relstore::value::SqlValue;
use relstore::{
    AccessConfig, DataAccessError, FieldType, GlobalStatus, Schema, SchemaBuilder, TableDef,
    TableId, open_in_memory_context,
};

fn names(schema: &Schema, order: &[TableId]) -> Vec<String> {
    order
        .iter()
        .map(|t| schema.table(*t).name().to_string())
        .collect()
}

fn assert_references_precede(schema: &Schema, order: &[TableId]) {
    for (position, table) in order.iter().enumerate() {
        for target in schema.table(*table).references() {
            let target_position = order
                .iter()
                .position(|t| t == target)
                .unwrap_or_else(|| panic!("{} missing from order", schema.table(*target).name()));
            assert!(
                target_position < position,
                "{} placed before {}",
                schema.table(*table).name(),
                schema.table(*target).name()
            );
        }
    }
}

#[test]
fn single_table_orders_to_itself() {
    let schema = SchemaBuilder::new()
        .table(TableDef::new("user").serial_id("id"))
        .build()
        .unwrap();
    assert_eq!(names(&schema, &creation_order(&schema).unwrap()), vec!["user"]);
}

#[test]
fn referenced_table_comes_first_regardless_of_declaration() {
    let schema = SchemaBuilder::new()
        .table(
            TableDef::new("orders")
                .serial_id("id")
                .reference("owner", "user"),
        )
        .table(TableDef::new("user").serial_id("id"))
        .build()
        .unwrap();
    assert_eq!(
        names(&schema, &creation_order(&schema).unwrap()),
        vec!["user", "orders"]
    );
}

#[test]
fn unrelated_tables_each_appear_once() {
    let mut builder = SchemaBuilder::new();
    for i in 0..12 {
        builder = builder.table(
            TableDef::new(format!("t{i}"))
                .serial_id("id")
                .field("value", FieldType::Integer),
        );
    }
    let schema = builder.build().unwrap();
    let order = creation_order(&schema).unwrap();
    assert_eq!(order.len(), 12);
    let mut sorted = names(&schema, &order);
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), 12);
}

#[test]
fn random_acyclic_schemas_are_ordered() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..25 {
        let count = rng.gen_range(2..15);
        // Table i only references tables with a larger index, so the graph is
        // acyclic while declaration order is unhelpful.
        let mut builder = SchemaBuilder::new();
        for i in 0..count {
            let mut def = TableDef::new(format!("t{i}")).serial_id("id");
            for j in (i + 1)..count {
                if rng.gen_bool(0.3) {
                    def = def.reference(format!("ref_{j}"), format!("t{j}"));
                }
            }
            builder = builder.table(def);
        }
        let schema = builder.build().unwrap();
        let order = creation_order(&schema).unwrap();
        assert_eq!(order.len(), count);
        assert_references_precede(&schema, &order);
    }
}

#[test]
fn subsets_ignore_unlisted_references() {
    let schema = common::sample_schema();
    let line = schema.require_table("line").unwrap().id();
    let tag = schema.require_table("tag").unwrap().id();
    let user = schema.require_table("user").unwrap().id();
    let order = creation_order_from(&schema, [line, tag, user]).unwrap();
    assert_eq!(names(&schema, &order), vec!["line", "tag", "user"]);

    let everything = creation_order(&schema).unwrap();
    assert_references_precede(&schema, &everything);
}

#[test]
fn keyword_named_tables_survive_reset_queries_and_backup() {
    let schema = Arc::new(
        SchemaBuilder::new()
            .table(
                TableDef::new("order")
                    .serial_id("id")
                    .reference("user", "user")
                    .field("group", FieldType::Text),
            )
            .table(
                TableDef::new("user")
                    .serial_id("id")
                    .field("name", FieldType::Text),
            )
            .build()
            .unwrap(),
    );
    assert_eq!(
        names(&schema, &creation_order(&schema).unwrap()),
        vec!["user", "order"]
    );

    let ctx = common::open_with(Arc::clone(&schema), &AccessConfig::default());
    let conn = ctx.connection();
    conn.execute("INSERT INTO user (name) VALUES (?)", &[SqlValue::Text("Jan".into())])
        .unwrap();
    conn.execute(
        "INSERT INTO \"order\" (user, \"group\") VALUES (?, ?)",
        &[SqlValue::Integer(1), SqlValue::Text("retail".into())],
    )
    .unwrap();

    let group = schema.require_field("order", "group").unwrap().id();
    let mut filter = ctx.filter("order").unwrap();
    filter.join_table("user").unwrap().field_equals(group, "retail").unwrap();
    assert_eq!(ctx.execute_count(&filter).unwrap(), 1);

    let mut archive = Cursor::new(Vec::new());
    ctx.save_to_archive(&mut archive).unwrap();
    archive.set_position(0);
    let target = common::open_with(schema, &AccessConfig::default());
    let report = target.load_from_archive(archive).unwrap();
    assert!(report.is_complete(), "{:?}", report.failures);
    assert_eq!(report.rows_loaded("order"), Some(1));

    assert_eq!(ctx.execute_delete(&filter).unwrap(), 1);
    assert_eq!(ctx.execute_count(&ctx.filter("order").unwrap()).unwrap(), 0);
}

#[test]
fn reset_creates_tables_and_clears_rows() {
    let ctx = common::open();
    assert!(ctx.has_been_reset());
    let conn = ctx.connection();
    for name in ["user", "orders", "line", "transfer", "tag", "large_object", "large_object_page"] {
        assert!(conn.table_exists(name).unwrap(), "{name} missing");
    }
    assert!(ctx.is_empty().unwrap());

    common::insert_tag(&ctx, "rust", "A");
    assert!(!ctx.is_empty().unwrap());
}

#[test]
fn reset_drops_rows_written_before_it() {
    let schema = common::sample_schema();
    let ctx = open_in_memory_context(Arc::clone(&schema), &AccessConfig::default()).unwrap();
    // The tables do not exist yet; missing tables count as empty.
    assert!(ctx.is_empty().unwrap());
    ctx.connection()
        .execute_batch(
            "CREATE TABLE tag (id INTEGER PRIMARY KEY, label TEXT); \
             INSERT INTO tag (label) VALUES ('old')",
        )
        .unwrap();
    assert!(!ctx.is_empty().unwrap());

    let mut status = GlobalStatus::new(schema.len());
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    status.add_listener(move |progress| sink.borrow_mut().push(progress.relation.clone()));
    ctx.reset_with_status(&mut status).unwrap();

    assert!(ctx.is_empty().unwrap());
    assert_eq!(status.snapshot().total_relations, 5);
    let seen = seen.borrow();
    assert_eq!(seen.first().map(String::as_str), Some("user"));
    assert_eq!(seen.len(), 5);
    assert!(ctx.is_auto_commit());
}

#[test]
fn reset_is_allowed_once() {
    let ctx = common::open();
    let err = ctx.reset().unwrap_err();
    assert!(matches!(err, DataAccessError::InvalidInput(_)), "{err:?}");
}
