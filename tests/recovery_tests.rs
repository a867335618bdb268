mod common;

use std::io::{Cursor, Write};

use relstore::record::Record;
use relstore::value::SqlValue;
use relstore::{AccessConfig, DataAccessContext, DataAccessError, IdDao, LoadMode, Value};
use zip::ZipWriter;
use zip::write::FileOptions;

use common::{User, count_rows, field, insert_order, insert_tag, insert_user};

fn archive_of(entries: &[(&str, &str)]) -> Cursor<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    let mut cursor = zip.finish().unwrap();
    cursor.set_position(0);
    cursor
}

fn all_rows(ctx: &DataAccessContext, table: &str) -> Vec<Vec<Value>> {
    let mut filter = ctx.filter(table).unwrap();
    filter.set_order(field(ctx, table, "id"), true).unwrap();
    ctx.execute_filter(&filter)
        .unwrap()
        .into_iter()
        .map(|row| row.into_values())
        .collect()
}

fn populated() -> DataAccessContext {
    let ctx = common::open();
    let pieter = insert_user(&ctx, "Pieter", "de Vries");
    let gone = insert_user(&ctx, "Anna", "de Vries");
    let jan = insert_user(&ctx, "Jan", "Jansen");
    let order = insert_order(&ctx, pieter, "2024-01-01", 1250, true);
    insert_order(&ctx, jan, "2024-03-10", 40, false);
    ctx.connection()
        .execute(
            "INSERT INTO line (order_id, product, quantity, price) VALUES (?, ?, ?, ?)",
            &[
                SqlValue::Integer(order),
                SqlValue::Text("widget".into()),
                SqlValue::Integer(3),
                SqlValue::Real(2.5),
            ],
        )
        .unwrap();
    ctx.connection()
        .execute(
            "INSERT INTO transfer (sender, receiver, amount) VALUES (?, ?, ?)",
            &[SqlValue::Integer(pieter), SqlValue::Integer(jan), SqlValue::Integer(700)],
        )
        .unwrap();
    insert_tag(&ctx, "rust", "A");
    ctx.connection()
        .execute("DELETE FROM user WHERE id = ?", &[SqlValue::Integer(gone)])
        .unwrap();
    ctx.payloads()
        .write(field(&ctx, "user", "photo"), jan, &b"\x89PNG fake image"[..])
        .unwrap();
    ctx
}

#[test]
fn archive_round_trips_rows_and_payloads() {
    let source = populated();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("backup.zip");

    let backup = source.save_to_path(&path).unwrap();
    let written: Vec<&str> = backup.tables.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(written, vec!["user", "orders", "line", "transfer", "tag"]);
    assert_eq!(backup.tables[0].1, 2);
    assert_eq!(backup.payloads, 1);
    assert_eq!(backup.payload_bytes, 15);

    let target = common::open();
    let report = target.load_from_path(&path).unwrap();
    assert!(report.is_complete(), "{:?}", report.failures);
    assert_eq!(report.rows_loaded("user"), Some(2));
    assert_eq!(report.rows_loaded("orders"), Some(2));
    assert_eq!(report.payloads_loaded, 1);
    assert!(report.skipped_entries.is_empty());

    for table in ["user", "orders", "line", "transfer", "tag"] {
        assert_eq!(all_rows(&source, table), all_rows(&target, table), "{table}");
    }
    let photo = field(&target, "user", "photo");
    assert_eq!(
        target.payloads().read_to_vec(photo, 3).unwrap(),
        b"\x89PNG fake image".to_vec()
    );
    assert!(!target.payloads().has_payload(photo, 1).unwrap());
}

#[test]
fn restored_sequences_continue_after_loaded_ids() {
    let source = populated();
    let mut archive = Cursor::new(Vec::new());
    source.save_to_archive(&mut archive).unwrap();
    archive.set_position(0);

    let target = common::open();
    target.load_from_archive(archive).unwrap();

    let users = IdDao::<User>::new(&target).unwrap();
    let mut user = User::new("Nieuw", "Lid");
    users.add(&mut user).unwrap();
    assert_eq!(user.id(), 4);
}

#[test]
fn quotes_and_backslashes_survive() {
    let source = common::open();
    insert_user(&source, r#"say "hi""#, r"C:\temp\new");
    insert_tag(&source, "", "\\");
    let mut archive = Cursor::new(Vec::new());
    source.save_to_archive(&mut archive).unwrap();
    archive.set_position(0);

    let target = common::open();
    assert!(target.load_from_archive(archive).unwrap().is_complete());
    assert_eq!(all_rows(&source, "user"), all_rows(&target, "user"));
    assert_eq!(all_rows(&source, "tag"), all_rows(&target, "tag"));
}

#[test]
fn bad_row_skips_only_its_table() {
    let archive = archive_of(&[
        (
            "user.csv",
            "\"id\",\"name\",\"lastname\"\n\"1\",\"Pieter\",\"de Vries\"\n\"two\",\"Anna\",\"de Vries\"\n",
        ),
        ("tag.csv", "\"id\",\"label\",\"grade\"\n\"5\",\"rust\",\"A\"\n"),
    ]);
    let target = common::open();
    let report = target.load_from_archive(archive).unwrap();

    assert_eq!(report.failures.len(), 1);
    let (table, message) = &report.failures[0];
    assert_eq!(table, "user");
    assert!(message.contains("row 2"), "{message}");
    assert!(message.contains("two,Anna,de Vries"), "{message}");
    assert_eq!(count_rows(&target, "user"), 0);
    assert_eq!(report.rows_loaded("tag"), Some(1));
    assert_eq!(count_rows(&target, "tag"), 1);
}

#[test]
fn entry_order_in_archive_does_not_matter() {
    let archive = archive_of(&[
        (
            "orders.csv",
            "\"id\",\"owner\",\"placed\",\"total\",\"paid\"\n\"1\",\"7\",\"2024-01-01\",\"10\",\"t\"\n",
        ),
        ("user.csv", "\"id\",\"name\",\"lastname\"\n\"7\",\"Jan\",\"Jansen\"\n"),
    ]);
    let target = common::open();
    let report = target.load_from_archive(archive).unwrap();
    assert!(report.is_complete(), "{:?}", report.failures);
    let loaded: Vec<&str> = report.tables_loaded.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(loaded, vec!["user", "orders"]);
    assert_eq!(count_rows(&target, "orders"), 1);
}

#[test]
fn unknown_entries_are_reported_as_skipped() {
    let archive = archive_of(&[
        ("tag.csv", "\"id\",\"label\",\"grade\"\n\"1\",\"rust\",\"A\"\n"),
        ("README.txt", "not a table"),
        ("ghost/ghost1_photo", "boo"),
        ("user/user1_photo", "no user rows in this archive"),
    ]);
    let target = common::open();
    let report = target.load_from_archive(archive).unwrap();
    assert!(report.is_complete());
    let mut skipped = report.skipped_entries.clone();
    skipped.sort();
    assert_eq!(skipped, vec!["README.txt", "ghost/ghost1_photo", "user/user1_photo"]);
    assert_eq!(report.rows_loaded("tag"), Some(1));
    assert_eq!(report.payloads_loaded, 0);
}

#[test]
fn unknown_columns_fail_the_table() {
    let archive = archive_of(&[("tag.csv", "\"id\",\"colour\"\n\"1\",\"red\"\n")]);
    let target = common::open();
    let report = target.load_from_archive(archive).unwrap();
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].1.contains("unknown column colour"));
}

fn chunked(chunk_size: usize) -> DataAccessContext {
    let mut cfg = AccessConfig::default();
    cfg.bulk.chunk_size = chunk_size;
    common::open_with(common::sample_schema(), &cfg)
}

#[test]
fn restore_splits_rows_into_chunks() {
    let source = common::open();
    for (name, lastname) in [
        ("Pieter", "de Vries"),
        ("Anna", "de Vries"),
        ("Jan", "Jansen"),
        ("Els", "Bakker"),
        ("Kees", "Visser"),
    ] {
        insert_user(&source, name, lastname);
    }

    let mut archive = Cursor::new(Vec::new());
    source.save_to_archive(&mut archive).unwrap();
    archive.set_position(0);
    let target = chunked(2);
    let report = target.load_from_archive(archive).unwrap();
    assert!(report.is_complete(), "{:?}", report.failures);
    assert_eq!(report.rows_loaded("user"), Some(5));
    assert_eq!(all_rows(&source, "user"), all_rows(&target, "user"));

    let mut csv = Vec::new();
    source.save_csv(&source.filter("user").unwrap(), &mut csv).unwrap();
    let target = chunked(2);
    target.reset_metrics();
    assert_eq!(target.load_csv("user", csv.as_slice(), LoadMode::Overwrite).unwrap(), 5);
    // Two chunks of two rows share one statement, the last row gets its own.
    let metrics = target.metrics();
    assert_eq!(metrics.prepare_cache_misses, 2);
    assert_eq!(metrics.prepare_cache_hits, 1);
    assert_eq!(count_rows(&target, "user"), 5);
}

#[test]
fn filtered_export_writes_matching_rows_only() {
    let source = populated();
    let mut filter = source.filter("user").unwrap();
    filter.field_equals(field(&source, "user", "lastname"), "Jansen").unwrap();

    let mut csv = Vec::new();
    assert_eq!(source.save_csv(&filter, &mut csv).unwrap(), 1);
    assert_eq!(
        String::from_utf8(csv).unwrap(),
        "\"id\",\"name\",\"lastname\"\n\"3\",\"Jan\",\"Jansen\"\n"
    );
}

#[test]
fn append_load_numbers_rows_afresh() {
    let target = common::open();
    insert_user(&target, "Pieter", "de Vries");
    let csv = "\"id\",\"name\",\"lastname\"\n\"1\",\"Anna\",\"de Vries\"\n\"x\",\"Jan\",\"Jansen\"\n";

    let err = target
        .load_csv("user", csv.as_bytes(), LoadMode::Overwrite)
        .unwrap_err();
    assert!(matches!(err, DataAccessError::Row { .. }), "{err:?}");

    assert_eq!(target.load_csv("user", csv.as_bytes(), LoadMode::Append).unwrap(), 2);
    let users = IdDao::<User>::new(&target).unwrap();
    let loaded: Vec<(i64, String)> = users
        .get_all()
        .unwrap()
        .into_iter()
        .map(|u| (u.id(), u.name))
        .collect();
    assert_eq!(
        loaded,
        vec![(1, "Pieter".into()), (2, "Anna".into()), (3, "Jan".into())]
    );
}
