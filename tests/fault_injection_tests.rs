mod common;

use std::io::Cursor;
use std::sync::{Mutex, MutexGuard, OnceLock};

use relstore::fault_injection::{FaultPoint, configure_fault, reset_faults};
use relstore::{AccessConfig, DataAccessContext, DataAccessError, open_context};
use tempfile::TempDir;

fn test_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn is_fault(err: &DataAccessError) -> bool {
    match err {
        DataAccessError::FaultInjected(_) => true,
        DataAccessError::Blob { source, .. } => is_fault(source),
        _ => false,
    }
}

fn count(ctx: &DataAccessContext, sql: &str) -> i64 {
    ctx.connection().query_i64(sql, &[]).unwrap()
}

fn on_disk(dir: &TempDir) -> DataAccessContext {
    open_context(
        dir.path().join("store.db"),
        common::sample_schema(),
        &AccessConfig::default(),
    )
    .unwrap()
}

#[test]
fn failed_reset_keeps_previous_tables_and_rows() {
    let _guard = test_lock();
    reset_faults();
    let dir = tempfile::tempdir().unwrap();

    let first = on_disk(&dir);
    first.reset().unwrap();
    let owner = common::insert_user(&first, "Pieter", "de Vries");
    common::insert_order(&first, owner, "2024-01-01", 1250, true);
    drop(first);

    let second = on_disk(&dir);
    configure_fault(FaultPoint::ResetBeforeCommit, 1);
    let err = second.reset().unwrap_err();
    assert!(is_fault(&err), "{err:?}");
    assert!(!second.has_been_reset());
    assert!(second.is_auto_commit());
    assert_eq!(count(&second, "PRAGMA foreign_keys"), 1);
    assert_eq!(common::count_rows(&second, "user"), 1);
    assert_eq!(common::count_rows(&second, "orders"), 1);

    // Disarmed after one failure.
    second.reset().unwrap();
    assert!(second.is_empty().unwrap());
    assert_eq!(count(&second, "PRAGMA foreign_keys"), 1);
    reset_faults();
}

#[test]
fn blob_write_failing_mid_stream_keeps_old_payload() {
    let _guard = test_lock();
    reset_faults();
    let ctx = common::open();
    let id = common::insert_user(&ctx, "Anna", "de Vries");
    let photo = common::field(&ctx, "user", "photo");
    let payloads = ctx.payloads();

    payloads.write(photo, id, Cursor::new(vec![7u8; 100])).unwrap();
    let handle = payloads.handle_of(photo, id).unwrap();
    let objects = count(&ctx, "SELECT COUNT(*) FROM large_object");

    configure_fault(FaultPoint::BlobWriteMidStream, 1);
    let err = payloads
        .write(photo, id, Cursor::new(vec![9u8; 3 * ctx.config().blob.page_size]))
        .unwrap_err();
    assert!(is_fault(&err), "{err:?}");
    assert!(matches!(err, DataAccessError::Blob { operation: "write", .. }));

    assert!(ctx.is_auto_commit());
    assert_eq!(payloads.handle_of(photo, id).unwrap(), handle);
    assert_eq!(payloads.read_to_vec(photo, id).unwrap(), vec![7u8; 100]);
    assert_eq!(count(&ctx, "SELECT COUNT(*) FROM large_object"), objects);
    reset_faults();
}

#[test]
fn blob_write_failing_before_commit_keeps_old_handle() {
    let _guard = test_lock();
    reset_faults();
    let ctx = common::open();
    let id = common::insert_user(&ctx, "Jan", "Jansen");
    let photo = common::field(&ctx, "user", "photo");
    let payloads = ctx.payloads();

    payloads.write(photo, id, &b"first"[..]).unwrap();
    let handle = payloads.handle_of(photo, id).unwrap();

    configure_fault(FaultPoint::BlobWriteBeforeCommit, 1);
    let err = payloads.write(photo, id, &b"second"[..]).unwrap_err();
    assert!(is_fault(&err), "{err:?}");

    assert!(ctx.is_auto_commit());
    assert_eq!(payloads.handle_of(photo, id).unwrap(), handle);
    assert_eq!(payloads.read_to_vec(photo, id).unwrap(), b"first".to_vec());
    assert_eq!(count(&ctx, "SELECT COUNT(*) FROM large_object"), 1);
    assert!(ctx.metrics().tx_rollback_count >= 1);

    payloads.write(photo, id, &b"second"[..]).unwrap();
    assert_eq!(payloads.read_to_vec(photo, id).unwrap(), b"second".to_vec());
    assert_eq!(count(&ctx, "SELECT COUNT(*) FROM large_object"), 1);
    reset_faults();
}

#[test]
fn failed_table_restore_leaves_other_tables_loaded() {
    let _guard = test_lock();
    reset_faults();
    let source = common::open();
    common::insert_user(&source, "Pieter", "de Vries");
    common::insert_tag(&source, "rust", "A");
    let mut archive = Cursor::new(Vec::new());
    source.save_to_archive(&mut archive).unwrap();

    let target = common::open();
    // user is restored first; its single chunk fails.
    configure_fault(FaultPoint::RestoreChunkInsert, 1);
    archive.set_position(0);
    let report = target.load_from_archive(archive).unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "user");
    assert_eq!(report.rows_loaded("tag"), Some(1));
    assert_eq!(common::count_rows(&target, "user"), 0);
    assert_eq!(common::count_rows(&target, "tag"), 1);
    assert!(target.is_auto_commit());
    reset_faults();
}
