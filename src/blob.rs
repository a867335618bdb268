//! Large binary payloads stored behind integer handles.
//!
//! SQLite has no server-side large objects, so payloads live in two tables:
//! `large_object(oid, size)` and `large_object_page(oid, pageno, data)`. An
//! oid column of a schema table holds the handle; `0` or NULL means the row
//! has no payload. Handles are never reused.
//!
//! [`LargeObjects`] can only be opened from a live [`TransactionGuard`], and
//! every [`BlobTransfer`] operation runs in its own transaction, so a failed
//! write leaves neither a half-written object nor a changed handle behind.

use std::io::{self, Read, Write};

use rusqlite::types::ValueRef;
use tracing::debug;

use crate::connection::{LoggingConnection, TransactionGuard, transactional};
use crate::fault_injection::{FaultPoint, check_fault};
use crate::filter::Filter;
use crate::schema::{Field, FieldId, SqlGenerator, TableId};
use crate::value::SqlValue;
use crate::{DataAccessContext, DataAccessError, Dialect};

const CREATE_STORE: &str = "CREATE TABLE IF NOT EXISTS large_object (\
        oid INTEGER PRIMARY KEY AUTOINCREMENT, \
        size INTEGER NOT NULL DEFAULT 0); \
    CREATE TABLE IF NOT EXISTS large_object_page (\
        oid INTEGER NOT NULL REFERENCES large_object (oid) ON DELETE CASCADE, \
        pageno INTEGER NOT NULL, \
        data BLOB NOT NULL, \
        PRIMARY KEY (oid, pageno))";

/// Creates the large-object tables if they are missing.
pub fn ensure_store(conn: LoggingConnection<'_>) -> Result<(), DataAccessError> {
    conn.execute_batch(CREATE_STORE)
}

pub(crate) fn drop_store(conn: LoggingConnection<'_>) -> Result<(), DataAccessError> {
    conn.execute_batch("DROP TABLE IF EXISTS large_object_page")?;
    conn.execute_batch("DROP TABLE IF EXISTS large_object")
}

/// Page-wise access to the large-object store within one transaction.
pub struct LargeObjects<'t> {
    conn: LoggingConnection<'t>,
    page_size: usize,
}

impl<'t> LargeObjects<'t> {
    pub fn open(tx: &TransactionGuard<'t>, page_size: usize) -> Self {
        Self {
            conn: tx.conn(),
            page_size: page_size.max(1),
        }
    }

    /// Allocates a new, empty object and returns its handle.
    pub fn create(&self) -> Result<i64, DataAccessError> {
        self.conn
            .execute("INSERT INTO large_object (size) VALUES (0)", &[])?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn exists(&self, oid: i64) -> Result<bool, DataAccessError> {
        Ok(self.size(oid)?.is_some())
    }

    pub fn size(&self, oid: i64) -> Result<Option<u64>, DataAccessError> {
        self.conn.query_optional(
            "SELECT size FROM large_object WHERE oid = ?",
            &[SqlValue::Integer(oid)],
            |row| {
                row.get::<_, i64>(0)
                    .map(|size| size.max(0) as u64)
                    .map_err(|e| DataAccessError::execution("SELECT size FROM large_object", &e))
            },
        )
    }

    /// Appends everything `reader` yields to object `oid`, one page per
    /// statement. Returns the number of bytes written.
    pub fn write_from<R: Read>(&self, oid: i64, reader: &mut R) -> Result<u64, DataAccessError> {
        let mut page = vec![0u8; self.page_size];
        let mut pageno: i64 = 0;
        let mut total: u64 = 0;
        loop {
            let filled = fill_page(reader, &mut page)
                .map_err(|e| DataAccessError::io("reading payload", &e))?;
            if filled == 0 {
                break;
            }
            self.conn.execute(
                "INSERT INTO large_object_page (oid, pageno, data) VALUES (?, ?, ?)",
                &[
                    SqlValue::Integer(oid),
                    SqlValue::Integer(pageno),
                    SqlValue::Blob(page[..filled].to_vec()),
                ],
            )?;
            pageno += 1;
            total += filled as u64;
            if pageno == 1 {
                check_fault(FaultPoint::BlobWriteMidStream)?;
            }
            if filled < page.len() {
                break;
            }
        }
        self.conn.execute(
            "UPDATE large_object SET size = ? WHERE oid = ?",
            &[SqlValue::Integer(total as i64), SqlValue::Integer(oid)],
        )?;
        debug!(oid, bytes = total, pages = pageno, "large object written");
        Ok(total)
    }

    /// Streams object `oid` into `writer` page by page.
    pub fn read_into<W: Write>(&self, oid: i64, writer: &mut W) -> Result<u64, DataAccessError> {
        if !self.exists(oid)? {
            return Err(DataAccessError::not_found(format!("large object {oid}")));
        }
        let mut total: u64 = 0;
        self.conn.query(
            "SELECT data FROM large_object_page WHERE oid = ? ORDER BY pageno",
            &[SqlValue::Integer(oid)],
            |row| {
                let data = match row.get_ref(0) {
                    Ok(ValueRef::Blob(data)) => data,
                    Ok(other) => {
                        return Err(DataAccessError::invalid_input(format!(
                            "large object {oid} has a {:?} page",
                            other.data_type()
                        )));
                    }
                    Err(e) => {
                        return Err(DataAccessError::execution("SELECT data FROM large_object_page", &e));
                    }
                };
                writer
                    .write_all(data)
                    .map_err(|e| DataAccessError::io("writing payload", &e))?;
                total += data.len() as u64;
                Ok(())
            },
        )?;
        Ok(total)
    }

    /// Removes object `oid`; returns whether it existed.
    pub fn unlink(&self, oid: i64) -> Result<bool, DataAccessError> {
        self.conn.execute(
            "DELETE FROM large_object_page WHERE oid = ?",
            &[SqlValue::Integer(oid)],
        )?;
        let removed = self.conn.execute(
            "DELETE FROM large_object WHERE oid = ?",
            &[SqlValue::Integer(oid)],
        )?;
        Ok(removed > 0)
    }
}

fn fill_page<R: Read>(reader: &mut R, page: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < page.len() {
        match reader.read(&mut page[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Payload reads and writes addressed by oid field and row id.
pub struct BlobTransfer<'c> {
    ctx: &'c DataAccessContext,
}

impl<'c> BlobTransfer<'c> {
    pub(crate) fn new(ctx: &'c DataAccessContext) -> Self {
        Self { ctx }
    }

    /// Oid fields of `table`, in declaration order.
    pub fn payload_fields(&self, table: TableId) -> Vec<FieldId> {
        self.ctx
            .schema()
            .table(table)
            .oid_fields()
            .map(Field::id)
            .collect()
    }

    fn oid_field(&self, field: FieldId) -> Result<&'c Field, DataAccessError> {
        let schema = self.ctx.schema();
        if !schema.contains_field(field) {
            return Err(DataAccessError::validation("unregistered field", format!("{field:?}")));
        }
        let resolved = schema.field(field);
        if !resolved.is_oid() {
            return Err(DataAccessError::validation(
                "payloads are stored in oid fields only",
                resolved.qualified_name(),
            ));
        }
        Ok(resolved)
    }

    /// Handle stored in `field` of row `id`; `None` for 0 or NULL.
    pub fn handle_of(&self, field: FieldId, id: i64) -> Result<Option<i64>, DataAccessError> {
        let resolved = self.oid_field(field)?;
        let schema = self.ctx.schema();
        let id_field = schema.single_id(resolved.table())?;
        let mut filter = Filter::new(schema, resolved.table());
        filter.field_equals(id_field, id)?;
        match self.ctx.execute_field(&filter, field)?.first() {
            Some(value) => Ok(value.as_handle()),
            None => Err(DataAccessError::not_found(format!(
                "{}#{id}",
                schema.table(resolved.table()).name()
            ))),
        }
    }

    /// True when row `id` exists and carries a payload in `field`.
    pub fn has_payload(&self, field: FieldId, id: i64) -> Result<bool, DataAccessError> {
        match self.handle_of(field, id) {
            Ok(handle) => Ok(handle.is_some()),
            Err(DataAccessError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Stores the bytes of `reader` as the payload of row `id`, replacing
    /// and unlinking any previous payload. Returns the bytes written.
    pub fn write<R: Read>(&self, field: FieldId, id: i64, mut reader: R) -> Result<u64, DataAccessError> {
        let resolved = self.oid_field(field)?;
        let schema = self.ctx.schema();
        let table = schema.table(resolved.table()).name();
        let page_size = self.ctx.config().blob.page_size;

        transactional(self.ctx.connection(), |tx| {
            let previous = self.handle_of(field, id)?;
            let objects = LargeObjects::open(tx, page_size);
            let handle = objects.create()?;
            let written = objects.write_from(handle, &mut reader)?;

            let sql = SqlGenerator::new(schema, resolved.table(), Dialect::Sqlite).update_field(field)?;
            let updated = tx
                .conn()
                .execute(&sql, &[SqlValue::Integer(handle), SqlValue::Integer(id)])?;
            if updated != 1 {
                return Err(DataAccessError::invalid_input(format!(
                    "expected to update one row, updated {updated}"
                )));
            }
            if let Some(previous) = previous {
                objects.unlink(previous)?;
            }
            check_fault(FaultPoint::BlobWriteBeforeCommit)?;
            Ok(written)
        })
        .map_err(|e| DataAccessError::blob("write", table, id, e))
    }

    /// Streams the payload of row `id` into `writer`. A row without a
    /// payload is an error.
    pub fn read<W: Write>(&self, field: FieldId, id: i64, mut writer: W) -> Result<u64, DataAccessError> {
        let resolved = self.oid_field(field)?;
        let table = self.ctx.schema().table(resolved.table()).name();
        let page_size = self.ctx.config().blob.page_size;

        transactional(self.ctx.connection(), |tx| {
            let handle = self.handle_of(field, id)?.ok_or_else(|| {
                DataAccessError::not_found(format!("no payload in {}", resolved.qualified_name()))
            })?;
            LargeObjects::open(tx, page_size).read_into(handle, &mut writer)
        })
        .map_err(|e| DataAccessError::blob("read", table, id, e))
    }

    pub fn read_to_vec(&self, field: FieldId, id: i64) -> Result<Vec<u8>, DataAccessError> {
        let mut bytes = Vec::new();
        self.read(field, id, &mut bytes)?;
        Ok(bytes)
    }
}
