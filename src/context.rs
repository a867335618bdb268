//! The per-session entry point owning one SQLite connection.

use std::cell::Cell;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tracing::info;

use crate::blob::{self, BlobTransfer};
use crate::config::{AccessConfig, apply_pragmas};
use crate::connection::{
    ConnectionMetrics, LoggingConnection, MetricsSnapshot, StatementTracker, TransactionGuard,
    transactional,
};
use crate::filter::Filter;
use crate::progress::{GlobalStatus, log_global_progress};
use crate::recovery::table_csv;
use crate::recovery::{self, BackupReport, LoadMode, RestoreReport};
use crate::resolver;
use crate::schema::{Schema, docs};
use crate::DataAccessError;

/// Connection, schema and configuration of one session.
///
/// A context is `Send` but not `Sync`: one caller at a time. Open one per
/// session; the schema is shared through its `Arc`.
#[derive(Debug)]
pub struct DataAccessContext {
    conn: Connection,
    schema: Arc<Schema>,
    config: AccessConfig,
    metrics: ConnectionMetrics,
    tracker: StatementTracker,
    did_reset: Cell<bool>,
}

impl DataAccessContext {
    pub(crate) fn from_connection(
        conn: Connection,
        schema: Arc<Schema>,
        config: AccessConfig,
    ) -> Result<Self, DataAccessError> {
        config.validate()?;
        apply_pragmas(&conn, &config.sqlite)?;
        let ctx = Self {
            conn,
            schema,
            config,
            metrics: ConnectionMetrics::default(),
            tracker: StatementTracker::default(),
            did_reset: Cell::new(false),
        };
        blob::ensure_store(ctx.connection())?;
        info!(
            tables = ctx.schema.len(),
            user = ?ctx.config.user,
            "data access context opened"
        );
        Ok(ctx)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn shared_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    /// Statement execution with logging and metrics.
    pub fn connection(&self) -> LoggingConnection<'_> {
        LoggingConnection::new(&self.conn, &self.metrics, &self.tracker, self.config.user)
    }

    /// The underlying rusqlite connection, bypassing logging and metrics.
    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Zeroes the counters and empties the statement cache, so cache
    /// observations start over as well.
    pub fn reset_metrics(&self) {
        self.metrics.reset();
        self.conn.flush_prepared_statement_cache();
        self.tracker.forget_all();
    }

    /// A new filter on the table called `table`.
    pub fn filter(&self, table: &str) -> Result<Filter<'_>, DataAccessError> {
        Filter::on(&self.schema, table)
    }

    pub fn begin(&self) -> Result<(), DataAccessError> {
        let conn = self.connection();
        if !conn.is_autocommit() {
            return Err(DataAccessError::transaction("a transaction is already open"));
        }
        conn.begin()
    }

    pub fn commit(&self) -> Result<(), DataAccessError> {
        let conn = self.connection();
        if conn.is_autocommit() {
            return Err(DataAccessError::transaction("no open transaction to commit"));
        }
        conn.commit()
    }

    pub fn rollback(&self) -> Result<(), DataAccessError> {
        let conn = self.connection();
        if conn.is_autocommit() {
            return Err(DataAccessError::transaction("no open transaction to roll back"));
        }
        conn.rollback()
    }

    /// Commits an open transaction, if any, and returns to autocommit.
    pub fn start_auto_commit(&self) -> Result<(), DataAccessError> {
        let conn = self.connection();
        if conn.is_autocommit() {
            Ok(())
        } else {
            conn.commit()
        }
    }

    pub fn is_auto_commit(&self) -> bool {
        self.conn.is_autocommit()
    }

    /// Runs `work` in a transaction committed on `Ok` and rolled back
    /// otherwise.
    pub fn transactional<'a, R, F>(&'a self, work: F) -> Result<R, DataAccessError>
    where
        F: FnOnce(&TransactionGuard<'a>) -> Result<R, DataAccessError>,
    {
        transactional(self.connection(), work)
    }

    /// True when no schema table holds a row. Missing tables count as empty.
    pub fn is_empty(&self) -> Result<bool, DataAccessError> {
        let conn = self.connection();
        for table in self.schema.tables() {
            if !conn.table_exists(table.name())? {
                continue;
            }
            let sql = format!("SELECT COUNT(*) FROM {}", table.sql_name());
            if conn.query_i64(&sql, &[])? > 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn has_been_reset(&self) -> bool {
        self.did_reset.get()
    }

    /// Drops and recreates every table. Allowed once per context.
    pub fn reset(&self) -> Result<(), DataAccessError> {
        let mut status = GlobalStatus::new(self.schema.len());
        status.add_listener(log_global_progress("reset"));
        self.reset_with_status(&mut status)
    }

    pub fn reset_with_status(&self, status: &mut GlobalStatus) -> Result<(), DataAccessError> {
        if self.did_reset.get() {
            return Err(DataAccessError::invalid_input("context already reset"));
        }
        resolver::reset_schema(
            self.connection(),
            &self.schema,
            self.config.sqlite.foreign_keys,
            status,
        )?;
        self.did_reset.set(true);
        Ok(())
    }

    /// Payload transfer for oid columns.
    pub fn payloads(&self) -> BlobTransfer<'_> {
        BlobTransfer::new(self)
    }

    pub fn save_to_archive<W: Write + Seek>(&self, writer: W) -> Result<BackupReport, DataAccessError> {
        let mut status = GlobalStatus::new(self.schema.len());
        status.add_listener(log_global_progress("backup"));
        self.save_to_archive_with_status(writer, &mut status)
    }

    pub fn save_to_archive_with_status<W: Write + Seek>(
        &self,
        writer: W,
        status: &mut GlobalStatus,
    ) -> Result<BackupReport, DataAccessError> {
        recovery::save_to_archive(self, writer, status)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<BackupReport, DataAccessError> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| DataAccessError::io(format!("creating {}", path.display()), &e))?;
        self.save_to_archive(BufWriter::new(file))
    }

    pub fn load_from_archive<R: Read + Seek>(&self, reader: R) -> Result<RestoreReport, DataAccessError> {
        let mut status = GlobalStatus::new(self.schema.len());
        status.add_listener(log_global_progress("restore"));
        self.load_from_archive_with_status(reader, &mut status)
    }

    pub fn load_from_archive_with_status<R: Read + Seek>(
        &self,
        reader: R,
        status: &mut GlobalStatus,
    ) -> Result<RestoreReport, DataAccessError> {
        recovery::load_from_archive(self, reader, status)
    }

    pub fn load_from_path<P: AsRef<Path>>(&self, path: P) -> Result<RestoreReport, DataAccessError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| DataAccessError::io(format!("opening {}", path.display()), &e))?;
        self.load_from_archive(BufReader::new(file))
    }

    /// Writes the rows matching `filter` as CSV, header first. Returns the
    /// row count.
    pub fn save_csv<W: Write>(&self, filter: &Filter<'_>, out: W) -> Result<usize, DataAccessError> {
        table_csv::write_filtered(self, filter, out, &self.config.bulk)
    }

    /// Loads CSV rows into `table`.
    pub fn load_csv<R: Read>(
        &self,
        table: &str,
        input: R,
        mode: LoadMode,
    ) -> Result<usize, DataAccessError> {
        let table = self.schema.require_table(table)?.id();
        table_csv::load_table(self, table, input, &self.config.bulk, mode)
    }

    /// Markdown description of the schema.
    pub fn schema_overview(&self) -> String {
        docs::to_markdown(&self.schema)
    }
}
