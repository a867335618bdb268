use rusqlite::{Connection, Row, params_from_iter};
use tracing::debug;

use super::metrics::{ConnectionMetrics, StatementTracker};
use crate::DataAccessError;
use crate::value::SqlValue;

/// Thin wrapper over a [`Connection`] that logs every statement, counts it in
/// [`ConnectionMetrics`] and turns driver failures into execution errors
/// carrying the SQL text.
#[derive(Copy, Clone)]
pub struct LoggingConnection<'a> {
    conn: &'a Connection,
    metrics: &'a ConnectionMetrics,
    tracker: &'a StatementTracker,
    user: Option<i64>,
}

impl<'a> LoggingConnection<'a> {
    pub fn new(
        conn: &'a Connection,
        metrics: &'a ConnectionMetrics,
        tracker: &'a StatementTracker,
        user: Option<i64>,
    ) -> Self {
        Self {
            conn,
            metrics,
            tracker,
            user,
        }
    }

    pub fn user(&self) -> Option<i64> {
        self.user
    }

    fn trace(&self, sql: &str, params: usize) {
        debug!(target: "relstore::sql", user = ?self.user, params, "{sql}");
        self.metrics.record_execute(sql);
    }

    fn prepare(&self, sql: &str) -> Result<rusqlite::CachedStatement<'a>, DataAccessError> {
        self.metrics.record_cache(self.tracker.observe(sql));
        self.conn
            .prepare_cached(sql)
            .map_err(|e| DataAccessError::execution(sql, &e))
    }

    pub fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize, DataAccessError> {
        self.trace(sql, params.len());
        let mut stmt = self.prepare(sql)?;
        stmt.execute(params_from_iter(params.iter()))
            .map_err(|e| DataAccessError::execution(sql, &e))
    }

    /// Runs parameterless statements such as DDL or pragmas, bypassing the
    /// statement cache.
    pub fn execute_batch(&self, sql: &str) -> Result<(), DataAccessError> {
        self.trace(sql, 0);
        self.conn
            .execute_batch(sql)
            .map_err(|e| DataAccessError::execution(sql, &e))
    }

    /// Streams every result row through `on_row`; returns the row count.
    pub fn query<F>(
        &self,
        sql: &str,
        params: &[SqlValue],
        mut on_row: F,
    ) -> Result<usize, DataAccessError>
    where
        F: FnMut(&Row<'_>) -> Result<(), DataAccessError>,
    {
        self.trace(sql, params.len());
        let mut stmt = self.prepare(sql)?;
        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|e| DataAccessError::execution(sql, &e))?;
        let mut count = 0;
        while let Some(row) = rows
            .next()
            .map_err(|e| DataAccessError::execution(sql, &e))?
        {
            on_row(row)?;
            count += 1;
        }
        Ok(count)
    }

    /// First row mapped through `map`, or `None` when the query is empty.
    pub fn query_optional<T, F>(
        &self,
        sql: &str,
        params: &[SqlValue],
        map: F,
    ) -> Result<Option<T>, DataAccessError>
    where
        F: FnOnce(&Row<'_>) -> Result<T, DataAccessError>,
    {
        self.trace(sql, params.len());
        let mut stmt = self.prepare(sql)?;
        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|e| DataAccessError::execution(sql, &e))?;
        match rows
            .next()
            .map_err(|e| DataAccessError::execution(sql, &e))?
        {
            Some(row) => map(row).map(Some),
            None => Ok(None),
        }
    }

    pub fn query_i64(&self, sql: &str, params: &[SqlValue]) -> Result<i64, DataAccessError> {
        self.query_optional(sql, params, |row| {
            row.get::<_, Option<i64>>(0)
                .map(|v| v.unwrap_or(0))
                .map_err(|e| DataAccessError::execution(sql, &e))
        })
        .map(|v| v.unwrap_or(0))
    }

    pub fn begin(&self) -> Result<(), DataAccessError> {
        self.execute_batch("BEGIN")
    }

    pub fn commit(&self) -> Result<(), DataAccessError> {
        self.execute_batch("COMMIT")
    }

    pub fn rollback(&self) -> Result<(), DataAccessError> {
        self.execute_batch("ROLLBACK")
    }

    pub fn is_autocommit(&self) -> bool {
        self.conn.is_autocommit()
    }

    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    pub fn table_exists(&self, name: &str) -> Result<bool, DataAccessError> {
        let sql = "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?";
        Ok(self.query_i64(sql, &[SqlValue::Text(name.to_string())])? > 0)
    }
}
