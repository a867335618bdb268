//! Configuration for opening a [`DataAccessContext`].
//!
//! All structures have `Default` impls matching the behavior callers get
//! without configuration, and deserialize with serde so they can be read
//! from a JSON document with any subset of keys present.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{DataAccessContext, DataAccessError, schema::Schema};

/// SQLite connection options.
///
/// # Default Configuration
///
/// ```rust
/// use relstore::SqliteConfig;
/// let config = SqliteConfig::default();
/// assert!(config.foreign_keys);
/// assert!(config.cache_size.is_none());
/// assert!(config.pragma_settings.is_empty());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Enforce `REFERENCES` clauses (`PRAGMA foreign_keys`).
    ///
    /// **Default:** `true`
    ///
    /// Schema reset switches enforcement off while it drops and recreates
    /// tables and restores this setting afterwards.
    pub foreign_keys: bool,

    /// Capacity of the prepared statement cache.
    ///
    /// **Default:** `None` (rusqlite's default of 16)
    ///
    /// Bulk restore reuses one INSERT shape per table and chunk size, so a
    /// schema with many tables benefits from a larger cache.
    pub cache_size: Option<usize>,

    /// Additional `PRAGMA` settings applied right after opening.
    ///
    /// ```rust
    /// use relstore::AccessConfig;
    ///
    /// let mut cfg = AccessConfig::default();
    /// cfg.sqlite.pragma_settings.insert("journal_mode".to_string(), "WAL".to_string());
    /// cfg.sqlite.pragma_settings.insert("synchronous".to_string(), "NORMAL".to_string());
    /// ```
    pub pragma_settings: HashMap<String, String>,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            foreign_keys: true,
            cache_size: None,
            pragma_settings: HashMap::new(),
        }
    }
}

/// Options for CSV restore.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Rows per multi-row INSERT statement.
    pub chunk_size: usize,
    /// Rows between two progress notifications.
    pub progress_interval: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            progress_interval: 250,
        }
    }
}

/// Options for large-object transfer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    /// Bytes per stored page and per streaming step.
    pub page_size: usize,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self { page_size: 2048 }
    }
}

/// Complete configuration for a data access context.
///
/// ```rust
/// use relstore::AccessConfig;
///
/// let cfg: AccessConfig = serde_json::from_str(r#"{"bulk": {"chunk_size": 100}}"#).unwrap();
/// assert_eq!(cfg.bulk.chunk_size, 100);
/// assert_eq!(cfg.blob.page_size, 2048);
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub sqlite: SqliteConfig,
    pub bulk: BulkConfig,
    pub blob: BlobConfig,
    /// Identifier of the acting user, attached to statement logs.
    pub user: Option<i64>,
}

impl AccessConfig {
    pub fn from_json(json: &str) -> Result<Self, DataAccessError> {
        serde_json::from_str(json)
            .map_err(|e| DataAccessError::invalid_input(format!("invalid configuration: {e}")))
    }

    pub fn with_user(mut self, user: i64) -> Self {
        self.user = Some(user);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), DataAccessError> {
        if self.bulk.chunk_size == 0 {
            return Err(DataAccessError::invalid_input("bulk.chunk_size must be positive"));
        }
        if self.blob.page_size == 0 {
            return Err(DataAccessError::invalid_input("blob.page_size must be positive"));
        }
        Ok(())
    }
}

/// Opens a context on the database file at `path`.
pub fn open_context<P: AsRef<Path>>(
    path: P,
    schema: Arc<Schema>,
    cfg: &AccessConfig,
) -> Result<DataAccessContext, DataAccessError> {
    let conn = rusqlite::Connection::open(path.as_ref())
        .map_err(|e| DataAccessError::connection(e.to_string()))?;
    DataAccessContext::from_connection(conn, schema, cfg.clone())
}

/// Opens a context on a fresh in-memory database.
pub fn open_in_memory_context(
    schema: Arc<Schema>,
    cfg: &AccessConfig,
) -> Result<DataAccessContext, DataAccessError> {
    let conn = rusqlite::Connection::open_in_memory()
        .map_err(|e| DataAccessError::connection(e.to_string()))?;
    DataAccessContext::from_connection(conn, schema, cfg.clone())
}

pub(crate) fn apply_pragmas(
    conn: &rusqlite::Connection,
    cfg: &SqliteConfig,
) -> Result<(), DataAccessError> {
    if let Some(capacity) = cfg.cache_size {
        conn.set_prepared_statement_cache_capacity(capacity);
    }
    let mut pragmas: Vec<(&String, &String)> = cfg.pragma_settings.iter().collect();
    pragmas.sort();
    for (key, value) in pragmas {
        let sql = format!("PRAGMA {key} = {value}");
        // Some pragmas report their new value as a row; execute_batch ignores it.
        conn.execute_batch(&sql)
            .map_err(|e| DataAccessError::connection(format!("{sql}: {e}")))?;
    }
    let sql = format!(
        "PRAGMA foreign_keys = {}",
        if cfg.foreign_keys { "ON" } else { "OFF" }
    );
    conn.execute_batch(&sql)
        .map_err(|e| DataAccessError::connection(format!("{sql}: {e}")))
}
