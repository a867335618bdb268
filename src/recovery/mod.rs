//! Backup of a whole database into one zip archive and restore from it.
//!
//! The archive holds `<table>.csv` for every table and, for tables with oid
//! columns, a `<table>/` directory with one entry per stored payload.
//! Tables are written and loaded in creation order.

pub mod archive;
pub mod table_csv;

use serde::Serialize;

pub use archive::{load_from_archive, payload_entry_name, save_to_archive};
pub use table_csv::LoadMode;

/// Outcome of a backup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BackupReport {
    /// Table name and row count, in the order written.
    pub tables: Vec<(String, usize)>,
    pub payloads: usize,
    pub payload_bytes: u64,
}

/// Outcome of a restore. Tables listed in `failures` were skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub tables_loaded: Vec<(String, usize)>,
    pub failures: Vec<(String, String)>,
    pub payloads_loaded: usize,
    /// Entries that matched no table of the schema.
    pub skipped_entries: Vec<String>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn rows_loaded(&self, table: &str) -> Option<usize> {
        self.tables_loaded
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, rows)| *rows)
    }
}
