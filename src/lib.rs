//! Relational data access over SQLite: a declarative schema registry, a
//! composable filter builder rendering parameterized SQL, dependency-ordered
//! schema reset, transactional large-object transfer and zip/CSV
//! backup-restore.
//! Run Criterion benchmarks with `cargo bench` to inspect reports under `target/criterion`.

pub mod blob;
pub mod config;
pub mod connection;
pub mod context;
pub mod dao;
pub mod dialect;
pub mod errors;
pub mod fault_injection;
pub mod filter;
pub mod progress;
pub mod record;
pub mod recovery;
pub mod resolver;
pub mod schema;
pub mod value;

pub use crate::blob::BlobTransfer;
pub use crate::config::{
    AccessConfig, BlobConfig, BulkConfig, SqliteConfig, open_context, open_in_memory_context,
};
pub use crate::context::DataAccessContext;
pub use crate::dao::IdDao;
pub use crate::dialect::Dialect;
pub use crate::errors::DataAccessError;
pub use crate::filter::{Filter, Operator, RecordRow, RenderedStatement, StatementKind};
pub use crate::progress::{GlobalStatus, RelationStatus};
pub use crate::record::Record;
pub use crate::recovery::{BackupReport, LoadMode, RestoreReport};
pub use crate::schema::{
    Field, FieldId, FieldType, Schema, SchemaBuilder, Table, TableDef, TableId,
};
pub use crate::value::Value;
