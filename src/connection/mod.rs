//! Statement execution over rusqlite with logging, metrics and scoped
//! transactions.

pub mod logging;
pub mod metrics;
pub mod transaction;

pub use logging::LoggingConnection;
pub use metrics::{ConnectionMetrics, MetricsSnapshot, StatementTracker};
pub use transaction::{TransactionGuard, transactional};
