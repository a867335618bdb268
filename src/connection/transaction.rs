use tracing::warn;

use super::LoggingConnection;
use crate::DataAccessError;

/// Explicit transaction that rolls back on drop unless committed.
///
/// Dropping the guard also puts the connection back into autocommit mode,
/// whichever way the owning scope is left.
pub struct TransactionGuard<'a> {
    conn: LoggingConnection<'a>,
    finished: bool,
}

impl<'a> TransactionGuard<'a> {
    pub fn begin(conn: LoggingConnection<'a>) -> Result<Self, DataAccessError> {
        if !conn.is_autocommit() {
            return Err(DataAccessError::transaction(
                "connection already has an open transaction",
            ));
        }
        conn.begin()?;
        Ok(Self {
            conn,
            finished: false,
        })
    }

    pub fn conn(&self) -> LoggingConnection<'a> {
        self.conn
    }

    pub fn commit(mut self) -> Result<(), DataAccessError> {
        self.conn.commit()?;
        self.finished = true;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<(), DataAccessError> {
        self.finished = true;
        self.conn.rollback()
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if !self.finished
            && let Err(err) = self.conn.rollback()
        {
            warn!(error = %err, "rollback of abandoned transaction failed");
        }
        if !self.conn.is_autocommit()
            && let Err(err) = self.conn.rollback()
        {
            warn!(error = %err, "could not restore autocommit");
        }
    }
}

/// Runs `work` inside a transaction: begin, then commit on `Ok` or roll back
/// on `Err`. Autocommit is restored on every exit path.
pub fn transactional<'a, R, F>(conn: LoggingConnection<'a>, work: F) -> Result<R, DataAccessError>
where
    F: FnOnce(&TransactionGuard<'a>) -> Result<R, DataAccessError>,
{
    let guard = TransactionGuard::begin(conn)?;
    let value = work(&guard)?;
    guard.commit()?;
    Ok(value)
}
