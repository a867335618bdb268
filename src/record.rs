//! Application entities keyed by a single integer id.

use crate::DataAccessError;
use crate::filter::RecordRow;
use crate::value::Value;

/// Id of a record that has not been stored yet.
pub const UNSET_ID: i64 = -1;

/// A row of one table, mapped to a Rust type.
///
/// A negative id means "not yet persisted"; a stored record keeps its id
/// until it is deleted, which sets it to `0`.
pub trait Record: Sized {
    /// Name of the table the record lives in.
    fn table_name() -> &'static str;

    fn id(&self) -> i64;

    fn set_id(&mut self, id: i64);

    fn from_row(row: &RecordRow) -> Result<Self, DataAccessError>;

    /// Value for the non-id column `column`.
    fn value_of(&self, column: &str) -> Result<Value, DataAccessError>;

    fn has_valid_id(&self) -> bool {
        self.id() > 0
    }

    /// Fails unless the record has been stored.
    fn check_id(&self) -> Result<(), DataAccessError> {
        if self.id() < 0 {
            return Err(DataAccessError::invalid_input(format!(
                "{} record has no id",
                Self::table_name()
            )));
        }
        Ok(())
    }

    /// Fails if the record already carries an id.
    fn check_no_id(&self) -> Result<(), DataAccessError> {
        if self.id() >= 0 {
            return Err(DataAccessError::invalid_input(format!(
                "{} record already has id {}",
                Self::table_name(),
                self.id()
            )));
        }
        Ok(())
    }

    fn invalidate_id(&mut self) {
        self.set_id(0);
    }
}

/// Reads `column` from `row` as an integer, treating NULL as an error.
pub fn required_i64(row: &RecordRow, column: &str) -> Result<i64, DataAccessError> {
    row.get(column)?.as_i64().ok_or_else(|| {
        DataAccessError::coercion(column, "NULL", "expected an integer")
    })
}

/// Reads `column` from `row` as text; NULL becomes an empty string.
pub fn text_or_empty(row: &RecordRow, column: &str) -> Result<String, DataAccessError> {
    Ok(row
        .get(column)?
        .as_text()
        .map(str::to_string)
        .unwrap_or_default())
}
