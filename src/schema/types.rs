use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic column type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Boolean,
    Text,
    Integer,
    Real,
    Date,
    Timestamp,
    Char,
    /// Handle into the large-object store. Never bound as a plain parameter.
    Oid,
    /// Whole cents, stored as an integer.
    Currency,
}

impl FieldType {
    /// Portable type name, as used in PostgreSQL DDL.
    pub fn sql_name(self) -> &'static str {
        match self {
            FieldType::Boolean => "boolean",
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Real => "real",
            FieldType::Date => "date",
            FieldType::Timestamp => "timestamp",
            FieldType::Char => "character",
            FieldType::Oid => "oid",
            FieldType::Currency => "integer",
        }
    }

    /// Column declaration used for SQLite DDL. `DATE`, `TIMESTAMP` and
    /// `BOOLEAN` get NUMERIC affinity; ISO dates stay text only because they
    /// do not parse as numbers.
    pub fn sqlite_name(self) -> &'static str {
        match self {
            FieldType::Boolean => "BOOLEAN",
            FieldType::Text => "TEXT",
            FieldType::Integer | FieldType::Currency | FieldType::Oid => "INTEGER",
            FieldType::Real => "REAL",
            FieldType::Date => "DATE",
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::Char => "CHARACTER(1)",
        }
    }

    /// Two fields can be joined or referenced when their storage types agree.
    pub fn is_compatible(self, other: FieldType) -> bool {
        self.sql_name() == other.sql_name()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}
