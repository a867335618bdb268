use thiserror::Error;

/// Error type for every relstore operation.
#[derive(Debug, Error)]
pub enum DataAccessError {
    /// Malformed filter or schema usage, raised before anything reaches the store.
    #[error("validation error: {message} [{fragment}]")]
    Validation { message: String, fragment: String },
    #[error("{}", describe_execution(.sql, .context, .cause, .kind))]
    Execution {
        sql: String,
        context: Option<String>,
        cause: String,
        kind: String,
    },
    #[error("payload {operation} failed for {table}#{id}: {source}")]
    Blob {
        operation: &'static str,
        table: String,
        id: i64,
        source: Box<DataAccessError>,
    },
    #[error("error in row {row} of {table} with data [{content}]: {message}")]
    Row {
        table: String,
        row: usize,
        content: String,
        message: String,
    },
    #[error("archive entry {entry}: {message}")]
    Archive { entry: String, message: String },
    #[error("i/o error during {context}: {message} ({kind})")]
    Io {
        context: String,
        kind: String,
        message: String,
    },
    #[error("cannot convert {input:?} for {field}: {message}")]
    Coercion {
        field: String,
        input: String,
        message: String,
    },
    #[error("schema error: {0}")]
    Schema(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("transaction error: {0}")]
    Transaction(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("fault injected: {0}")]
    FaultInjected(String),
}

fn describe_execution(sql: &str, context: &Option<String>, cause: &str, kind: &str) -> String {
    match context {
        Some(context) => {
            format!("{context}: statement failed: {sql}\n  > caused by: {cause} ({kind})")
        }
        None => format!("statement failed: {sql}\n  > caused by: {cause} ({kind})"),
    }
}

/// Short category name of a driver error, e.g. `ConstraintViolation`.
pub(crate) fn cause_kind(err: &rusqlite::Error) -> String {
    match err {
        rusqlite::Error::SqliteFailure(inner, _) => format!("{:?}", inner.code),
        other => {
            let debug = format!("{other:?}");
            debug
                .split(|c: char| !c.is_ascii_alphanumeric())
                .next()
                .filter(|name| !name.is_empty())
                .unwrap_or("Error")
                .to_string()
        }
    }
}

impl DataAccessError {
    pub fn validation<M: Into<String>, F: Into<String>>(message: M, fragment: F) -> Self {
        DataAccessError::Validation {
            message: message.into(),
            fragment: fragment.into(),
        }
    }

    pub fn execution<S: Into<String>>(sql: S, err: &rusqlite::Error) -> Self {
        DataAccessError::Execution {
            sql: sql.into(),
            context: None,
            cause: err.to_string(),
            kind: cause_kind(err),
        }
    }

    pub fn blob<T: Into<String>>(operation: &'static str, table: T, id: i64, source: Self) -> Self {
        DataAccessError::Blob {
            operation,
            table: table.into(),
            id,
            source: Box::new(source),
        }
    }

    pub fn row<T, C, M>(table: T, row: usize, content: C, message: M) -> Self
    where
        T: Into<String>,
        C: Into<String>,
        M: Into<String>,
    {
        DataAccessError::Row {
            table: table.into(),
            row,
            content: content.into(),
            message: message.into(),
        }
    }

    pub fn archive<E: Into<String>, M: Into<String>>(entry: E, message: M) -> Self {
        DataAccessError::Archive {
            entry: entry.into(),
            message: message.into(),
        }
    }

    pub fn io<C: Into<String>>(context: C, err: &std::io::Error) -> Self {
        DataAccessError::Io {
            context: context.into(),
            kind: format!("{:?}", err.kind()),
            message: err.to_string(),
        }
    }

    pub fn coercion<F, I, M>(field: F, input: I, message: M) -> Self
    where
        F: Into<String>,
        I: Into<String>,
        M: Into<String>,
    {
        DataAccessError::Coercion {
            field: field.into(),
            input: input.into(),
            message: message.into(),
        }
    }

    pub fn schema<T: Into<String>>(msg: T) -> Self {
        DataAccessError::Schema(msg.into())
    }

    pub fn connection<T: Into<String>>(msg: T) -> Self {
        DataAccessError::Connection(msg.into())
    }

    pub fn transaction<T: Into<String>>(msg: T) -> Self {
        DataAccessError::Transaction(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        DataAccessError::NotFound(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        DataAccessError::InvalidInput(msg.into())
    }

    pub fn fault_injection<T: Into<String>>(msg: T) -> Self {
        DataAccessError::FaultInjected(msg.into())
    }

    /// Attaches a caller-supplied context message to an execution error.
    /// Other kinds are returned unchanged.
    pub fn with_context<T: Into<String>>(self, message: T) -> Self {
        match self {
            DataAccessError::Execution {
                sql, cause, kind, ..
            } => DataAccessError::Execution {
                sql,
                context: Some(message.into()),
                cause,
                kind,
            },
            other => other,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, DataAccessError::Validation { .. })
    }

    /// The SQL text or archive entry this error was raised for, if any.
    pub fn subject(&self) -> Option<&str> {
        match self {
            DataAccessError::Validation { fragment, .. } => Some(fragment),
            DataAccessError::Execution { sql, .. } => Some(sql),
            DataAccessError::Archive { entry, .. } => Some(entry),
            DataAccessError::Blob { source, .. } => source.subject(),
            _ => None,
        }
    }
}

pub type Result<T, E = DataAccessError> = std::result::Result<T, E>;
