/// SQL flavor used when rendering statements.
///
/// Statements executed through a [`crate::DataAccessContext`] always use
/// [`Dialect::Sqlite`]; the PostgreSQL flavor is for callers that hand the
/// rendered text to another driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Case-insensitive pattern match operator.
    pub fn case_insensitive_like(self) -> &'static str {
        match self {
            Dialect::Sqlite => "LIKE",
            Dialect::Postgres => "ILIKE",
        }
    }

    /// Day of week (Sunday = 0) of a date expression.
    pub fn weekday_of(self, column: &str) -> String {
        match self {
            Dialect::Sqlite => format!("CAST(strftime('%w', {column}) AS INTEGER)"),
            Dialect::Postgres => format!("extract(dow from {column})"),
        }
    }

    pub fn supports_distinct_on(self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    pub fn supports_delete_using(self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}
