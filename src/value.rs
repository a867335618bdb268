//! Typed values and their conversion to and from parameters, rows and text.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::ValueRef;

use crate::DataAccessError;
use crate::schema::{Field, FieldType};

/// Driver-native parameter value.
pub type SqlValue = rusqlite::types::Value;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// `%.f` writes nothing for whole seconds, so plain timestamps stay plain.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Text(String),
    Integer(i64),
    Real(f64),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    /// Large-object handle read from an oid column.
    Handle(i64),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Text(_) => "text",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
            Value::Handle(_) => "oid",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) | Value::Handle(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(v) => Some(*v),
            Value::Timestamp(v) => Some(v.date()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(v) => Some(*v),
            Value::Date(v) => Some(v.and_time(NaiveTime::MIN)),
            _ => None,
        }
    }

    /// Handle of a stored payload; `0` counts as absent.
    pub fn as_handle(&self) -> Option<i64> {
        match self {
            Value::Handle(v) | Value::Integer(v) if *v != 0 => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v:?}"),
            Value::Integer(v) | Value::Handle(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Date(v) => write!(f, "{}", v.format(DATE_FORMAT)),
            Value::Timestamp(v) => write!(f, "{}", v.format(TIMESTAMP_FORMAT)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

fn mismatch(field: &Field, value: &Value) -> DataAccessError {
    DataAccessError::validation(
        format!(
            "type mismatch: {} is {}, got {}",
            field,
            field.field_type(),
            value.type_name()
        ),
        field.qualified_name(),
    )
}

fn check_char(field: &Field, text: &str) -> Result<(), DataAccessError> {
    if field.field_type() == FieldType::Char && text.chars().count() > 1 {
        return Err(DataAccessError::coercion(
            field.qualified_name(),
            text,
            "character columns hold a single character",
        ));
    }
    Ok(())
}

/// Type-checked conversion of `value` into a parameter for `field`.
pub fn to_parameter(field: &Field, value: &Value) -> Result<SqlValue, DataAccessError> {
    let ty = field.field_type();
    if ty == FieldType::Oid {
        return Err(DataAccessError::validation(
            "oid columns cannot be bound as parameters",
            field.qualified_name(),
        ));
    }
    let param = match (ty, value) {
        (_, Value::Null) => SqlValue::Null,
        (FieldType::Boolean, Value::Bool(v)) => SqlValue::Integer(i64::from(*v)),
        (FieldType::Text | FieldType::Char, Value::Text(v)) => {
            check_char(field, v)?;
            SqlValue::Text(v.clone())
        }
        (FieldType::Integer | FieldType::Currency, Value::Integer(v)) => SqlValue::Integer(*v),
        (FieldType::Real, Value::Real(v)) => SqlValue::Real(*v),
        (FieldType::Real, Value::Integer(v)) => SqlValue::Real(*v as f64),
        (FieldType::Date, Value::Date(v)) => SqlValue::Text(v.format(DATE_FORMAT).to_string()),
        (FieldType::Timestamp, Value::Timestamp(v)) => {
            SqlValue::Text(v.format(TIMESTAMP_FORMAT).to_string())
        }
        (FieldType::Timestamp, Value::Date(v)) => SqlValue::Text(
            v.and_time(NaiveTime::MIN)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
        ),
        _ => return Err(mismatch(field, value)),
    };
    Ok(param)
}

/// Decodes column `index` of `row` as `field`'s type.
pub fn from_row(
    row: &rusqlite::Row<'_>,
    index: usize,
    field: &Field,
) -> Result<Value, DataAccessError> {
    let raw = row.get_ref(index).map_err(|e| {
        DataAccessError::coercion(field.qualified_name(), format!("column {index}"), e.to_string())
    })?;
    from_value_ref(field, raw)
}

pub fn from_value_ref(field: &Field, raw: ValueRef<'_>) -> Result<Value, DataAccessError> {
    let text_of = |bytes: &[u8]| -> Result<String, DataAccessError> {
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            DataAccessError::coercion(field.qualified_name(), "<bytes>", e.to_string())
        })
    };
    let value = match (field.field_type(), raw) {
        (_, ValueRef::Null) => Value::Null,
        (_, ValueRef::Blob(_)) => {
            return Err(DataAccessError::coercion(
                field.qualified_name(),
                "<blob>",
                "unexpected binary column",
            ));
        }
        (FieldType::Boolean, ValueRef::Integer(v)) => Value::Bool(v != 0),
        (FieldType::Boolean, ValueRef::Real(v)) => Value::Bool(v != 0.0),
        (FieldType::Boolean, ValueRef::Text(v)) => Value::Bool(parse_bool(&text_of(v)?)),
        (FieldType::Text | FieldType::Char, ValueRef::Text(v)) => Value::Text(text_of(v)?),
        (FieldType::Text | FieldType::Char, ValueRef::Integer(v)) => Value::Text(v.to_string()),
        (FieldType::Text | FieldType::Char, ValueRef::Real(v)) => Value::Text(v.to_string()),
        (FieldType::Integer | FieldType::Currency, ValueRef::Integer(v)) => Value::Integer(v),
        (FieldType::Integer | FieldType::Currency, ValueRef::Real(v)) if v.fract() == 0.0 => {
            Value::Integer(v as i64)
        }
        (FieldType::Real, ValueRef::Real(v)) => Value::Real(v),
        (FieldType::Real, ValueRef::Integer(v)) => Value::Real(v as f64),
        (FieldType::Oid, ValueRef::Integer(v)) => Value::Handle(v),
        (_, ValueRef::Text(v)) => parse_text(field, &text_of(v)?)?,
        (_, other) => {
            return Err(DataAccessError::coercion(
                field.qualified_name(),
                format!("{other:?}"),
                format!("not a {} value", field.field_type()),
            ));
        }
    };
    Ok(value)
}

fn parse_bool(text: &str) -> bool {
    text.starts_with(['t', 'T']) || text == "1"
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, DATE_FORMAT)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Parses the text form of a `field` value.
///
/// Empty input is an empty string for text columns and NULL for every other
/// type.
pub fn parse_text(field: &Field, text: &str) -> Result<Value, DataAccessError> {
    let ty = field.field_type();
    let fail = |message: String| DataAccessError::coercion(field.qualified_name(), text, message);
    if ty == FieldType::Oid {
        return Err(fail("oid columns have no text form".to_string()));
    }
    if text.is_empty() {
        return Ok(match ty {
            FieldType::Text | FieldType::Char => Value::Text(String::new()),
            _ => Value::Null,
        });
    }
    let value = match ty {
        FieldType::Boolean => Value::Bool(parse_bool(text)),
        FieldType::Text => Value::Text(text.to_string()),
        FieldType::Char => {
            check_char(field, text)?;
            Value::Text(text.to_string())
        }
        FieldType::Integer | FieldType::Currency => {
            Value::Integer(text.trim().parse().map_err(|e| fail(format!("{e}")))?)
        }
        FieldType::Real => Value::Real(text.trim().parse().map_err(|e| fail(format!("{e}")))?),
        FieldType::Date => Value::Date(
            NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
                .or_else(|_| parse_timestamp(text.trim()).map(|t| t.date()).ok_or(()))
                .map_err(|_| fail(format!("expected {DATE_FORMAT}")))?,
        ),
        FieldType::Timestamp => Value::Timestamp(
            parse_timestamp(text.trim()).ok_or_else(|| fail("expected a timestamp".to_string()))?,
        ),
        FieldType::Oid => return Err(fail("oid columns have no text form".to_string())),
    };
    Ok(value)
}

/// Text form of `value`, the inverse of [`parse_text`]. NULL becomes "".
pub fn format_text(field: &Field, value: &Value) -> Result<String, DataAccessError> {
    let ty = field.field_type();
    let text = match (ty, value) {
        (FieldType::Oid, _) | (_, Value::Handle(_)) => {
            return Err(DataAccessError::validation(
                "oid columns have no text form",
                field.qualified_name(),
            ));
        }
        (_, Value::Null) => String::new(),
        (FieldType::Boolean, Value::Bool(v)) => if *v { "t" } else { "f" }.to_string(),
        (FieldType::Text | FieldType::Char, Value::Text(v)) => v.clone(),
        (FieldType::Integer | FieldType::Currency, Value::Integer(v)) => v.to_string(),
        (FieldType::Real, Value::Real(v)) => v.to_string(),
        (FieldType::Real, Value::Integer(v)) => (*v as f64).to_string(),
        (FieldType::Date, Value::Date(v)) => v.format(DATE_FORMAT).to_string(),
        (FieldType::Timestamp, Value::Timestamp(v)) => v.format(TIMESTAMP_FORMAT).to_string(),
        (FieldType::Timestamp, Value::Date(v)) => v
            .and_time(NaiveTime::MIN)
            .format(TIMESTAMP_FORMAT)
            .to_string(),
        _ => return Err(mismatch(field, value)),
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaBuilder, TableDef};

    fn sample() -> crate::schema::Schema {
        SchemaBuilder::new()
            .table(
                TableDef::new("sample")
                    .serial_id("id")
                    .field("flag", FieldType::Boolean)
                    .field("label", FieldType::Text)
                    .field("initial", FieldType::Char)
                    .field("amount", FieldType::Currency)
                    .field("ratio", FieldType::Real)
                    .field("born", FieldType::Date)
                    .field("seen", FieldType::Timestamp)
                    .field("photo", FieldType::Oid),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn empty_text_depends_on_type() {
        let schema = sample();
        let label = schema.field_named("sample", "label").unwrap();
        let ratio = schema.field_named("sample", "ratio").unwrap();
        assert_eq!(parse_text(label, "").unwrap(), Value::Text(String::new()));
        assert_eq!(parse_text(ratio, "").unwrap(), Value::Null);
    }

    #[test]
    fn booleans_parse_leniently() {
        let schema = sample();
        let flag = schema.field_named("sample", "flag").unwrap();
        assert_eq!(parse_text(flag, "true").unwrap(), Value::Bool(true));
        assert_eq!(parse_text(flag, "t").unwrap(), Value::Bool(true));
        assert_eq!(parse_text(flag, "1").unwrap(), Value::Bool(true));
        assert_eq!(parse_text(flag, "f").unwrap(), Value::Bool(false));
        assert_eq!(format_text(flag, &Value::Bool(true)).unwrap(), "t");
    }

    #[test]
    fn timestamps_keep_fractions_only_when_present() {
        let schema = sample();
        let seen = schema.field_named("sample", "seen").unwrap();
        let whole = parse_text(seen, "2021-03-04 05:06:07").unwrap();
        assert_eq!(format_text(seen, &whole).unwrap(), "2021-03-04 05:06:07");
        let fraction = parse_text(seen, "2021-03-04 05:06:07.25").unwrap();
        assert_eq!(format_text(seen, &fraction).unwrap(), "2021-03-04 05:06:07.250");
    }

    #[test]
    fn parameters_are_type_checked() {
        let schema = sample();
        let amount = schema.field_named("sample", "amount").unwrap();
        let born = schema.field_named("sample", "born").unwrap();
        let photo = schema.field_named("sample", "photo").unwrap();
        let initial = schema.field_named("sample", "initial").unwrap();

        assert_eq!(
            to_parameter(amount, &Value::Integer(250)).unwrap(),
            SqlValue::Integer(250)
        );
        assert!(to_parameter(amount, &Value::Text("250".into())).unwrap_err().is_validation());
        let date = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap();
        assert_eq!(
            to_parameter(born, &Value::Date(date)).unwrap(),
            SqlValue::Text("2020-01-31".into())
        );
        assert!(to_parameter(photo, &Value::Integer(1)).is_err());
        assert!(to_parameter(initial, &Value::Text("ab".into())).is_err());
    }
}
