//! Shorthands over [`Filter::add_predicate`] and
//! [`Filter::or_predicate_over_values`].

use super::{Filter, Operator};
use crate::DataAccessError;
use crate::schema::FieldId;
use crate::value::Value;

impl<'s> Filter<'s> {
    pub fn field_equals<V: Into<Value>>(
        &mut self,
        field: FieldId,
        value: V,
    ) -> Result<&mut Self, DataAccessError> {
        self.add_predicate(field, Operator::Equals, value)
    }

    pub fn field_not_equals<V: Into<Value>>(
        &mut self,
        field: FieldId,
        value: V,
    ) -> Result<&mut Self, DataAccessError> {
        self.add_predicate(field, Operator::NotEquals, value)
    }

    pub fn field_less_than<V: Into<Value>>(
        &mut self,
        field: FieldId,
        value: V,
    ) -> Result<&mut Self, DataAccessError> {
        self.add_predicate(field, Operator::Less, value)
    }

    pub fn field_less_or_equal<V: Into<Value>>(
        &mut self,
        field: FieldId,
        value: V,
    ) -> Result<&mut Self, DataAccessError> {
        self.add_predicate(field, Operator::LessOrEqual, value)
    }

    pub fn field_greater_than<V: Into<Value>>(
        &mut self,
        field: FieldId,
        value: V,
    ) -> Result<&mut Self, DataAccessError> {
        self.add_predicate(field, Operator::Greater, value)
    }

    pub fn field_greater_or_equal<V: Into<Value>>(
        &mut self,
        field: FieldId,
        value: V,
    ) -> Result<&mut Self, DataAccessError> {
        self.add_predicate(field, Operator::GreaterOrEqual, value)
    }

    pub fn field_contains(
        &mut self,
        field: FieldId,
        text: &str,
    ) -> Result<&mut Self, DataAccessError> {
        self.add_predicate(field, Operator::CaseInsensitiveLike, format!("%{text}%"))
    }

    pub fn field_starts_with(
        &mut self,
        field: FieldId,
        text: &str,
    ) -> Result<&mut Self, DataAccessError> {
        self.add_predicate(field, Operator::CaseInsensitiveLike, format!("{text}%"))
    }

    pub fn field_ends_with(
        &mut self,
        field: FieldId,
        text: &str,
    ) -> Result<&mut Self, DataAccessError> {
        self.add_predicate(field, Operator::CaseInsensitiveLike, format!("%{text}"))
    }

    pub fn field_is_true(&mut self, field: FieldId) -> Result<&mut Self, DataAccessError> {
        self.add_predicate(field, Operator::Equals, true)
    }

    pub fn field_is_false(&mut self, field: FieldId) -> Result<&mut Self, DataAccessError> {
        self.add_predicate(field, Operator::Equals, false)
    }

    /// `field > from AND field < to`; requires `from <= to`.
    pub fn fields_between<V: Into<Value>>(
        &mut self,
        field: FieldId,
        from: V,
        to: V,
    ) -> Result<&mut Self, DataAccessError> {
        let (from, to) = (from.into(), to.into());
        self.check_range(field, &from, &to)?;
        self.add_predicate(field, Operator::Greater, from)?;
        self.add_predicate(field, Operator::Less, to)
    }

    /// Rows whose `[start, end]` span overlaps `[from, to]`:
    /// `start < to AND end >= from`; requires `from <= to`.
    pub fn fields_overlap<V: Into<Value>>(
        &mut self,
        start: FieldId,
        end: FieldId,
        from: V,
        to: V,
    ) -> Result<&mut Self, DataAccessError> {
        let (from, to) = (from.into(), to.into());
        self.check_range(start, &from, &to)?;
        crate::value::to_parameter(self.present_field(end)?, &from)?;
        self.add_predicate(start, Operator::Less, to)?;
        self.add_predicate(end, Operator::GreaterOrEqual, from)
    }

    pub fn field_equals_any<I, V>(
        &mut self,
        field: FieldId,
        values: I,
    ) -> Result<&mut Self, DataAccessError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.or_predicate_over_values(field, Operator::Equals, values)
    }

    pub fn field_contains_any<I, S>(
        &mut self,
        field: FieldId,
        texts: I,
    ) -> Result<&mut Self, DataAccessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = texts
            .into_iter()
            .map(|t| format!("%{}%", t.as_ref()))
            .collect();
        self.or_predicate_over_values(field, Operator::CaseInsensitiveLike, patterns)
    }

    pub fn field_starts_with_any<I, S>(
        &mut self,
        field: FieldId,
        texts: I,
    ) -> Result<&mut Self, DataAccessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = texts
            .into_iter()
            .map(|t| format!("{}%", t.as_ref()))
            .collect();
        self.or_predicate_over_values(field, Operator::CaseInsensitiveLike, patterns)
    }

    fn check_range(&self, field: FieldId, from: &Value, to: &Value) -> Result<(), DataAccessError> {
        let resolved = self.present_field(field)?;
        match (from.as_timestamp(), to.as_timestamp()) {
            (Some(from), Some(to)) if from <= to => Ok(()),
            (Some(_), Some(_)) => Err(DataAccessError::validation(
                "range start lies after its end",
                resolved.qualified_name(),
            )),
            _ => Err(DataAccessError::validation(
                "range bounds must be dates or timestamps",
                resolved.qualified_name(),
            )),
        }
    }
}
