use super::{Filter, SubqueryTest};
use crate::DataAccessError;
use crate::schema::FieldId;

impl<'s> Filter<'s> {
    /// `own IN (SELECT sub_field FROM ...)`. The sub-filter is captured as it
    /// is now; later changes to it do not affect this filter.
    pub fn field_in_subquery(
        &mut self,
        own: FieldId,
        sub: &Filter<'s>,
        sub_field: FieldId,
    ) -> Result<&mut Self, DataAccessError> {
        self.push_subquery(own, sub, sub_field, false)
    }

    /// `own NOT IN (SELECT sub_field FROM ...)`
    pub fn field_not_in_subquery(
        &mut self,
        own: FieldId,
        sub: &Filter<'s>,
        sub_field: FieldId,
    ) -> Result<&mut Self, DataAccessError> {
        self.push_subquery(own, sub, sub_field, true)
    }

    fn push_subquery(
        &mut self,
        own: FieldId,
        sub: &Filter<'s>,
        sub_field: FieldId,
        negated: bool,
    ) -> Result<&mut Self, DataAccessError> {
        if !std::ptr::eq(self.schema, sub.schema) {
            return Err(DataAccessError::validation(
                "sub-filter belongs to another schema",
                format!("{own:?}"),
            ));
        }
        let own_field = self.present_field(own)?;
        let inner_field = sub.present_field(sub_field)?;
        if !own_field.field_type().is_compatible(inner_field.field_type()) {
            return Err(DataAccessError::validation(
                format!(
                    "sub-query type mismatch: {} is {}, {} is {}",
                    own_field,
                    own_field.field_type(),
                    inner_field,
                    inner_field.field_type()
                ),
                format!("{own_field} IN (SELECT {inner_field} ...)"),
            ));
        }
        self.subqueries.push(SubqueryTest {
            own,
            sub: Box::new(sub.clone()),
            sub_field,
            negated,
        });
        Ok(self)
    }
}
