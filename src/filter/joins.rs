use super::{Filter, Join};
use crate::DataAccessError;
use crate::schema::{FieldId, TableId};

impl<'s> Filter<'s> {
    fn check_joinable(&self, target: TableId) -> Result<(), DataAccessError> {
        if target.index() >= self.schema.len() {
            return Err(DataAccessError::validation(
                "unregistered table",
                format!("{target:?}"),
            ));
        }
        if self.contains_table(target) {
            return Err(DataAccessError::validation(
                "table is already part of the filter",
                format!("INNER JOIN {}", self.schema.table(target).name()),
            ));
        }
        Ok(())
    }

    fn join_fragment(&self, target: TableId, left: FieldId, right: FieldId) -> String {
        format!(
            "INNER JOIN {} ON {} = {}",
            self.schema.table(target).sql_name(),
            self.schema.field(left).sql_qualified_name(),
            self.schema.field(right).sql_qualified_name()
        )
    }

    /// True when `target` references, or is referenced by, a table already
    /// in the filter.
    fn is_connected(&self, target: TableId) -> bool {
        let target_table = self.schema.table(target);
        self.tables().into_iter().any(|present| {
            target_table.references().contains(&present)
                || self.schema.table(present).references().contains(&target)
        })
    }

    /// Joins `target` on `left = right`. One of the fields must belong to
    /// `target` and the other to a table already in the filter.
    pub fn inner_join(
        &mut self,
        target: TableId,
        left: FieldId,
        right: FieldId,
    ) -> Result<&mut Self, DataAccessError> {
        self.check_joinable(target)?;
        if !self.schema.contains_field(left) || !self.schema.contains_field(right) {
            return Err(DataAccessError::validation(
                "unregistered join field",
                format!("INNER JOIN {}", self.schema.table(target).name()),
            ));
        }
        let fragment = self.join_fragment(target, left, right);
        let schema = self.schema;
        let (a, b) = (schema.field(left), schema.field(right));
        if a.table() == b.table() {
            return Err(DataAccessError::validation(
                "join fields come from the same table",
                fragment,
            ));
        }
        if !a.field_type().is_compatible(b.field_type()) {
            return Err(DataAccessError::validation(
                format!(
                    "join type mismatch: {} is {}, {} is {}",
                    a,
                    a.field_type(),
                    b,
                    b.field_type()
                ),
                fragment,
            ));
        }
        let links_target = (a.table() == target && self.contains_table(b.table()))
            || (b.table() == target && self.contains_table(a.table()));
        if !links_target {
            return Err(DataAccessError::validation(
                "join must link the new table to a table already in the filter",
                fragment,
            ));
        }
        if !self.is_connected(target) {
            return Err(DataAccessError::validation(
                "joined table has no reference to or from the filter's tables",
                fragment,
            ));
        }
        self.joins.push(Join {
            target,
            left,
            right,
        });
        Ok(self)
    }

    /// Joins `target` along the foreign key connecting it to the filter.
    ///
    /// Present tables are scanned base first, then in join order. For each
    /// one, fields referencing `target` and fields of `target` referencing it
    /// are candidates: a single candidate decides the join, several are
    /// ambiguous and need an explicit [`Filter::inner_join`].
    pub fn auto_join(&mut self, target: TableId) -> Result<&mut Self, DataAccessError> {
        self.check_joinable(target)?;
        let schema = self.schema;
        let target_table = schema.table(target);

        for present in self.tables() {
            let present_table = schema.table(present);
            let mut candidates = Vec::new();
            for field in present_table.fields() {
                if field.reference() == Some(target) {
                    candidates.push((field.id(), target));
                }
            }
            for field in target_table.fields() {
                if field.reference() == Some(present) {
                    candidates.push((field.id(), present));
                }
            }

            match candidates.as_slice() {
                [] => continue,
                [(field, referenced)] => {
                    let (field, key) = (*field, schema.single_id(*referenced)?);
                    return self.inner_join(target, field, key);
                }
                many => {
                    let names: Vec<&str> = many
                        .iter()
                        .map(|(f, _)| schema.field(*f).qualified_name())
                        .collect();
                    return Err(DataAccessError::validation(
                        format!(
                            "ambiguous join between {} and {}: {}",
                            present_table.name(),
                            target_table.name(),
                            names.join(", ")
                        ),
                        format!("INNER JOIN {}", target_table.name()),
                    ));
                }
            }
        }

        Err(DataAccessError::validation(
            format!(
                "no reference connects {} to the filter",
                target_table.name()
            ),
            format!("INNER JOIN {}", target_table.name()),
        ))
    }

    /// [`Filter::auto_join`] by table name.
    pub fn join_table(&mut self, target: &str) -> Result<&mut Self, DataAccessError> {
        let target = self.schema.require_table(target)?.id();
        self.auto_join(target)
    }
}
