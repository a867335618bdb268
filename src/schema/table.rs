use std::fmt;

use ahash::AHashMap;

use super::FieldType;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub(crate) usize);

impl TableId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId {
    pub(crate) table: TableId,
    pub(crate) index: usize,
}

impl FieldId {
    pub fn table(self) -> TableId {
        self.table
    }

    /// Position of the field in its table's declaration order.
    pub fn index(self) -> usize {
        self.index
    }
}

#[derive(Debug)]
pub struct Field {
    pub(crate) id: FieldId,
    pub(crate) name: String,
    pub(crate) qualified: String,
    pub(crate) sql_name: String,
    pub(crate) sql_qualified: String,
    pub(crate) ty: FieldType,
    pub(crate) reference: Option<TableId>,
    pub(crate) is_id: bool,
    pub(crate) docs: Option<String>,
}

impl Field {
    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn table(&self) -> TableId {
        self.id.table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `table.column`
    pub fn qualified_name(&self) -> &str {
        &self.qualified
    }

    /// Column name as written into SQL, quoted when it is a keyword.
    pub fn sql_name(&self) -> &str {
        &self.sql_name
    }

    pub fn sql_qualified_name(&self) -> &str {
        &self.sql_qualified
    }

    pub fn field_type(&self) -> FieldType {
        self.ty
    }

    pub fn reference(&self) -> Option<TableId> {
        self.reference
    }

    pub fn is_id(&self) -> bool {
        self.is_id
    }

    pub fn is_oid(&self) -> bool {
        self.ty == FieldType::Oid
    }

    pub fn docs(&self) -> Option<&str> {
        self.docs.as_deref()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified)
    }
}

#[derive(Debug)]
pub struct Table {
    pub(crate) id: TableId,
    pub(crate) name: String,
    pub(crate) sql_name: String,
    pub(crate) fields: Vec<Field>,
    pub(crate) id_fields: Vec<FieldId>,
    pub(crate) references: Vec<TableId>,
    pub(crate) docs: Option<String>,
    pub(crate) by_name: AHashMap<String, usize>,
}

impl Table {
    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table name as written into SQL, quoted when it is a keyword.
    pub fn sql_name(&self) -> &str {
        &self.sql_name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_ids(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.fields.iter().map(|f| f.id)
    }

    pub fn id_fields(&self) -> &[FieldId] {
        &self.id_fields
    }

    /// Tables pointed to by any field, without the table itself.
    pub fn references(&self) -> &[TableId] {
        &self.references
    }

    pub fn docs(&self) -> Option<&str> {
        self.docs.as_deref()
    }

    pub fn field_named(&self, name: &str) -> Option<&Field> {
        self.by_name.get(name).map(|&index| &self.fields[index])
    }

    pub fn field(&self, id: FieldId) -> Option<&Field> {
        if id.table != self.id {
            return None;
        }
        self.fields.get(id.index)
    }

    pub fn contains(&self, id: FieldId) -> bool {
        id.table == self.id && id.index < self.fields.len()
    }

    pub fn oid_fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.fields.iter().filter(|f| f.is_oid())
    }

    pub fn has_oid_fields(&self) -> bool {
        self.fields.iter().any(Field::is_oid)
    }

    /// The id field when the table has exactly one.
    pub fn single_id(&self) -> Option<FieldId> {
        match self.id_fields.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
