//! Declarative table definitions and validation into an immutable [`Schema`].

use std::collections::VecDeque;

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

use super::{Field, FieldId, FieldType, Schema, Table, TableId};
use crate::DataAccessError;

/// Table names used by the large-object store.
pub const RESERVED_TABLES: &[&str] = &["large_object", "large_object_page", "sqlite_sequence"];

/// Keywords that cannot appear unquoted where SQLite expects a name.
const RESERVED_WORDS: &[&str] = &[
    "add", "all", "alter", "and", "as", "autoincrement", "between", "case", "check",
    "collate", "commit", "constraint", "create", "cross", "current_date", "current_time",
    "current_timestamp", "default", "deferrable", "delete", "distinct", "drop", "else",
    "escape", "except", "exists", "filter", "foreign", "from", "full", "glob", "group",
    "having", "in", "index", "indexed", "inner", "insert", "intersect", "into", "is",
    "isnull", "join", "left", "like", "limit", "natural", "not", "nothing", "notnull",
    "null", "on", "or", "order", "outer", "over", "primary", "references", "regexp",
    "returning", "right", "select", "set", "table", "then", "to", "transaction", "union",
    "unique", "update", "using", "values", "when", "where", "window",
];

/// `name` as it is written into SQL: double-quoted when it is a reserved word.
pub fn sql_identifier(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    if RESERVED_WORDS.contains(&lower.as_str()) {
        format!("\"{name}\"")
    } else {
        name.to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    #[serde(default)]
    pub id: bool,
    #[serde(default)]
    pub references: Option<String>,
    #[serde(default)]
    pub docs: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(default)]
    pub docs: Option<String>,
    pub fields: Vec<FieldDef>,
}

impl TableDef {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            docs: None,
            fields: Vec::new(),
        }
    }

    pub fn docs<D: Into<String>>(mut self, docs: D) -> Self {
        self.docs = Some(docs.into());
        self
    }

    pub fn push(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn id<N: Into<String>>(self, name: N, ty: FieldType) -> Self {
        self.push(FieldDef {
            name: name.into(),
            ty,
            id: true,
            references: None,
            docs: None,
        })
    }

    /// Integer id that the store assigns on insert.
    pub fn serial_id<N: Into<String>>(self, name: N) -> Self {
        self.id(name, FieldType::Integer)
    }

    pub fn field<N: Into<String>>(self, name: N, ty: FieldType) -> Self {
        self.push(FieldDef {
            name: name.into(),
            ty,
            id: false,
            references: None,
            docs: None,
        })
    }

    /// Integer foreign key to `target`.
    pub fn reference<N: Into<String>, T: Into<String>>(self, name: N, target: T) -> Self {
        self.push(FieldDef {
            name: name.into(),
            ty: FieldType::Integer,
            id: false,
            references: Some(target.into()),
            docs: None,
        })
    }

    /// Integer foreign key to `target` that is also part of this table's key.
    pub fn id_reference<N: Into<String>, T: Into<String>>(self, name: N, target: T) -> Self {
        self.push(FieldDef {
            name: name.into(),
            ty: FieldType::Integer,
            id: true,
            references: Some(target.into()),
            docs: None,
        })
    }

    /// Documents the most recently added field.
    pub fn field_docs<D: Into<String>>(mut self, docs: D) -> Self {
        if let Some(last) = self.fields.last_mut() {
            last.docs = Some(docs.into());
        }
        self
    }
}

/// Serialized form of a whole schema.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub tables: Vec<TableDef>,
}

#[derive(Default)]
pub struct SchemaBuilder {
    tables: Vec<TableDef>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_description(description: SchemaDescription) -> Self {
        Self {
            tables: description.tables,
        }
    }

    pub fn table(mut self, table: TableDef) -> Self {
        self.tables.push(table);
        self
    }

    pub fn build(self) -> Result<Schema, DataAccessError> {
        let mut table_index: AHashMap<String, TableId> = AHashMap::new();
        for (position, def) in self.tables.iter().enumerate() {
            check_identifier(&def.name)?;
            if RESERVED_TABLES.contains(&def.name.as_str())
                || def.name.to_ascii_lowercase().starts_with("sqlite_")
            {
                return Err(DataAccessError::schema(format!(
                    "table name {} is reserved",
                    def.name
                )));
            }
            if table_index
                .insert(def.name.clone(), TableId(position))
                .is_some()
            {
                return Err(DataAccessError::schema(format!(
                    "duplicate table {}",
                    def.name
                )));
            }
        }

        let mut tables = Vec::with_capacity(self.tables.len());
        for (position, def) in self.tables.iter().enumerate() {
            tables.push(build_table(TableId(position), def, &table_index)?);
        }

        check_references(&tables)?;
        check_acyclic(&tables)?;

        Ok(Schema::from_parts(tables, table_index))
    }
}

fn check_identifier(name: &str) -> Result<(), DataAccessError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DataAccessError::schema(format!(
            "invalid identifier {name:?}"
        )))
    }
}

fn build_table(
    id: TableId,
    def: &TableDef,
    table_index: &AHashMap<String, TableId>,
) -> Result<Table, DataAccessError> {
    let mut fields = Vec::with_capacity(def.fields.len());
    let mut by_name = AHashMap::with_capacity(def.fields.len());
    let mut id_fields = Vec::new();
    let mut references = Vec::new();

    for (index, field) in def.fields.iter().enumerate() {
        check_identifier(&field.name)?;
        if by_name.insert(field.name.clone(), index).is_some() {
            return Err(DataAccessError::schema(format!(
                "duplicate field {}.{}",
                def.name, field.name
            )));
        }
        let reference = match &field.references {
            Some(target) => Some(*table_index.get(target).ok_or_else(|| {
                DataAccessError::schema(format!(
                    "{}.{} references unknown table {target}",
                    def.name, field.name
                ))
            })?),
            None => None,
        };
        if field.ty == FieldType::Oid && (field.id || reference.is_some()) {
            return Err(DataAccessError::schema(format!(
                "{}.{}: oid fields cannot be ids or references",
                def.name, field.name
            )));
        }
        let field_id = FieldId { table: id, index };
        if field.id {
            id_fields.push(field_id);
        }
        if let Some(target) = reference
            && target != id
            && !references.contains(&target)
        {
            references.push(target);
        }
        let sql_name = sql_identifier(&field.name);
        fields.push(Field {
            id: field_id,
            name: field.name.clone(),
            qualified: format!("{}.{}", def.name, field.name),
            sql_qualified: format!("{}.{}", sql_identifier(&def.name), sql_name),
            sql_name,
            ty: field.ty,
            reference,
            is_id: field.id,
            docs: field.docs.clone(),
        });
    }

    if id_fields.is_empty() {
        return Err(DataAccessError::schema(format!(
            "table {} has no id field",
            def.name
        )));
    }

    Ok(Table {
        id,
        name: def.name.clone(),
        sql_name: sql_identifier(&def.name),
        fields,
        id_fields,
        references,
        docs: def.docs.clone(),
        by_name,
    })
}

/// Every reference must point at a table with one id field of a compatible type.
fn check_references(tables: &[Table]) -> Result<(), DataAccessError> {
    for table in tables {
        for field in &table.fields {
            let Some(target) = field.reference else {
                continue;
            };
            let target = &tables[target.0];
            let [target_id] = target.id_fields.as_slice() else {
                return Err(DataAccessError::schema(format!(
                    "{} references {}, which has {} id fields",
                    field.qualified,
                    target.name,
                    target.id_fields.len()
                )));
            };
            let target_id = &target.fields[target_id.index];
            if !field.ty.is_compatible(target_id.ty) {
                return Err(DataAccessError::schema(format!(
                    "{} ({}) references {} ({})",
                    field.qualified, field.ty, target_id.qualified, target_id.ty
                )));
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm over the reference graph; leftovers form at least one cycle.
fn check_acyclic(tables: &[Table]) -> Result<(), DataAccessError> {
    let mut pending: Vec<usize> = tables.iter().map(|t| t.references.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tables.len()];
    for table in tables {
        for target in &table.references {
            dependents[target.0].push(table.id.0);
        }
    }

    let mut ready: VecDeque<usize> = (0..tables.len()).filter(|&i| pending[i] == 0).collect();
    let mut resolved = 0;
    while let Some(next) = ready.pop_front() {
        resolved += 1;
        for &dependent in &dependents[next] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }
    if resolved == tables.len() {
        return Ok(());
    }

    let cycle = find_cycle(tables, &pending);
    let names: Vec<&str> = cycle.iter().map(|&i| tables[i].name.as_str()).collect();
    Err(DataAccessError::schema(format!(
        "reference cycle: {}",
        names.join(" -> ")
    )))
}

/// Walks references through unresolved tables until one repeats.
fn find_cycle(tables: &[Table], pending: &[usize]) -> Vec<usize> {
    let Some(start) = (0..tables.len()).find(|&i| pending[i] > 0) else {
        return Vec::new();
    };
    let mut path = vec![start];
    let mut seen = AHashSet::new();
    seen.insert(start);
    let mut current = start;
    loop {
        let Some(next) = tables[current]
            .references
            .iter()
            .map(|t| t.0)
            .find(|&t| pending[t] > 0)
        else {
            return path;
        };
        if !seen.insert(next) {
            let begin = path.iter().position(|&i| i == next).unwrap_or(0);
            let mut cycle = path.split_off(begin);
            cycle.push(next);
            return cycle;
        }
        path.push(next);
        current = next;
    }
}
