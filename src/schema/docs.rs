//! Markdown overview of a schema.

use std::io::Write;

use super::Schema;
use crate::DataAccessError;

pub fn write_markdown<W: Write>(schema: &Schema, mut out: W) -> Result<(), DataAccessError> {
    render(schema, &mut out).map_err(|e| DataAccessError::io("writing schema overview", &e))
}

pub fn to_markdown(schema: &Schema) -> String {
    let mut buffer = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = render(schema, &mut buffer);
    String::from_utf8_lossy(&buffer).into_owned()
}

fn render<W: Write>(schema: &Schema, out: &mut W) -> std::io::Result<()> {
    writeln!(out, "# Tables")?;
    writeln!(out)?;
    for table in schema.tables() {
        writeln!(out, "- [{}](#{})", table.name(), table.name())?;
    }

    for table in schema.tables() {
        writeln!(out)?;
        writeln!(out, "## {}", table.name())?;
        if let Some(docs) = table.docs() {
            writeln!(out)?;
            writeln!(out, "{docs}")?;
        }
        writeln!(out)?;
        writeln!(out, "| field | type | references | description |")?;
        writeln!(out, "|---|---|---|---|")?;
        for field in table.fields() {
            let name = if field.is_id() {
                format!("**{}**", field.name())
            } else {
                field.name().to_string()
            };
            let reference = field
                .reference()
                .map(|t| {
                    let target = schema.table(t).name();
                    format!("[{target}](#{target})")
                })
                .unwrap_or_default();
            writeln!(
                out,
                "| {} | {} | {} | {} |",
                name,
                field.field_type(),
                reference,
                field.docs().unwrap_or("")
            )?;
        }

        let dependents = schema.referenced_by(table.id());
        if !dependents.is_empty() {
            let names: Vec<String> = dependents
                .iter()
                .map(|t| {
                    let name = schema.table(*t).name();
                    format!("[{name}](#{name})")
                })
                .collect();
            writeln!(out)?;
            writeln!(out, "Referenced by: {}", names.join(", "))?;
        }
    }
    Ok(())
}
