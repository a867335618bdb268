//! One table as CSV: every field quoted, `\` as escape byte, header first.

use std::io::{Read, Write};

use csv::{QuoteStyle, ReaderBuilder, StringRecord, WriterBuilder};

use crate::config::BulkConfig;
use crate::fault_injection::{FaultPoint, check_fault};
use crate::filter::{Filter, StatementKind};
use crate::progress::{RelationStatus, log_relation_progress};
use crate::schema::{FieldId, Schema, SqlGenerator, TableId};
use crate::value::{self, SqlValue};
use crate::{DataAccessContext, DataAccessError, Dialect};

/// SQLite's default host parameter limit.
const MAX_PARAMETERS: usize = 32_766;

fn csv_error(entry: &str, err: csv::Error) -> DataAccessError {
    DataAccessError::archive(entry, err.to_string())
}

/// The csv writer escapes quotes only, so backslashes are doubled up front.
fn escape_backslashes(text: String) -> String {
    if text.contains('\\') {
        text.replace('\\', "\\\\")
    } else {
        text
    }
}

fn row_content(record: &StringRecord) -> String {
    record.iter().collect::<Vec<_>>().join(",")
}

/// How loaded rows treat the serial id column of the file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadMode {
    /// Insert the ids from the file, then move the id sequence past them.
    #[default]
    Overwrite,
    /// Drop the serial id column and let the store number the rows.
    Append,
}

/// Writes the non-oid columns of every row of `table`; returns the row count.
pub fn write_table<W: Write>(
    ctx: &DataAccessContext,
    table: TableId,
    out: W,
    bulk: &BulkConfig,
) -> Result<usize, DataAccessError> {
    let schema = ctx.schema();
    let mut filter = Filter::new(schema, table);
    if let Some(id) = schema.table(table).single_id() {
        filter.set_order(id, true)?;
    }
    write_filtered(ctx, &filter, out, bulk)
}

/// Writes the base-table columns of the rows matching `filter`, in the
/// filter's order; returns the row count.
pub fn write_filtered<W: Write>(
    ctx: &DataAccessContext,
    filter: &Filter<'_>,
    out: W,
    bulk: &BulkConfig,
) -> Result<usize, DataAccessError> {
    let schema = ctx.schema();
    let name = schema.table(filter.base()).name();
    let entry = format!("{name}.csv");

    let total = usize::try_from(ctx.execute_count(filter)?).unwrap_or(0);
    let statement = filter.render(StatementKind::Select)?;
    let mut status = RelationStatus::new(name, total);
    status.add_listener(log_relation_progress(bulk.progress_interval));

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .double_quote(false)
        .escape(b'\\')
        .from_writer(out);
    let header: Vec<&str> = statement
        .columns
        .iter()
        .map(|f| schema.field(*f).name())
        .collect();
    writer
        .write_record(&header)
        .map_err(|e| csv_error(&entry, e))?;

    let mut record = Vec::with_capacity(header.len());
    let rows = ctx.for_each_row(&statement, |row| {
        record.clear();
        for (field, value) in statement.columns.iter().zip(row.values()) {
            let text = value::format_text(schema.field(*field), value)?;
            record.push(escape_backslashes(text));
        }
        writer
            .write_record(&record)
            .map_err(|e| csv_error(&entry, e))?;
        status.advance(1);
        Ok(())
    })?;
    writer
        .flush()
        .map_err(|e| DataAccessError::io(format!("writing {entry}"), &e))?;
    Ok(rows)
}

fn parse_header(
    schema: &Schema,
    table: TableId,
    header: &StringRecord,
) -> Result<Vec<FieldId>, DataAccessError> {
    let definition = schema.table(table);
    let mut fields: Vec<FieldId> = Vec::with_capacity(header.len());
    for column in header.iter() {
        let field = definition
            .field_named(column)
            .filter(|f| !f.is_oid())
            .ok_or_else(|| {
                DataAccessError::row(
                    definition.name(),
                    0,
                    row_content(header),
                    format!("unknown column {column}"),
                )
            })?;
        if fields.contains(&field.id()) {
            return Err(DataAccessError::row(
                definition.name(),
                0,
                row_content(header),
                format!("duplicate column {column}"),
            ));
        }
        fields.push(field.id());
    }
    if fields.is_empty() {
        return Err(DataAccessError::row(definition.name(), 0, "", "empty header"));
    }
    Ok(fields)
}

/// Parses and validates every row before the first insert, so a table
/// with one bad row stays empty. Only the `(position, field)` pairs in
/// `selected` are read from each record.
fn parse_rows<R: Read>(
    schema: &Schema,
    table: TableId,
    width: usize,
    selected: &[(usize, FieldId)],
    records: csv::StringRecordsIntoIter<R>,
) -> Result<Vec<Vec<SqlValue>>, DataAccessError> {
    let name = schema.table(table).name();
    let mut rows = Vec::new();
    for (index, record) in records.enumerate() {
        let number = index + 1;
        let record = record.map_err(|e| DataAccessError::row(name, number, "", e.to_string()))?;
        if record.len() != width {
            return Err(DataAccessError::row(
                name,
                number,
                row_content(&record),
                format!("expected {width} values, found {}", record.len()),
            ));
        }
        let mut params = Vec::with_capacity(selected.len());
        for (position, field) in selected {
            let field = schema.field(*field);
            let text = record.get(*position).unwrap_or_default();
            let param = value::parse_text(field, text)
                .and_then(|v| value::to_parameter(field, &v))
                .map_err(|e| DataAccessError::row(name, number, row_content(&record), e.to_string()))?;
            params.push(param);
        }
        rows.push(params);
    }
    Ok(rows)
}

/// Loads CSV rows into `table` with chunked multi-row INSERTs. In
/// [`LoadMode::Overwrite`] the table is expected to be empty and its id
/// sequence is moved past the loaded ids. Returns the row count.
pub fn load_table<R: Read>(
    ctx: &DataAccessContext,
    table: TableId,
    input: R,
    bulk: &BulkConfig,
    mode: LoadMode,
) -> Result<usize, DataAccessError> {
    let schema = ctx.schema();
    let mut records = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .double_quote(false)
        .escape(Some(b'\\'))
        .from_reader(input)
        .into_records();

    let name = schema.table(table).name();
    let header = match records.next() {
        Some(header) => header.map_err(|e| DataAccessError::row(name, 0, "", e.to_string()))?,
        None => return Ok(0),
    };
    let header_fields = parse_header(schema, table, &header)?;

    let generator = SqlGenerator::new(schema, table, Dialect::Sqlite);
    let writable = generator.insert_columns(mode == LoadMode::Overwrite);
    let selected: Vec<(usize, FieldId)> = header_fields
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, field)| writable.contains(field))
        .collect();
    let columns: Vec<FieldId> = selected.iter().map(|(_, field)| *field).collect();
    let rows = parse_rows(schema, table, header_fields.len(), &selected, records)?;

    let mut status = RelationStatus::new(name, rows.len());
    status.add_listener(log_relation_progress(bulk.progress_interval));

    let conn = ctx.connection();
    if columns.is_empty() {
        // Only a serial id in the file: every row gets a fresh one.
        let sql = format!("INSERT INTO {} DEFAULT VALUES", generator.table().sql_name());
        for _ in &rows {
            check_fault(FaultPoint::RestoreChunkInsert)?;
            conn.execute(&sql, &[])?;
            status.advance(1);
        }
        return Ok(rows.len());
    }

    let per_chunk = bulk
        .chunk_size
        .min(MAX_PARAMETERS / columns.len())
        .max(1);
    // Each chunk commits on its own.
    for chunk in rows.chunks(per_chunk) {
        check_fault(FaultPoint::RestoreChunkInsert)?;
        let sql = generator.insert(&columns, chunk.len())?;
        let params: Vec<SqlValue> = chunk.iter().flatten().cloned().collect();
        conn.execute(&sql, &params)?;
        status.advance(chunk.len());
    }
    if mode == LoadMode::Overwrite {
        for sql in generator.resync_sequence() {
            conn.execute_batch(&sql)?;
        }
    }
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backslashes_are_doubled() {
        assert_eq!(escape_backslashes(r"C:\temp".to_string()), r"C:\\temp");
        assert_eq!(escape_backslashes("plain".to_string()), "plain");
    }

    #[test]
    fn quotes_and_backslashes_survive_the_codec() {
        let original = vec![r#"say "hi""#.to_string(), r"back\slash".to_string(), String::new()];
        let mut buffer = Vec::new();
        {
            let mut writer = WriterBuilder::new()
                .quote_style(QuoteStyle::Always)
                .double_quote(false)
                .escape(b'\\')
                .from_writer(&mut buffer);
            let escaped: Vec<String> = original.iter().cloned().map(escape_backslashes).collect();
            writer.write_record(&escaped).unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(
            String::from_utf8(buffer.clone()).unwrap(),
            "\"say \\\"hi\\\"\",\"back\\\\slash\",\"\"\n"
        );

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .double_quote(false)
            .escape(Some(b'\\'))
            .from_reader(buffer.as_slice());
        let record = reader.records().next().unwrap().unwrap();
        let decoded: Vec<&str> = record.iter().collect();
        assert_eq!(decoded, original);
    }
}
