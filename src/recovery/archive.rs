use std::io::{Read, Seek, Write};

use ahash::AHashMap;
use tracing::{info, warn};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::table_csv::{LoadMode, load_table, write_table};
use super::{BackupReport, RestoreReport};
use crate::filter::Filter;
use crate::progress::GlobalStatus;
use crate::resolver::creation_order;
use crate::schema::{FieldId, Schema, TableId};
use crate::{DataAccessContext, DataAccessError};

fn zip_error(entry: &str, err: ZipError) -> DataAccessError {
    DataAccessError::archive(entry, err.to_string())
}

/// `<table>/<table><id>_<field>`
pub fn payload_entry_name(table: &str, id: i64, field: &str) -> String {
    format!("{table}/{table}{id}_{field}")
}

/// Splits a payload entry name inside the directory of `table`.
fn parse_payload_entry(
    schema: &Schema,
    table: TableId,
    entry: &str,
) -> Result<(i64, FieldId), DataAccessError> {
    let definition = schema.table(table);
    let malformed = |message: &str| DataAccessError::archive(entry, message);
    let file = entry
        .split_once('/')
        .map(|(_, file)| file)
        .ok_or_else(|| malformed("not inside a table directory"))?;
    let rest = file
        .strip_prefix(definition.name())
        .ok_or_else(|| malformed("entry does not start with its table name"))?;
    let digits = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits == 0 {
        return Err(malformed("missing row id"));
    }
    let id: i64 = rest[..digits]
        .parse()
        .map_err(|_| malformed("row id out of range"))?;
    let field = rest[digits..]
        .strip_prefix('_')
        .ok_or_else(|| malformed("missing '_' before the field name"))?;
    let field = definition
        .field_named(field)
        .filter(|f| f.is_oid())
        .ok_or_else(|| malformed("no payload field of that name"))?;
    Ok((id, field.id()))
}

/// Rows of `table` carrying a handle in `field`, by ascending id.
fn rows_with_payload(
    ctx: &DataAccessContext,
    table: TableId,
    field: FieldId,
) -> Result<Vec<i64>, DataAccessError> {
    let schema = ctx.schema();
    let id = schema.single_id(table)?;
    let mut filter = Filter::new(schema, table);
    filter.field_is_not_null(field)?.set_order(id, true)?;
    let payloads = ctx.payloads();
    let mut ids = Vec::new();
    for row in ctx.execute_integers(&filter, id)? {
        if payloads.has_payload(field, row)? {
            ids.push(row);
        }
    }
    Ok(ids)
}

pub fn save_to_archive<W: Write + Seek>(
    ctx: &DataAccessContext,
    writer: W,
    status: &mut GlobalStatus,
) -> Result<BackupReport, DataAccessError> {
    let schema = ctx.schema();
    let bulk = &ctx.config().bulk;
    let order = creation_order(schema)?;
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(writer);
    let mut report = BackupReport::default();

    status.set_total(order.len());
    for table in order {
        let name = schema.table(table).name();
        status.begin_relation(name);

        let entry = format!("{name}.csv");
        zip.start_file(entry.as_str(), options)
            .map_err(|e| zip_error(&entry, e))?;
        let rows = write_table(ctx, table, &mut zip, bulk)?;
        report.tables.push((name.to_string(), rows));

        let payload_fields = ctx.payloads().payload_fields(table);
        if payload_fields.is_empty() {
            continue;
        }
        let directory = format!("{name}/");
        zip.add_directory(directory.as_str(), options)
            .map_err(|e| zip_error(&directory, e))?;
        for field in payload_fields {
            let field_name = schema.field(field).name();
            for id in rows_with_payload(ctx, table, field)? {
                let entry = payload_entry_name(name, id, field_name);
                zip.start_file(entry.as_str(), options)
                    .map_err(|e| zip_error(&entry, e))?;
                report.payload_bytes += ctx.payloads().read(field, id, &mut zip)?;
                report.payloads += 1;
            }
        }
    }
    zip.finish().map_err(|e| zip_error("<central directory>", e))?;
    info!(
        tables = report.tables.len(),
        payloads = report.payloads,
        "backup written"
    );
    Ok(report)
}

#[derive(Default)]
struct ArchiveIndex {
    tables: AHashMap<TableId, String>,
    payloads: AHashMap<TableId, Vec<String>>,
    skipped: Vec<String>,
}

fn index_entries<R: Read + Seek>(
    schema: &Schema,
    archive: &mut ZipArchive<R>,
) -> Result<ArchiveIndex, DataAccessError> {
    let mut index = ArchiveIndex::default();
    for position in 0..archive.len() {
        let name = archive
            .by_index(position)
            .map_err(|e| zip_error(&format!("#{position}"), e))?
            .name()
            .to_string();
        if name.ends_with('/') {
            continue;
        }
        let table = match name.split_once('/') {
            Some((directory, _)) => schema.table_named(directory),
            None => name.strip_suffix(".csv").and_then(|t| schema.table_named(t)),
        };
        match (table, name.contains('/')) {
            (Some(table), true) => index.payloads.entry(table.id()).or_default().push(name),
            (Some(table), false) => {
                index.tables.insert(table.id(), name);
            }
            (None, _) => {
                warn!(entry = %name, "skipping archive entry without a matching table");
                index.skipped.push(name);
            }
        }
    }
    Ok(index)
}

fn restore_table<R: Read + Seek>(
    ctx: &DataAccessContext,
    archive: &mut ZipArchive<R>,
    table: TableId,
    csv_entry: &str,
    payload_entries: &[String],
) -> Result<(usize, usize), DataAccessError> {
    let schema = ctx.schema();
    let bulk = &ctx.config().bulk;
    let rows = {
        let entry = archive
            .by_name(csv_entry)
            .map_err(|e| zip_error(csv_entry, e))?;
        load_table(ctx, table, entry, bulk, LoadMode::Overwrite)?
    };

    let mut payloads = 0;
    for name in payload_entries {
        let (id, field) = parse_payload_entry(schema, table, name)?;
        let entry = archive.by_name(name).map_err(|e| zip_error(name, e))?;
        ctx.payloads().write(field, id, entry)?;
        payloads += 1;
    }
    Ok((rows, payloads))
}

/// Loads every table found in the archive, in creation order. A table that
/// fails is reported and skipped; the others are still loaded.
pub fn load_from_archive<R: Read + Seek>(
    ctx: &DataAccessContext,
    reader: R,
    status: &mut GlobalStatus,
) -> Result<RestoreReport, DataAccessError> {
    let schema = ctx.schema();
    let mut archive = ZipArchive::new(reader).map_err(|e| zip_error("<archive>", e))?;
    let index = index_entries(schema, &mut archive)?;
    let mut report = RestoreReport {
        skipped_entries: index.skipped.clone(),
        ..RestoreReport::default()
    };

    for (table, entries) in &index.payloads {
        if !index.tables.contains_key(table) {
            let name = schema.table(*table).name();
            warn!(table = name, entries = entries.len(), "payloads without table data");
            report.skipped_entries.extend(entries.iter().cloned());
        }
    }

    let order: Vec<TableId> = creation_order(schema)?
        .into_iter()
        .filter(|t| index.tables.contains_key(t))
        .collect();
    status.set_total(order.len());
    for table in order {
        let name = schema.table(table).name();
        status.begin_relation(name);
        let payload_entries = index.payloads.get(&table).map(Vec::as_slice).unwrap_or(&[]);
        let csv_entry = index.tables.get(&table).map(String::as_str).unwrap_or_default();
        match restore_table(ctx, &mut archive, table, csv_entry, payload_entries) {
            Ok((rows, payloads)) => {
                report.tables_loaded.push((name.to_string(), rows));
                report.payloads_loaded += payloads;
            }
            Err(err) => {
                warn!(table = name, error = %err, "skipping table");
                report.failures.push((name.to_string(), err.to_string()));
            }
        }
    }
    info!(
        tables = report.tables_loaded.len(),
        failures = report.failures.len(),
        payloads = report.payloads_loaded,
        "restore finished"
    );
    Ok(report)
}
