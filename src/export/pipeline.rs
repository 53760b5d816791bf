// SPDX-License-Identifier: Apache-2.0

//! Table export and import
//!
//! Exports page through the builder's SELECT path and stream rows to a
//! writer. Imports parse JSON or CSV into records; CSV fields are coerced by
//! the live column types before they reach the validator.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tablegate_core::{AdminError, AdminResult, Record};
use tablegate_query::SelectQuery;
use tracing::{debug, info};

use crate::engine::records::RecordStore;
use crate::engine::schema::TableSchema;
use crate::engine::validator::TypeFamily;
use crate::export::types::{ExportFormat, ExportSummary};
use crate::export::writers::create_writer;

pub struct ExportPipeline {
    store: Arc<RecordStore>,
    batch_size: u64,
}

impl ExportPipeline {
    pub fn new(store: Arc<RecordStore>, batch_size: usize) -> Self {
        let batch_size = (batch_size as u64).clamp(1, store.max_page_size());
        Self { store, batch_size }
    }

    /// `query` with a stable order for paging: the primary key unless one is given.
    fn ordered(&self, query: &SelectQuery) -> AdminResult<SelectQuery> {
        let mut query = query.clone();
        if query.order_by.is_none() {
            let policy = self.store.whitelist().validate_table(&query.table)?;
            if policy.has_column(&policy.primary_key) {
                query.order_by = Some(Value::String(policy.primary_key.clone()));
            }
        }
        Ok(query)
    }

    async fn next_page(&self, query: &mut SelectQuery, offset: u64) -> AdminResult<Vec<Record>> {
        query.limit = Some(self.batch_size as i64);
        query.offset = Some(offset as i64);
        self.store.page(query).await
    }

    /// Every row matching `query`, in memory.
    pub async fn collect(&self, query: &SelectQuery) -> AdminResult<Vec<Record>> {
        let mut query = self.ordered(query)?;
        let mut rows = Vec::new();
        loop {
            let page = self.next_page(&mut query, rows.len() as u64).await?;
            let len = page.len() as u64;
            rows.extend(page);
            if len < self.batch_size {
                break;
            }
        }
        Ok(rows)
    }

    pub async fn export_to_file(
        &self,
        query: &SelectQuery,
        format: ExportFormat,
        path: &Path,
    ) -> AdminResult<ExportSummary> {
        let columns: Vec<String> = match &query.columns {
            Some(columns) => columns.clone(),
            None => self
                .store
                .whitelist()
                .validate_table(&query.table)?
                .columns
                .clone(),
        };

        let file = tokio::fs::File::create(path)
            .await
            .map_err(|e| AdminError::backup_failed(format!("cannot create export file: {}", e)))?;
        let mut writer = create_writer(format, file);
        writer.write_header(&columns).await.map_err(io_failure)?;

        let mut paged = self.ordered(query)?;
        let mut records = 0u64;
        loop {
            let page = self.next_page(&mut paged, records).await?;
            for row in &page {
                writer.write_row(&columns, row).await.map_err(io_failure)?;
            }
            records += page.len() as u64;
            debug!(table = %query.table, records, "export page written");
            if (page.len() as u64) < self.batch_size {
                break;
            }
        }
        writer.finish().await.map_err(io_failure)?;

        info!(table = %query.table, records, format = format.extension(), "export complete");
        Ok(ExportSummary {
            file: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            format,
            records,
            size: writer.bytes_written(),
        })
    }
}

fn io_failure(e: std::io::Error) -> AdminError {
    AdminError::backup_failed(format!("export write failed: {}", e))
}

/// Records from a JSON array of objects.
pub fn parse_json_rows(value: &Value) -> AdminResult<Vec<Record>> {
    let items = value
        .as_array()
        .ok_or_else(|| AdminError::validation("import data must be a JSON array of objects"))?;
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.as_object().cloned().ok_or_else(|| {
                AdminError::validation(format!("import entry {} is not an object", index))
            })
        })
        .collect()
}

/// Records from CSV text with a header row, coerced by column type.
pub fn parse_csv_rows(text: &str, schema: &TableSchema) -> AdminResult<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AdminError::validation(format!("invalid CSV header: {}", e)))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result
            .map_err(|e| AdminError::validation(format!("invalid CSV row {}: {}", index + 1, e)))?;
        let mut row = Map::with_capacity(headers.len());
        for (header, field) in headers.iter().zip(record.iter()) {
            let family = schema.column(header).map(TypeFamily::of);
            let value = coerce_field(field, family)
                .map_err(|message| AdminError::validation(format!("row {}, column '{}': {}", index + 1, header, message)))?;
            row.insert(header.clone(), value);
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Empty fields become null; others parse by type family.
fn coerce_field(field: &str, family: Option<TypeFamily>) -> Result<Value, String> {
    if field.is_empty() {
        return Ok(Value::Null);
    }
    match family {
        Some(TypeFamily::Integer) => field
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("'{}' is not an integer", field)),
        Some(TypeFamily::Numeric) => field
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("'{}' is not a number", field)),
        Some(TypeFamily::Boolean) => match field.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" => Ok(Value::Bool(true)),
            "false" | "f" | "0" | "no" => Ok(Value::Bool(false)),
            _ => Err(format!("'{}' is not a boolean", field)),
        },
        Some(TypeFamily::Json) | Some(TypeFamily::Array) => {
            serde_json::from_str(field).map_err(|_| format!("'{}' is not valid JSON", field))
        }
        _ => Ok(Value::String(field.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::schema::ColumnInfo;
    use serde_json::json;

    fn column(name: &str, data_type: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.into(),
            data_type: data_type.into(),
            udt_name: data_type.into(),
            nullable: true,
            max_length: None,
            default_value: None,
            is_primary_key: name == "id",
        }
    }

    fn books() -> TableSchema {
        TableSchema {
            table: "books".into(),
            columns: vec![
                column("id", "integer"),
                column("title", "text"),
                column("word_count", "integer"),
                column("published_at", "date"),
            ],
            primary_key: vec!["id".into()],
            foreign_keys: vec![],
            unique_constraints: vec![],
            row_count_estimate: None,
        }
    }

    #[test]
    fn csv_fields_are_coerced_by_column_type() {
        let text = "id,title,word_count,published_at\n1,\"Dune, Part One\",1200,\n";
        let rows = parse_csv_rows(text, &books()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(rows[0]["title"], json!("Dune, Part One"));
        assert_eq!(rows[0]["word_count"], json!(1200));
        assert_eq!(rows[0]["published_at"], Value::Null);
    }

    #[test]
    fn csv_type_errors_name_row_and_column() {
        let err = parse_csv_rows("id,word_count\n1,lots\n", &books()).unwrap_err();
        assert!(err.to_string().contains("word_count"));
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn json_import_requires_array_of_objects() {
        assert_eq!(parse_json_rows(&json!([{"title": "A"}])).unwrap().len(), 1);
        assert!(parse_json_rows(&json!({"title": "A"})).is_err());
        assert!(parse_json_rows(&json!([1])).is_err());
    }
}
