// SPDX-License-Identifier: Apache-2.0

//! Tool catalog returned by `list_tools`
//!
//! One entry per [`Operation`], each with a JSON Schema for its arguments.

use serde::Serialize;
use serde_json::{json, Value};
use tablegate_core::Operation;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

pub fn catalog() -> Vec<ToolDefinition> {
    Operation::ALL.iter().map(|op| definition(*op)).collect()
}

fn object(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn table_prop() -> Value {
    json!({ "type": "string", "description": "Whitelisted table name." })
}

fn where_prop() -> Value {
    json!({
        "type": "object",
        "description": "Column conditions joined with AND. A scalar means equality, null means IS NULL, \
                        an array means IN, an object uses $eq $ne $gt $gte $lt $lte $in $like $ilike $null.",
    })
}

fn backup_file_prop() -> Value {
    json!({ "type": "string", "description": "Backup file name inside the backup directory." })
}

fn audit_filters() -> Value {
    object(
        json!({
            "filters": {
                "type": "object",
                "properties": {
                    "startDate": { "type": "string", "format": "date-time" },
                    "endDate": { "type": "string", "format": "date-time" },
                    "table": { "type": "string" },
                    "operation": { "type": "string" },
                    "userId": { "type": "string" },
                    "success": { "type": "boolean" },
                    "limit": { "type": "integer", "minimum": 1 },
                    "offset": { "type": "integer", "minimum": 0 }
                }
            }
        }),
        &[],
    )
}

fn restore_schema() -> Value {
    object(
        json!({
            "backupFile": backup_file_prop(),
            "table": table_prop(),
            "dropExisting": { "type": "boolean", "default": false },
            "skipErrors": { "type": "boolean", "default": false },
            "onConflict": { "type": "string", "enum": ["error", "skip", "overwrite"], "default": "error" }
        }),
        &["backupFile"],
    )
}

fn definition(op: Operation) -> ToolDefinition {
    let (description, input_schema) = match op {
        Operation::QueryRecords => (
            "Read rows from a whitelisted table with filters, ordering and pagination.",
            object(
                json!({
                    "table": table_prop(),
                    "columns": { "type": "array", "items": { "type": "string" } },
                    "where": where_prop(),
                    "orderBy": {
                        "description": "\"col\", \"col DESC\", {column, direction} or an array of those."
                    },
                    "limit": { "type": "integer", "minimum": 1 },
                    "offset": { "type": "integer", "minimum": 0 },
                    "includeDeleted": { "type": "boolean", "default": false }
                }),
                &["table"],
            ),
        ),
        Operation::InsertRecord => (
            "Insert one row after schema, foreign key and uniqueness validation.",
            object(
                json!({ "table": table_prop(), "data": { "type": "object" } }),
                &["table", "data"],
            ),
        ),
        Operation::UpdateRecords => (
            "Update rows matching a non-empty WHERE.",
            object(
                json!({ "table": table_prop(), "data": { "type": "object" }, "where": where_prop() }),
                &["table", "data", "where"],
            ),
        ),
        Operation::DeleteRecords => (
            "Delete rows matching a non-empty WHERE. Soft-deletes when the table supports it unless hard is true.",
            object(
                json!({ "table": table_prop(), "where": where_prop(), "hard": { "type": "boolean" } }),
                &["table", "where"],
            ),
        ),
        Operation::BatchInsert => (
            "Insert many rows in one transaction; any failure rolls back all of them.",
            object(
                json!({
                    "table": table_prop(),
                    "records": { "type": "array", "items": { "type": "object" }, "minItems": 1 },
                    "returnRecords": { "type": "boolean", "default": true }
                }),
                &["table", "records"],
            ),
        ),
        Operation::BatchUpdate => (
            "Apply several updates in one transaction.",
            object(
                json!({
                    "table": table_prop(),
                    "updates": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": { "where": where_prop(), "data": { "type": "object" } },
                            "required": ["where", "data"]
                        }
                    }
                }),
                &["table", "updates"],
            ),
        ),
        Operation::BatchDelete => (
            "Apply several deletes in one transaction.",
            object(
                json!({
                    "table": table_prop(),
                    "deletes": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": { "where": where_prop() },
                            "required": ["where"]
                        }
                    },
                    "hard": { "type": "boolean" }
                }),
                &["table", "deletes"],
            ),
        ),
        Operation::GetSchema => (
            "Describe a whitelisted table: columns, keys, constraints and access policy.",
            object(json!({ "table": table_prop() }), &["table"]),
        ),
        Operation::ListTables => (
            "List whitelisted tables present in the database.",
            object(json!({}), &[]),
        ),
        Operation::GetRelationships => (
            "Walk foreign keys to and from a table.",
            object(
                json!({
                    "table": table_prop(),
                    "depth": { "type": "integer", "minimum": 1, "maximum": 5, "default": 1 }
                }),
                &["table"],
            ),
        ),
        Operation::ListTableColumns => (
            "List the whitelisted columns of a table with their types.",
            object(json!({ "table": table_prop() }), &["table"]),
        ),
        Operation::QueryAuditLogs => ("Search the audit log, newest first.", audit_filters()),
        Operation::GetAuditSummary => (
            "Aggregate audit statistics by operation and table.",
            audit_filters(),
        ),
        Operation::BackupFull => (
            "Dump every whitelisted table with pg_dump and record a manifest.",
            object(
                json!({
                    "compress": { "type": "boolean", "default": true },
                    "includeSchema": { "type": "boolean", "default": true },
                    "description": { "type": "string" }
                }),
                &[],
            ),
        ),
        Operation::BackupTable => (
            "Dump one table with pg_dump.",
            object(
                json!({
                    "table": table_prop(),
                    "dataOnly": { "type": "boolean", "default": false },
                    "schemaOnly": { "type": "boolean", "default": false },
                    "compress": { "type": "boolean", "default": true }
                }),
                &["table"],
            ),
        ),
        Operation::BackupIncremental => (
            "Save rows changed since a point in time, on top of the newest full backup.",
            object(
                json!({
                    "since": { "type": "string", "format": "date-time" },
                    "tables": { "type": "array", "items": { "type": "string" } },
                    "compress": { "type": "boolean", "default": false }
                }),
                &[],
            ),
        ),
        Operation::ExportJson | Operation::ExportCsv => (
            if op == Operation::ExportJson {
                "Export matching rows to a JSON file in the backup directory."
            } else {
                "Export matching rows to a CSV file in the backup directory."
            },
            object(
                json!({
                    "table": table_prop(),
                    "where": where_prop(),
                    "columns": { "type": "array", "items": { "type": "string" } },
                    "includeDeleted": { "type": "boolean", "default": false }
                }),
                &["table"],
            ),
        ),
        Operation::ImportJson | Operation::ImportCsv => (
            if op == Operation::ImportJson {
                "Import a JSON array of objects in one transaction."
            } else {
                "Import CSV text with a header row in one transaction."
            },
            object(
                json!({
                    "table": table_prop(),
                    "data": if op == Operation::ImportJson {
                        json!({ "type": "array", "items": { "type": "object" } })
                    } else {
                        json!({ "type": "string" })
                    },
                    "mode": { "type": "string", "enum": ["error", "skip", "upsert"], "default": "error" }
                }),
                &["table", "data"],
            ),
        ),
        Operation::RestoreFull => (
            "Restore a verified backup with psql, or replay an incremental backup.",
            restore_schema(),
        ),
        Operation::RestoreTable => (
            "Restore one table from a verified table or incremental backup.",
            restore_schema(),
        ),
        Operation::ListBackups => (
            "List backup manifests, newest first.",
            object(
                json!({ "type": { "type": "string", "enum": ["full", "table", "incremental"] } }),
                &[],
            ),
        ),
        Operation::ValidateBackup => (
            "Recompute a backup's checksum and check it against its manifest.",
            object(json!({ "backupFile": backup_file_prop() }), &["backupFile"]),
        ),
        Operation::DeleteBackup => (
            "Delete a backup and its manifest unless another backup depends on it.",
            object(json!({ "backupFile": backup_file_prop() }), &["backupFile"]),
        ),
        Operation::ListTools => ("List available tools.", object(json!({}), &[])),
        Operation::GetMetrics => ("Tool call counters since start.", object(json!({}), &[])),
    };

    ToolDefinition {
        name: op.as_str(),
        description,
        input_schema,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_operation_has_an_object_schema() {
        let tools = catalog();
        assert_eq!(tools.len(), Operation::ALL.len());
        for tool in &tools {
            assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
            assert!(!tool.description.is_empty());
        }
    }

    #[test]
    fn table_tools_require_table() {
        let tools = catalog();
        let insert = tools.iter().find(|t| t.name == "insert_record").unwrap();
        let required = insert.input_schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("table")));
        assert!(required.contains(&json!("data")));
    }
}
