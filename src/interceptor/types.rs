// SPDX-License-Identifier: Apache-2.0

//! Audit Types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use tablegate_core::{Record, TablePolicy};

/// One audited operation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_hash: Option<String>,
}

impl AuditRecord {
    pub fn new(operation: impl Into<String>, success: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: operation.into(),
            table: None,
            record_id: None,
            user_id: None,
            changes: None,
            success,
            error_message: None,
            execution_time_ms: None,
            query_hash: None,
        }
    }

    /// Row for the audit table, restricted to the columns its policy lists.
    pub fn to_row(&self, policy: &TablePolicy) -> Record {
        let candidates = [
            ("timestamp", Some(json!(self.timestamp.to_rfc3339()))),
            ("operation", Some(json!(self.operation))),
            ("table_name", self.table.as_ref().map(|t| json!(t))),
            ("record_id", self.record_id.as_ref().map(|r| json!(r))),
            ("user_id", self.user_id.as_ref().map(|u| json!(u))),
            ("changes", self.changes.clone()),
            ("success", Some(json!(self.success))),
            ("error_message", self.error_message.as_ref().map(|e| json!(e))),
            (
                "execution_time_ms",
                self.execution_time_ms.map(|ms| json!(ms.round() as i64)),
            ),
            ("query_hash", self.query_hash.as_ref().map(|h| json!(h))),
        ];

        candidates
            .into_iter()
            .filter(|(column, _)| policy.has_column(column))
            .filter_map(|(column, value)| value.map(|v| (column.to_string(), v)))
            .collect()
    }
}

/// SHA-256 of statement text, hex encoded.
pub fn query_hash(statement: &str) -> String {
    hex::encode(Sha256::digest(statement.as_bytes()))
}

/// Filters shared by the audit read tools
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditFilters {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub table: Option<String>,
    pub operation: Option<String>,
    pub user_id: Option<String>,
    pub success: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AuditFilters {
    /// The filters as a WHERE object over the audit table's columns.
    pub fn to_where(&self) -> Value {
        let mut filter = Map::new();

        let mut range = Map::new();
        if let Some(start) = &self.start_date {
            range.insert("$gte".into(), json!(start));
        }
        if let Some(end) = &self.end_date {
            range.insert("$lte".into(), json!(end));
        }
        if !range.is_empty() {
            filter.insert("timestamp".into(), Value::Object(range));
        }
        if let Some(table) = &self.table {
            filter.insert("table_name".into(), json!(table));
        }
        if let Some(operation) = &self.operation {
            filter.insert("operation".into(), json!(operation));
        }
        if let Some(user) = &self.user_id {
            filter.insert("user_id".into(), json!(user));
        }
        if let Some(success) = self.success {
            filter.insert("success".into(), json!(success));
        }

        Value::Object(filter)
    }
}

/// Aggregates over the audit table
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub avg_execution_time_ms: Option<f64>,
    pub by_operation: BTreeMap<String, u64>,
    pub by_table: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablegate_core::whitelist::AUDIT_COLUMNS;

    #[test]
    fn hash_is_stable_hex_sha256() {
        let hash = query_hash("SELECT 1");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, query_hash("SELECT 1"));
        assert_ne!(hash, query_hash("SELECT 2"));
    }

    #[test]
    fn row_skips_absent_fields_and_unknown_columns() {
        let mut record = AuditRecord::new("insert_record", true);
        record.table = Some("books".into());
        record.execution_time_ms = Some(12.6);

        let policy = TablePolicy::new("audit_logs", &AUDIT_COLUMNS);
        let row = record.to_row(&policy);
        assert_eq!(row["table_name"], "books");
        assert_eq!(row["execution_time_ms"], 13);
        assert!(!row.contains_key("record_id"));

        let narrow = TablePolicy::new("audit_logs", &["id", "operation", "success"]);
        let row = record.to_row(&narrow);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn filters_become_where_object() {
        let filters = AuditFilters {
            start_date: Some("2024-01-01".into()),
            table: Some("books".into()),
            success: Some(false),
            ..Default::default()
        };
        let filter = filters.to_where();
        assert_eq!(filter["timestamp"]["$gte"], "2024-01-01");
        assert_eq!(filter["table_name"], "books");
        assert_eq!(filter["success"], false);
        assert!(filter.get("operation").is_none());
    }
}
