// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::records::ImportOutcome;
use crate::export::ConflictPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    Full,
    Table,
    Incremental,
}

impl BackupKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            BackupKind::Full => "full",
            BackupKind::Table => "table",
            BackupKind::Incremental => "incremental",
        }
    }
}

/// Sidecar written next to every backup file. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    pub backup_id: String,
    #[serde(rename = "type")]
    pub kind: BackupKind,
    pub timestamp: DateTime<Utc>,
    pub file: String,
    pub tables: Vec<String>,
    pub record_count: u64,
    pub size: u64,
    pub compressed: bool,
    pub checksum: String,
    /// Backup files this one needs restored first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub data_only: bool,
    #[serde(default)]
    pub schema_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BackupManifest {
    /// Whether the dump recreates tables, so dropping them first is safe.
    pub fn carries_schema(&self) -> bool {
        self.kind != BackupKind::Incremental && !self.data_only
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullBackupOptions {
    #[serde(default = "default_true")]
    pub compress: bool,
    /// False dumps rows only.
    #[serde(default = "default_true")]
    pub include_schema: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl Default for FullBackupOptions {
    fn default() -> Self {
        Self {
            compress: true,
            include_schema: true,
            description: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableBackupOptions {
    pub table: String,
    #[serde(default)]
    pub data_only: bool,
    #[serde(default)]
    pub schema_only: bool,
    #[serde(default = "default_true")]
    pub compress: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementalBackupOptions {
    /// Defaults to the base backup's timestamp.
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tables: Option<Vec<String>>,
    #[serde(default)]
    pub compress: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOptions {
    pub backup_file: String,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub drop_existing: bool,
    /// Keep going past failing statements instead of aborting the restore.
    #[serde(default)]
    pub skip_errors: bool,
    #[serde(default)]
    pub on_conflict: ConflictPolicy,
}

impl RestoreOptions {
    pub fn continues_on_error(&self) -> bool {
        self.skip_errors || self.on_conflict == ConflictPolicy::Skip
    }

    pub fn drops_first(&self) -> bool {
        self.drop_existing || self.on_conflict == ConflictPolicy::Upsert
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    pub table: String,
    #[serde(default, rename = "where")]
    pub filter: Option<Value>,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub include_deleted: bool,
}

/// `data` is a JSON array of objects, or CSV text with a header row.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    pub table: String,
    pub data: Value,
    #[serde(default, alias = "onConflict")]
    pub mode: ConflictPolicy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupValidation {
    pub backup_file: String,
    pub valid: bool,
    pub checksum: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: BackupKind,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedBackup {
    pub backup_file: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSummary {
    pub backup_file: String,
    #[serde(rename = "type")]
    pub kind: BackupKind,
    pub tables: Vec<String>,
    pub dropped_existing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<ImportOutcome>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupListing {
    #[serde(flatten)]
    pub manifest: BackupManifest,
    /// False when the sidecar survives but the backup file is gone.
    pub file_present: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_backup_flags_default_independently() {
        let options: FullBackupOptions = serde_json::from_value(json!({ "compress": false })).unwrap();
        assert!(!options.compress);
        assert!(options.include_schema);

        let options: FullBackupOptions = serde_json::from_value(json!({ "includeSchema": false })).unwrap();
        assert!(options.compress);
        assert!(!options.include_schema);
    }

    #[test]
    fn overwrite_clears_before_loading() {
        let options: RestoreOptions =
            serde_json::from_value(json!({ "backupFile": "x.sql", "onConflict": "overwrite" })).unwrap();
        assert!(options.drops_first());
        assert!(!options.continues_on_error());
    }
}
