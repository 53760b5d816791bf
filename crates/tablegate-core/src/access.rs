// SPDX-License-Identifier: Apache-2.0

//! Operation catalog and table access control

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AdminError, AdminResult};
use crate::whitelist::{Permission, TableCategory, TablePolicy, Whitelist};

/// Every operation exposed through the tool catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    QueryRecords,
    InsertRecord,
    UpdateRecords,
    DeleteRecords,
    BatchInsert,
    BatchUpdate,
    BatchDelete,
    GetSchema,
    ListTables,
    GetRelationships,
    ListTableColumns,
    QueryAuditLogs,
    GetAuditSummary,
    BackupFull,
    BackupTable,
    BackupIncremental,
    ExportJson,
    ExportCsv,
    ImportJson,
    ImportCsv,
    RestoreFull,
    RestoreTable,
    ListBackups,
    ValidateBackup,
    DeleteBackup,
    ListTools,
    GetMetrics,
}

impl Operation {
    pub const ALL: [Operation; 27] = [
        Operation::QueryRecords,
        Operation::InsertRecord,
        Operation::UpdateRecords,
        Operation::DeleteRecords,
        Operation::BatchInsert,
        Operation::BatchUpdate,
        Operation::BatchDelete,
        Operation::GetSchema,
        Operation::ListTables,
        Operation::GetRelationships,
        Operation::ListTableColumns,
        Operation::QueryAuditLogs,
        Operation::GetAuditSummary,
        Operation::BackupFull,
        Operation::BackupTable,
        Operation::BackupIncremental,
        Operation::ExportJson,
        Operation::ExportCsv,
        Operation::ImportJson,
        Operation::ImportCsv,
        Operation::RestoreFull,
        Operation::RestoreTable,
        Operation::ListBackups,
        Operation::ValidateBackup,
        Operation::DeleteBackup,
        Operation::ListTools,
        Operation::GetMetrics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::QueryRecords => "query_records",
            Operation::InsertRecord => "insert_record",
            Operation::UpdateRecords => "update_records",
            Operation::DeleteRecords => "delete_records",
            Operation::BatchInsert => "batch_insert",
            Operation::BatchUpdate => "batch_update",
            Operation::BatchDelete => "batch_delete",
            Operation::GetSchema => "get_schema",
            Operation::ListTables => "list_tables",
            Operation::GetRelationships => "get_relationships",
            Operation::ListTableColumns => "list_table_columns",
            Operation::QueryAuditLogs => "query_audit_logs",
            Operation::GetAuditSummary => "get_audit_summary",
            Operation::BackupFull => "backup_full",
            Operation::BackupTable => "backup_table",
            Operation::BackupIncremental => "backup_incremental",
            Operation::ExportJson => "export_json",
            Operation::ExportCsv => "export_csv",
            Operation::ImportJson => "import_json",
            Operation::ImportCsv => "import_csv",
            Operation::RestoreFull => "restore_full",
            Operation::RestoreTable => "restore_table",
            Operation::ListBackups => "list_backups",
            Operation::ValidateBackup => "validate_backup",
            Operation::DeleteBackup => "delete_backup",
            Operation::ListTools => "list_tools",
            Operation::GetMetrics => "get_metrics",
        }
    }

    /// Permission a table must grant for this operation.
    pub fn permission(&self) -> Permission {
        match self {
            Operation::InsertRecord
            | Operation::UpdateRecords
            | Operation::BatchInsert
            | Operation::BatchUpdate
            | Operation::ImportJson
            | Operation::ImportCsv
            | Operation::RestoreFull
            | Operation::RestoreTable => Permission::Write,
            Operation::DeleteRecords | Operation::BatchDelete | Operation::DeleteBackup => {
                Permission::Delete
            }
            _ => Permission::Read,
        }
    }

    /// Schema introspection only needs the table to be whitelisted.
    pub fn is_introspection(&self) -> bool {
        matches!(
            self,
            Operation::GetSchema | Operation::GetRelationships | Operation::ListTableColumns
        )
    }

    /// Operations that mutate data and are therefore worth auditing on failure too.
    pub fn is_mutation(&self) -> bool {
        matches!(self.permission(), Permission::Write | Permission::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| AdminError::unknown_operation(s))
    }
}

/// Checks that `operation` may touch `table`, returning its policy.
pub fn validate_table_access<'w>(
    whitelist: &'w Whitelist,
    table: &str,
    operation: Operation,
) -> AdminResult<&'w TablePolicy> {
    let policy = whitelist.validate_table(table)?;

    if operation.is_introspection() {
        return Ok(policy);
    }

    match policy.category {
        TableCategory::Restricted => {
            return Err(AdminError::access_denied(
                table,
                operation.as_str(),
                "table is restricted",
            ))
        }
        TableCategory::AdminOnly => {
            return Err(AdminError::access_denied(
                table,
                operation.as_str(),
                "table is admin-only",
            ))
        }
        TableCategory::ReadOnly if operation.permission() != Permission::Read => {
            return Err(AdminError::access_denied(
                table,
                operation.as_str(),
                "table is read-only",
            ))
        }
        _ => {}
    }

    let required = operation.permission();
    if !policy.allows(required) {
        return Err(AdminError::access_denied(
            table,
            operation.as_str(),
            format!("{} permission not granted", required.as_str()),
        ));
    }

    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn registry() -> Whitelist {
        let mut whitelist = Whitelist::builtin();
        whitelist
            .insert(
                TablePolicy::new("genres", &["id", "name"]).with_category(TableCategory::ReadOnly),
            )
            .unwrap();
        whitelist
            .insert(
                TablePolicy::new("secrets", &["id", "value"])
                    .with_category(TableCategory::Restricted),
            )
            .unwrap();
        whitelist
    }

    #[test]
    fn operation_names_round_trip_through_from_str() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        let err = "drop_database".parse::<Operation>().unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownOperation);
    }

    #[test]
    fn standard_table_allows_everything() {
        let whitelist = registry();
        for op in [
            Operation::QueryRecords,
            Operation::InsertRecord,
            Operation::BatchDelete,
        ] {
            assert!(validate_table_access(&whitelist, "books", op).is_ok());
        }
    }

    #[test]
    fn read_only_table_refuses_writes_and_deletes() {
        let whitelist = registry();
        assert!(validate_table_access(&whitelist, "genres", Operation::QueryRecords).is_ok());
        for op in [Operation::InsertRecord, Operation::DeleteRecords, Operation::ImportCsv] {
            let err = validate_table_access(&whitelist, "genres", op).unwrap_err();
            assert_eq!(err.code(), ErrorCode::AccessDenied);
        }
    }

    #[test]
    fn restricted_and_admin_tables_refuse_data_access() {
        let whitelist = registry();
        let err = validate_table_access(&whitelist, "secrets", Operation::QueryRecords).unwrap_err();
        assert_eq!(err.code(), ErrorCode::AccessDenied);
        let err =
            validate_table_access(&whitelist, "audit_logs", Operation::DeleteRecords).unwrap_err();
        assert_eq!(err.code(), ErrorCode::AccessDenied);
    }

    #[test]
    fn introspection_only_needs_whitelisting() {
        let whitelist = registry();
        assert!(validate_table_access(&whitelist, "secrets", Operation::GetSchema).is_ok());
        let err =
            validate_table_access(&whitelist, "pg_class", Operation::GetSchema).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotWhitelisted);
    }

    #[test]
    fn missing_permission_is_denied() {
        let mut whitelist = Whitelist::new();
        let mut policy = TablePolicy::new("notes", &["id", "body"]);
        policy.permissions.remove(&Permission::Delete);
        whitelist.insert(policy).unwrap();

        let err = validate_table_access(&whitelist, "notes", Operation::DeleteRecords).unwrap_err();
        assert_eq!(err.code(), ErrorCode::AccessDenied);
        assert!(validate_table_access(&whitelist, "notes", Operation::UpdateRecords).is_ok());
    }
}
