// SPDX-License-Identifier: Apache-2.0

//! Tool Commands
//!
//! [`dispatch`] is the single entry point for a tool call: it resolves the
//! operation, enforces table access, routes to the handler, then records
//! metrics and an audit entry for whatever passed access control.

pub mod audit;
pub mod backup;
pub mod batch;
pub mod metrics;
pub mod mutation;
pub mod query;
pub mod schema;

use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tablegate_core::{validate_table_access, AdminError, AdminResult, ErrorPayload, Operation};
use tracing::{debug, instrument, warn};

use crate::interceptor::types::{query_hash, AuditRecord};
use crate::metrics::{record_call, CallOutcome};
use crate::AppState;

/// Caller identity attached to a request, recorded in the audit log.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallContext {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Response wrapper for every tool call
#[derive(Debug, Serialize)]
pub struct ToolResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl ToolResponse {
    pub fn ok(result: Value) -> Self {
        Self {
            id: None,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(error: &AdminError) -> Self {
        Self {
            id: None,
            success: false,
            result: None,
            error: Some(error.to_payload()),
        }
    }

    pub fn with_id(mut self, id: Option<Value>) -> Self {
        self.id = id;
        self
    }
}

/// Handler result plus what the audit entry needs to know about it.
#[derive(Debug, Default)]
pub struct ToolOutput {
    pub result: Value,
    pub record_id: Option<String>,
    pub changes: Option<Value>,
    pub statement: Option<String>,
}

impl ToolOutput {
    pub fn new<T: Serialize>(value: &T) -> AdminResult<Self> {
        let result = serde_json::to_value(value)
            .map_err(|e| AdminError::internal(format!("cannot encode result: {}", e)))?;
        Ok(Self {
            result,
            ..Default::default()
        })
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        let statement = statement.into();
        if !statement.is_empty() {
            self.statement = Some(statement);
        }
        self
    }

    pub fn with_changes(mut self, changes: Value) -> Self {
        self.changes = Some(changes);
        self
    }

    pub fn with_record_id(mut self, record_id: Option<String>) -> Self {
        self.record_id = record_id;
        self
    }
}

/// Deserializes tool arguments; a missing argument object reads as `{}`.
pub(crate) fn parse_args<T: DeserializeOwned>(arguments: Value) -> AdminResult<T> {
    let arguments = match arguments {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    Ok(serde_json::from_value(arguments)?)
}

/// The `id` of a row as a string, for the audit log.
pub(crate) fn record_id_of(row: &serde_json::Map<String, Value>, primary_key: &str) -> Option<String> {
    match row.get(primary_key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Tables named by the arguments that access control must clear.
fn target_tables(operation: Operation, arguments: &Value) -> AdminResult<Vec<String>> {
    let table = arguments.get("table").and_then(Value::as_str);
    match operation {
        Operation::ListTables
        | Operation::ListTools
        | Operation::GetMetrics
        | Operation::QueryAuditLogs
        | Operation::GetAuditSummary
        | Operation::BackupFull
        | Operation::RestoreFull
        | Operation::ListBackups
        | Operation::ValidateBackup
        | Operation::DeleteBackup => Ok(Vec::new()),
        Operation::BackupIncremental => Ok(arguments
            .get("tables")
            .and_then(Value::as_array)
            .map(|tables| {
                tables
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()),
        _ => table
            .map(|t| vec![t.to_string()])
            .ok_or_else(|| AdminError::validation(format!("{} requires 'table'", operation))),
    }
}

/// Runs one tool call and never fails: errors become error responses.
#[instrument(skip(state, arguments, context))]
pub async fn dispatch(state: &AppState, tool: &str, arguments: Value, context: &CallContext) -> ToolResponse {
    let started = Instant::now();

    let operation = match tool.parse::<Operation>() {
        Ok(op) => op,
        Err(e) => {
            record_call(elapsed_ms(started), CallOutcome::Failed);
            return ToolResponse::err(&e);
        }
    };

    let tables = match target_tables(operation, &arguments).and_then(|tables| {
        for table in &tables {
            if state.audit.is_audit_table(table) && !operation.is_introspection() {
                return Err(AdminError::access_denied(
                    table.as_str(),
                    operation.as_str(),
                    "the audit table is only reachable through the audit tools",
                ));
            }
            validate_table_access(&state.whitelist, table, operation)?;
        }
        Ok(tables)
    }) {
        Ok(tables) => tables,
        Err(e) => {
            debug!(error = %e, "access check failed");
            record_call(elapsed_ms(started), CallOutcome::Failed);
            return ToolResponse::err(&e);
        }
    };

    let result = route(state, operation, arguments).await;
    let duration = elapsed_ms(started);

    let outcome = match &result {
        Ok(_) => CallOutcome::Success,
        Err(AdminError::TransactionTimeout { .. }) => CallOutcome::TimedOut,
        Err(e) if e.is_retryable() => CallOutcome::Retryable,
        Err(_) => CallOutcome::Failed,
    };
    record_call(duration, outcome);

    if audited(operation) {
        let mut record = AuditRecord::new(operation.as_str(), result.is_ok());
        record.table = tables.first().cloned();
        record.user_id = context.user_id.clone();
        record.execution_time_ms = Some(duration);
        match &result {
            Ok(output) => {
                record.record_id = output.record_id.clone();
                record.changes = output.changes.clone();
                record.query_hash = output.statement.as_deref().map(query_hash);
            }
            Err(e) => record.error_message = Some(e.to_string()),
        }
        state.audit.log(record);
    }

    match result {
        Ok(output) => ToolResponse::ok(output.result),
        Err(e) => {
            warn!(code = e.code().as_str(), error = %e, "tool call failed");
            ToolResponse::err(&e)
        }
    }
}

/// Audit reads and catalog lookups are not themselves audited.
fn audited(operation: Operation) -> bool {
    !matches!(
        operation,
        Operation::QueryAuditLogs
            | Operation::GetAuditSummary
            | Operation::ListTools
            | Operation::GetMetrics
    )
}

async fn route(state: &AppState, operation: Operation, arguments: Value) -> AdminResult<ToolOutput> {
    match operation {
        Operation::QueryRecords => query::query_records(state, arguments).await,
        Operation::InsertRecord => mutation::insert_record(state, arguments).await,
        Operation::UpdateRecords => mutation::update_records(state, arguments).await,
        Operation::DeleteRecords => mutation::delete_records(state, arguments).await,
        Operation::BatchInsert => batch::batch_insert(state, arguments).await,
        Operation::BatchUpdate => batch::batch_update(state, arguments).await,
        Operation::BatchDelete => batch::batch_delete(state, arguments).await,
        Operation::GetSchema => schema::get_schema(state, arguments).await,
        Operation::ListTables => schema::list_tables(state).await,
        Operation::GetRelationships => schema::get_relationships(state, arguments).await,
        Operation::ListTableColumns => schema::list_table_columns(state, arguments).await,
        Operation::QueryAuditLogs => audit::query_audit_logs(state, arguments).await,
        Operation::GetAuditSummary => audit::get_audit_summary(state, arguments).await,
        Operation::BackupFull => backup::backup_full(state, arguments).await,
        Operation::BackupTable => backup::backup_table(state, arguments).await,
        Operation::BackupIncremental => backup::backup_incremental(state, arguments).await,
        Operation::ExportJson => backup::export(state, arguments, crate::export::ExportFormat::Json).await,
        Operation::ExportCsv => backup::export(state, arguments, crate::export::ExportFormat::Csv).await,
        Operation::ImportJson => backup::import(state, arguments, crate::export::ExportFormat::Json).await,
        Operation::ImportCsv => backup::import(state, arguments, crate::export::ExportFormat::Csv).await,
        Operation::RestoreFull => backup::restore_full(state, arguments).await,
        Operation::RestoreTable => backup::restore_table(state, arguments).await,
        Operation::ListBackups => backup::list_backups(state, arguments).await,
        Operation::ValidateBackup => backup::validate_backup(state, arguments).await,
        Operation::DeleteBackup => backup::delete_backup(state, arguments).await,
        Operation::ListTools => ToolOutput::new(&crate::tools::catalog()),
        Operation::GetMetrics => metrics::get_metrics(),
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
