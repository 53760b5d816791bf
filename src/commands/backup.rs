// SPDX-License-Identifier: Apache-2.0

//! Backup, restore, export and import tools

use serde::Deserialize;
use serde_json::{json, Value};
use tablegate_core::AdminResult;
use tracing::instrument;

use super::{parse_args, ToolOutput};
use crate::backup::{
    BackupKind, ExportOptions, FullBackupOptions, ImportOptions, IncrementalBackupOptions,
    RestoreOptions, TableBackupOptions,
};
use crate::export::ExportFormat;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackupFileArgs {
    backup_file: String,
}

#[derive(Debug, Default, Deserialize)]
struct ListArgs {
    #[serde(default, rename = "type")]
    kind: Option<BackupKind>,
}

#[instrument(skip(state, arguments))]
pub async fn backup_full(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let options: FullBackupOptions = parse_args(arguments)?;
    let manifest = state.backups.backup_full(&options).await?;
    Ok(ToolOutput::new(&manifest)?.with_record_id(Some(manifest.file.clone())))
}

#[instrument(skip(state, arguments))]
pub async fn backup_table(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let options: TableBackupOptions = parse_args(arguments)?;
    let manifest = state.backups.backup_table(&options).await?;
    Ok(ToolOutput::new(&manifest)?.with_record_id(Some(manifest.file.clone())))
}

#[instrument(skip(state, arguments))]
pub async fn backup_incremental(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let options: IncrementalBackupOptions = parse_args(arguments)?;
    let manifest = state.backups.backup_incremental(&options).await?;
    Ok(ToolOutput::new(&manifest)?
        .with_record_id(Some(manifest.file.clone()))
        .with_changes(json!({ "dependencies": manifest.dependencies, "skipped": manifest.skipped })))
}

#[instrument(skip(state, arguments))]
pub async fn export(state: &AppState, arguments: Value, format: ExportFormat) -> AdminResult<ToolOutput> {
    let options: ExportOptions = parse_args(arguments)?;
    let summary = state.backups.export(&options, format).await?;
    Ok(ToolOutput::new(&summary)?.with_record_id(Some(summary.file.clone())))
}

#[instrument(skip(state, arguments))]
pub async fn import(state: &AppState, arguments: Value, format: ExportFormat) -> AdminResult<ToolOutput> {
    let options: ImportOptions = parse_args(arguments)?;
    let outcome = state.backups.import(&options, format).await?;
    Ok(ToolOutput::new(&outcome)?.with_changes(json!({ "mode": options.mode, "format": format })))
}

#[instrument(skip(state, arguments))]
pub async fn restore_full(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let options: RestoreOptions = parse_args(arguments)?;
    let summary = state.backups.restore_full(&options).await;
    state.introspection.invalidate_all();
    let summary = summary?;
    Ok(ToolOutput::new(&summary)?.with_record_id(Some(summary.backup_file.clone())))
}

#[instrument(skip(state, arguments))]
pub async fn restore_table(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let options: RestoreOptions = parse_args(arguments)?;
    let summary = state.backups.restore_table(&options).await;
    state.introspection.invalidate_all();
    let summary = summary?;
    Ok(ToolOutput::new(&summary)?.with_record_id(Some(summary.backup_file.clone())))
}

#[instrument(skip(state, arguments))]
pub async fn list_backups(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let args: ListArgs = parse_args(arguments)?;
    let backups = state.backups.list_backups(args.kind).await?;
    ToolOutput::new(&backups)
}

#[instrument(skip(state, arguments))]
pub async fn validate_backup(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let args: BackupFileArgs = parse_args(arguments)?;
    let report = state.backups.validate_backup(&args.backup_file).await?;
    Ok(ToolOutput::new(&report)?.with_record_id(Some(args.backup_file)))
}

#[instrument(skip(state, arguments))]
pub async fn delete_backup(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let args: BackupFileArgs = parse_args(arguments)?;
    let deleted = state.backups.delete_backup(&args.backup_file).await?;
    Ok(ToolOutput::new(&deleted)?.with_record_id(Some(args.backup_file)))
}
