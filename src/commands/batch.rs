// SPDX-License-Identifier: Apache-2.0

//! Batch write tools
//!
//! A batch is all-or-nothing: the first failing entry rolls back the whole
//! transaction and the error names its index.

use serde::Deserialize;
use serde_json::{json, Value};
use tablegate_core::{AdminResult, Record};
use tracing::instrument;

use super::{parse_args, ToolOutput};
use crate::engine::records::{BatchDeleteEntry, BatchUpdateEntry};
use crate::AppState;

fn default_return_records() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchInsertArgs {
    table: String,
    records: Vec<Record>,
    #[serde(default = "default_return_records")]
    return_records: bool,
}

#[derive(Debug, Deserialize)]
struct BatchUpdateArgs {
    table: String,
    updates: Vec<BatchUpdateEntry>,
}

#[derive(Debug, Deserialize)]
struct BatchDeleteArgs {
    table: String,
    deletes: Vec<BatchDeleteEntry>,
    #[serde(default)]
    hard: Option<bool>,
}

#[instrument(skip(state, arguments))]
pub async fn batch_insert(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let args: BatchInsertArgs = parse_args(arguments)?;
    let outcome = state
        .store
        .batch_insert(&args.table, &args.records, args.return_records)
        .await?;
    Ok(ToolOutput::new(&outcome)?
        .with_statement(outcome.statement.clone())
        .with_changes(json!({ "rows": args.records.len() })))
}

#[instrument(skip(state, arguments))]
pub async fn batch_update(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let args: BatchUpdateArgs = parse_args(arguments)?;
    let outcome = state.store.batch_update(&args.table, &args.updates).await?;
    Ok(ToolOutput::new(&outcome)?
        .with_statement(outcome.statement.clone())
        .with_changes(json!({ "entries": args.updates.len(), "affected": outcome.affected })))
}

#[instrument(skip(state, arguments))]
pub async fn batch_delete(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let args: BatchDeleteArgs = parse_args(arguments)?;
    let outcome = state
        .store
        .batch_delete(&args.table, &args.deletes, args.hard)
        .await?;
    Ok(ToolOutput::new(&outcome)?
        .with_statement(outcome.statement.clone())
        .with_changes(json!({ "entries": args.deletes.len(), "affected": outcome.affected })))
}
