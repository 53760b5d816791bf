// SPDX-License-Identifier: Apache-2.0

//! Single-statement write tools
//!
//! Each call runs in its own managed transaction inside the record store.

use serde::Deserialize;
use serde_json::{json, Value};
use tablegate_core::{AdminResult, Record};
use tracing::instrument;

use super::{parse_args, record_id_of, ToolOutput};
use crate::AppState;

#[derive(Debug, Deserialize)]
struct InsertArgs {
    table: String,
    data: Record,
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    table: String,
    data: Record,
    #[serde(rename = "where", default)]
    filter: Value,
}

#[derive(Debug, Deserialize)]
struct DeleteArgs {
    table: String,
    #[serde(rename = "where", default)]
    filter: Value,
    #[serde(default)]
    hard: Option<bool>,
}

fn primary_key<'a>(state: &'a AppState, table: &str) -> &'a str {
    state
        .whitelist
        .get(table)
        .map(|p| p.primary_key.as_str())
        .unwrap_or("id")
}

/// Inserts one row and returns it as stored.
#[instrument(skip(state, arguments))]
pub async fn insert_record(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let args: InsertArgs = parse_args(arguments)?;
    let outcome = state.store.insert(&args.table, &args.data).await?;
    let record_id = record_id_of(&outcome.record, primary_key(state, &args.table));
    Ok(ToolOutput::new(&outcome.record)?
        .with_statement(outcome.statement)
        .with_record_id(record_id)
        .with_changes(Value::Object(args.data)))
}

#[instrument(skip(state, arguments))]
pub async fn update_records(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let args: UpdateArgs = parse_args(arguments)?;
    let outcome = state.store.update(&args.table, &args.data, &args.filter).await?;
    let record_id = match outcome.records.as_slice() {
        [only] => record_id_of(only, primary_key(state, &args.table)),
        _ => None,
    };
    Ok(ToolOutput::new(&outcome)?
        .with_statement(outcome.statement.clone())
        .with_record_id(record_id)
        .with_changes(json!({ "set": args.data, "where": args.filter })))
}

/// Soft delete where the table supports it, unless `hard` says otherwise.
#[instrument(skip(state, arguments))]
pub async fn delete_records(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let args: DeleteArgs = parse_args(arguments)?;
    let outcome = state.store.delete(&args.table, &args.filter, args.hard).await?;
    let record_id = match outcome.records.as_slice() {
        [only] => record_id_of(only, primary_key(state, &args.table)),
        _ => None,
    };
    Ok(ToolOutput::new(&outcome)?
        .with_statement(outcome.statement.clone())
        .with_record_id(record_id)
        .with_changes(json!({ "where": args.filter, "type": outcome.kind })))
}
